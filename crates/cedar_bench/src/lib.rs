//! Benchmark helpers for cedardb.

use cedar_core::{DbName, DbOptions, Database, EnvConfig, Environment};

/// Opens an in-memory environment with transactions enabled and one
/// database, the setup every benchmark starts from.
#[must_use]
pub fn bench_env() -> (Environment, Database) {
    let env = Environment::open_in_memory(
        EnvConfig::new().enable_transactions(true),
    )
    .expect("in-memory environment");
    let db = env
        .create_db(DbName::new(1), DbOptions::new())
        .expect("benchmark database");
    (env, db)
}
