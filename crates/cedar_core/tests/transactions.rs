//! Transaction behaviour of the engine, end to end.

use cedar_core::{
    CloseOptions, CursorMove, DbName, DbOptions, EngineError, EnvConfig, Environment, InsertMode,
    TxnFlags,
};
use tempfile::TempDir;

const DB: DbName = DbName::new(1);

fn txn_config() -> EnvConfig {
    EnvConfig::new().enable_transactions(true)
}

fn memory_env() -> Environment {
    Environment::open_in_memory(txn_config()).unwrap()
}

fn file_env(temp: &TempDir) -> Environment {
    Environment::open(temp.path().join("env"), txn_config()).unwrap()
}

// =========================================================================
// transaction lifecycle
// =========================================================================

#[test]
fn begin_commit() {
    let env = memory_env();
    let txn = env.begin(TxnFlags::new()).unwrap();
    assert!(txn.is_active());
    txn.commit().unwrap();
    assert!(!txn.is_active());
}

#[test]
fn begin_abort() {
    let env = memory_env();
    let txn = env.begin(TxnFlags::new()).unwrap();
    txn.abort().unwrap();
    assert!(!txn.is_active());
}

#[test]
fn multiple_begin_commit_in_order() {
    let env = memory_env();
    let t1 = env.begin(TxnFlags::new()).unwrap();
    let t2 = env.begin(TxnFlags::new()).unwrap();
    let t3 = env.begin(TxnFlags::new()).unwrap();

    assert!(t1.id() < t2.id() && t2.id() < t3.id());
    assert_eq!(env.active_transactions(), 3);

    t1.commit().unwrap();
    assert_eq!(env.active_transactions(), 2);
    t2.commit().unwrap();
    assert_eq!(env.active_transactions(), 1);
    t3.commit().unwrap();
    assert_eq!(env.active_transactions(), 0);
}

#[test]
fn terminal_transaction_rejects_further_use() {
    let env = memory_env();
    let db = env.create_db(DB, DbOptions::new()).unwrap();

    let txn = env.begin(TxnFlags::new()).unwrap();
    txn.commit().unwrap();

    assert!(txn.commit().is_err());
    assert!(txn.abort().is_err());
    assert!(db.insert(Some(&txn), b"hello", b"world", InsertMode::Plain).is_err());
}

#[test]
fn dropping_an_active_transaction_aborts_it() {
    let env = memory_env();
    let db = env.create_db(DB, DbOptions::new()).unwrap();

    {
        let txn = env.begin(TxnFlags::new()).unwrap();
        db.insert(Some(&txn), b"hello", b"world", InsertMode::Plain)
            .unwrap();
    }

    assert_eq!(env.active_transactions(), 0);
    assert!(matches!(
        db.find(None, b"hello"),
        Err(EngineError::KeyNotFound)
    ));
}

#[test]
fn transactions_work_across_multiple_databases() {
    let env = memory_env();
    let db1 = env.create_db(DB, DbOptions::new()).unwrap();
    let db2 = env.create_db(DbName::new(14), DbOptions::new()).unwrap();
    let db3 = env.create_db(DbName::new(15), DbOptions::new()).unwrap();

    let txn = env.begin(TxnFlags::new()).unwrap();
    db1.insert(Some(&txn), b"one", b"1", InsertMode::Plain).unwrap();
    db2.insert(Some(&txn), b"two", b"2", InsertMode::Plain).unwrap();
    db3.insert(Some(&txn), b"three", b"3", InsertMode::Plain).unwrap();
    txn.commit().unwrap();

    assert_eq!(db1.find(None, b"one").unwrap(), b"1");
    assert_eq!(db2.find(None, b"two").unwrap(), b"2");
    assert_eq!(db3.find(None, b"three").unwrap(), b"3");
    assert!(matches!(
        db1.find(None, b"two"),
        Err(EngineError::KeyNotFound)
    ));
}

// =========================================================================
// conflicts between overlapping transactions
// =========================================================================

#[test]
fn insert_conflict_between_active_transactions() {
    let env = memory_env();
    let db = env.create_db(DB, DbOptions::new()).unwrap();

    // begin(T1); begin(T2); insert(T1, a); insert(T2, a) -> conflict
    let t1 = env.begin(TxnFlags::new()).unwrap();
    let t2 = env.begin(TxnFlags::new()).unwrap();

    db.insert(Some(&t1), b"hello", b"world", InsertMode::Plain).unwrap();
    assert!(db
        .insert(Some(&t2), b"hello", b"world", InsertMode::Plain)
        .unwrap_err()
        .is_conflict());

    t1.commit().unwrap();
    t2.commit().unwrap();
}

#[test]
fn insert_after_commit_is_a_duplicate() {
    let env = memory_env();
    let db = env.create_db(DB, DbOptions::new()).unwrap();

    // begin(T1); begin(T2); insert(T1, a); commit(T1); insert(T2, a) -> duplicate
    let t1 = env.begin(TxnFlags::new()).unwrap();
    let t2 = env.begin(TxnFlags::new()).unwrap();

    db.insert(Some(&t1), b"hello", b"world", InsertMode::Plain).unwrap();
    t1.commit().unwrap();

    assert!(matches!(
        db.insert(Some(&t2), b"hello", b"world", InsertMode::Plain),
        Err(EngineError::DuplicateKey)
    ));
    t2.commit().unwrap();
}

#[test]
fn overwrite_after_commit_succeeds() {
    let env = memory_env();
    let db = env.create_db(DB, DbOptions::new()).unwrap();

    // begin(T1); begin(T2); insert(T1, a); commit(T1); insert(T2, a, OW) -> ok
    let t1 = env.begin(TxnFlags::new()).unwrap();
    let t2 = env.begin(TxnFlags::new()).unwrap();

    db.insert(Some(&t1), b"hello", b"world", InsertMode::Plain).unwrap();
    t1.commit().unwrap();

    db.insert(Some(&t2), b"hello", b"again", InsertMode::Overwrite).unwrap();
    t2.commit().unwrap();

    assert_eq!(db.find(None, b"hello").unwrap(), b"again");
}

#[test]
fn duplicate_insert_after_commit_succeeds() {
    let env = memory_env();
    let db = env
        .create_db(DB, DbOptions::new().enable_duplicate_keys(true))
        .unwrap();

    // begin(T1); begin(T2); insert(T1, a); commit(T1); insert(T2, a, DUP) -> ok
    let t1 = env.begin(TxnFlags::new()).unwrap();
    let t2 = env.begin(TxnFlags::new()).unwrap();

    db.insert(Some(&t1), b"hello", b"world", InsertMode::Plain).unwrap();
    t1.commit().unwrap();

    db.insert(Some(&t2), b"hello", b"again", InsertMode::Duplicate).unwrap();
    t2.commit().unwrap();

    assert_eq!(db.count(None, false).unwrap(), 2);
    assert_eq!(db.count(None, true).unwrap(), 1);
}

#[test]
fn insert_after_abort_succeeds() {
    let env = memory_env();
    let db = env.create_db(DB, DbOptions::new()).unwrap();

    // begin(T1); begin(T2); insert(T1, a); abort(T1); insert(T2, a) -> ok
    let t1 = env.begin(TxnFlags::new()).unwrap();
    let t2 = env.begin(TxnFlags::new()).unwrap();

    db.insert(Some(&t1), b"hello", b"world", InsertMode::Plain).unwrap();
    t1.abort().unwrap();

    db.insert(Some(&t2), b"hello", b"world", InsertMode::Plain).unwrap();
    t2.commit().unwrap();
}

// =========================================================================
// find under transactions
// =========================================================================

#[test]
fn committed_insert_is_visible_to_older_transaction() {
    let env = memory_env();
    let db = env.create_db(DB, DbOptions::new()).unwrap();

    let t1 = env.begin(TxnFlags::new()).unwrap();
    let t2 = env.begin(TxnFlags::new()).unwrap();

    db.insert(Some(&t1), b"hello", b"world", InsertMode::Plain).unwrap();
    t1.commit().unwrap();

    assert_eq!(db.find(Some(&t2), b"hello").unwrap(), b"world");
    t2.commit().unwrap();
}

#[test]
fn uncommitted_insert_conflicts_with_reader() {
    let env = memory_env();
    let db = env.create_db(DB, DbOptions::new()).unwrap();

    let t1 = env.begin(TxnFlags::new()).unwrap();
    let t2 = env.begin(TxnFlags::new()).unwrap();

    db.insert(Some(&t1), b"hello", b"world", InsertMode::Plain).unwrap();
    assert!(db.find(Some(&t2), b"hello").unwrap_err().is_conflict());

    t1.commit().unwrap();
    t2.commit().unwrap();
}

#[test]
fn committed_insert_is_visible_without_transaction() {
    let env = memory_env();
    let db = env.create_db(DB, DbOptions::new()).unwrap();

    let t1 = env.begin(TxnFlags::new()).unwrap();
    let t2 = env.begin(TxnFlags::new()).unwrap();

    db.insert(Some(&t1), b"hello", b"world", InsertMode::Plain).unwrap();
    t1.commit().unwrap();
    t2.commit().unwrap();

    assert_eq!(db.find(None, b"hello").unwrap(), b"world");
}

#[test]
fn aborted_insert_is_not_found() {
    let env = memory_env();
    let db = env.create_db(DB, DbOptions::new()).unwrap();

    let t1 = env.begin(TxnFlags::new()).unwrap();
    let t2 = env.begin(TxnFlags::new()).unwrap();

    db.insert(Some(&t1), b"hello", b"world", InsertMode::Plain).unwrap();
    t1.abort().unwrap();

    assert!(matches!(
        db.find(Some(&t2), b"hello"),
        Err(EngineError::KeyNotFound)
    ));
    t2.commit().unwrap();
}

#[test]
fn unrelated_key_is_not_found() {
    let env = memory_env();
    let db = env.create_db(DB, DbOptions::new()).unwrap();

    let t1 = env.begin(TxnFlags::new()).unwrap();
    let t2 = env.begin(TxnFlags::new()).unwrap();

    db.insert(Some(&t1), b"hello", b"world", InsertMode::Plain).unwrap();
    t1.abort().unwrap();

    assert!(matches!(
        db.find(Some(&t2), b"world"),
        Err(EngineError::KeyNotFound)
    ));
    t2.commit().unwrap();
}

// =========================================================================
// erase under transactions
// =========================================================================

#[test]
fn erase_hides_committed_key_from_same_transaction() {
    let env = memory_env();
    let db = env.create_db(DB, DbOptions::new()).unwrap();

    let t1 = env.begin(TxnFlags::new()).unwrap();
    let t2 = env.begin(TxnFlags::new()).unwrap();

    db.insert(Some(&t1), b"hello", b"world", InsertMode::Plain).unwrap();
    t1.commit().unwrap();

    db.erase(Some(&t2), b"hello").unwrap();
    assert!(matches!(
        db.find(Some(&t2), b"hello"),
        Err(EngineError::KeyNotFound)
    ));
    t2.commit().unwrap();

    assert!(matches!(
        db.erase(None, b"hello"),
        Err(EngineError::KeyNotFound)
    ));
}

#[test]
fn erase_of_aborted_key_fails() {
    let env = memory_env();
    let db = env.create_db(DB, DbOptions::new()).unwrap();

    let t1 = env.begin(TxnFlags::new()).unwrap();
    let t2 = env.begin(TxnFlags::new()).unwrap();

    db.insert(Some(&t1), b"hello", b"world", InsertMode::Plain).unwrap();
    t1.abort().unwrap();

    assert!(matches!(
        db.erase(Some(&t2), b"hello"),
        Err(EngineError::KeyNotFound)
    ));
    t2.commit().unwrap();
}

#[test]
fn erase_after_own_insert() {
    let env = memory_env();
    let db = env.create_db(DB, DbOptions::new()).unwrap();

    // insert(T1, a); erase(T1, a) -> ok; erase(T1, a) -> not found
    let t1 = env.begin(TxnFlags::new()).unwrap();
    let t2 = env.begin(TxnFlags::new()).unwrap();

    db.insert(Some(&t1), b"hello", b"world", InsertMode::Plain).unwrap();
    db.erase(Some(&t1), b"hello").unwrap();
    assert!(matches!(
        db.erase(Some(&t1), b"hello"),
        Err(EngineError::KeyNotFound)
    ));
    t1.commit().unwrap();

    assert!(matches!(
        db.erase(Some(&t2), b"hello"),
        Err(EngineError::KeyNotFound)
    ));
    t2.commit().unwrap();
}

// =========================================================================
// implicit transactions and the null reader
// =========================================================================

#[test]
fn insert_find_commit_with_null_reader() {
    let env = memory_env();
    let db = env.create_db(DB, DbOptions::new()).unwrap();
    let record = [0u8; 64];

    let txn = env.begin(TxnFlags::new()).unwrap();
    // zero-length keys are legal
    db.insert(Some(&txn), b"", &record, InsertMode::Plain).unwrap();
    assert_eq!(db.find(Some(&txn), b"").unwrap(), record);

    // the null reader observes linearizable truth and must conflict
    assert!(db.find(None, b"").unwrap_err().is_conflict());

    txn.commit().unwrap();
    assert_eq!(db.find(None, b"").unwrap(), record);
}

#[test]
fn erase_without_transaction_conflicts_with_writer() {
    let env = memory_env();
    let db = env.create_db(DB, DbOptions::new()).unwrap();

    let txn = env.begin(TxnFlags::new()).unwrap();
    db.insert(Some(&txn), b"hello", b"world", InsertMode::Plain).unwrap();

    assert!(db.erase(None, b"hello").unwrap_err().is_conflict());

    txn.commit().unwrap();
    db.erase(None, b"hello").unwrap();
}

#[test]
fn begin_fails_without_transactions() {
    let env = Environment::open_in_memory(EnvConfig::new()).unwrap();
    let db = env.create_db(DB, DbOptions::new()).unwrap();

    assert!(env.begin(TxnFlags::new()).is_err());

    // plain operations still work, straight against the tree
    db.insert(None, b"hello", b"world", InsertMode::Plain).unwrap();
    assert_eq!(db.find(None, b"hello").unwrap(), b"world");
    db.erase(None, b"hello").unwrap();
}

// =========================================================================
// counting
// =========================================================================

#[test]
fn key_count() {
    let env = memory_env();
    let db = env.create_db(DB, DbOptions::new()).unwrap();

    // without txn
    db.insert(None, b"key1", b"rec1", InsertMode::Plain).unwrap();
    assert_eq!(db.find(None, b"key1").unwrap(), b"rec1");
    assert_eq!(db.count(None, false).unwrap(), 1);

    // in an active txn
    let txn = env.begin(TxnFlags::new()).unwrap();
    assert_eq!(db.count(Some(&txn), false).unwrap(), 1);
    db.insert(Some(&txn), b"key2", b"rec2", InsertMode::Plain).unwrap();
    assert!(db.find(None, b"key2").unwrap_err().is_conflict());
    assert_eq!(db.find(Some(&txn), b"key2").unwrap(), b"rec2");
    assert_eq!(db.count(Some(&txn), false).unwrap(), 2);
    db.insert(Some(&txn), b"key2", b"rec2", InsertMode::Overwrite).unwrap();
    assert_eq!(db.count(Some(&txn), false).unwrap(), 2);
    txn.commit().unwrap();
    assert_eq!(db.find(None, b"key2").unwrap(), b"rec2");

    // after commit
    assert_eq!(db.count(None, false).unwrap(), 2);

    // in an aborted txn
    let txn = env.begin(TxnFlags::new()).unwrap();
    db.insert(Some(&txn), b"key3", b"rec1", InsertMode::Plain).unwrap();
    assert_eq!(db.count(Some(&txn), false).unwrap(), 3);
    txn.abort().unwrap();

    assert_eq!(db.count(None, false).unwrap(), 2);
}

#[test]
fn key_count_with_duplicates() {
    let env = memory_env();
    let db = env
        .create_db(DB, DbOptions::new().enable_duplicate_keys(true))
        .unwrap();

    db.insert(None, b"key1", b"rec1", InsertMode::Plain).unwrap();
    db.insert(None, b"key2", b"rec1", InsertMode::Plain).unwrap();
    assert_eq!(db.count(None, false).unwrap(), 2);

    let txn = env.begin(TxnFlags::new()).unwrap();
    assert_eq!(db.count(Some(&txn), false).unwrap(), 2);
    db.insert(Some(&txn), b"key3", b"rec3", InsertMode::Plain).unwrap();
    db.insert(Some(&txn), b"key3", b"rec4", InsertMode::Duplicate).unwrap();
    assert_eq!(db.count(Some(&txn), false).unwrap(), 4);
    assert_eq!(db.count(Some(&txn), true).unwrap(), 3);
    txn.commit().unwrap();

    assert_eq!(db.count(None, false).unwrap(), 4);
    assert_eq!(db.count(None, true).unwrap(), 3);
}

#[test]
fn key_count_with_overwrites() {
    let env = memory_env();
    let db = env
        .create_db(DB, DbOptions::new().enable_duplicate_keys(true))
        .unwrap();

    db.insert(None, b"key1", b"rec1", InsertMode::Plain).unwrap();
    db.insert(None, b"key2", b"rec1", InsertMode::Plain).unwrap();
    assert_eq!(db.count(None, false).unwrap(), 2);

    let txn = env.begin(TxnFlags::new()).unwrap();
    assert_eq!(db.count(Some(&txn), false).unwrap(), 2);
    db.insert(Some(&txn), b"key2", b"rec4", InsertMode::Overwrite).unwrap();
    assert_eq!(db.count(Some(&txn), false).unwrap(), 2);
    db.insert(Some(&txn), b"key3", b"rec3", InsertMode::Plain).unwrap();
    db.insert(Some(&txn), b"key3", b"rec4", InsertMode::Overwrite).unwrap();
    assert_eq!(db.count(Some(&txn), false).unwrap(), 3);
    assert_eq!(db.count(Some(&txn), true).unwrap(), 3);
    txn.commit().unwrap();

    assert_eq!(db.count(None, false).unwrap(), 3);
    assert_eq!(db.count(None, true).unwrap(), 3);
}

// =========================================================================
// cursors
// =========================================================================

#[test]
fn cursor_blocks_commit_until_closed() {
    let env = memory_env();
    let db = env.create_db(DB, DbOptions::new()).unwrap();

    let txn = env.begin(TxnFlags::new()).unwrap();
    let cursor = db.cursor(Some(&txn)).unwrap();

    assert!(matches!(
        txn.commit(),
        Err(EngineError::CursorStillOpen { .. })
    ));
    assert!(matches!(
        txn.abort(),
        Err(EngineError::CursorStillOpen { .. })
    ));

    cursor.close();
    txn.commit().unwrap();
}

#[test]
fn cloned_cursor_blocks_commit_until_closed() {
    let env = memory_env();
    let db = env.create_db(DB, DbOptions::new()).unwrap();

    let txn = env.begin(TxnFlags::new()).unwrap();
    let cursor = db.cursor(Some(&txn)).unwrap();
    let clone = cursor.try_clone().unwrap();

    cursor.close();
    assert!(matches!(
        txn.commit(),
        Err(EngineError::CursorStillOpen { .. })
    ));

    clone.close();
    txn.abort().unwrap();
}

#[test]
fn cursor_insert_find_erase() {
    let env = memory_env();
    let db = env.create_db(DB, DbOptions::new()).unwrap();

    let txn = env.begin(TxnFlags::new()).unwrap();
    let mut cursor = db.cursor(Some(&txn)).unwrap();

    cursor.insert(b"hello", b"world", InsertMode::Plain).unwrap();
    assert_eq!(cursor.find(b"hello").unwrap(), b"world");

    cursor.erase().unwrap();
    assert!(matches!(cursor.find(b"hello"), Err(EngineError::KeyNotFound)));

    cursor.close();
    txn.commit().unwrap();
}

#[test]
fn cursor_record_size_and_overwrite() {
    let env = memory_env();
    let db = env.create_db(DB, DbOptions::new()).unwrap();

    let txn = env.begin(TxnFlags::new()).unwrap();
    let mut cursor = db.cursor(Some(&txn)).unwrap();

    cursor.insert(b"", b"12345\0", InsertMode::Plain).unwrap();
    cursor.find(b"").unwrap();
    assert_eq!(cursor.record_size().unwrap(), 6);

    cursor.overwrite(b"1234567890\0").unwrap();
    assert_eq!(cursor.find(b"").unwrap(), b"1234567890\0");
    assert_eq!(cursor.record_size().unwrap(), 11);

    cursor.close();
    txn.commit().unwrap();
}

#[test]
fn cursor_duplicates_and_count() {
    let env = memory_env();
    let db = env
        .create_db(DbName::new(13), DbOptions::new().enable_duplicate_keys(true))
        .unwrap();

    let txn = env.begin(TxnFlags::new()).unwrap();
    let mut cursor = db.cursor(Some(&txn)).unwrap();

    cursor.insert(b"key", b"a", InsertMode::Duplicate).unwrap();
    cursor.insert(b"key", b"b", InsertMode::Duplicate).unwrap();
    cursor.insert(b"key", b"c", InsertMode::Duplicate).unwrap();
    assert_eq!(cursor.duplicate_position().unwrap(), 2);

    cursor.find(b"key").unwrap();
    assert_eq!(cursor.duplicate_position().unwrap(), 0);
    assert_eq!(db.count(Some(&txn), false).unwrap(), 3);
    assert_eq!(db.count(Some(&txn), true).unwrap(), 1);

    cursor.close();
    txn.commit().unwrap();
}

#[test]
fn cursor_moves_over_the_merged_view() {
    let env = memory_env();
    let db = env.create_db(DB, DbOptions::new()).unwrap();

    // "bbb" is committed, "aaa" and "ccc" live in the transaction layer
    db.insert(None, b"bbb", b"2", InsertMode::Plain).unwrap();

    let txn = env.begin(TxnFlags::new()).unwrap();
    db.insert(Some(&txn), b"aaa", b"1", InsertMode::Plain).unwrap();
    db.insert(Some(&txn), b"ccc", b"3", InsertMode::Plain).unwrap();

    let mut cursor = db.cursor(Some(&txn)).unwrap();

    let (key, record) = cursor.move_to(CursorMove::First).unwrap();
    assert_eq!((key.as_slice(), record.as_slice()), (&b"aaa"[..], &b"1"[..]));

    let (key, _) = cursor.move_to(CursorMove::Next).unwrap();
    assert_eq!(key, b"bbb");
    let (key, _) = cursor.move_to(CursorMove::Next).unwrap();
    assert_eq!(key, b"ccc");
    assert!(matches!(
        cursor.move_to(CursorMove::Next),
        Err(EngineError::KeyNotFound)
    ));

    let (key, _) = cursor.move_to(CursorMove::Last).unwrap();
    assert_eq!(key, b"ccc");
    let (key, _) = cursor.move_to(CursorMove::Prev).unwrap();
    assert_eq!(key, b"bbb");
    let (key, _) = cursor.move_to(CursorMove::Prev).unwrap();
    assert_eq!(key, b"aaa");
    assert!(matches!(
        cursor.move_to(CursorMove::Prev),
        Err(EngineError::KeyNotFound)
    ));

    cursor.close();
    txn.commit().unwrap();
}

#[test]
fn cursor_steps_through_duplicates() {
    let env = memory_env();
    let db = env
        .create_db(DB, DbOptions::new().enable_duplicate_keys(true))
        .unwrap();

    db.insert(None, b"key", b"a", InsertMode::Plain).unwrap();
    db.insert(None, b"key", b"b", InsertMode::Duplicate).unwrap();
    db.insert(None, b"zzz", b"z", InsertMode::Plain).unwrap();

    let txn = env.begin(TxnFlags::new()).unwrap();
    let mut cursor = db.cursor(Some(&txn)).unwrap();

    let (key, record) = cursor.move_to(CursorMove::First).unwrap();
    assert_eq!((key.as_slice(), record.as_slice()), (&b"key"[..], &b"a"[..]));

    let (key, record) = cursor.move_to(CursorMove::Next).unwrap();
    assert_eq!((key.as_slice(), record.as_slice()), (&b"key"[..], &b"b"[..]));
    assert_eq!(cursor.duplicate_position().unwrap(), 1);

    let (key, record) = cursor.move_to(CursorMove::Next).unwrap();
    assert_eq!((key.as_slice(), record.as_slice()), (&b"zzz"[..], &b"z"[..]));

    let (key, record) = cursor.move_to(CursorMove::Prev).unwrap();
    assert_eq!((key.as_slice(), record.as_slice()), (&b"key"[..], &b"b"[..]));

    cursor.close();
    txn.abort().unwrap();
}

// =========================================================================
// close behaviour
// =========================================================================

#[test]
fn db_close_fails_with_open_transaction() {
    let env = memory_env();
    let db = env.create_db(DB, DbOptions::new()).unwrap();

    let txn = env.begin(TxnFlags::new()).unwrap();
    db.insert(Some(&txn), b"hello", b"world", InsertMode::Plain).unwrap();

    assert!(matches!(
        db.close(CloseOptions::new()),
        Err(EngineError::TxnStillOpen { .. })
    ));

    txn.commit().unwrap();
    db.close(CloseOptions::new()).unwrap();
}

#[test]
fn env_close_fails_with_open_transaction() {
    let env = memory_env();
    let db = env.create_db(DB, DbOptions::new()).unwrap();

    let txn = env.begin(TxnFlags::new()).unwrap();
    db.insert(Some(&txn), b"hello", b"world", InsertMode::Plain).unwrap();

    assert!(matches!(
        env.close(CloseOptions::new()),
        Err(EngineError::TxnStillOpen { .. })
    ));

    txn.commit().unwrap();
    env.close(CloseOptions::new()).unwrap();
    assert!(matches!(
        db.find(None, b"hello"),
        Err(EngineError::EnvironmentClosed)
    ));
}

#[test]
fn auto_abort_on_env_close() {
    let temp = TempDir::new().unwrap();

    {
        let env = file_env(&temp);
        let db = env.create_db(DB, DbOptions::new()).unwrap();
        let txn = env.begin(TxnFlags::new()).unwrap();
        db.insert(Some(&txn), b"hello", b"world", InsertMode::Plain).unwrap();
        assert_eq!(db.find(Some(&txn), b"hello").unwrap(), b"world");

        env.close(CloseOptions::new().auto_cleanup(true)).unwrap();
    }

    let env = file_env(&temp);
    let db = env.open_db(DB).unwrap();
    assert!(matches!(
        db.find(None, b"hello"),
        Err(EngineError::KeyNotFound)
    ));
}

#[test]
fn auto_commit_on_env_close() {
    let temp = TempDir::new().unwrap();

    {
        let env = file_env(&temp);
        let db = env.create_db(DB, DbOptions::new()).unwrap();
        let txn = env.begin(TxnFlags::new()).unwrap();
        db.insert(Some(&txn), b"hello", b"world", InsertMode::Plain).unwrap();

        env.close(CloseOptions::new().auto_cleanup(true).txn_auto_commit(true))
            .unwrap();
    }

    let env = file_env(&temp);
    let db = env.open_db(DB).unwrap();
    assert_eq!(db.find(None, b"hello").unwrap(), b"world");
}

// =========================================================================
// durability and the non-persisted transaction flag
// =========================================================================

#[test]
fn transaction_flag_is_not_persisted() {
    let temp = TempDir::new().unwrap();

    {
        let env = file_env(&temp);
        let db = env.create_db(DB, DbOptions::new()).unwrap();
        assert!(env.transactions_enabled());
        assert!(db.transactions_enabled());
        env.close(CloseOptions::new()).unwrap();
    }

    // reopening without the flag yields a non-transactional session
    let env = Environment::open(temp.path().join("env"), EnvConfig::new()).unwrap();
    let db = env.open_db(DB).unwrap();
    assert!(!env.transactions_enabled());
    assert!(!db.transactions_enabled());
    assert!(env.begin(TxnFlags::new()).is_err());
}

#[test]
fn committed_data_survives_reopen() {
    let temp = TempDir::new().unwrap();

    {
        let env = file_env(&temp);
        let db = env.create_db(DB, DbOptions::new()).unwrap();
        let txn = env.begin(TxnFlags::new()).unwrap();
        db.insert(Some(&txn), b"hello", b"world", InsertMode::Plain).unwrap();
        txn.commit().unwrap();
        env.close(CloseOptions::new()).unwrap();
    }

    let env = file_env(&temp);
    let db = env.open_db(DB).unwrap();
    assert_eq!(db.find(None, b"hello").unwrap(), b"world");
}

#[test]
fn aborted_data_does_not_survive() {
    let env = memory_env();
    let db = env.create_db(DB, DbOptions::new()).unwrap();

    let txn = env.begin(TxnFlags::new()).unwrap();
    db.insert(Some(&txn), b"hello", b"world", InsertMode::Plain).unwrap();
    txn.abort().unwrap();

    assert!(matches!(
        db.find(None, b"hello"),
        Err(EngineError::KeyNotFound)
    ));
}

#[test]
fn thirty_single_op_transactions_survive_reopen() {
    let temp = TempDir::new().unwrap();

    {
        let env = file_env(&temp);
        let db = env.create_db(DB, DbOptions::new()).unwrap();
        for i in 0u32..30 {
            let key = i.to_le_bytes();
            let txn = env.begin(TxnFlags::new()).unwrap();
            db.insert(Some(&txn), &key, &key, InsertMode::Plain).unwrap();
            txn.commit().unwrap();
        }
        env.close(CloseOptions::new().auto_cleanup(true)).unwrap();
    }

    let env = file_env(&temp);
    let db = env.open_db(DB).unwrap();
    for i in 0u32..30 {
        let key = i.to_le_bytes();
        assert_eq!(db.find(None, &key).unwrap(), key);
    }
    assert_eq!(db.count(None, false).unwrap(), 30);
}

#[test]
fn pending_transaction_does_not_survive_reopen() {
    let temp = TempDir::new().unwrap();

    {
        let env = file_env(&temp);
        let db = env.create_db(DB, DbOptions::new()).unwrap();

        let committed = env.begin(TxnFlags::new()).unwrap();
        db.insert(Some(&committed), b"kept", b"yes", InsertMode::Plain).unwrap();
        committed.commit().unwrap();

        let pending = env.begin(TxnFlags::new()).unwrap();
        db.insert(Some(&pending), b"dropped", b"no", InsertMode::Plain).unwrap();
        // `pending` is still open when the environment goes away
    }

    let env = file_env(&temp);
    let db = env.open_db(DB).unwrap();
    assert_eq!(db.find(None, b"kept").unwrap(), b"yes");
    assert!(matches!(
        db.find(None, b"dropped"),
        Err(EngineError::KeyNotFound)
    ));
}

#[test]
fn duplicates_survive_reopen() {
    let temp = TempDir::new().unwrap();

    {
        let env = file_env(&temp);
        let db = env
            .create_db(DbName::new(13), DbOptions::new().enable_duplicate_keys(true))
            .unwrap();
        let txn = env.begin(TxnFlags::new()).unwrap();
        db.insert(Some(&txn), b"key", b"a", InsertMode::Plain).unwrap();
        db.insert(Some(&txn), b"key", b"b", InsertMode::Duplicate).unwrap();
        txn.commit().unwrap();
        env.close(CloseOptions::new()).unwrap();
    }

    let env = file_env(&temp);
    let db = env.open_db(DbName::new(13)).unwrap();
    assert!(db.duplicates_enabled());
    assert_eq!(db.count(None, false).unwrap(), 2);
    assert_eq!(db.count(None, true).unwrap(), 1);
}

// =========================================================================
// in-memory environments
// =========================================================================

#[test]
fn in_memory_create_close() {
    let env = Environment::open_in_memory(txn_config()).unwrap();
    let _db = env
        .create_db(DbName::new(13), DbOptions::new().enable_duplicate_keys(true))
        .unwrap();
    env.close(CloseOptions::new().auto_cleanup(true)).unwrap();
}

#[test]
fn in_memory_insert_abort_insert() {
    let env = memory_env();
    let db = env
        .create_db(DbName::new(13), DbOptions::new().enable_duplicate_keys(true))
        .unwrap();

    let txn = env.begin(TxnFlags::new()).unwrap();
    db.insert(Some(&txn), b"", b"", InsertMode::Plain).unwrap();
    txn.abort().unwrap();

    let txn = env.begin(TxnFlags::new()).unwrap();
    db.insert(Some(&txn), b"", b"", InsertMode::Plain).unwrap();
    txn.commit().unwrap();
}

#[test]
fn in_memory_insert_erase_find() {
    let env = memory_env();
    let db = env
        .create_db(DbName::new(13), DbOptions::new().enable_duplicate_keys(true))
        .unwrap();

    let txn = env.begin(TxnFlags::new()).unwrap();
    db.insert(Some(&txn), b"", b"", InsertMode::Plain).unwrap();
    assert_eq!(db.find(Some(&txn), b"").unwrap(), b"");
    db.erase(Some(&txn), b"").unwrap();
    assert!(matches!(
        db.find(Some(&txn), b""),
        Err(EngineError::KeyNotFound)
    ));
    txn.commit().unwrap();
}

#[test]
fn in_memory_conflicts_match_file_behaviour() {
    let env = memory_env();
    let db = env.create_db(DB, DbOptions::new()).unwrap();

    let t1 = env.begin(TxnFlags::new()).unwrap();
    let t2 = env.begin(TxnFlags::new()).unwrap();

    db.insert(Some(&t1), b"hello", b"world", InsertMode::Plain).unwrap();
    assert!(db
        .insert(Some(&t2), b"hello", b"world", InsertMode::Plain)
        .unwrap_err()
        .is_conflict());
    assert!(db.find(Some(&t2), b"hello").unwrap_err().is_conflict());
    assert!(db.find(None, b"hello").unwrap_err().is_conflict());

    t1.commit().unwrap();
    assert_eq!(db.find(Some(&t2), b"hello").unwrap(), b"world");
    t2.commit().unwrap();
}
