//! Cursors over the merged view of base tree and transaction layer.

use crate::config::{CursorMove, InsertMode};
use crate::db::{direct_insert, DbState};
use crate::env::EnvInner;
use crate::error::{EngineError, EngineResult};
use crate::tree::TreeInsert;
use crate::types::TxnId;
use std::sync::Arc;

/// Current coupling of a cursor: a key plus a duplicate position.
#[derive(Debug, Clone)]
struct Position {
    key: Vec<u8>,
    duplicate: u32,
}

/// A cursor over one database.
///
/// A cursor is positioned on a key and one of its duplicates, and navigates
/// the merged view of the base tree and the transaction layer under the
/// cursor's transaction. While positioned, it pins the key's transaction
/// node; while alive, it pins its transaction, which refuses to commit or
/// abort with `CursorStillOpen`.
///
/// The cursor's lifetime must stay within its transaction's lifetime.
pub struct Cursor {
    env: Arc<EnvInner>,
    db: Arc<DbState>,
    txn: Option<TxnId>,
    position: Option<Position>,
    released: bool,
}

impl Cursor {
    pub(crate) fn create(
        env: Arc<EnvInner>,
        db: Arc<DbState>,
        txn: Option<TxnId>,
    ) -> EngineResult<Self> {
        if let Some(id) = txn {
            env.manager().attach_cursor(id)?;
        }
        Ok(Self {
            env,
            db,
            txn,
            position: None,
            released: false,
        })
    }

    /// Clones this cursor, including its position and transaction binding.
    pub fn try_clone(&self) -> EngineResult<Self> {
        self.guard()?;
        if let Some(id) = self.txn {
            self.env.manager().attach_cursor(id)?;
        }
        if let Some(position) = &self.position {
            if self.transactional() {
                self.env.manager().pin_key(self.db.name, &position.key);
            }
        }
        Ok(Self {
            env: self.env.clone(),
            db: self.db.clone(),
            txn: self.txn,
            position: self.position.clone(),
            released: false,
        })
    }

    /// Closes the cursor, releasing its transaction and node pins.
    pub fn close(mut self) {
        self.release();
    }

    /// Positions the cursor on a key and returns its first record.
    pub fn find(&mut self, key: &[u8]) -> EngineResult<Vec<u8>> {
        self.guard()?;
        let mut dups = self.view(key)?;
        if dups.is_empty() {
            return Err(EngineError::KeyNotFound);
        }
        self.set_position(key.to_vec(), 0);
        Ok(dups.swap_remove(0))
    }

    /// Inserts a key/record pair and positions the cursor on it.
    pub fn insert(&mut self, key: &[u8], record: &[u8], mode: InsertMode) -> EngineResult<()> {
        self.guard()?;

        if self.transactional() {
            self.env
                .manager()
                .insert(&self.db, self.txn, key, record, mode)?;
        } else {
            direct_insert(&self.db, self.env.config(), key, record, mode)?;
        }

        let duplicate = if mode == InsertMode::Duplicate {
            (self.view(key)?.len().saturating_sub(1)) as u32
        } else {
            0
        };
        self.set_position(key.to_vec(), duplicate);
        Ok(())
    }

    /// Erases the duplicate the cursor is positioned on.
    ///
    /// The cursor becomes unpositioned afterwards.
    pub fn erase(&mut self) -> EngineResult<()> {
        self.guard()?;
        let position = self.require_position()?.clone();

        if self.transactional() {
            self.env
                .manager()
                .erase(&self.db, self.txn, &position.key, Some(position.duplicate))?;
        } else {
            self.db
                .tree
                .write()
                .erase(&position.key, Some(position.duplicate))?;
        }

        self.clear_position();
        Ok(())
    }

    /// Replaces the record of the duplicate the cursor is positioned on.
    pub fn overwrite(&mut self, record: &[u8]) -> EngineResult<()> {
        self.guard()?;
        let position = self.require_position()?.clone();

        if self.transactional() {
            self.env.manager().overwrite_at(
                &self.db,
                self.txn,
                &position.key,
                position.duplicate,
                record,
            )
        } else {
            let mut tree = self.db.tree.write();
            let dups = tree.duplicates(&position.key).unwrap_or_default();
            if position.duplicate as usize >= dups.len() {
                return Err(EngineError::KeyNotFound);
            }
            tree.insert(
                &position.key,
                record,
                TreeInsert::Overwrite(Some(position.duplicate)),
            )
        }
    }

    /// Returns the size of the record the cursor is positioned on.
    pub fn record_size(&self) -> EngineResult<u64> {
        self.guard()?;
        let position = self.require_position()?;
        let dups = self.view(&position.key)?;
        dups.get(position.duplicate as usize)
            .map(|record| record.len() as u64)
            .ok_or(EngineError::KeyNotFound)
    }

    /// Returns the cursor's position in the duplicate list.
    pub fn duplicate_position(&self) -> EngineResult<u32> {
        self.guard()?;
        Ok(self.require_position()?.duplicate)
    }

    /// Returns the key the cursor is positioned on.
    pub fn current_key(&self) -> EngineResult<Vec<u8>> {
        self.guard()?;
        Ok(self.require_position()?.key.clone())
    }

    /// Moves the cursor and returns the key/record pair it lands on.
    ///
    /// `Next` and `Prev` step through duplicates before moving to the
    /// neighbouring key; `First` and `Last` land on the outermost key's
    /// first (respectively last) duplicate. When the move runs off the end,
    /// `KeyNotFound` is returned and the position is unchanged.
    pub fn move_to(&mut self, direction: CursorMove) -> EngineResult<(Vec<u8>, Vec<u8>)> {
        self.guard()?;

        match direction {
            CursorMove::First => self.land(self.seek(None, true)?, true),
            CursorMove::Last => self.land(self.seek(None, false)?, false),
            CursorMove::Next => match self.position.clone() {
                None => self.land(self.seek(None, true)?, true),
                Some(position) => {
                    let dups = self.view(&position.key)?;
                    let next = position.duplicate as usize + 1;
                    if next < dups.len() {
                        self.set_position(position.key.clone(), next as u32);
                        return Ok((position.key, dups[next].clone()));
                    }
                    self.land(self.seek(Some(position.key.as_slice()), true)?, true)
                }
            },
            CursorMove::Prev => match self.position.clone() {
                None => self.land(self.seek(None, false)?, false),
                Some(position) => {
                    if position.duplicate > 0 {
                        let dups = self.view(&position.key)?;
                        let prev = (position.duplicate - 1) as usize;
                        if prev < dups.len() {
                            self.set_position(position.key.clone(), prev as u32);
                            return Ok((position.key, dups[prev].clone()));
                        }
                    }
                    self.land(self.seek(Some(position.key.as_slice()), false)?, false)
                }
            },
        }
    }

    // ------------------------------------------------------------------
    // internals
    // ------------------------------------------------------------------

    fn transactional(&self) -> bool {
        self.env.transactions_enabled()
    }

    fn guard(&self) -> EngineResult<()> {
        self.env.ensure_open()?;
        if !self.db.is_open() {
            return Err(EngineError::DatabaseClosed { name: self.db.name });
        }
        Ok(())
    }

    fn require_position(&self) -> EngineResult<&Position> {
        self.position
            .as_ref()
            .ok_or_else(|| EngineError::invalid_operation("cursor is not positioned"))
    }

    /// Couples the cursor at a seek result, first or last duplicate.
    fn land(
        &mut self,
        found: Option<(Vec<u8>, Vec<Vec<u8>>)>,
        first_duplicate: bool,
    ) -> EngineResult<(Vec<u8>, Vec<u8>)> {
        let Some((key, dups)) = found else {
            return Err(EngineError::KeyNotFound);
        };
        let index = if first_duplicate { 0 } else { dups.len() - 1 };
        self.set_position(key.clone(), index as u32);
        Ok((key, dups[index].clone()))
    }

    fn view(&self, key: &[u8]) -> EngineResult<Vec<Vec<u8>>> {
        if self.transactional() {
            self.env.manager().view(&self.db, self.txn, key, true)
        } else {
            Ok(self.db.tree.read().duplicates(key).unwrap_or_default())
        }
    }

    fn seek(
        &self,
        from: Option<&[u8]>,
        forward: bool,
    ) -> EngineResult<Option<(Vec<u8>, Vec<Vec<u8>>)>> {
        if self.transactional() {
            return self.env.manager().seek(&self.db, self.txn, from, forward);
        }

        let tree = self.db.tree.read();
        let key = match (from, forward) {
            (None, true) => tree.first_key(),
            (None, false) => tree.last_key(),
            (Some(key), true) => tree.next_key(key),
            (Some(key), false) => tree.prev_key(key),
        };
        Ok(key.map(|key| {
            let dups = tree.duplicates(&key).unwrap_or_default();
            (key, dups)
        }))
    }

    fn set_position(&mut self, key: Vec<u8>, duplicate: u32) {
        let same_key = self
            .position
            .as_ref()
            .is_some_and(|position| position.key == key);

        if self.transactional() && !same_key {
            if let Some(old) = &self.position {
                self.env.manager().unpin_key(self.db.name, &old.key);
            }
            self.env.manager().pin_key(self.db.name, &key);
        }
        self.position = Some(Position { key, duplicate });
    }

    fn clear_position(&mut self) {
        if let Some(old) = self.position.take() {
            if self.transactional() && !self.env.is_closed() {
                self.env.manager().unpin_key(self.db.name, &old.key);
            }
        }
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        if self.env.is_closed() {
            self.position = None;
            return;
        }
        self.clear_position();
        if let Some(id) = self.txn {
            self.env.manager().detach_cursor(id);
        }
    }
}

impl Drop for Cursor {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for Cursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cursor")
            .field("db", &self.db.name)
            .field("txn", &self.txn)
            .field("positioned", &self.position.is_some())
            .finish_non_exhaustive()
    }
}
