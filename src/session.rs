//! Per-identity cursors into a tenant's table.
//!
//! Navigation is circular: stepping past either end wraps around instead of
//! clamping. Each operation runs under one lock so a read-modify-write on a
//! cursor is never interleaved with another update.
use crate::identity::Identity;
use crate::sync::lock_with_recovery;
use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;

/// Navigation failures reported back to the chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavError {
    EmptyTable,
    OutOfRange { min: u64, max: u64 },
}

impl fmt::Display for NavError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NavError::EmptyTable => f.write_str("table is empty"),
            NavError::OutOfRange { min, max } => {
                write!(f, "number must be between {min} and {max}")
            }
        }
    }
}

impl std::error::Error for NavError {}

#[derive(Debug, Default)]
pub struct SessionStore {
    cursors: Mutex<HashMap<Identity, usize>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current cursor; identities that never navigated sit at 0.
    pub fn cursor(&self, identity: &Identity) -> usize {
        let cursors = lock_with_recovery(&self.cursors, "sessions");
        cursors.get(identity).copied().unwrap_or(0)
    }

    pub fn reset(&self, identity: &Identity) {
        let mut cursors = lock_with_recovery(&self.cursors, "sessions");
        cursors.insert(identity.clone(), 0);
    }

    pub fn advance(&self, identity: &Identity, table_len: usize) -> Result<usize, NavError> {
        self.step(identity, table_len, |cursor, len| (cursor + 1) % len)
    }

    pub fn retreat(&self, identity: &Identity, table_len: usize) -> Result<usize, NavError> {
        self.step(identity, table_len, |cursor, len| (cursor + len - 1) % len)
    }

    /// Jump to a 1-based record number. The cursor is untouched on failure.
    pub fn jump_to(
        &self,
        identity: &Identity,
        number: u64,
        table_len: usize,
    ) -> Result<usize, NavError> {
        if table_len == 0 {
            return Err(NavError::EmptyTable);
        }
        let max = table_len as u64;
        if !(1..=max).contains(&number) {
            return Err(NavError::OutOfRange { min: 1, max });
        }
        let index = (number - 1) as usize;
        let mut cursors = lock_with_recovery(&self.cursors, "sessions");
        cursors.insert(identity.clone(), index);
        Ok(index)
    }

    fn step(
        &self,
        identity: &Identity,
        table_len: usize,
        next: impl FnOnce(usize, usize) -> usize,
    ) -> Result<usize, NavError> {
        if table_len == 0 {
            return Err(NavError::EmptyTable);
        }
        let mut cursors = lock_with_recovery(&self.cursors, "sessions");
        let cursor = cursors.entry(identity.clone()).or_insert(0);
        // A cursor left over from a longer table is folded back into range first.
        *cursor = next(*cursor % table_len, table_len);
        Ok(*cursor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(raw: &str) -> Identity {
        Identity::new(raw)
    }

    #[test]
    fn advance_then_retreat_is_identity() {
        for len in 1..=7 {
            for start in 0..len {
                let store = SessionStore::new();
                let user = id("u");
                store
                    .jump_to(&user, start as u64 + 1, len)
                    .expect("jump in range");
                store.advance(&user, len).expect("advance");
                store.retreat(&user, len).expect("retreat");
                assert_eq!(store.cursor(&user), start, "len={len} start={start}");
            }
        }
    }

    #[test]
    fn full_cycle_returns_to_start() {
        let store = SessionStore::new();
        let user = id("u");
        let len = 5;
        store.jump_to(&user, 3, len).expect("jump");
        for _ in 0..len {
            store.advance(&user, len).expect("advance");
        }
        assert_eq!(store.cursor(&user), 2);
    }

    #[test]
    fn retreat_from_zero_wraps_to_last() {
        let store = SessionStore::new();
        let user = id("u");
        assert_eq!(store.retreat(&user, 4), Ok(3));
    }

    #[test]
    fn three_record_wraparound() {
        let store = SessionStore::new();
        let user = id("u");
        assert_eq!(store.cursor(&user), 0);
        assert_eq!(store.advance(&user, 3), Ok(1));
        assert_eq!(store.advance(&user, 3), Ok(2));
        assert_eq!(store.advance(&user, 3), Ok(0));
    }

    #[test]
    fn jump_validates_bounds_without_mutation() {
        let store = SessionStore::new();
        let user = id("u");
        assert_eq!(store.jump_to(&user, 4, 10), Ok(3));
        assert_eq!(
            store.jump_to(&user, 0, 10),
            Err(NavError::OutOfRange { min: 1, max: 10 })
        );
        assert_eq!(
            store.jump_to(&user, 11, 10),
            Err(NavError::OutOfRange { min: 1, max: 10 })
        );
        assert_eq!(store.cursor(&user), 3);
        assert_eq!(store.jump_to(&user, 10, 10), Ok(9));
    }

    #[test]
    fn empty_table_is_reported_not_divided() {
        let store = SessionStore::new();
        let user = id("u");
        assert_eq!(store.advance(&user, 0), Err(NavError::EmptyTable));
        assert_eq!(store.retreat(&user, 0), Err(NavError::EmptyTable));
        assert_eq!(store.jump_to(&user, 1, 0), Err(NavError::EmptyTable));
        assert_eq!(store.cursor(&user), 0);
    }

    #[test]
    fn cursors_are_per_identity() {
        let store = SessionStore::new();
        let (a, b) = (id("a"), id("b"));
        store.advance(&a, 5).expect("advance a");
        store.advance(&a, 5).expect("advance a");
        store.retreat(&b, 5).expect("retreat b");
        assert_eq!(store.cursor(&a), 2);
        assert_eq!(store.cursor(&b), 4);
        store.reset(&a);
        assert_eq!(store.cursor(&a), 0);
        assert_eq!(store.cursor(&b), 4);
    }

    #[test]
    fn stale_cursor_folds_into_shorter_table() {
        let store = SessionStore::new();
        let user = id("u");
        store.jump_to(&user, 9, 9).expect("jump");
        assert_eq!(store.advance(&user, 3), Ok(0));
        store.jump_to(&user, 9, 9).expect("jump");
        assert_eq!(store.retreat(&user, 3), Ok(1));
    }

    #[test]
    fn concurrent_advances_on_one_identity_are_not_lost() {
        let store = std::sync::Arc::new(SessionStore::new());
        let user = id("u");
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let store = std::sync::Arc::clone(&store);
                let user = user.clone();
                std::thread::spawn(move || {
                    for _ in 0..250 {
                        store.advance(&user, 1_000_000).expect("advance");
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("join advance thread");
        }
        assert_eq!(store.cursor(&user), 1000);
    }
}
