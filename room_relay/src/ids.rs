//! Identifier generation
//!
//! The registry and the server state never build identifiers themselves; they
//! ask an injected [`IdGenerator`]. Production uses random UUIDs, tests use
//! [`SequentialIds`] so that assertions can name ids up front.

use std::cell::Cell;

/// What an identifier is going to name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdKind {
    Room,
    Member,
    Connection,
}

impl IdKind {
    fn prefix(self) -> &'static str {
        match self {
            IdKind::Room => "room",
            IdKind::Member => "member",
            IdKind::Connection => "conn",
        }
    }
}

/// Source of collision-resistant identifiers
pub trait IdGenerator {
    fn next_id(&self, kind: IdKind) -> String;
}

/// Random v4 UUIDs
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidIds;

impl IdGenerator for UuidIds {
    fn next_id(&self, _kind: IdKind) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

/// `room-1`, `member-2`, `conn-3`, ... from one shared counter
#[derive(Debug, Default)]
pub struct SequentialIds {
    counter: Cell<u64>,
}

impl SequentialIds {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdGenerator for SequentialIds {
    fn next_id(&self, kind: IdKind) -> String {
        let next = self.counter.get() + 1;
        self.counter.set(next);
        format!("{}-{next}", kind.prefix())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequential_ids_share_one_counter() {
        let ids = SequentialIds::new();
        assert_eq!(ids.next_id(IdKind::Room), "room-1");
        assert_eq!(ids.next_id(IdKind::Member), "member-2");
        assert_eq!(ids.next_id(IdKind::Connection), "conn-3");
    }

    #[test]
    fn uuid_ids_are_distinct() {
        let ids = UuidIds;
        assert_ne!(ids.next_id(IdKind::Member), ids.next_id(IdKind::Member));
    }
}
