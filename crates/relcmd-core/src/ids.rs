//! Correlation identifiers.
//!
//! Connection and transaction ids are minted eagerly; they are created once
//! per connection or transaction and are cheap relative to the I/O around
//! them. Command ids are created for every execution, so [`CommandId`] defers
//! generation until something actually observes the id.

use std::fmt;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable identity of a relational connection wrapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Identity of one transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionId(Uuid);

impl TransactionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Identity of one command execution.
///
/// Always present, minted on first call to [`CommandId::get`]. Every event of
/// one execution reads the same instance and therefore sees the same value.
///
/// ```
/// use relcmd_core::ids::CommandId;
///
/// let id = CommandId::deferred();
/// assert!(!id.is_minted());
/// let first = id.get();
/// assert_eq!(first, id.get());
/// assert!(id.is_minted());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CommandId {
    id: OnceLock<Uuid>,
}

impl CommandId {
    /// An id that has not been generated yet.
    pub fn deferred() -> Self {
        Self::default()
    }

    /// The id value, generating it on first access.
    pub fn get(&self) -> Uuid {
        *self.id.get_or_init(Uuid::new_v4)
    }

    /// The id value if it was already generated.
    pub fn peek(&self) -> Option<Uuid> {
        self.id.get().copied()
    }

    pub fn is_minted(&self) -> bool {
        self.id.get().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_id_is_lazy_and_stable() {
        let id = CommandId::deferred();
        assert_eq!(id.peek(), None);
        let a = id.get();
        let b = id.get();
        assert_eq!(a, b);
        assert_eq!(id.peek(), Some(a));
    }

    #[test]
    fn test_command_ids_are_distinct() {
        let a = CommandId::deferred();
        let b = CommandId::deferred();
        assert_ne!(a.get(), b.get());
    }

    #[test]
    fn test_connection_ids_are_distinct() {
        assert_ne!(ConnectionId::new(), ConnectionId::new());
    }
}
