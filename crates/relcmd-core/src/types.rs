//! Store type metadata used when binding parameters.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Provider-neutral type tag attached to native parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DbType {
    Boolean,
    SByte,
    Int16,
    Int32,
    Int64,
    UInt64,
    Single,
    Double,
    Decimal,
    String,
    Binary,
    Date,
    DateTime,
    DateTimeOffset,
    Guid,
    Json,
    Object,
}

impl fmt::Display for DbType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Direction of a native parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ParameterDirection {
    #[default]
    Input,
    Output,
    InputOutput,
    ReturnValue,
}

/// Transaction isolation level requested when beginning a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum IsolationLevel {
    /// Let the driver pick its default.
    #[default]
    Unspecified,
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
    Snapshot,
}

/// Maps a value to a store type for parameter binding.
///
/// Only the binding-relevant part of a mapping lives here: the store type
/// name, the `DbType` handed to the driver and an optional size.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeMapping {
    pub store_type: String,
    pub db_type: Option<DbType>,
    pub size: Option<u32>,
}

impl TypeMapping {
    pub fn new(store_type: impl Into<String>, db_type: Option<DbType>) -> Self {
        Self {
            store_type: store_type.into(),
            db_type,
            size: None,
        }
    }

    /// 32-bit integer mapping.
    pub fn int(store_type: impl Into<String>) -> Self {
        Self::new(store_type, Some(DbType::Int32))
    }

    /// Unsigned 64-bit integer mapping.
    pub fn ulong(store_type: impl Into<String>) -> Self {
        Self::new(store_type, Some(DbType::UInt64))
    }

    /// Timestamp-with-offset mapping.
    pub fn datetime_offset(store_type: impl Into<String>) -> Self {
        Self::new(store_type, Some(DbType::DateTimeOffset))
    }

    /// Text mapping, optionally bounded.
    pub fn string(store_type: impl Into<String>, size: Option<u32>) -> Self {
        Self {
            size,
            ..Self::new(store_type, Some(DbType::String))
        }
    }

    pub fn with_size(mut self, size: u32) -> Self {
        self.size = Some(size);
        self
    }
}
