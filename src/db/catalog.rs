//! Server catalog entries.

use serde::{Deserialize, Serialize};

/// A database on the server, as listed from `pg_database`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseInfo {
    pub name: String,

    /// Role that owns the database.
    pub owner: String,

    /// Character encoding name, e.g. `UTF8`.
    pub encoding: String,
}

impl DatabaseInfo {
    pub fn new(
        name: impl Into<String>,
        owner: impl Into<String>,
        encoding: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            owner: owner.into(),
            encoding: encoding.into(),
        }
    }
}

/// A user-visible schema (namespace) in the connected database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaInfo {
    pub name: String,
}

impl SchemaInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}
