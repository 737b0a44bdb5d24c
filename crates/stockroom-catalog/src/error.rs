//! Error types for catalog operations.

use thiserror::Error;

/// The two kinds of catalog entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Product,
    Category,
}

impl EntityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Product => "product",
            Self::Category => "category",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur during catalog operations.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("{kind} not found: {id}")]
    NotFound { kind: EntityKind, id: i64 },
    #[error("{kind} name already in use: {name}")]
    Conflict { kind: EntityKind, name: String },
    #[error("invalid request: {0}")]
    Validation(String),
}

impl CatalogError {
    /// Converts a failed write, turning a UNIQUE violation on `name` into
    /// `Conflict`.
    ///
    /// The pipeline checks names before writing; this covers a concurrent
    /// writer that claimed the same name between the check and the write.
    pub(crate) fn from_write(err: rusqlite::Error, kind: EntityKind, name: &str) -> Self {
        if let rusqlite::Error::SqliteFailure(code, _) = &err {
            if code.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE {
                return Self::Conflict {
                    kind,
                    name: name.to_string(),
                };
            }
        }
        Self::Database(err)
    }
}
