//! Connection bootstrap and schema migrations.
//!
//! Every connection handed to a `Session` comes from [`open_db`],
//! [`open_db_with_config`] or [`open_db_in_memory`], so foreign keys are on,
//! the lock wait is bounded and the `team`/`member`/`item` tables exist.
//!
//! # Invariants
//! - The applied schema version is stored in `PRAGMA user_version`.
//! - A database newer than this build is refused, never downgraded.

use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod migrations;
mod open;

pub use open::{open_db, open_db_in_memory, open_db_with_config};

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    /// One migration script failed; nothing from the pending batch is kept.
    Migration {
        version: u32,
        source: rusqlite::Error,
    },
    SchemaTooNew {
        found: u32,
        supported: u32,
    },
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "sqlite error: {err}"),
            Self::Migration { version, source } => {
                write!(f, "migration {version:04} failed: {source}")
            }
            Self::SchemaTooNew { found, supported } => write!(
                f,
                "schema version {found} is newer than this build supports ({supported})"
            ),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) | Self::Migration { source: err, .. } => Some(err),
            Self::SchemaTooNew { .. } => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}
