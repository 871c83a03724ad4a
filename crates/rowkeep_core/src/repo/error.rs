//! Error taxonomy for sessions, queries and repositories.
//!
//! # Invariants
//! - SQLite constraint failures surface as `ConstraintViolation`.
//! - SQLite busy/locked failures surface as `LockTimeout`.
//! - Derivation errors are raised when a query is built, never mid-execution.

use crate::db::DbError;
use rusqlite::ErrorCode;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type RepoResult<T> = Result<T, RepoError>;

/// Malformed derived query name or explicit query template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryDerivationError {
    EmptyName,
    /// Leading verb is not one of find/read/get/query/search/stream/count/exists/delete/remove.
    UnknownAction(String),
    UnknownProperty {
        entity: &'static str,
        property: String,
    },
    /// `By` present without any condition, or a condition without a property.
    MissingPredicate(String),
    /// `And`/`Or` with nothing after it.
    DanglingConnector(String),
    /// `First0`/`Top0` or an unparsable count.
    InvalidLimit(String),
    InvalidOrderBy(String),
    /// Named (`:name`) and positional (`?1`) placeholders in one statement.
    MixedPlaceholders(String),
    EmptyStatement,
    /// Result shape cannot be expressed as a select list (projection without properties).
    ShapeNotDerivable(&'static str),
}

impl Display for QueryDerivationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyName => write!(f, "query name is empty"),
            Self::UnknownAction(name) => write!(f, "`{name}` does not start with a query verb"),
            Self::UnknownProperty { entity, property } => {
                write!(f, "no property `{property}` found for type {entity}")
            }
            Self::MissingPredicate(name) => write!(f, "`{name}` has an empty condition"),
            Self::DanglingConnector(name) => {
                write!(f, "`{name}` ends a condition chain with And/Or")
            }
            Self::InvalidLimit(name) => write!(f, "`{name}` has an invalid First/Top limit"),
            Self::InvalidOrderBy(name) => write!(f, "`{name}` has an invalid OrderBy clause"),
            Self::MixedPlaceholders(sql) => {
                write!(f, "named and positional placeholders are mixed in `{sql}`")
            }
            Self::EmptyStatement => write!(f, "query statement is empty"),
            Self::ShapeNotDerivable(shape) => {
                write!(f, "result shape {shape} cannot be derived from a query name")
            }
        }
    }
}

impl Error for QueryDerivationError {}

/// Repository/session error.
#[derive(Debug)]
pub enum RepoError {
    Db(DbError),
    Derivation(QueryDerivationError),
    /// Non-optional single-result query matched nothing.
    NoResult(String),
    /// Single-result query matched more than one row.
    NonUniqueResult { query: String, count: usize },
    /// A row expected to exist (update, delete by id) is gone.
    NotFound { entity: &'static str, id: String },
    /// Placeholder or derived-query argument without a bound value.
    MissingParameter(String),
    /// Argument of the wrong kind (list for a scalar operator, etc.).
    InvalidArgument(String),
    InvalidSort(String),
    ConstraintViolation(String),
    LockTimeout(String),
    /// Identity of an attached entity was changed after assignment.
    IdentityMutated { entity: &'static str, id: String },
    /// Entity has no identity and its identity type cannot be generated.
    MissingIdentity(&'static str),
    /// Handle is not tracked by this session.
    NotAttached(&'static str),
    InvalidState(String),
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Derivation(err) => write!(f, "query derivation failed: {err}"),
            Self::NoResult(query) => write!(f, "no result for single-result query `{query}`"),
            Self::NonUniqueResult { query, count } => {
                write!(f, "query `{query}` returned {count} rows, expected at most one")
            }
            Self::NotFound { entity, id } => write!(f, "{entity} not found: {id}"),
            Self::MissingParameter(name) => write!(f, "no value bound for parameter `{name}`"),
            Self::InvalidArgument(message) => write!(f, "invalid argument: {message}"),
            Self::InvalidSort(property) => write!(f, "cannot sort by unknown property `{property}`"),
            Self::ConstraintViolation(message) => write!(f, "constraint violation: {message}"),
            Self::LockTimeout(message) => write!(f, "lock wait timed out: {message}"),
            Self::IdentityMutated { entity, id } => {
                write!(f, "identity of attached {entity} {id} was modified")
            }
            Self::MissingIdentity(entity) => {
                write!(f, "{entity} requires a caller-assigned identity")
            }
            Self::NotAttached(entity) => write!(f, "{entity} is not attached to this session"),
            Self::InvalidState(message) => write!(f, "invalid session state: {message}"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Derivation(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<QueryDerivationError> for RepoError {
    fn from(value: QueryDerivationError) -> Self {
        Self::Derivation(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        let code = match &value {
            rusqlite::Error::SqliteFailure(err, _) => Some(err.code),
            _ => None,
        };
        match code {
            Some(ErrorCode::ConstraintViolation) => Self::ConstraintViolation(value.to_string()),
            Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) => {
                Self::LockTimeout(value.to_string())
            }
            _ => Self::Db(DbError::Sqlite(value)),
        }
    }
}
