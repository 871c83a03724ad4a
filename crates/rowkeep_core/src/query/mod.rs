//! Query building: criteria, examples, derived names, explicit statements,
//! result shapes.
//!
//! # Responsibility
//! - Turn a method-style name or a parameterized statement into SQL plus
//!   ordered bind values.
//! - Reject malformed queries when they are declared, not when executed.
//!
//! # Invariants
//! - Every query flushes the session first under `FlushMode::Auto`.
//! - `LockMode::PessimisticWrite` holds the database write lock until the
//!   session transaction ends.

pub mod args;
pub mod criteria;
pub mod derived;
pub mod example;
pub(crate) mod exec;
pub mod explicit;
pub mod shape;
mod template;

pub use args::{Arg, Params};
pub use criteria::{Condition, Connector, Criteria, FieldChange, Operator, Predicate};
pub use derived::{Action, DerivedQuery};
pub use example::{Example, StringMatch};
pub use explicit::{ExplicitQuery, ModifyingQuery};
pub use shape::{DerivableShape, Entities, Projected, Projection, ResultShape, Scalar};

/// Row locking requested by a query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LockMode {
    #[default]
    None,
    /// Exclusive write access for the rest of the session transaction.
    ///
    /// SQLite locks at database granularity: the session reserves the write
    /// lock (`BEGIN IMMEDIATE`), waiting at most `DataConfig::lock_timeout`
    /// for a conflicting writer.
    PessimisticWrite,
}

/// Execution hints attached to a declared query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryOptions {
    pub lock: LockMode,
    /// Load entities without a snapshot; they are never dirty-checked.
    pub read_only: bool,
}
