//! Data-access layer over SQLite: unit of work, derived and explicit
//! queries, paging, and per-entity repositories.
//!
//! A `Session` tracks loaded entities and writes changes on flush;
//! repositories borrow a session for every call.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod page;
pub mod query;
pub mod repo;
pub mod session;

pub use config::{DataConfig, FlushMode};
pub use db::{open_db, open_db_in_memory, open_db_with_config, DbError, DbResult};
pub use logging::{default_log_level, init_logging, logging_status, LogSettings, LoggingError};
pub use model::audit::{
    Audit, AuditContext, Auditor, Clock, FixedAuditor, FixedClock, RandomAuditor, SystemClock,
};
pub use model::dto::{MemberDto, UsernameOnly};
pub use model::entity::{Association, Entity, Field, FromRow};
pub use model::item::Item;
pub use model::member::{Member, MemberId};
pub use model::team::{Team, TeamId};
pub use page::{Direction, Order, Page, PageRequest, Slice, Sort};
pub use query::{
    Arg, Criteria, DerivedQuery, Entities, Example, ExplicitQuery, FieldChange, LockMode,
    ModifyingQuery, Operator, Params, Projected, Projection, Scalar, StringMatch,
};
pub use repo::{
    CrudRepository, ItemRepository, MemberRepository, MemberWithTeam, QueryDerivationError,
    RepoError, RepoResult, Repository, TeamRepository,
};
pub use session::{FlushReport, Managed, Session, TransactionMode};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
