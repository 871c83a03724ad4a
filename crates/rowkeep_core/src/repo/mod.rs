//! Repository facade over sessions and query builders.
//!
//! # Responsibility
//! - Expose CRUD, paging and bulk operations per entity type.
//! - Declare each repository's queries once, at construction.
//!
//! # Invariants
//! - Repositories hold no connection; every call borrows a `Session`.
//! - Repository APIs return semantic errors (`NotFound`, `NoResult`) in
//!   addition to storage errors.

pub mod error;
pub mod item_repo;
pub mod member_repo;
pub mod repository;
pub mod team_repo;

pub use error::{QueryDerivationError, RepoError, RepoResult};
pub use item_repo::ItemRepository;
pub use member_repo::{MemberRepository, MemberWithTeam};
pub use repository::{CrudRepository, Repository};
pub use team_repo::TeamRepository;
