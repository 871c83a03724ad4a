//! Entity schema declarations and audit primitives.
//!
//! # Responsibility
//! - Define the `Entity` contract that sessions and queries are generic over.
//! - Declare the concrete schema (`Member`, `Team`, `Item`) and read models.
//!
//! # Invariants
//! - Every entity maps to one table with one identity column.
//! - Relationships are stored only on the owning side (foreign key column).

pub mod audit;
pub mod dto;
pub mod entity;
pub mod item;
pub mod member;
pub mod team;
