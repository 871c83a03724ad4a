//! Entity contract.
//!
//! # Responsibility
//! - Describe how a Rust record maps to one table: identity, fields, audit.
//! - Provide column/value helpers shared by the session and query builders.
//!
//! # Invariants
//! - `Entity::values()` returns one value per `Entity::FIELDS` entry, in order.
//! - Audit columns are appended after `FIELDS` when `Entity::AUDITED` is set.
//! - The identity column is never part of `FIELDS`.

use crate::model::audit::{Audit, AUDIT_FIELDS, INSERT_ONLY_COLUMNS};
use rusqlite::types::Value;
use rusqlite::Row;
use std::fmt::Debug;
use std::hash::Hash;

/// Hashable form of an identity, used as identity-map key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IdKey {
    Int(i64),
    Text(String),
}

/// Identity value of an entity.
pub trait EntityId: Clone + Eq + Hash + Debug + 'static {
    /// Whether the session may generate this identity at first persist.
    const GENERATED: bool;

    fn to_value(&self) -> Value;
    fn from_value(value: Value) -> Option<Self>;
    fn key(&self) -> IdKey;
}

impl EntityId for i64 {
    const GENERATED: bool = true;

    fn to_value(&self) -> Value {
        Value::Integer(*self)
    }

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Integer(id) => Some(id),
            _ => None,
        }
    }

    fn key(&self) -> IdKey {
        IdKey::Int(*self)
    }
}

impl EntityId for String {
    const GENERATED: bool = false;

    fn to_value(&self) -> Value {
        Value::Text(self.clone())
    }

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Text(id) => Some(id),
            _ => None,
        }
    }

    fn key(&self) -> IdKey {
        IdKey::Text(self.clone())
    }
}

/// Property-to-column mapping for one persisted field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    /// Name used by derived queries, sorts and criteria (`teamName`-style).
    pub property: &'static str,
    /// Storage column name.
    pub column: &'static str,
}

impl Field {
    pub const fn new(property: &'static str, column: &'static str) -> Self {
        Self { property, column }
    }
}

/// Owning-side link from a foreign-key column to another entity's table.
///
/// Lets criteria reach the target's columns with a dotted path such as
/// `team.name`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Association {
    /// First path segment (`team` in `team.name`).
    pub property: &'static str,
    /// Foreign-key column on the owning table.
    pub column: &'static str,
    pub target_name: &'static str,
    pub target_table: &'static str,
    pub target_id: Field,
    pub target_fields: &'static [Field],
}

impl Association {
    pub const fn to<T: Entity>(property: &'static str, column: &'static str) -> Self {
        Self {
            property,
            column,
            target_name: T::NAME,
            target_table: T::TABLE,
            target_id: T::ID,
            target_fields: T::FIELDS,
        }
    }

    /// Column of the target table for `property`, identity included.
    pub fn target_column(&self, property: &str) -> Option<&'static str> {
        std::iter::once(&self.target_id)
            .chain(self.target_fields.iter())
            .find(|field| field.property == property)
            .map(|field| field.column)
    }

    /// `fk IN (SELECT id FROM target WHERE <condition>)`: rows whose linked
    /// target matches. Rows without a link never match.
    pub(crate) fn wrap(&self, condition: &str) -> String {
        format!(
            "{} IN (SELECT {} FROM {} WHERE {condition})",
            self.column, self.target_id.column, self.target_table
        )
    }
}

/// Builds a value from one result row, reading columns by name.
pub trait FromRow: Sized {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self>;
}

/// A record persisted to one table and tracked by a session.
pub trait Entity: FromRow + Clone + Debug + 'static {
    type Id: EntityId;

    /// Display name used in errors and logs.
    const NAME: &'static str;
    const TABLE: &'static str;
    const ID: Field;
    /// Non-identity, non-audit fields, in `values()` order.
    const FIELDS: &'static [Field];
    /// Whether the table carries the audit block columns.
    const AUDITED: bool = false;
    /// Foreign keys criteria may traverse.
    const ASSOCIATIONS: &'static [Association] = &[];

    fn id(&self) -> Option<Self::Id>;

    /// Called exactly once, when the session assigns a generated identity.
    fn set_id(&mut self, id: Self::Id);

    fn values(&self) -> Vec<Value>;

    fn audit(&self) -> Option<&Audit> {
        None
    }

    fn audit_mut(&mut self) -> Option<&mut Audit> {
        None
    }

    /// Custom "is new" declaration. `None` means identity presence decides.
    fn is_new(&self) -> Option<bool> {
        None
    }

    /// Runs before the entity is registered for insert.
    fn pre_persist(&mut self) {}

    /// Runs before a dirty entity's update statement is built.
    fn pre_update(&mut self) {}
}

/// Persisted non-identity fields, audit block included.
pub(crate) fn state_fields<E: Entity>() -> impl Iterator<Item = &'static Field> {
    let audit: &'static [Field] = if E::AUDITED { AUDIT_FIELDS } else { &[] };
    E::FIELDS.iter().chain(audit.iter())
}

/// Snapshot-comparable values aligned with [`state_fields`].
pub(crate) fn state_values<E: Entity>(entity: &E) -> Vec<Value> {
    let mut values = entity.values();
    if E::AUDITED {
        match entity.audit() {
            Some(audit) => values.extend(audit.values()),
            None => values.extend(Audit::default().values()),
        }
    }
    values
}

pub(crate) fn is_insert_only(column: &str) -> bool {
    INSERT_ONLY_COLUMNS.contains(&column)
}

/// Comma-separated identity + state columns.
pub(crate) fn select_list<E: Entity>() -> String {
    std::iter::once(E::ID.column)
        .chain(state_fields::<E>().map(|field| field.column))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Maps a property name to its column, identity and audit block included.
pub fn resolve_property<E: Entity>(property: &str) -> Option<&'static str> {
    if E::ID.property == property {
        return Some(E::ID.column);
    }
    state_fields::<E>()
        .find(|field| field.property == property)
        .map(|field| field.column)
}

/// Resolves `property` or a one-hop `association.property` path.
///
/// Returns the column and, for paths, the association that reaches it.
pub fn resolve_path<E: Entity>(
    path: &str,
) -> Option<(&'static str, Option<&'static Association>)> {
    let Some((head, rest)) = path.split_once('.') else {
        return resolve_property::<E>(path).map(|column| (column, None));
    };
    let association = E::ASSOCIATIONS
        .iter()
        .find(|association| association.property == head)?;
    association
        .target_column(rest)
        .map(|column| (column, Some(association)))
}

/// Splits a camel-case property such as `teamName` into the dotted path
/// `team.name` when it starts with an association name.
pub(crate) fn nested_path<E: Entity>(property: &str) -> Option<String> {
    E::ASSOCIATIONS.iter().find_map(|association| {
        let rest = property.strip_prefix(association.property)?;
        let mut chars = rest.chars();
        let first = chars.next().filter(char::is_ascii_uppercase)?;
        Some(format!(
            "{}.{}{}",
            association.property,
            first.to_ascii_lowercase(),
            chars.as_str()
        ))
    })
}
