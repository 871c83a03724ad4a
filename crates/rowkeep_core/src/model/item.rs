//! Item entity with a client-assigned identity.
//!
//! # Invariants
//! - `id` is supplied by the caller; the session never generates it.
//! - An item is new exactly while `audit.created_at` is unset, so `save`
//!   inserts instead of merging even though the identity is present.

use crate::model::audit::Audit;
use crate::model::entity::{Entity, Field, FromRow};
use rusqlite::types::Value;
use rusqlite::Row;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub audit: Audit,
}

impl Item {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            audit: Audit::default(),
        }
    }
}

impl FromRow for Item {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("item_id")?,
            audit: Audit::from_row(row)?,
        })
    }
}

impl Entity for Item {
    type Id = String;

    const NAME: &'static str = "Item";
    const TABLE: &'static str = "item";
    const ID: Field = Field::new("id", "item_id");
    const FIELDS: &'static [Field] = &[];
    const AUDITED: bool = true;

    fn id(&self) -> Option<String> {
        Some(self.id.clone())
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn values(&self) -> Vec<Value> {
        Vec::new()
    }

    fn audit(&self) -> Option<&Audit> {
        Some(&self.audit)
    }

    fn audit_mut(&mut self) -> Option<&mut Audit> {
        Some(&mut self.audit)
    }

    fn is_new(&self) -> Option<bool> {
        Some(self.audit.created_at.is_none())
    }
}
