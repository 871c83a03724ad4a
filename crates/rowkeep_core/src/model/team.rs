//! Team entity: inverse side of the member → team relationship.
//!
//! A team stores no member list. Members of a team are found with
//! `MemberRepository::find_by_team`.

use crate::model::entity::{Entity, Field, FromRow};
use rusqlite::types::Value;
use rusqlite::Row;
use serde::{Deserialize, Serialize};

pub type TeamId = i64;

const TEAM_FIELDS: &[Field] = &[Field::new("name", "name")];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub id: Option<TeamId>,
    pub name: String,
}

impl Team {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
        }
    }
}

impl FromRow for Team {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: Some(row.get("team_id")?),
            name: row.get("name")?,
        })
    }
}

impl Entity for Team {
    type Id = TeamId;

    const NAME: &'static str = "Team";
    const TABLE: &'static str = "team";
    const ID: Field = Field::new("id", "team_id");
    const FIELDS: &'static [Field] = TEAM_FIELDS;

    fn id(&self) -> Option<TeamId> {
        self.id
    }

    fn set_id(&mut self, id: TeamId) {
        self.id = Some(id);
    }

    fn values(&self) -> Vec<Value> {
        vec![Value::Text(self.name.clone())]
    }
}
