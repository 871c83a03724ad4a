//! Member entity: owning side of the member → team relationship.
//!
//! # Invariants
//! - `team_id` is the only stored link; a team's members are looked up by query.
//! - `id` is assigned once by the session sequence and never rewritten.

use crate::model::audit::Audit;
use crate::model::entity::{Association, Entity, Field, FromRow};
use crate::model::team::{Team, TeamId};
use rusqlite::types::Value;
use rusqlite::Row;
use serde::{Deserialize, Serialize};

pub type MemberId = i64;

/// Named query `Member.findByUsername`, declared next to the entity.
pub const NAMED_FIND_BY_USERNAME: (&str, &str) = (
    "Member.findByUsername",
    "SELECT * FROM member WHERE username = :username",
);

const MEMBER_FIELDS: &[Field] = &[
    Field::new("username", "username"),
    Field::new("age", "age"),
    Field::new("team", "team_id"),
];

const MEMBER_ASSOCIATIONS: &[Association] = &[Association::to::<Team>("team", "team_id")];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: Option<MemberId>,
    pub username: String,
    pub age: i64,
    /// Owning-side foreign key to `team.team_id`.
    pub team_id: Option<TeamId>,
    pub audit: Audit,
}

impl Member {
    pub fn new(username: impl Into<String>) -> Self {
        Self::with_age(username, 0)
    }

    pub fn with_age(username: impl Into<String>, age: i64) -> Self {
        Self {
            id: None,
            username: username.into(),
            age,
            team_id: None,
            audit: Audit::default(),
        }
    }

    pub fn with_team(username: impl Into<String>, age: i64, team: &Team) -> Self {
        let mut member = Self::with_age(username, age);
        member.change_team(team);
        member
    }

    /// Points this member at `team`. The team must already have an identity.
    pub fn change_team(&mut self, team: &Team) {
        self.team_id = team.id;
    }
}

impl FromRow for Member {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: Some(row.get("member_id")?),
            username: row.get("username")?,
            age: row.get("age")?,
            team_id: row.get("team_id")?,
            audit: Audit::from_row(row)?,
        })
    }
}

impl Entity for Member {
    type Id = MemberId;

    const NAME: &'static str = "Member";
    const TABLE: &'static str = "member";
    const ID: Field = Field::new("id", "member_id");
    const FIELDS: &'static [Field] = MEMBER_FIELDS;
    const AUDITED: bool = true;
    const ASSOCIATIONS: &'static [Association] = MEMBER_ASSOCIATIONS;

    fn id(&self) -> Option<MemberId> {
        self.id
    }

    fn set_id(&mut self, id: MemberId) {
        self.id = Some(id);
    }

    fn values(&self) -> Vec<Value> {
        vec![
            Value::Text(self.username.clone()),
            Value::Integer(self.age),
            self.team_id.map_or(Value::Null, Value::Integer),
        ]
    }

    fn audit(&self) -> Option<&Audit> {
        Some(&self.audit)
    }

    fn audit_mut(&mut self) -> Option<&mut Audit> {
        Some(&mut self.audit)
    }
}
