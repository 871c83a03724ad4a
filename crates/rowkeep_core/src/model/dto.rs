//! Read models returned by projection queries.

use crate::model::entity::FromRow;
use crate::model::member::{Member, MemberId};
use crate::query::shape::Projection;
use rusqlite::Row;
use serde::{Deserialize, Serialize};

/// Member joined with its team name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberDto {
    pub id: MemberId,
    pub username: String,
    pub team_name: Option<String>,
}

impl MemberDto {
    pub fn new(id: MemberId, username: impl Into<String>, team_name: Option<String>) -> Self {
        Self {
            id,
            username: username.into(),
            team_name,
        }
    }
}

impl FromRow for MemberDto {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            username: row.get("username")?,
            team_name: row.get("team_name")?,
        })
    }
}

/// Single-property projection derived from `Member`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsernameOnly {
    pub username: String,
}

impl FromRow for UsernameOnly {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            username: row.get("username")?,
        })
    }
}

impl Projection for UsernameOnly {
    type Source = Member;

    const PROPERTIES: &'static [&'static str] = &["username"];
}
