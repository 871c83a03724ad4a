//! Member repository: CRUD plus the member query catalogue.
//!
//! # Responsibility
//! - Declare every member query once, when the repository is built.
//! - Resolve the member → team reference on request (fetch plan).
//!
//! # Invariants
//! - A malformed query name or statement fails `try_new`, never a call.
//! - `bulk_age_plus` clears the session after it runs.

use crate::model::dto::{MemberDto, UsernameOnly};
use crate::model::member::{Member, NAMED_FIND_BY_USERNAME};
use crate::model::team::{Team, TeamId};
use crate::page::{Page, PageRequest, Slice};
use crate::query::{
    Arg, DerivedQuery, Entities, ExplicitQuery, LockMode, ModifyingQuery, Params, Projected,
    Scalar,
};
use crate::repo::error::RepoResult;
use crate::repo::repository::CrudRepository;
use crate::session::{Managed, Session};
use std::collections::HashMap;

type MemberQuery = DerivedQuery<Entities<Member>>;
type MemberStatement = ExplicitQuery<Entities<Member>>;

/// A member with its team reference resolved.
pub type MemberWithTeam = (Managed<Member>, Option<Managed<Team>>);

const FIND_MEMBER_SQL: &str = "SELECT * FROM member WHERE username = :username AND age = :age";
const FIND_USERNAME_LIST_SQL: &str = "SELECT username FROM member";
const FIND_MEMBER_DTO_SQL: &str = "SELECT m.member_id AS id, m.username AS username, t.name AS team_name
     FROM member m
     JOIN team t ON t.team_id = m.team_id";
const FIND_BY_NAMES_SQL: &str = "SELECT * FROM member WHERE username IN :names";
const FIND_BY_AGE_SQL: &str = "SELECT m.*
     FROM member m
     LEFT JOIN team t ON t.team_id = m.team_id
     WHERE m.age = :age";
const COUNT_BY_AGE_SQL: &str = "SELECT COUNT(*) FROM member WHERE age = :age";
const BULK_AGE_PLUS_SQL: &str = "UPDATE member SET age = age + 1 WHERE age >= :age";
const FIND_MEMBER_CUSTOM_SQL: &str = "SELECT * FROM member";
const NATIVE_BY_USERNAME_SQL: &str = "SELECT * FROM member WHERE username = ?";
const NATIVE_PROJECTION_SQL: &str = "SELECT m.member_id AS id, m.username AS username, t.name AS team_name
     FROM member m
     LEFT JOIN team t ON t.team_id = m.team_id";
const NATIVE_PROJECTION_COUNT_SQL: &str = "SELECT COUNT(*) FROM member";

/// Member repository with derived and explicit queries.
#[derive(Debug)]
pub struct MemberRepository {
    by_username_and_age_greater_than: MemberQuery,
    by_username: MemberStatement,
    member: MemberStatement,
    username_list: ExplicitQuery<Scalar<String>>,
    member_dto: ExplicitQuery<Projected<MemberDto>>,
    by_names: MemberStatement,
    list_by_username: MemberQuery,
    member_by_username: MemberQuery,
    optional_by_username: MemberQuery,
    by_age: MemberStatement,
    slice_by_age: MemberQuery,
    bulk_age_plus: ModifyingQuery,
    member_custom: MemberStatement,
    entity_graph_by_username: MemberQuery,
    read_only_by_username: MemberQuery,
    lock_by_username: MemberQuery,
    projections_by_username: DerivedQuery<Projected<UsernameOnly>>,
    by_team: MemberQuery,
    by_team_name: MemberQuery,
    native_by_username: MemberStatement,
    native_projection: ExplicitQuery<Projected<MemberDto>>,
}

impl MemberRepository {
    /// Parses every declared query.
    ///
    /// # Errors
    /// - `RepoError::Derivation` for the first malformed query.
    pub fn try_new() -> RepoResult<Self> {
        let (named_query, named_sql) = NAMED_FIND_BY_USERNAME;
        Ok(Self {
            by_username_and_age_greater_than: MemberQuery::parse(
                "findByUsernameAndAgeGreaterThan",
            )?,
            by_username: MemberStatement::new(named_query, named_sql)?,
            member: MemberStatement::new("findMember", FIND_MEMBER_SQL)?,
            username_list: ExplicitQuery::new("findUsernameList", FIND_USERNAME_LIST_SQL)?,
            member_dto: ExplicitQuery::new("findMemberDto", FIND_MEMBER_DTO_SQL)?,
            by_names: MemberStatement::new("findByNames", FIND_BY_NAMES_SQL)?,
            list_by_username: MemberQuery::parse("findListByUsername")?,
            member_by_username: MemberQuery::parse("findMemberByUsername")?,
            optional_by_username: MemberQuery::parse("findOptionalByUsername")?,
            by_age: MemberStatement::new("findByAge", FIND_BY_AGE_SQL)?
                .with_count_query(COUNT_BY_AGE_SQL)?,
            slice_by_age: MemberQuery::parse("findSliceByAge")?,
            bulk_age_plus: ModifyingQuery::new("bulkAgePlus", BULK_AGE_PLUS_SQL)?
                .clear_automatically(),
            member_custom: MemberStatement::new("findMemberCustom", FIND_MEMBER_CUSTOM_SQL)?,
            entity_graph_by_username: MemberQuery::parse("findEntityGraphByUsername")?,
            read_only_by_username: MemberQuery::parse("findReadOnlyByUsername")?.read_only(),
            lock_by_username: MemberQuery::parse("findLockByUsername")?
                .lock(LockMode::PessimisticWrite),
            projections_by_username: DerivedQuery::parse("findProjectionsByUsername")?,
            by_team: MemberQuery::parse("findByTeam")?,
            by_team_name: MemberQuery::parse("findByTeamName")?,
            native_by_username: MemberStatement::new("findByNativeQuery", NATIVE_BY_USERNAME_SQL)?,
            native_projection: ExplicitQuery::new("findByNativeProjection", NATIVE_PROJECTION_SQL)?
                .with_count_query(NATIVE_PROJECTION_COUNT_SQL)?,
        })
    }

    pub fn find_by_username_and_age_greater_than(
        &self,
        session: &mut Session<'_>,
        username: &str,
        age: i64,
    ) -> RepoResult<Vec<Managed<Member>>> {
        self.by_username_and_age_greater_than
            .fetch(session, &[Arg::from(username), Arg::from(age)])
    }

    /// Runs the entity-level named query `Member.findByUsername`.
    pub fn find_by_username(
        &self,
        session: &mut Session<'_>,
        username: &str,
    ) -> RepoResult<Vec<Managed<Member>>> {
        self.by_username
            .fetch(session, &Params::new().set("username", username))
    }

    pub fn find_member(
        &self,
        session: &mut Session<'_>,
        username: &str,
        age: i64,
    ) -> RepoResult<Vec<Managed<Member>>> {
        self.member.fetch(
            session,
            &Params::new().set("username", username).set("age", age),
        )
    }

    pub fn find_username_list(&self, session: &mut Session<'_>) -> RepoResult<Vec<String>> {
        self.username_list.fetch(session, &Params::new())
    }

    /// Members joined with their team; members without a team are excluded.
    pub fn find_member_dto(&self, session: &mut Session<'_>) -> RepoResult<Vec<MemberDto>> {
        self.member_dto.fetch(session, &Params::new())
    }

    pub fn find_by_names(
        &self,
        session: &mut Session<'_>,
        names: &[&str],
    ) -> RepoResult<Vec<Managed<Member>>> {
        self.by_names
            .fetch(session, &Params::new().set("names", names))
    }

    pub fn find_list_by_username(
        &self,
        session: &mut Session<'_>,
        username: &str,
    ) -> RepoResult<Vec<Managed<Member>>> {
        self.list_by_username.fetch(session, &[Arg::from(username)])
    }

    /// Fails with `NoResult` when absent and `NonUniqueResult` when ambiguous.
    pub fn find_member_by_username(
        &self,
        session: &mut Session<'_>,
        username: &str,
    ) -> RepoResult<Managed<Member>> {
        self.member_by_username
            .fetch_single(session, &[Arg::from(username)])
    }

    pub fn find_optional_by_username(
        &self,
        session: &mut Session<'_>,
        username: &str,
    ) -> RepoResult<Option<Managed<Member>>> {
        self.optional_by_username
            .fetch_optional(session, &[Arg::from(username)])
    }

    /// Page of members with `age`, totalled by a separate count statement.
    pub fn find_by_age(
        &self,
        session: &mut Session<'_>,
        age: i64,
        request: &PageRequest,
    ) -> RepoResult<Page<Managed<Member>>> {
        self.by_age
            .page(session, &Params::new().set("age", age), request)
    }

    pub fn find_slice_by_age(
        &self,
        session: &mut Session<'_>,
        age: i64,
        request: &PageRequest,
    ) -> RepoResult<Slice<Managed<Member>>> {
        self.slice_by_age.slice(session, &[Arg::from(age)], request)
    }

    /// Adds one year to every member aged `age` or older; clears the session.
    pub fn bulk_age_plus(&self, session: &mut Session<'_>, age: i64) -> RepoResult<usize> {
        self.bulk_age_plus
            .execute(session, &Params::new().set("age", age))
    }

    pub fn find_member_custom(&self, session: &mut Session<'_>) -> RepoResult<Vec<Managed<Member>>> {
        self.member_custom.fetch(session, &Params::new())
    }

    /// Every member with its team prefetched in one batch.
    pub fn find_all_with_team(&self, session: &mut Session<'_>) -> RepoResult<Vec<MemberWithTeam>> {
        let members = self.find_all(session)?;
        with_teams(session, members)
    }

    pub fn find_entity_graph_by_username(
        &self,
        session: &mut Session<'_>,
        username: &str,
    ) -> RepoResult<Vec<MemberWithTeam>> {
        let members = self
            .entity_graph_by_username
            .fetch(session, &[Arg::from(username)])?;
        with_teams(session, members)
    }

    /// Loaded without a snapshot: later changes are never flushed.
    pub fn find_read_only_by_username(
        &self,
        session: &mut Session<'_>,
        username: &str,
    ) -> RepoResult<Option<Managed<Member>>> {
        self.read_only_by_username
            .fetch_optional(session, &[Arg::from(username)])
    }

    /// Holds the database write lock until the session transaction ends.
    pub fn find_lock_by_username(
        &self,
        session: &mut Session<'_>,
        username: &str,
    ) -> RepoResult<Vec<Managed<Member>>> {
        self.lock_by_username.fetch(session, &[Arg::from(username)])
    }

    pub fn find_projections_by_username(
        &self,
        session: &mut Session<'_>,
        username: &str,
    ) -> RepoResult<Vec<UsernameOnly>> {
        self.projections_by_username
            .fetch(session, &[Arg::from(username)])
    }

    /// Inverse side of member → team.
    pub fn find_by_team(
        &self,
        session: &mut Session<'_>,
        team_id: TeamId,
    ) -> RepoResult<Vec<Managed<Member>>> {
        self.by_team.fetch(session, &[Arg::from(team_id)])
    }

    /// Members whose team is named `team_name`; members without a team never match.
    pub fn find_by_team_name(
        &self,
        session: &mut Session<'_>,
        team_name: &str,
    ) -> RepoResult<Vec<Managed<Member>>> {
        self.by_team_name.fetch(session, &[Arg::from(team_name)])
    }

    pub fn find_by_native_query(
        &self,
        session: &mut Session<'_>,
        username: &str,
    ) -> RepoResult<Option<Managed<Member>>> {
        self.native_by_username
            .fetch_optional(session, &Params::new().push(username))
    }

    pub fn find_by_native_projection(
        &self,
        session: &mut Session<'_>,
        request: &PageRequest,
    ) -> RepoResult<Page<MemberDto>> {
        self.native_projection.page(session, &Params::new(), request)
    }
}

impl CrudRepository for MemberRepository {
    type Entity = Member;
}

fn with_teams(
    session: &mut Session<'_>,
    members: Vec<Managed<Member>>,
) -> RepoResult<Vec<MemberWithTeam>> {
    let mut team_ids: Vec<TeamId> = Vec::new();
    for member in &members {
        if let Some(team_id) = member.borrow().team_id {
            if !team_ids.contains(&team_id) {
                team_ids.push(team_id);
            }
        }
    }

    let teams: HashMap<TeamId, Managed<Team>> = session
        .load_many::<Team>(&team_ids)?
        .into_iter()
        .filter_map(|team| {
            let id = team.borrow().id?;
            Some((id, team))
        })
        .collect();

    Ok(members
        .into_iter()
        .map(|member| {
            let team = member
                .borrow()
                .team_id
                .and_then(|team_id| teams.get(&team_id).cloned());
            (member, team)
        })
        .collect())
}
