//! Generic CRUD surface composed from the session and query builders.
//!
//! # Responsibility
//! - Decide insert versus merge on `save`.
//! - Provide lookups, counts, paging and deletes for any entity type.
//! - Filter by runtime criteria or by example.
//! - Run bulk updates straight against storage.
//!
//! # Invariants
//! - `save` trusts identity presence unless the entity declares `is_new`.
//! - Bulk updates never touch attached entities; they stay stale until the
//!   session is cleared.

use crate::model::entity::Entity;
use crate::page::{self, Page, PageRequest, Sort};
use crate::query::exec::{execute, fetch_count, fetch_rows};
use crate::query::{Criteria, Entities, Example, FieldChange, LockMode, ResultShape};
use crate::repo::error::{RepoError, RepoResult};
use crate::session::sql::select_all_sql;
use crate::session::{FlushReport, Managed, Session};
use log::info;
use rusqlite::types::Value;
use std::fmt::{Debug, Formatter};
use std::marker::PhantomData;

/// CRUD operations shared by every repository. All methods are provided;
/// implementors only name their entity type.
pub trait CrudRepository {
    type Entity: Entity;

    /// Persists a new entity or merges a detached one.
    fn save(
        &self,
        session: &mut Session<'_>,
        entity: Self::Entity,
    ) -> RepoResult<Managed<Self::Entity>> {
        let is_new = entity.is_new().unwrap_or_else(|| entity.id().is_none());
        if is_new {
            session.persist(entity)
        } else {
            session.merge(entity)
        }
    }

    fn save_all(
        &self,
        session: &mut Session<'_>,
        entities: impl IntoIterator<Item = Self::Entity>,
    ) -> RepoResult<Vec<Managed<Self::Entity>>> {
        entities
            .into_iter()
            .map(|entity| self.save(session, entity))
            .collect()
    }

    fn save_and_flush(
        &self,
        session: &mut Session<'_>,
        entity: Self::Entity,
    ) -> RepoResult<Managed<Self::Entity>> {
        let managed = self.save(session, entity)?;
        session.flush()?;
        Ok(managed)
    }

    fn find_by_id(
        &self,
        session: &mut Session<'_>,
        id: &<Self::Entity as Entity>::Id,
    ) -> RepoResult<Option<Managed<Self::Entity>>> {
        session.find::<Self::Entity>(id)
    }

    fn exists_by_id(
        &self,
        session: &mut Session<'_>,
        id: &<Self::Entity as Entity>::Id,
    ) -> RepoResult<bool> {
        Ok(session.find::<Self::Entity>(id)?.is_some())
    }

    fn find_all(&self, session: &mut Session<'_>) -> RepoResult<Vec<Managed<Self::Entity>>> {
        self.find_all_sorted(session, &Sort::unsorted())
    }

    fn find_all_sorted(
        &self,
        session: &mut Session<'_>,
        sort: &Sort,
    ) -> RepoResult<Vec<Managed<Self::Entity>>> {
        let order = page::order_clause(sort, Entities::<Self::Entity>::sort_column)?;
        let sql = format!("{}{order}", select_all_sql::<Self::Entity>());
        session.before_query(LockMode::None)?;
        fetch_entities::<Self::Entity>(session, &sql, &[])
    }

    /// Loads the given identities; missing ones are skipped, order follows `ids`.
    fn find_all_by_id(
        &self,
        session: &mut Session<'_>,
        ids: &[<Self::Entity as Entity>::Id],
    ) -> RepoResult<Vec<Managed<Self::Entity>>> {
        session.load_many::<Self::Entity>(ids)
    }

    fn find_page(
        &self,
        session: &mut Session<'_>,
        request: &PageRequest,
    ) -> RepoResult<Page<Managed<Self::Entity>>> {
        self.find_matching_page(session, &Criteria::new(), request)
    }

    fn find_matching(
        &self,
        session: &mut Session<'_>,
        criteria: &Criteria,
    ) -> RepoResult<Vec<Managed<Self::Entity>>> {
        let mut binds = Vec::new();
        let sql = format!(
            "{}{}",
            select_all_sql::<Self::Entity>(),
            where_clause::<Self::Entity>(criteria, &mut binds)?
        );
        session.before_query(LockMode::None)?;
        fetch_entities::<Self::Entity>(session, &sql, &binds)
    }

    fn find_matching_page(
        &self,
        session: &mut Session<'_>,
        criteria: &Criteria,
        request: &PageRequest,
    ) -> RepoResult<Page<Managed<Self::Entity>>> {
        let mut binds = Vec::new();
        let filter = where_clause::<Self::Entity>(criteria, &mut binds)?;
        let select = format!("{}{filter}", select_all_sql::<Self::Entity>());
        let order = page::order_clause(request.sort(), Entities::<Self::Entity>::sort_column)?;
        let name = <Self::Entity as Entity>::NAME;
        let count_sql = format!("SELECT COUNT(*) FROM {}{filter}", <Self::Entity as Entity>::TABLE);
        let count_binds = binds.clone();

        session.before_query(LockMode::None)?;
        page::fetch_page(
            session,
            request,
            |session, window| {
                let mut binds = binds;
                let sql = format!("{select}{order}{}", window.clause(&mut binds));
                fetch_entities::<Self::Entity>(session, &sql, &binds)
            },
            |session| fetch_count(session, name, &count_sql, &count_binds),
        )
    }

    /// Rows matching every non-null, non-ignored value of the sample.
    fn find_by_example(
        &self,
        session: &mut Session<'_>,
        example: &Example<Self::Entity>,
    ) -> RepoResult<Vec<Managed<Self::Entity>>> {
        self.find_matching(session, &example.to_criteria()?)
    }

    fn count_by_example(
        &self,
        session: &mut Session<'_>,
        example: &Example<Self::Entity>,
    ) -> RepoResult<u64> {
        self.count_matching(session, &example.to_criteria()?)
    }

    fn count(&self, session: &mut Session<'_>) -> RepoResult<u64> {
        self.count_matching(session, &Criteria::new())
    }

    fn count_matching(&self, session: &mut Session<'_>, criteria: &Criteria) -> RepoResult<u64> {
        let mut binds = Vec::new();
        let sql = format!(
            "SELECT COUNT(*) FROM {}{}",
            <Self::Entity as Entity>::TABLE,
            where_clause::<Self::Entity>(criteria, &mut binds)?
        );
        session.before_query(LockMode::None)?;
        fetch_count(session, <Self::Entity as Entity>::NAME, &sql, &binds)
    }

    fn delete(&self, session: &mut Session<'_>, entity: &Managed<Self::Entity>) -> RepoResult<()> {
        session.remove(entity)
    }

    /// Fails with `NotFound` when no row has `id`.
    fn delete_by_id(
        &self,
        session: &mut Session<'_>,
        id: &<Self::Entity as Entity>::Id,
    ) -> RepoResult<()> {
        let entity = session
            .find::<Self::Entity>(id)?
            .ok_or_else(|| RepoError::NotFound {
                entity: <Self::Entity as Entity>::NAME,
                id: format!("{id:?}"),
            })?;
        session.remove(&entity)
    }

    /// Loads and removes every row; the deletes run on the next flush.
    fn delete_all(&self, session: &mut Session<'_>) -> RepoResult<usize> {
        let all = self.find_all(session)?;
        for entity in &all {
            session.remove(entity)?;
        }
        Ok(all.len())
    }

    fn flush(&self, session: &mut Session<'_>) -> RepoResult<FlushReport> {
        session.flush()
    }

    /// Single `UPDATE` over every row matching `criteria`.
    ///
    /// Attached entities are not refreshed; returns the affected row count.
    fn update_where(
        &self,
        session: &mut Session<'_>,
        criteria: &Criteria,
        changes: &[FieldChange],
    ) -> RepoResult<usize> {
        if changes.is_empty() {
            return Err(RepoError::InvalidArgument(
                "bulk update needs at least one field change".into(),
            ));
        }

        let mut binds: Vec<Value> = Vec::new();
        let assignments = changes
            .iter()
            .map(|change| change.render::<Self::Entity>(&mut binds))
            .collect::<RepoResult<Vec<_>>>()?;
        let sql = format!(
            "UPDATE {} SET {}{}",
            <Self::Entity as Entity>::TABLE,
            assignments.join(", "),
            where_clause::<Self::Entity>(criteria, &mut binds)?
        );

        session.before_query(LockMode::None)?;
        let affected = execute(session, <Self::Entity as Entity>::NAME, &sql, &binds)?;
        info!(
            "event=bulk_update module=repo status=ok entity={} rows={}",
            <Self::Entity as Entity>::NAME,
            affected
        );
        Ok(affected)
    }

    /// `update_where`, then clears the session so later reads see the update.
    fn update_where_and_clear(
        &self,
        session: &mut Session<'_>,
        criteria: &Criteria,
        changes: &[FieldChange],
    ) -> RepoResult<usize> {
        let affected = self.update_where(session, criteria, changes)?;
        session.clear();
        Ok(affected)
    }
}

fn fetch_entities<E: Entity>(
    session: &mut Session<'_>,
    sql: &str,
    binds: &[Value],
) -> RepoResult<Vec<Managed<E>>> {
    fetch_rows::<Entities<E>>(session, E::NAME, sql, binds, false)
}

fn where_clause<E: Entity>(criteria: &Criteria, binds: &mut Vec<Value>) -> RepoResult<String> {
    let (predicate, args) = criteria.resolve::<E>()?;
    let rendered = predicate.render(&args, binds)?;
    if rendered.is_empty() {
        return Ok(String::new());
    }
    Ok(format!(" WHERE {rendered}"))
}

/// Repository for any entity type without declared queries.
pub struct Repository<E: Entity> {
    entity: PhantomData<fn() -> E>,
}

impl<E: Entity> Repository<E> {
    pub fn new() -> Self {
        Self {
            entity: PhantomData,
        }
    }
}

impl<E: Entity> Default for Repository<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Entity> Clone for Repository<E> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<E: Entity> Debug for Repository<E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Repository<{}>", E::NAME)
    }
}

impl<E: Entity> CrudRepository for Repository<E> {
    type Entity = E;
}
