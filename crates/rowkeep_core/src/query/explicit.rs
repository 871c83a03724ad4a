//! Explicit parameterized statements.
//!
//! # Responsibility
//! - Hold a validated statement template with an optional count statement.
//! - Bind `Params`, execute, and shape rows as declared.
//!
//! # Invariants
//! - Every placeholder must be bound; the first unbound one fails with
//!   `MissingParameter` before any statement runs.
//! - Paged execution wraps the statement as a subquery, so sort keys refer
//!   to its output columns.

use crate::page::{self, Page, PageRequest, Slice};
use crate::repo::error::{QueryDerivationError, RepoError, RepoResult};
use crate::session::Session;
use log::info;
use std::fmt::{Debug, Formatter};
use std::marker::PhantomData;

use super::args::Params;
use super::exec::{at_most_one, execute, fetch_count, fetch_rows};
use super::shape::ResultShape;
use super::template::SqlTemplate;
use super::{LockMode, QueryOptions};

/// Named explicit query returning shape `S`.
pub struct ExplicitQuery<S: ResultShape> {
    name: String,
    template: SqlTemplate,
    count_template: Option<SqlTemplate>,
    options: QueryOptions,
    shape: PhantomData<fn() -> S>,
}

impl<S: ResultShape> ExplicitQuery<S> {
    pub fn new(name: &str, sql: &str) -> Result<Self, QueryDerivationError> {
        Ok(Self {
            name: name.to_string(),
            template: SqlTemplate::parse(sql)?,
            count_template: None,
            options: QueryOptions::default(),
            shape: PhantomData,
        })
    }

    /// Statement used for page totals instead of `SELECT COUNT(*)` over the
    /// query. It is bound with the same `Params`.
    pub fn with_count_query(mut self, sql: &str) -> Result<Self, QueryDerivationError> {
        self.count_template = Some(SqlTemplate::parse(sql)?);
        Ok(self)
    }

    pub fn read_only(mut self) -> Self {
        self.options.read_only = true;
        self
    }

    pub fn lock(mut self, mode: LockMode) -> Self {
        self.options.lock = mode;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sql(&self) -> &str {
        self.template.source()
    }

    pub fn placeholders(&self) -> Vec<String> {
        self.template.placeholders()
    }

    pub fn fetch(&self, session: &mut Session<'_>, params: &Params) -> RepoResult<Vec<S::Output>> {
        let mut binds = Vec::new();
        let sql = self.template.bind(params, &mut binds)?;
        session.before_query(self.options.lock)?;
        fetch_rows::<S>(session, &self.name, &sql, &binds, self.options.read_only)
    }

    pub fn fetch_optional(
        &self,
        session: &mut Session<'_>,
        params: &Params,
    ) -> RepoResult<Option<S::Output>> {
        let rows = self.fetch(session, params)?;
        at_most_one(&self.name, rows)
    }

    pub fn fetch_single(&self, session: &mut Session<'_>, params: &Params) -> RepoResult<S::Output> {
        self.fetch_optional(session, params)?
            .ok_or_else(|| RepoError::NoResult(self.name.clone()))
    }

    pub fn page(
        &self,
        session: &mut Session<'_>,
        params: &Params,
        request: &PageRequest,
    ) -> RepoResult<Page<S::Output>> {
        let mut binds = Vec::new();
        let inner = self.template.bind(params, &mut binds)?;
        let order = page::order_clause(request.sort(), S::sort_column)?;
        let mut count_binds = Vec::new();
        let count_sql = match &self.count_template {
            Some(template) => template.bind(params, &mut count_binds)?,
            None => {
                count_binds = binds.clone();
                format!("SELECT COUNT(*) FROM ({inner})")
            }
        };

        session.before_query(self.options.lock)?;
        let read_only = self.options.read_only;
        page::fetch_page(
            session,
            request,
            |session, window| {
                let mut binds = binds;
                let sql = format!("SELECT * FROM ({inner}){order}{}", window.clause(&mut binds));
                fetch_rows::<S>(session, &self.name, &sql, &binds, read_only)
            },
            |session| fetch_count(session, &self.name, &count_sql, &count_binds),
        )
    }

    pub fn slice(
        &self,
        session: &mut Session<'_>,
        params: &Params,
        request: &PageRequest,
    ) -> RepoResult<Slice<S::Output>> {
        let mut binds = Vec::new();
        let inner = self.template.bind(params, &mut binds)?;
        let order = page::order_clause(request.sort(), S::sort_column)?;

        session.before_query(self.options.lock)?;
        let read_only = self.options.read_only;
        page::fetch_slice(session, request, |session, window| {
            let mut binds = binds;
            let sql = format!("SELECT * FROM ({inner}){order}{}", window.clause(&mut binds));
            fetch_rows::<S>(session, &self.name, &sql, &binds, read_only)
        })
    }
}

impl<S: ResultShape> Debug for ExplicitQuery<S> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExplicitQuery")
            .field("name", &self.name)
            .field("sql", &self.template.source())
            .field(
                "count_sql",
                &self.count_template.as_ref().map(SqlTemplate::source),
            )
            .field("options", &self.options)
            .finish()
    }
}

/// Explicit `UPDATE`/`DELETE` executed straight against storage.
///
/// Attached entities are not refreshed: they keep their pre-statement state
/// until the session is cleared, unless `clear_automatically` is set.
#[derive(Debug, Clone)]
pub struct ModifyingQuery {
    name: String,
    template: SqlTemplate,
    clear_automatically: bool,
}

impl ModifyingQuery {
    pub fn new(name: &str, sql: &str) -> Result<Self, QueryDerivationError> {
        Ok(Self {
            name: name.to_string(),
            template: SqlTemplate::parse(sql)?,
            clear_automatically: false,
        })
    }

    /// Clears the session after the statement runs.
    pub fn clear_automatically(mut self) -> Self {
        self.clear_automatically = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of affected rows.
    pub fn execute(&self, session: &mut Session<'_>, params: &Params) -> RepoResult<usize> {
        let mut binds = Vec::new();
        let sql = self.template.bind(params, &mut binds)?;
        session.before_query(LockMode::None)?;
        let affected = execute(session, &self.name, &sql, &binds)?;
        if self.clear_automatically {
            session.clear();
        }
        info!(
            "event=bulk_update module=query status=ok query={} rows={} cleared={}",
            self.name, affected, self.clear_automatically
        );
        Ok(affected)
    }
}
