//! Statement execution shared by derived and explicit queries.

use crate::logging::statement_summary;
use crate::repo::error::{RepoError, RepoResult};
use crate::session::Session;
use log::{debug, trace};
use rusqlite::params_from_iter;
use rusqlite::types::Value;
use std::time::Instant;

use super::shape::ResultShape;

/// Runs `sql` and reads every row through shape `S`.
pub(crate) fn fetch_rows<S: ResultShape>(
    session: &mut Session<'_>,
    query: &str,
    sql: &str,
    binds: &[Value],
    read_only: bool,
) -> RepoResult<Vec<S::Output>> {
    trace!(
        "event=query_prepare module=query query={query} sql={}",
        statement_summary(sql)
    );
    let started_at = Instant::now();
    let conn = session.connection();
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(params_from_iter(binds.iter()))?;

    let mut output = Vec::new();
    while let Some(row) = rows.next()? {
        output.push(S::read(session, row, read_only)?);
    }
    debug!(
        "event=query_execute module=query status=ok query={query} rows={} duration_ms={}",
        output.len(),
        started_at.elapsed().as_millis()
    );
    Ok(output)
}

/// Runs a `SELECT COUNT(...)` statement.
pub(crate) fn fetch_count(
    session: &Session<'_>,
    query: &str,
    sql: &str,
    binds: &[Value],
) -> RepoResult<u64> {
    let count: i64 = session
        .connection()
        .query_row(sql, params_from_iter(binds.iter()), |row| row.get(0))?;
    debug!("event=query_count module=query status=ok query={query} count={count}");
    u64::try_from(count)
        .map_err(|_| RepoError::InvalidData(format!("negative count {count} from `{query}`")))
}

/// Runs an `UPDATE`/`DELETE`, returning the affected row count.
pub(crate) fn execute(
    session: &Session<'_>,
    query: &str,
    sql: &str,
    binds: &[Value],
) -> RepoResult<usize> {
    trace!(
        "event=query_prepare module=query query={query} sql={}",
        statement_summary(sql)
    );
    let affected = session
        .connection()
        .execute(sql, params_from_iter(binds.iter()))?;
    debug!("event=query_modify module=query status=ok query={query} rows={affected}");
    Ok(affected)
}

/// Collapses a result list to at most one row.
pub(crate) fn at_most_one<T>(query: &str, mut rows: Vec<T>) -> RepoResult<Option<T>> {
    match rows.len() {
        0 => Ok(None),
        1 => Ok(rows.pop()),
        count => Err(RepoError::NonUniqueResult {
            query: query.to_string(),
            count,
        }),
    }
}
