//! Windowed fetch plus optional companion count.
//!
//! # Invariants
//! - The count statement never carries sort or limit.
//! - Window fetch and count are separate statements; the total may be stale
//!   relative to the content under concurrent writes.
//! - The count is skipped only when the window alone proves the total.

use crate::config::DataConfig;
use crate::repo::error::{RepoError, RepoResult};
use crate::session::Session;
use log::debug;
use rusqlite::types::Value;

use super::{Page, PageRequest, Slice, Sort};

/// `LIMIT`/`OFFSET` pair of one fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Window {
    pub(crate) limit: u64,
    pub(crate) offset: u64,
}

impl Window {
    /// Appends ` LIMIT ?n OFFSET ?m`, continuing the numbering in `binds`.
    pub(crate) fn clause(&self, binds: &mut Vec<Value>) -> String {
        binds.push(Value::Integer(to_sql_int(self.limit)));
        let limit = binds.len();
        binds.push(Value::Integer(to_sql_int(self.offset)));
        let offset = binds.len();
        format!(" LIMIT ?{limit} OFFSET ?{offset}")
    }
}

fn to_sql_int(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Page size after applying the configured default and maximum.
pub(crate) fn effective_size(request: &PageRequest, config: &DataConfig) -> u32 {
    let requested = if request.size() == 0 {
        config.default_page_size
    } else {
        request.size()
    };
    requested.clamp(1, config.max_page_size.max(1))
}

/// `column DIRECTION` keys for `sort`.
///
/// `resolve` maps a sort property to a column; `None` fails with `InvalidSort`.
pub(crate) fn order_keys(
    sort: &Sort,
    resolve: impl Fn(&str) -> Option<String>,
) -> RepoResult<Vec<String>> {
    sort.orders()
        .iter()
        .map(|order| {
            resolve(&order.property)
                .map(|column| format!("{column} {}", order.direction.keyword()))
                .ok_or_else(|| RepoError::InvalidSort(order.property.clone()))
        })
        .collect()
}

/// ` ORDER BY ...` for `keys`, or an empty string when there are none.
pub(crate) fn order_by(keys: &[String]) -> String {
    if keys.is_empty() {
        return String::new();
    }
    format!(" ORDER BY {}", keys.join(", "))
}

pub(crate) fn order_clause(
    sort: &Sort,
    resolve: impl Fn(&str) -> Option<String>,
) -> RepoResult<String> {
    Ok(order_by(&order_keys(sort, resolve)?))
}

/// Runs `fetch` for the requested window and `count` when the total is not
/// implied by the window.
pub(crate) fn fetch_page<'c, T>(
    session: &mut Session<'c>,
    request: &PageRequest,
    fetch: impl FnOnce(&mut Session<'c>, Window) -> RepoResult<Vec<T>>,
    count: impl FnOnce(&mut Session<'c>) -> RepoResult<u64>,
) -> RepoResult<Page<T>> {
    let size = effective_size(request, session.config());
    let offset = u64::from(request.page()) * u64::from(size);
    let content = fetch(
        session,
        Window {
            limit: u64::from(size),
            offset,
        },
    )?;

    let fetched = content.len() as u64;
    let counted = !((offset == 0 || fetched > 0) && fetched < u64::from(size));
    let total = if counted {
        count(session)?
    } else {
        offset + fetched
    };
    debug!(
        "event=page_fetch module=page status=ok page={} size={} rows={} total={} counted={}",
        request.page(),
        size,
        fetched,
        total,
        counted
    );
    Ok(Page::new(content, request.page(), size, total))
}

/// Fetches one extra row to learn whether a next window exists; never counts.
pub(crate) fn fetch_slice<'c, T>(
    session: &mut Session<'c>,
    request: &PageRequest,
    fetch: impl FnOnce(&mut Session<'c>, Window) -> RepoResult<Vec<T>>,
) -> RepoResult<Slice<T>> {
    let size = effective_size(request, session.config());
    let offset = u64::from(request.page()) * u64::from(size);
    let mut content = fetch(
        session,
        Window {
            limit: u64::from(size) + 1,
            offset,
        },
    )?;

    let has_next = content.len() > size as usize;
    content.truncate(size as usize);
    debug!(
        "event=slice_fetch module=page status=ok page={} size={} rows={} has_next={}",
        request.page(),
        size,
        content.len(),
        has_next
    );
    Ok(Slice::new(content, request.page(), size, has_next))
}
