//! Queries derived from method-style names.
//!
//! # Responsibility
//! - Parse `<action><subject>By<predicate>[OrderBy<orders>]` names into a
//!   resolved predicate, ordering and limit.
//! - Execute the parsed query as a list, single result, count, existence
//!   check, page, slice or delete.
//!
//! # Invariants
//! - Every property is resolved when the query is parsed; execution never
//!   meets an unknown property.
//! - Arguments are consumed in condition order; fewer than declared fails
//!   with `MissingParameter` before any statement runs.

use crate::model::entity::{nested_path, resolve_path, resolve_property, Entity};
use crate::page::{self, Direction, Page, PageRequest, Slice, Sort, Window};
use crate::repo::error::{QueryDerivationError, RepoError, RepoResult};
use crate::session::Session;
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::types::Value;
use std::fmt::{Debug, Formatter};
use std::marker::PhantomData;

use super::args::Arg;
use super::criteria::{Condition, Connector, Operator, Predicate};
use super::exec::{at_most_one, fetch_count, fetch_rows};
use super::shape::{DerivableShape, Entities};
use super::{LockMode, QueryOptions};

static LIMIT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:First|Top)(\d*)$").expect("valid limit regex"));

/// Operator suffixes, longest first. A trailing `Is` left after stripping is
/// dropped, so `AgeIsGreaterThan` and `AgeGreaterThan` are equivalent.
const OPERATOR_SUFFIXES: &[(&[&str], Operator)] = &[
    (&["Greater", "Than", "Equal"], Operator::GreaterThanEqual),
    (&["Less", "Than", "Equal"], Operator::LessThanEqual),
    (&["Greater", "Than"], Operator::GreaterThan),
    (&["Less", "Than"], Operator::LessThan),
    (&["Not", "Null"], Operator::IsNotNull),
    (&["Not", "Like"], Operator::NotLike),
    (&["Not", "In"], Operator::NotIn),
    (&["Starting", "With"], Operator::StartingWith),
    (&["Starts", "With"], Operator::StartingWith),
    (&["Ending", "With"], Operator::EndingWith),
    (&["Ends", "With"], Operator::EndingWith),
    (&["Null"], Operator::IsNull),
    (&["After"], Operator::GreaterThan),
    (&["Before"], Operator::LessThan),
    (&["Between"], Operator::Between),
    (&["Like"], Operator::Like),
    (&["Containing"], Operator::Containing),
    (&["Contains"], Operator::Containing),
    (&["In"], Operator::In),
    (&["True"], Operator::True),
    (&["False"], Operator::False),
    (&["Not"], Operator::Not),
    (&["Equals"], Operator::Equals),
    (&["Is"], Operator::Equals),
];

/// What a derived query does with its matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// `find`, `read`, `get`, `query`, `search`, `stream`.
    Find,
    Count,
    Exists,
    /// `delete`, `remove`: loads matches and removes them through the session.
    Delete,
}

impl Action {
    fn from_verb(verb: &str) -> Option<Self> {
        match verb {
            "find" | "read" | "get" | "query" | "search" | "stream" => Some(Self::Find),
            "count" => Some(Self::Count),
            "exists" => Some(Self::Exists),
            "delete" | "remove" => Some(Self::Delete),
            _ => None,
        }
    }
}

/// Parsed and validated derived query returning shape `S`.
pub struct DerivedQuery<S: DerivableShape> {
    name: String,
    action: Action,
    distinct: bool,
    limit: Option<u32>,
    predicate: Predicate,
    orders: Vec<String>,
    select_list: String,
    options: QueryOptions,
    shape: PhantomData<fn() -> S>,
}

impl<S: DerivableShape> DerivedQuery<S> {
    /// Parses `name` against the properties of `S::Source`.
    pub fn parse(name: &str) -> Result<Self, QueryDerivationError> {
        let parsed = parse_name::<S::Source>(name)?;
        Ok(Self {
            name: name.to_string(),
            action: parsed.action,
            distinct: parsed.distinct,
            limit: parsed.limit,
            predicate: parsed.predicate,
            orders: parsed.orders,
            select_list: S::select_list()?,
            options: QueryOptions::default(),
            shape: PhantomData,
        })
    }

    /// Load entities without a snapshot.
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

    pub fn action(&self) -> Action {
        self.action
    }

    pub fn predicate(&self) -> &Predicate {
        &self.predicate
    }

    pub fn limit(&self) -> Option<u32> {
        self.limit
    }

    pub fn is_distinct(&self) -> bool {
        self.distinct
    }

    pub fn options(&self) -> QueryOptions {
        self.options
    }

    pub fn fetch(&self, session: &mut Session<'_>, args: &[Arg]) -> RepoResult<Vec<S::Output>> {
        self.expect_action(Action::Find)?;
        let mut binds = Vec::new();
        let mut sql = self.select_sql(args, &mut binds)?;
        sql.push_str(&page::order_by(&self.orders));
        if let Some(limit) = self.limit {
            let window = Window {
                limit: u64::from(limit),
                offset: 0,
            };
            sql.push_str(&window.clause(&mut binds));
        }

        session.before_query(self.options.lock)?;
        fetch_rows::<S>(session, &self.name, &sql, &binds, self.options.read_only)
    }

    /// `None` when nothing matches; `NonUniqueResult` for more than one row.
    pub fn fetch_optional(
        &self,
        session: &mut Session<'_>,
        args: &[Arg],
    ) -> RepoResult<Option<S::Output>> {
        let rows = self.fetch(session, args)?;
        at_most_one(&self.name, rows)
    }

    /// Exactly one row, or `NoResult`/`NonUniqueResult`.
    pub fn fetch_single(&self, session: &mut Session<'_>, args: &[Arg]) -> RepoResult<S::Output> {
        self.fetch_optional(session, args)?
            .ok_or_else(|| RepoError::NoResult(self.name.clone()))
    }

    /// Number of matching rows, whatever the action.
    pub fn count(&self, session: &mut Session<'_>, args: &[Arg]) -> RepoResult<u64> {
        let mut binds = Vec::new();
        let sql = self.count_sql(args, &mut binds)?;
        session.before_query(self.options.lock)?;
        fetch_count(session, &self.name, &sql, &binds)
    }

    pub fn exists(&self, session: &mut Session<'_>, args: &[Arg]) -> RepoResult<bool> {
        let mut binds = Vec::new();
        let filter = self.where_clause(args, &mut binds)?;
        let sql = format!(
            "SELECT EXISTS (SELECT 1 FROM {}{filter});",
            <S::Source as Entity>::TABLE
        );
        session.before_query(self.options.lock)?;
        Ok(fetch_count(session, &self.name, &sql, &binds)? > 0)
    }

    /// Requested window plus total. Request sort keys follow the name's
    /// `OrderBy` keys.
    pub fn page(
        &self,
        session: &mut Session<'_>,
        args: &[Arg],
        request: &PageRequest,
    ) -> RepoResult<Page<S::Output>> {
        self.expect_action(Action::Find)?;
        let mut binds = Vec::new();
        let select = self.select_sql(args, &mut binds)?;
        let order = self.order_with(request.sort())?;
        let mut count_binds = Vec::new();
        let count_sql = self.count_sql(args, &mut count_binds)?;

        session.before_query(self.options.lock)?;
        let read_only = self.options.read_only;
        page::fetch_page(
            session,
            request,
            |session, window| {
                let mut binds = binds;
                let sql = format!("{select}{order}{}", window.clause(&mut binds));
                fetch_rows::<S>(session, &self.name, &sql, &binds, read_only)
            },
            |session| fetch_count(session, &self.name, &count_sql, &count_binds),
        )
    }

    /// Requested window without a count.
    pub fn slice(
        &self,
        session: &mut Session<'_>,
        args: &[Arg],
        request: &PageRequest,
    ) -> RepoResult<Slice<S::Output>> {
        self.expect_action(Action::Find)?;
        let mut binds = Vec::new();
        let select = self.select_sql(args, &mut binds)?;
        let order = self.order_with(request.sort())?;

        session.before_query(self.options.lock)?;
        let read_only = self.options.read_only;
        page::fetch_slice(session, request, |session, window| {
            let mut binds = binds;
            let sql = format!("{select}{order}{}", window.clause(&mut binds));
            fetch_rows::<S>(session, &self.name, &sql, &binds, read_only)
        })
    }

    pub(crate) fn select_sql(&self, args: &[Arg], binds: &mut Vec<Value>) -> RepoResult<String> {
        let filter = self.where_clause(args, binds)?;
        let distinct = if self.distinct { "DISTINCT " } else { "" };
        Ok(format!(
            "SELECT {distinct}{} FROM {}{filter}",
            self.select_list,
            <S::Source as Entity>::TABLE
        ))
    }

    fn count_sql(&self, args: &[Arg], binds: &mut Vec<Value>) -> RepoResult<String> {
        let filter = self.where_clause(args, binds)?;
        let counted = if self.distinct {
            format!("DISTINCT {}", <S::Source as Entity>::ID.column)
        } else {
            "*".to_string()
        };
        Ok(format!(
            "SELECT COUNT({counted}) FROM {}{filter}",
            <S::Source as Entity>::TABLE
        ))
    }

    fn where_clause(&self, args: &[Arg], binds: &mut Vec<Value>) -> RepoResult<String> {
        let rendered = self.predicate.render(args, binds)?;
        if rendered.is_empty() {
            return Ok(String::new());
        }
        Ok(format!(" WHERE {rendered}"))
    }

    fn order_with(&self, sort: &Sort) -> RepoResult<String> {
        let mut keys = self.orders.clone();
        keys.extend(page::order_keys(sort, |property| {
            resolve_property::<S::Source>(property).map(str::to_string)
        })?);
        Ok(page::order_by(&keys))
    }

    fn expect_action(&self, expected: Action) -> RepoResult<()> {
        if self.action == expected {
            return Ok(());
        }
        Err(RepoError::InvalidState(format!(
            "`{}` is a {:?} query, not {:?}",
            self.name, self.action, expected
        )))
    }
}

impl<E: Entity> DerivedQuery<Entities<E>> {
    /// Loads every match and removes it through the session; the deletes are
    /// written on the next flush. Returns the number of removed entities.
    pub fn delete(&self, session: &mut Session<'_>, args: &[Arg]) -> RepoResult<usize> {
        self.expect_action(Action::Delete)?;
        let mut binds = Vec::new();
        let sql = self.select_sql(args, &mut binds)?;

        session.before_query(self.options.lock)?;
        let doomed = fetch_rows::<Entities<E>>(session, &self.name, &sql, &binds, false)?;
        for handle in &doomed {
            session.remove(handle)?;
        }
        Ok(doomed.len())
    }
}

impl<S: DerivableShape> Debug for DerivedQuery<S> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DerivedQuery")
            .field("name", &self.name)
            .field("action", &self.action)
            .field("distinct", &self.distinct)
            .field("limit", &self.limit)
            .field("predicate", &self.predicate)
            .field("orders", &self.orders)
            .field("options", &self.options)
            .finish()
    }
}

struct ParsedName {
    action: Action,
    distinct: bool,
    limit: Option<u32>,
    predicate: Predicate,
    orders: Vec<String>,
}

fn parse_name<E: Entity>(name: &str) -> Result<ParsedName, QueryDerivationError> {
    if name.trim().is_empty() {
        return Err(QueryDerivationError::EmptyName);
    }
    let words = split_words(name.trim());
    let (verb, rest) = words
        .split_first()
        .ok_or(QueryDerivationError::EmptyName)?;
    let action =
        Action::from_verb(verb).ok_or_else(|| QueryDerivationError::UnknownAction(name.into()))?;

    let order_at = (0..rest.len()).find(|&i| rest[i] == "Order" && rest.get(i + 1) == Some(&"By"));
    let by_at = (0..rest.len())
        .find(|&i| rest[i] == "By" && (i == 0 || rest[i - 1] != "Order"))
        .filter(|&i| order_at.map_or(true, |order| i < order));

    let subject_end = by_at.or(order_at).unwrap_or(rest.len());
    let (distinct, limit) = parse_subject(name, &rest[..subject_end])?;

    let predicate = match by_at {
        Some(by) => {
            let words = &rest[by + 1..order_at.unwrap_or(rest.len())];
            match (words.is_empty(), order_at) {
                (true, None) => return Err(QueryDerivationError::MissingPredicate(name.into())),
                (true, Some(_)) => Predicate::default(),
                (false, _) => parse_predicate::<E>(name, words)?,
            }
        }
        None => Predicate::default(),
    };

    let orders = match order_at {
        Some(order) => parse_orders::<E>(name, &rest[order + 2..])?,
        None => Vec::new(),
    };

    Ok(ParsedName {
        action,
        distinct,
        limit,
        predicate,
        orders,
    })
}

/// Splits camel case at every uppercase letter; digits stay with their word.
fn split_words(name: &str) -> Vec<&str> {
    let mut words = Vec::new();
    let mut start = 0;
    for (index, ch) in name.char_indices() {
        if index > start && ch.is_uppercase() {
            words.push(&name[start..index]);
            start = index;
        }
    }
    if start < name.len() {
        words.push(&name[start..]);
    }
    words
}

fn parse_subject(name: &str, words: &[&str]) -> Result<(bool, Option<u32>), QueryDerivationError> {
    let mut distinct = false;
    let mut limit = None;
    for word in words {
        if *word == "Distinct" {
            distinct = true;
        } else if let Some(captures) = LIMIT_RE.captures(word) {
            let digits = captures.get(1).map_or("", |m| m.as_str());
            let count = if digits.is_empty() {
                1
            } else {
                digits
                    .parse::<u32>()
                    .map_err(|_| QueryDerivationError::InvalidLimit(name.into()))?
            };
            if count == 0 {
                return Err(QueryDerivationError::InvalidLimit(name.into()));
            }
            limit = Some(count);
        }
    }
    Ok((distinct, limit))
}

fn parse_predicate<E: Entity>(
    name: &str,
    words: &[&str],
) -> Result<Predicate, QueryDerivationError> {
    let mut predicate = Predicate::default();
    let mut connector = Connector::And;
    let mut segment: Vec<&str> = Vec::new();

    for word in words {
        let next = match *word {
            "And" => Connector::And,
            "Or" => Connector::Or,
            _ => {
                segment.push(word);
                continue;
            }
        };
        if segment.is_empty() {
            return Err(if predicate.is_empty() {
                QueryDerivationError::MissingPredicate(name.into())
            } else {
                QueryDerivationError::DanglingConnector(name.into())
            });
        }
        predicate.push(parse_condition::<E>(connector, &segment)?);
        segment.clear();
        connector = next;
    }

    if segment.is_empty() {
        return Err(QueryDerivationError::DanglingConnector(name.into()));
    }
    predicate.push(parse_condition::<E>(connector, &segment)?);
    Ok(predicate)
}

fn parse_condition<E: Entity>(
    connector: Connector,
    words: &[&str],
) -> Result<Condition, QueryDerivationError> {
    let (mut property_words, operator) = OPERATOR_SUFFIXES
        .iter()
        .find(|(suffix, _)| words.len() > suffix.len() && words.ends_with(suffix))
        .map_or((words, Operator::Equals), |(suffix, operator)| {
            (&words[..words.len() - suffix.len()], *operator)
        });
    if property_words.len() > 1 && property_words.last() == Some(&"Is") {
        property_words = &property_words[..property_words.len() - 1];
    }

    let property = decapitalize(&property_words.concat());
    // `TeamName` falls back to the `team.name` association path.
    let resolved = resolve_path::<E>(&property).or_else(|| {
        nested_path::<E>(&property).and_then(|path| resolve_path::<E>(&path))
    });
    let (column, via) = resolved.ok_or_else(|| QueryDerivationError::UnknownProperty {
        entity: E::NAME,
        property: property.clone(),
    })?;
    Ok(Condition {
        connector,
        property,
        column,
        via,
        operator,
    })
}

fn parse_orders<E: Entity>(name: &str, words: &[&str]) -> Result<Vec<String>, QueryDerivationError> {
    if words.is_empty() {
        return Err(QueryDerivationError::InvalidOrderBy(name.into()));
    }

    let mut orders = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    for word in words {
        let direction = match *word {
            "Asc" => Direction::Asc,
            "Desc" => Direction::Desc,
            _ => {
                current.push(word);
                continue;
            }
        };
        if current.is_empty() {
            return Err(QueryDerivationError::InvalidOrderBy(name.into()));
        }
        orders.push(order_key::<E>(&current, direction)?);
        current.clear();
    }
    if !current.is_empty() {
        orders.push(order_key::<E>(&current, Direction::Asc)?);
    }
    Ok(orders)
}

fn order_key<E: Entity>(words: &[&str], direction: Direction) -> Result<String, QueryDerivationError> {
    let property = decapitalize(&words.concat());
    let column = resolve_property::<E>(&property).ok_or_else(|| {
        QueryDerivationError::UnknownProperty {
            entity: E::NAME,
            property: property.clone(),
        }
    })?;
    Ok(format!("{column} {}", direction.keyword()))
}

/// `Username` → `username`; leading acronyms (`URL`) are kept as written.
fn decapitalize(word: &str) -> String {
    let mut chars = word.chars();
    match (chars.next(), chars.next()) {
        (Some(first), Some(second)) if first.is_uppercase() && second.is_uppercase() => {
            word.to_string()
        }
        (Some(first), _) => first.to_lowercase().chain(word.chars().skip(1)).collect(),
        (None, _) => String::new(),
    }
}
