//! Predicate chains shared by derived queries, criteria lookups and bulk updates.
//!
//! # Invariants
//! - Conditions combine strictly left to right: `a AND b OR c` renders as
//!   `((a AND b) OR c)`.
//! - Every argument is bound as a numbered placeholder; no value is spliced
//!   into statement text.
//! - Empty `In` matches nothing, empty `NotIn` matches everything.
//! - A condition on an associated property (`team.name`) only matches rows
//!   whose foreign key points at a matching target row.

use crate::model::entity::{resolve_path, resolve_property, Association, Entity};
use crate::repo::error::{QueryDerivationError, RepoError, RepoResult};
use rusqlite::types::Value;

use super::args::Arg;

/// Comparison applied to one property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Equals,
    Not,
    GreaterThan,
    GreaterThanEqual,
    LessThan,
    LessThanEqual,
    Between,
    Like,
    NotLike,
    StartingWith,
    EndingWith,
    Containing,
    In,
    NotIn,
    IsNull,
    IsNotNull,
    True,
    False,
}

impl Operator {
    /// Number of arguments consumed by this operator.
    pub fn arity(self) -> usize {
        match self {
            Self::IsNull | Self::IsNotNull | Self::True | Self::False => 0,
            Self::Between => 2,
            _ => 1,
        }
    }

    fn render(self, column: &str, args: &[Arg], binds: &mut Vec<Value>) -> RepoResult<String> {
        let sql = match self {
            Self::IsNull => format!("{column} IS NULL"),
            Self::IsNotNull => format!("{column} IS NOT NULL"),
            Self::True => format!("{column} = 1"),
            Self::False => format!("{column} = 0"),
            Self::Equals => match scalar(self, &args[0])? {
                Value::Null => format!("{column} IS NULL"),
                value => format!("{column} = {}", bind(binds, value)),
            },
            Self::Not => match scalar(self, &args[0])? {
                Value::Null => format!("{column} IS NOT NULL"),
                value => format!("{column} <> {}", bind(binds, value)),
            },
            Self::GreaterThan => compare(column, ">", scalar(self, &args[0])?, binds),
            Self::GreaterThanEqual => compare(column, ">=", scalar(self, &args[0])?, binds),
            Self::LessThan => compare(column, "<", scalar(self, &args[0])?, binds),
            Self::LessThanEqual => compare(column, "<=", scalar(self, &args[0])?, binds),
            Self::Like => compare(column, "LIKE", scalar(self, &args[0])?, binds),
            Self::NotLike => compare(column, "NOT LIKE", scalar(self, &args[0])?, binds),
            Self::Between => {
                let low = bind(binds, scalar(self, &args[0])?);
                let high = bind(binds, scalar(self, &args[1])?);
                format!("{column} BETWEEN {low} AND {high}")
            }
            Self::StartingWith => pattern(self, column, &args[0], "", "%", binds)?,
            Self::EndingWith => pattern(self, column, &args[0], "%", "", binds)?,
            Self::Containing => pattern(self, column, &args[0], "%", "%", binds)?,
            Self::In | Self::NotIn => {
                let values = args[0].values();
                if values.is_empty() {
                    return Ok(if self == Self::In { "1 = 0" } else { "1 = 1" }.to_string());
                }
                let placeholders = values
                    .iter()
                    .map(|value| bind(binds, value.clone()))
                    .collect::<Vec<_>>()
                    .join(", ");
                let keyword = if self == Self::In { "IN" } else { "NOT IN" };
                format!("{column} {keyword} ({placeholders})")
            }
        };
        Ok(sql)
    }
}

fn bind(binds: &mut Vec<Value>, value: Value) -> String {
    binds.push(value);
    format!("?{}", binds.len())
}

fn compare(column: &str, op: &str, value: Value, binds: &mut Vec<Value>) -> String {
    format!("{column} {op} {}", bind(binds, value))
}

fn scalar(operator: Operator, arg: &Arg) -> RepoResult<Value> {
    match arg {
        Arg::Value(value) => Ok(value.clone()),
        Arg::List(_) => Err(RepoError::InvalidArgument(format!(
            "{operator:?} expects a single value, got a list"
        ))),
    }
}

fn pattern(
    operator: Operator,
    column: &str,
    arg: &Arg,
    prefix: &str,
    suffix: &str,
    binds: &mut Vec<Value>,
) -> RepoResult<String> {
    let Value::Text(text) = scalar(operator, arg)? else {
        return Err(RepoError::InvalidArgument(format!(
            "{operator:?} expects a text value"
        )));
    };
    let escaped = escape_like(&text);
    let placeholder = bind(binds, Value::Text(format!("{prefix}{escaped}{suffix}")));
    Ok(format!("{column} LIKE {placeholder} ESCAPE '\\'"))
}

fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

/// How a condition joins the chain built so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connector {
    And,
    Or,
}

impl Connector {
    fn keyword(self) -> &'static str {
        match self {
            Self::And => "AND",
            Self::Or => "OR",
        }
    }
}

/// One resolved condition: property, its column and operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    pub connector: Connector,
    pub property: String,
    pub column: &'static str,
    /// Set when `column` lives on an associated table.
    pub via: Option<&'static Association>,
    pub operator: Operator,
}

/// Resolved condition chain; arguments are supplied at execution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Predicate {
    conditions: Vec<Condition>,
}

impl Predicate {
    pub(crate) fn push(&mut self, condition: Condition) {
        self.conditions.push(condition);
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Total number of arguments the chain consumes.
    pub fn arity(&self) -> usize {
        self.conditions
            .iter()
            .map(|condition| condition.operator.arity())
            .sum()
    }

    /// Renders the chain, consuming `args` in condition order.
    ///
    /// Returns an empty string for an empty chain. Placeholders continue the
    /// numbering already present in `binds`.
    pub(crate) fn render(&self, args: &[Arg], binds: &mut Vec<Value>) -> RepoResult<String> {
        let expected = self.arity();
        if args.len() > expected {
            return Err(RepoError::InvalidArgument(format!(
                "expected {expected} arguments, got {}",
                args.len()
            )));
        }

        let mut sql = String::new();
        let mut cursor = 0;
        for condition in &self.conditions {
            let arity = condition.operator.arity();
            let Some(own) = args.get(cursor..cursor + arity) else {
                return Err(RepoError::MissingParameter(condition.property.clone()));
            };
            cursor += arity;

            let mut rendered = condition.operator.render(condition.column, own, binds)?;
            if let Some(association) = condition.via {
                rendered = association.wrap(&rendered);
            }
            sql = if sql.is_empty() {
                rendered
            } else {
                format!("({sql} {} {rendered})", condition.connector.keyword())
            };
        }
        Ok(sql)
    }
}

/// Runtime-built condition chain with its arguments, resolved against an
/// entity when executed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Criteria {
    terms: Vec<Term>,
}

#[derive(Debug, Clone, PartialEq)]
struct Term {
    connector: Connector,
    property: String,
    operator: Operator,
    args: Vec<Arg>,
}

impl Criteria {
    pub fn new() -> Self {
        Self::default()
    }

    /// `property <operator> arg`, joined with AND.
    pub fn and(self, property: &str, operator: Operator, arg: impl Into<Arg>) -> Self {
        self.term(Connector::And, property, operator, vec![arg.into()])
    }

    /// `property <operator> arg`, joined with OR.
    pub fn or(self, property: &str, operator: Operator, arg: impl Into<Arg>) -> Self {
        self.term(Connector::Or, property, operator, vec![arg.into()])
    }

    pub fn and_between(self, property: &str, low: impl Into<Arg>, high: impl Into<Arg>) -> Self {
        self.term(
            Connector::And,
            property,
            Operator::Between,
            vec![low.into(), high.into()],
        )
    }

    /// Zero-argument operators (`IsNull`, `IsNotNull`, `True`, `False`).
    pub fn and_is(self, property: &str, operator: Operator) -> Self {
        self.term(Connector::And, property, operator, Vec::new())
    }

    pub fn or_is(self, property: &str, operator: Operator) -> Self {
        self.term(Connector::Or, property, operator, Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    fn term(mut self, connector: Connector, property: &str, operator: Operator, args: Vec<Arg>) -> Self {
        self.terms.push(Term {
            connector,
            property: property.to_string(),
            operator,
            args,
        });
        self
    }

    /// Resolves properties against `E` and flattens the arguments.
    pub(crate) fn resolve<E: Entity>(&self) -> RepoResult<(Predicate, Vec<Arg>)> {
        let mut predicate = Predicate::default();
        let mut args = Vec::new();
        for term in &self.terms {
            if term.args.len() != term.operator.arity() {
                return Err(RepoError::InvalidArgument(format!(
                    "{:?} on `{}` takes {} arguments, got {}",
                    term.operator,
                    term.property,
                    term.operator.arity(),
                    term.args.len()
                )));
            }
            let (column, via) = resolve_path::<E>(&term.property).ok_or_else(|| {
                QueryDerivationError::UnknownProperty {
                    entity: E::NAME,
                    property: term.property.clone(),
                }
            })?;
            predicate.push(Condition {
                connector: term.connector,
                property: term.property.clone(),
                column,
                via,
                operator: term.operator,
            });
            args.extend(term.args.iter().cloned());
        }
        Ok((predicate, args))
    }
}

/// Column assignment applied by a bulk update.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldChange {
    Set { property: String, value: Arg },
    Increment { property: String, delta: i64 },
}

impl FieldChange {
    pub fn set(property: &str, value: impl Into<Arg>) -> Self {
        Self::Set {
            property: property.to_string(),
            value: value.into(),
        }
    }

    pub fn increment(property: &str, delta: i64) -> Self {
        Self::Increment {
            property: property.to_string(),
            delta,
        }
    }

    fn property(&self) -> &str {
        match self {
            Self::Set { property, .. } | Self::Increment { property, .. } => property,
        }
    }

    /// Renders `column = ?n` / `column = column + ?n` for entity `E`.
    pub(crate) fn render<E: Entity>(&self, binds: &mut Vec<Value>) -> RepoResult<String> {
        let column = resolve_property::<E>(self.property()).ok_or_else(|| {
            QueryDerivationError::UnknownProperty {
                entity: E::NAME,
                property: self.property().to_string(),
            }
        })?;
        if column == E::ID.column {
            return Err(RepoError::InvalidArgument(format!(
                "bulk update cannot assign identity column `{column}`"
            )));
        }

        match self {
            Self::Set { value, .. } => {
                let value = scalar(Operator::Equals, value)?;
                Ok(format!("{column} = {}", bind(binds, value)))
            }
            Self::Increment { delta, .. } => Ok(format!(
                "{column} = {column} + {}",
                bind(binds, Value::Integer(*delta))
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Criteria, FieldChange, Operator};
    use crate::model::member::Member;
    use crate::query::args::Arg;
    use crate::repo::error::{QueryDerivationError, RepoError};
    use rusqlite::types::Value;

    fn render(criteria: &Criteria) -> (String, Vec<Value>) {
        let (predicate, args) = criteria.resolve::<Member>().unwrap();
        let mut binds = Vec::new();
        let sql = predicate.render(&args, &mut binds).unwrap();
        (sql, binds)
    }

    #[test]
    fn chain_combines_left_to_right() {
        let criteria = Criteria::new()
            .and("username", Operator::Equals, "AAA")
            .and("age", Operator::GreaterThan, 15)
            .or_is("team", Operator::IsNull);

        let (sql, binds) = render(&criteria);
        assert_eq!(sql, "((username = ?1 AND age > ?2) OR team_id IS NULL)");
        assert_eq!(binds, vec![Value::Text("AAA".into()), Value::Integer(15)]);
    }

    #[test]
    fn in_expands_and_empty_lists_short_circuit() {
        let (sql, binds) = render(&Criteria::new().and("username", Operator::In, vec!["A", "B"]));
        assert_eq!(sql, "username IN (?1, ?2)");
        assert_eq!(binds.len(), 2);

        let (sql, _) = render(&Criteria::new().and("username", Operator::In, Vec::<String>::new()));
        assert_eq!(sql, "1 = 0");
        let (sql, _) =
            render(&Criteria::new().and("username", Operator::NotIn, Vec::<String>::new()));
        assert_eq!(sql, "1 = 1");
    }

    #[test]
    fn pattern_operators_escape_wildcards() {
        let (sql, binds) = render(&Criteria::new().and("username", Operator::StartingWith, "50%_"));
        assert_eq!(sql, "username LIKE ?1 ESCAPE '\\'");
        assert_eq!(binds, vec![Value::Text("50\\%\\_%".into())]);
    }

    #[test]
    fn equals_null_renders_is_null() {
        let (sql, binds) = render(&Criteria::new().and("team", Operator::Equals, Arg::null()));
        assert_eq!(sql, "team_id IS NULL");
        assert!(binds.is_empty());
    }

    #[test]
    fn associated_property_renders_a_keyed_subquery() {
        let criteria = Criteria::new()
            .and("username", Operator::Equals, "m1")
            .and("team.name", Operator::Equals, "teamA");

        let (sql, binds) = render(&criteria);
        assert_eq!(
            sql,
            "(username = ?1 AND team_id IN (SELECT team_id FROM team WHERE name = ?2))"
        );
        assert_eq!(
            binds,
            vec![Value::Text("m1".into()), Value::Text("teamA".into())]
        );
    }

    #[test]
    fn unknown_property_is_a_derivation_error() {
        let err = Criteria::new()
            .and("nickname", Operator::Equals, "x")
            .resolve::<Member>()
            .unwrap_err();
        assert!(matches!(
            err,
            RepoError::Derivation(QueryDerivationError::UnknownProperty { .. })
        ));

        let err = Criteria::new()
            .and("team.nickname", Operator::Equals, "x")
            .resolve::<Member>()
            .unwrap_err();
        assert!(matches!(
            err,
            RepoError::Derivation(QueryDerivationError::UnknownProperty { property, .. })
                if property == "team.nickname"
        ));
    }

    #[test]
    fn missing_argument_names_the_property() {
        let (predicate, _) = Criteria::new()
            .and("username", Operator::Equals, "AAA")
            .and("age", Operator::GreaterThan, 15)
            .resolve::<Member>()
            .unwrap();
        let err = predicate
            .render(&[Arg::from("AAA")], &mut Vec::new())
            .unwrap_err();
        assert!(matches!(err, RepoError::MissingParameter(property) if property == "age"));
    }

    #[test]
    fn field_changes_render_assignments() {
        let mut binds = Vec::new();
        let increment = FieldChange::increment("age", 1).render::<Member>(&mut binds).unwrap();
        let set = FieldChange::set("username", "renamed").render::<Member>(&mut binds).unwrap();
        assert_eq!(increment, "age = age + ?1");
        assert_eq!(set, "username = ?2");

        let err = FieldChange::set("id", 5).render::<Member>(&mut binds).unwrap_err();
        assert!(matches!(err, RepoError::InvalidArgument(_)));
    }
}
