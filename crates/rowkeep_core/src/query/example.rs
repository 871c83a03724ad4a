//! Query by example: a partly filled entity used as a filter.
//!
//! # Invariants
//! - Only non-null sample values become conditions; they are joined with AND.
//! - Ignored properties never become conditions, whatever the sample holds.
//! - Text values follow the example's [`StringMatch`]; other values compare
//!   for equality.

use crate::model::entity::{resolve_path, state_fields, state_values, Entity, EntityId};
use crate::repo::error::{QueryDerivationError, RepoResult};
use rusqlite::types::Value;

use super::args::Arg;
use super::criteria::{Criteria, Operator};

/// How text values of the sample are compared.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StringMatch {
    #[default]
    Exact,
    StartingWith,
    EndingWith,
    Containing,
}

impl StringMatch {
    fn operator(self) -> Operator {
        match self {
            Self::Exact => Operator::Equals,
            Self::StartingWith => Operator::StartingWith,
            Self::EndingWith => Operator::EndingWith,
            Self::Containing => Operator::Containing,
        }
    }
}

/// Sample entity plus matching rules.
#[derive(Debug, Clone)]
pub struct Example<E: Entity> {
    sample: E,
    ignored: Vec<String>,
    strings: StringMatch,
    paths: Vec<(String, Arg)>,
}

impl<E: Entity> Example<E> {
    pub fn of(sample: E) -> Self {
        Self {
            sample,
            ignored: Vec::new(),
            strings: StringMatch::Exact,
            paths: Vec::new(),
        }
    }

    /// Skips these properties. Needed for fields that always hold a value,
    /// such as a zero `age`.
    pub fn ignoring(mut self, properties: &[&str]) -> Self {
        self.ignored
            .extend(properties.iter().map(|property| property.to_string()));
        self
    }

    pub fn with_string_match(mut self, strings: StringMatch) -> Self {
        self.strings = strings;
        self
    }

    /// Also requires an associated property, e.g. `("team.name", "teamA")`.
    pub fn with_path(mut self, path: &str, value: impl Into<Arg>) -> Self {
        self.paths.push((path.to_string(), value.into()));
        self
    }

    pub fn sample(&self) -> &E {
        &self.sample
    }

    /// Conditions for every non-null, non-ignored sample value, then the
    /// association paths.
    pub fn to_criteria(&self) -> RepoResult<Criteria> {
        for property in self.ignored.iter().chain(self.paths.iter().map(|(path, _)| path)) {
            if resolve_path::<E>(property).is_none() {
                return Err(QueryDerivationError::UnknownProperty {
                    entity: E::NAME,
                    property: property.clone(),
                }
                .into());
            }
        }

        let mut criteria = Criteria::new();
        let identity = self.sample.id().map(|id| (E::ID, id.to_value()));
        let state = state_fields::<E>().copied().zip(state_values(&self.sample));
        for (field, value) in identity.into_iter().chain(state) {
            if value == Value::Null || self.ignored.iter().any(|name| name == field.property) {
                continue;
            }
            let operator = match value {
                Value::Text(_) => self.strings.operator(),
                _ => Operator::Equals,
            };
            criteria = criteria.and(field.property, operator, value);
        }
        for (path, value) in &self.paths {
            let operator = match value {
                Arg::Value(Value::Text(_)) => self.strings.operator(),
                _ => Operator::Equals,
            };
            criteria = criteria.and(path, operator, value.clone());
        }
        Ok(criteria)
    }
}
