//! Declared result shapes: entities, scalars and DTO projections.
//!
//! The shape is part of the query's type, so what a query returns is fixed
//! when the query is declared and never inferred from the rows.

use crate::model::entity::{resolve_property, select_list, Entity, FromRow};
use crate::repo::error::{QueryDerivationError, RepoResult};
use crate::session::{Managed, Session};
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::types::FromSql;
use rusqlite::Row;
use std::marker::PhantomData;

static IDENTIFIER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid identifier regex"));

/// How one result row becomes one output value.
pub trait ResultShape {
    type Output;

    fn read(session: &mut Session<'_>, row: &Row<'_>, read_only: bool) -> RepoResult<Self::Output>;

    /// Column to order by for a sort property, or `None` when unknown.
    ///
    /// Explicit queries are sorted on their output columns, so any plain
    /// identifier is accepted by default.
    fn sort_column(property: &str) -> Option<String> {
        IDENTIFIER_RE
            .is_match(property)
            .then(|| property.to_string())
    }
}

/// Shapes whose select list can be generated from the source entity.
pub trait DerivableShape: ResultShape {
    type Source: Entity;

    fn select_list() -> Result<String, QueryDerivationError>;
}

/// Rows attached to the session as entities (identity map applies).
#[derive(Debug)]
pub struct Entities<E>(PhantomData<E>);

impl<E: Entity> ResultShape for Entities<E> {
    type Output = Managed<E>;

    fn read(session: &mut Session<'_>, row: &Row<'_>, read_only: bool) -> RepoResult<Managed<E>> {
        let entity = E::from_row(row)?;
        session.attach_loaded(entity, read_only)
    }

    fn sort_column(property: &str) -> Option<String> {
        resolve_property::<E>(property).map(str::to_string)
    }
}

impl<E: Entity> DerivableShape for Entities<E> {
    type Source = E;

    fn select_list() -> Result<String, QueryDerivationError> {
        Ok(select_list::<E>())
    }
}

/// First column of each row.
#[derive(Debug)]
pub struct Scalar<T>(PhantomData<T>);

impl<T: FromSql> ResultShape for Scalar<T> {
    type Output = T;

    fn read(_session: &mut Session<'_>, row: &Row<'_>, _read_only: bool) -> RepoResult<T> {
        Ok(row.get(0)?)
    }
}

/// Detached read model built from named columns.
#[derive(Debug)]
pub struct Projected<P>(PhantomData<P>);

impl<P: FromRow> ResultShape for Projected<P> {
    type Output = P;

    fn read(_session: &mut Session<'_>, row: &Row<'_>, _read_only: bool) -> RepoResult<P> {
        Ok(P::from_row(row)?)
    }
}

/// Read model listing the entity properties it is built from.
///
/// Derived queries returning `Projected<P>` select exactly these properties,
/// aliased to their property names.
pub trait Projection: FromRow {
    type Source: Entity;

    const PROPERTIES: &'static [&'static str];
}

impl<P: Projection> DerivableShape for Projected<P> {
    type Source = P::Source;

    fn select_list() -> Result<String, QueryDerivationError> {
        if P::PROPERTIES.is_empty() {
            return Err(QueryDerivationError::ShapeNotDerivable(
                std::any::type_name::<P>(),
            ));
        }
        P::PROPERTIES
            .iter()
            .map(|property| {
                resolve_property::<P::Source>(property)
                    .map(|column| format!("{column} AS {property}"))
                    .ok_or_else(|| QueryDerivationError::UnknownProperty {
                        entity: <P::Source as Entity>::NAME,
                        property: (*property).to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()
            .map(|columns| columns.join(", "))
    }
}
