//! Statement text for identity-keyed reads and writes.

use crate::model::entity::{select_list, state_fields, Entity};

/// Allocates the next identity for a table; creates the sequence row on first use.
pub(crate) const NEXT_ID_SQL: &str = "INSERT INTO id_sequences (name, next_val) VALUES (?1, 2)
     ON CONFLICT (name) DO UPDATE SET next_val = next_val + 1
     RETURNING next_val - 1;";

/// Raises a table's sequence to at least `?2`.
pub(crate) const RESERVE_ID_SQL: &str = "INSERT INTO id_sequences (name, next_val) VALUES (?1, ?2)
     ON CONFLICT (name) DO UPDATE SET next_val = max(next_val, excluded.next_val);";

/// `?start, ?start+1, ...` for `count` parameters.
pub(crate) fn numbered_placeholders(start: usize, count: usize) -> String {
    (start..start + count)
        .map(|index| format!("?{index}"))
        .collect::<Vec<_>>()
        .join(", ")
}

pub(crate) fn insert_sql<E: Entity>() -> String {
    let count = 1 + state_fields::<E>().count();
    format!(
        "INSERT INTO {} ({}) VALUES ({});",
        E::TABLE,
        select_list::<E>(),
        numbered_placeholders(1, count)
    )
}

pub(crate) fn select_all_sql<E: Entity>() -> String {
    format!("SELECT {} FROM {}", select_list::<E>(), E::TABLE)
}

pub(crate) fn select_by_id_sql<E: Entity>() -> String {
    format!("{} WHERE {} = ?1;", select_all_sql::<E>(), E::ID.column)
}

pub(crate) fn select_by_ids_sql<E: Entity>(count: usize) -> String {
    format!(
        "{} WHERE {} IN ({});",
        select_all_sql::<E>(),
        E::ID.column,
        numbered_placeholders(1, count)
    )
}

pub(crate) fn delete_by_id_sql<E: Entity>() -> String {
    format!("DELETE FROM {} WHERE {} = ?1;", E::TABLE, E::ID.column)
}
