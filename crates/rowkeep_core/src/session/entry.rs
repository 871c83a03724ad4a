//! Per-entity tracking record and its type-erased flush interface.

use crate::model::audit::AuditContext;
use crate::model::entity::{is_insert_only, state_fields, state_values, Entity, EntityId, IdKey};
use crate::repo::error::{RepoError, RepoResult};
use crate::session::managed::Managed;
use crate::session::sql::{delete_by_id_sql, insert_sql};
use log::debug;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};
use std::any::{Any, TypeId};

/// Identity-map key: entity type + identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct EntityKey {
    entity: TypeId,
    id: IdKey,
}

impl EntityKey {
    pub(crate) fn of<E: Entity>(id: &E::Id) -> Self {
        Self {
            entity: TypeId::of::<E>(),
            id: id.key(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EntryStatus {
    /// Persisted in memory, insert pending.
    New,
    Attached,
    /// Delete pending.
    Removed,
}

pub(crate) struct Entry<E: Entity> {
    pub(crate) id: E::Id,
    pub(crate) handle: Managed<E>,
    /// `None` for read-only loads, which are never dirty-checked.
    pub(crate) snapshot: Option<Vec<Value>>,
    pub(crate) status: EntryStatus,
}

impl<E: Entity> Entry<E> {
    fn check_identity(&self, entity: &E) -> RepoResult<()> {
        if entity.id().as_ref() == Some(&self.id) {
            return Ok(());
        }
        Err(RepoError::IdentityMutated {
            entity: E::NAME,
            id: format!("{:?}", self.id),
        })
    }
}

/// Flush operations the session runs without knowing the entity type.
pub(crate) trait Tracked {
    fn key(&self) -> EntityKey;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn write_insert(&mut self, conn: &Connection) -> RepoResult<bool>;
    fn write_update(&mut self, conn: &Connection, audit: &AuditContext) -> RepoResult<bool>;
    fn write_delete(&mut self, conn: &Connection) -> RepoResult<bool>;
}

impl<E: Entity> Tracked for Entry<E> {
    fn key(&self) -> EntityKey {
        EntityKey::of::<E>(&self.id)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn write_insert(&mut self, conn: &Connection) -> RepoResult<bool> {
        if self.status != EntryStatus::New {
            return Ok(false);
        }

        let state = {
            let entity = self.handle.try_borrow()?;
            self.check_identity(&entity)?;
            state_values(&*entity)
        };
        let mut row = Vec::with_capacity(state.len() + 1);
        row.push(self.id.to_value());
        row.extend(state.iter().cloned());

        conn.execute(&insert_sql::<E>(), params_from_iter(row.iter()))?;
        debug!(
            "event=flush_insert module=session status=ok entity={} id={:?}",
            E::NAME,
            self.id
        );

        self.snapshot = Some(state);
        self.status = EntryStatus::Attached;
        Ok(true)
    }

    fn write_update(&mut self, conn: &Connection, audit: &AuditContext) -> RepoResult<bool> {
        if self.status != EntryStatus::Attached {
            return Ok(false);
        }
        let Some(snapshot) = self.snapshot.as_ref() else {
            return Ok(false);
        };

        {
            let entity = self.handle.try_borrow()?;
            self.check_identity(&entity)?;
            if state_values(&*entity) == *snapshot {
                return Ok(false);
            }
        }
        {
            let mut entity = self.handle.try_borrow_mut()?;
            entity.pre_update();
            if let Some(block) = entity.audit_mut() {
                audit.stamp_updated(block);
            }
        }
        let current = state_values(&*self.handle.try_borrow()?);

        let mut assignments = Vec::new();
        let mut binds = Vec::new();
        for ((field, now), before) in state_fields::<E>().zip(&current).zip(snapshot) {
            if now == before || is_insert_only(field.column) {
                continue;
            }
            binds.push(now.clone());
            assignments.push(format!("{} = ?{}", field.column, binds.len()));
        }
        if assignments.is_empty() {
            self.snapshot = Some(current);
            return Ok(false);
        }

        binds.push(self.id.to_value());
        let sql = format!(
            "UPDATE {} SET {} WHERE {} = ?{};",
            E::TABLE,
            assignments.join(", "),
            E::ID.column,
            binds.len()
        );
        let changed = conn.execute(&sql, params_from_iter(binds.iter()))?;
        if changed == 0 {
            return Err(RepoError::NotFound {
                entity: E::NAME,
                id: format!("{:?}", self.id),
            });
        }
        debug!(
            "event=flush_update module=session status=ok entity={} id={:?} columns={}",
            E::NAME,
            self.id,
            assignments.len()
        );

        self.snapshot = Some(current);
        Ok(true)
    }

    fn write_delete(&mut self, conn: &Connection) -> RepoResult<bool> {
        if self.status != EntryStatus::Removed {
            return Ok(false);
        }
        conn.execute(&delete_by_id_sql::<E>(), [self.id.to_value()])?;
        debug!(
            "event=flush_delete module=session status=ok entity={} id={:?}",
            E::NAME,
            self.id
        );
        Ok(true)
    }
}
