//! Unit of work: identity map, snapshot change tracking and flush.
//!
//! # Responsibility
//! - Track entities loaded or persisted through one connection.
//! - Translate tracked changes into insert/update/delete statements on flush.
//! - Demarcate transactions and hold pessimistic write locks.
//!
//! # Invariants
//! - One `Managed<E>` per identity per session (identity map).
//! - Flush order is inserts, then updates, then deletes, each in registration
//!   order.
//! - Updates carry only the columns that differ from the snapshot.
//! - Statements issued outside the session (bulk updates) never touch tracked
//!   state; attached copies stay stale until `clear()`.
//! - A session is single-threaded; run one session per connection per task.

mod entry;
mod managed;
pub(crate) mod sql;

pub use managed::Managed;

use crate::config::{DataConfig, FlushMode};
use crate::model::audit::AuditContext;
use crate::model::entity::{state_values, Entity, EntityId};
use crate::query::LockMode;
use crate::repo::error::{RepoError, RepoResult};
use entry::{Entry, EntityKey, EntryStatus, Tracked};
use log::{debug, error, info, warn};
use rusqlite::types::Value;
use rusqlite::{
    params, params_from_iter, Connection, OptionalExtension, Transaction, TransactionBehavior,
};
use sql::{select_by_id_sql, select_by_ids_sql, NEXT_ID_SQL, RESERVE_ID_SQL};
use std::collections::HashMap;
use std::time::Instant;

/// Locking behavior of a session transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionMode {
    /// Locks are taken lazily by the first read/write.
    Deferred,
    /// Reserves the write lock up front; required for pessimistic locking.
    Immediate,
}

/// Statement counts written by one flush.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub inserts: usize,
    pub updates: usize,
    pub deletes: usize,
}

impl FlushReport {
    pub fn statements(&self) -> usize {
        self.inserts + self.updates + self.deletes
    }

    pub fn is_empty(&self) -> bool {
        self.statements() == 0
    }
}

struct ActiveTransaction<'conn> {
    tx: Transaction<'conn>,
    mode: TransactionMode,
}

/// Unit of work bound to one connection.
pub struct Session<'conn> {
    conn: &'conn Connection,
    transaction: Option<ActiveTransaction<'conn>>,
    audit: AuditContext,
    config: DataConfig,
    entries: Vec<Option<Box<dyn Tracked>>>,
    index: HashMap<EntityKey, usize>,
}

impl<'conn> Session<'conn> {
    /// Opens a session with the default audit context (wall clock, UUID auditor).
    pub fn new(conn: &'conn Connection, config: &DataConfig) -> RepoResult<Self> {
        Self::with_audit(conn, config, AuditContext::default())
    }

    /// Opens a session with an explicit audit context.
    ///
    /// Applies `config.lock_timeout` as the connection busy timeout.
    pub fn with_audit(
        conn: &'conn Connection,
        config: &DataConfig,
        audit: AuditContext,
    ) -> RepoResult<Self> {
        conn.busy_timeout(config.lock_timeout)?;
        Ok(Self {
            conn,
            transaction: None,
            audit,
            config: config.clone(),
            entries: Vec::new(),
            index: HashMap::new(),
        })
    }

    pub fn config(&self) -> &DataConfig {
        &self.config
    }

    pub(crate) fn connection(&self) -> &'conn Connection {
        self.conn
    }

    /// Number of entities currently tracked (new, attached or removed).
    pub fn attached_count(&self) -> usize {
        self.index.len()
    }

    /// Registers a new entity: assigns identity, runs `pre_persist`, stamps
    /// audit creation fields and schedules the insert for the next flush.
    ///
    /// A caller-supplied generated-type identity raises the table sequence
    /// past it.
    pub fn persist<E: Entity>(&mut self, mut entity: E) -> RepoResult<Managed<E>> {
        let id = match entity.id() {
            Some(id) => {
                if self.index.contains_key(&EntityKey::of::<E>(&id)) {
                    return Err(RepoError::InvalidState(format!(
                        "{} {id:?} is already attached to this session",
                        E::NAME
                    )));
                }
                self.reserve_id::<E>(&id)?;
                id
            }
            None => {
                let id = self.generate_id::<E>()?;
                entity.set_id(id.clone());
                id
            }
        };

        entity.pre_persist();
        if let Some(block) = entity.audit_mut() {
            self.audit.stamp_created(block);
        }

        let handle = Managed::new(entity);
        self.insert_entry(Entry {
            id: id.clone(),
            handle: handle.clone(),
            snapshot: None,
            status: EntryStatus::New,
        });
        debug!(
            "event=persist module=session status=ok entity={} id={id:?}",
            E::NAME
        );
        Ok(handle)
    }

    /// Looks up an entity by identity: identity map first, then storage.
    ///
    /// Entities removed in this session are reported as absent.
    pub fn find<E: Entity>(&mut self, id: &E::Id) -> RepoResult<Option<Managed<E>>> {
        if let Some(entry) = self.entry::<E>(id) {
            return Ok(match entry.status {
                EntryStatus::Removed => None,
                EntryStatus::New | EntryStatus::Attached => Some(entry.handle.clone()),
            });
        }

        let loaded = self
            .conn
            .query_row(&select_by_id_sql::<E>(), [id.to_value()], |row| {
                E::from_row(row)
            })
            .optional()?;
        loaded
            .map(|entity| self.attach_loaded(entity, false))
            .transpose()
    }

    /// Loads many identities with one statement for those not yet attached.
    ///
    /// Result order follows `ids`; missing and removed identities are skipped.
    pub fn load_many<E: Entity>(&mut self, ids: &[E::Id]) -> RepoResult<Vec<Managed<E>>> {
        let mut missing: Vec<Value> = Vec::new();
        for id in ids {
            if self.entry::<E>(id).is_none() && !missing.contains(&id.to_value()) {
                missing.push(id.to_value());
            }
        }

        if !missing.is_empty() {
            let conn = self.conn;
            let mut stmt = conn.prepare(&select_by_ids_sql::<E>(missing.len()))?;
            let mut rows = stmt.query(params_from_iter(missing.iter()))?;
            while let Some(row) = rows.next()? {
                let entity = E::from_row(row)?;
                self.attach_loaded(entity, false)?;
            }
        }

        Ok(ids
            .iter()
            .filter_map(|id| self.entry::<E>(id))
            .filter(|entry| entry.status != EntryStatus::Removed)
            .map(|entry| entry.handle.clone())
            .collect())
    }

    /// Re-attaches a detached entity.
    ///
    /// Copies its state onto the attached instance for the same identity,
    /// loading it first if needed. Entities without a stored row are persisted.
    pub fn merge<E: Entity>(&mut self, entity: E) -> RepoResult<Managed<E>> {
        let Some(id) = entity.id() else {
            return self.persist(entity);
        };
        let Some(attached) = self.find::<E>(&id)? else {
            return self.persist(entity);
        };

        {
            let mut target = attached.try_borrow_mut()?;
            let mut incoming = entity;
            carry_creation_audit(&*target, &mut incoming);
            *target = incoming;
        }
        debug!(
            "event=merge module=session status=ok entity={} id={id:?}",
            E::NAME
        );
        Ok(attached)
    }

    /// Schedules a delete. Removing a not-yet-flushed entity cancels its insert.
    pub fn remove<E: Entity>(&mut self, handle: &Managed<E>) -> RepoResult<()> {
        let (slot, key) = self.slot_of(handle)?;
        let entry = self.entries[slot]
            .as_mut()
            .and_then(|tracked| tracked.as_any_mut().downcast_mut::<Entry<E>>())
            .ok_or(RepoError::NotAttached(E::NAME))?;

        match entry.status {
            EntryStatus::New => {
                self.entries[slot] = None;
                self.index.remove(&key);
            }
            EntryStatus::Attached | EntryStatus::Removed => entry.status = EntryStatus::Removed,
        }
        Ok(())
    }

    /// Stops tracking one entity without writing its pending changes.
    pub fn detach<E: Entity>(&mut self, handle: &Managed<E>) -> RepoResult<()> {
        let (slot, key) = self.slot_of(handle)?;
        self.entries[slot] = None;
        self.index.remove(&key);
        Ok(())
    }

    /// Whether this exact handle is tracked by the session.
    pub fn contains<E: Entity>(&self, handle: &Managed<E>) -> bool {
        self.slot_of(handle).is_ok()
    }

    /// Detaches everything without writing.
    pub fn clear(&mut self) {
        let detached = self.index.len();
        self.entries.clear();
        self.index.clear();
        debug!("event=clear module=session status=ok detached={detached}");
    }

    /// Writes all pending inserts, updates and deletes.
    ///
    /// The first rejected statement aborts the batch; earlier statements are
    /// only undone if the caller rolls back the enclosing transaction.
    pub fn flush(&mut self) -> RepoResult<FlushReport> {
        let started_at = Instant::now();
        let mut report = FlushReport::default();

        match self.write_pending(&mut report) {
            Ok(()) => {
                if !report.is_empty() {
                    info!(
                        "event=flush module=session status=ok inserts={} updates={} deletes={} duration_ms={}",
                        report.inserts,
                        report.updates,
                        report.deletes,
                        started_at.elapsed().as_millis()
                    );
                }
                Ok(report)
            }
            Err(err) => {
                error!(
                    "event=flush module=session status=error inserts={} updates={} deletes={} duration_ms={} error={}",
                    report.inserts,
                    report.updates,
                    report.deletes,
                    started_at.elapsed().as_millis(),
                    err
                );
                Err(err)
            }
        }
    }

    pub fn in_transaction(&self) -> bool {
        self.transaction.is_some()
    }

    pub fn begin(&mut self, mode: TransactionMode) -> RepoResult<()> {
        if self.transaction.is_some() {
            return Err(RepoError::InvalidState(
                "a transaction is already active".into(),
            ));
        }

        let behavior = match mode {
            TransactionMode::Deferred => TransactionBehavior::Deferred,
            TransactionMode::Immediate => TransactionBehavior::Immediate,
        };
        let tx = Transaction::new_unchecked(self.conn, behavior)?;
        self.transaction = Some(ActiveTransaction { tx, mode });
        debug!("event=tx_begin module=session status=ok mode={mode:?}");
        Ok(())
    }

    /// Flushes, then commits. A failed flush rolls the transaction back and
    /// clears the session.
    pub fn commit(&mut self) -> RepoResult<FlushReport> {
        if self.transaction.is_none() {
            return Err(RepoError::InvalidState("no active transaction".into()));
        }

        let report = match self.flush() {
            Ok(report) => report,
            Err(err) => {
                self.rollback_after_failure();
                return Err(err);
            }
        };

        if let Some(active) = self.transaction.take() {
            active.tx.commit()?;
        }
        debug!("event=tx_commit module=session status=ok");
        Ok(report)
    }

    /// Discards the transaction and every tracked entity.
    pub fn rollback(&mut self) -> RepoResult<()> {
        let active = self
            .transaction
            .take()
            .ok_or_else(|| RepoError::InvalidState("no active transaction".into()))?;
        active.tx.rollback()?;
        self.clear();
        debug!("event=tx_rollback module=session status=ok");
        Ok(())
    }

    /// Registers a row read by a query; an already-attached identity wins over
    /// the row data.
    pub(crate) fn attach_loaded<E: Entity>(
        &mut self,
        entity: E,
        read_only: bool,
    ) -> RepoResult<Managed<E>> {
        let id = entity.id().ok_or_else(|| {
            RepoError::InvalidData(format!("{} row without identity", E::NAME))
        })?;
        if let Some(entry) = self.entry::<E>(&id) {
            return Ok(entry.handle.clone());
        }

        let snapshot = (!read_only).then(|| state_values(&entity));
        let handle = Managed::new(entity);
        self.insert_entry(Entry {
            id,
            handle: handle.clone(),
            snapshot,
            status: EntryStatus::Attached,
        });
        Ok(handle)
    }

    /// Lock acquisition and auto-flush ahead of a query or bulk statement.
    pub(crate) fn before_query(&mut self, lock: LockMode) -> RepoResult<()> {
        if lock == LockMode::PessimisticWrite {
            self.acquire_write_lock()?;
        }
        if self.config.flush_mode == FlushMode::Auto {
            self.flush()?;
        }
        Ok(())
    }

    fn acquire_write_lock(&mut self) -> RepoResult<()> {
        match self.transaction.as_ref().map(|active| active.mode) {
            Some(TransactionMode::Immediate) => Ok(()),
            Some(TransactionMode::Deferred) => Err(RepoError::InvalidState(
                "pessimistic write lock requires an immediate transaction".into(),
            )),
            None => {
                let started_at = Instant::now();
                match self.begin(TransactionMode::Immediate) {
                    Ok(()) => {
                        info!(
                            "event=lock_acquire module=session status=ok wait_ms={}",
                            started_at.elapsed().as_millis()
                        );
                        Ok(())
                    }
                    Err(err) => {
                        warn!(
                            "event=lock_acquire module=session status=error wait_ms={} error={}",
                            started_at.elapsed().as_millis(),
                            err
                        );
                        Err(err)
                    }
                }
            }
        }
    }

    fn write_pending(&mut self, report: &mut FlushReport) -> RepoResult<()> {
        let conn = self.conn;

        for tracked in self.entries.iter_mut().flatten() {
            if tracked.write_insert(conn)? {
                report.inserts += 1;
            }
        }
        for tracked in self.entries.iter_mut().flatten() {
            if tracked.write_update(conn, &self.audit)? {
                report.updates += 1;
            }
        }
        for slot in 0..self.entries.len() {
            let Some(tracked) = self.entries[slot].as_mut() else {
                continue;
            };
            if tracked.write_delete(conn)? {
                let key = tracked.key();
                self.entries[slot] = None;
                self.index.remove(&key);
                report.deletes += 1;
            }
        }
        Ok(())
    }

    fn rollback_after_failure(&mut self) {
        if let Some(active) = self.transaction.take() {
            if let Err(err) = active.tx.rollback() {
                warn!("event=tx_rollback module=session status=error error={err}");
            }
        }
        self.clear();
    }

    fn generate_id<E: Entity>(&self) -> RepoResult<E::Id> {
        if !<E::Id as EntityId>::GENERATED {
            return Err(RepoError::MissingIdentity(E::NAME));
        }
        let next: i64 = self
            .conn
            .query_row(NEXT_ID_SQL, [E::TABLE], |row| row.get(0))?;
        <E::Id as EntityId>::from_value(Value::Integer(next)).ok_or_else(|| {
            RepoError::InvalidData(format!("sequence value {next} is not a {} id", E::NAME))
        })
    }

    /// Moves the sequence past an identity the caller supplied, so later
    /// generated identities never collide with it.
    fn reserve_id<E: Entity>(&self, id: &E::Id) -> RepoResult<()> {
        if !<E::Id as EntityId>::GENERATED {
            return Ok(());
        }
        let Value::Integer(value) = id.to_value() else {
            return Ok(());
        };
        self.conn.execute(
            RESERVE_ID_SQL,
            params![E::TABLE, value.saturating_add(1)],
        )?;
        Ok(())
    }

    fn entry<E: Entity>(&self, id: &E::Id) -> Option<&Entry<E>> {
        let slot = *self.index.get(&EntityKey::of::<E>(id))?;
        self.entries
            .get(slot)?
            .as_ref()?
            .as_any()
            .downcast_ref::<Entry<E>>()
    }

    fn insert_entry<E: Entity>(&mut self, entry: Entry<E>) {
        let key = EntityKey::of::<E>(&entry.id);
        self.entries.push(Some(Box::new(entry)));
        self.index.insert(key, self.entries.len() - 1);
    }

    fn slot_of<E: Entity>(&self, handle: &Managed<E>) -> RepoResult<(usize, EntityKey)> {
        let id = handle
            .try_borrow()?
            .id()
            .ok_or(RepoError::NotAttached(E::NAME))?;
        let key = EntityKey::of::<E>(&id);
        let slot = *self.index.get(&key).ok_or(RepoError::NotAttached(E::NAME))?;
        match self.entry::<E>(&id) {
            Some(entry) if entry.handle.ptr_eq(handle) => Ok((slot, key)),
            _ => Err(RepoError::NotAttached(E::NAME)),
        }
    }
}

fn carry_creation_audit<E: Entity>(attached: &E, incoming: &mut E) {
    let Some(source) = attached.audit() else {
        return;
    };
    let created_at = source.created_at;
    let created_by = source.created_by.clone();
    if let Some(target) = incoming.audit_mut() {
        if target.created_at.is_none() {
            target.created_at = created_at;
            target.created_by = created_by;
        }
    }
}
