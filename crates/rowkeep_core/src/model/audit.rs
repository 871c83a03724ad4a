//! Audit block and the clock/auditor collaborators that stamp it.
//!
//! # Responsibility
//! - Hold created/updated timestamps and actors for audited entities.
//! - Abstract "now" and "who" so tests can pin both.
//!
//! # Invariants
//! - `created_at`/`created_by` are written on insert only.
//! - Timestamps are Unix epoch milliseconds.

use crate::model::entity::Field;
use rusqlite::types::Value;
use rusqlite::Row;
use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Formatter};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Audit columns in the order produced by [`Audit::values`].
pub const AUDIT_FIELDS: &[Field] = &[
    Field::new("createdAt", "created_at"),
    Field::new("updatedAt", "updated_at"),
    Field::new("createdBy", "created_by"),
    Field::new("updatedBy", "updated_by"),
];

/// Columns excluded from update statements.
pub const INSERT_ONLY_COLUMNS: &[&str] = &["created_at", "created_by"];

/// Who/when metadata for an audited entity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Audit {
    pub created_at: Option<i64>,
    pub updated_at: Option<i64>,
    pub created_by: Option<String>,
    pub updated_by: Option<String>,
}

impl Audit {
    /// Reads the audit columns from a row that selected them by name.
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
            created_by: row.get("created_by")?,
            updated_by: row.get("updated_by")?,
        })
    }

    pub(crate) fn values(&self) -> Vec<Value> {
        vec![
            self.created_at.map_or(Value::Null, Value::Integer),
            self.updated_at.map_or(Value::Null, Value::Integer),
            self.created_by.clone().map_or(Value::Null, Value::Text),
            self.updated_by.clone().map_or(Value::Null, Value::Text),
        ]
    }
}

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> i64;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |elapsed| {
                i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX)
            })
    }
}

/// Manually driven clock for deterministic stamps.
#[derive(Debug, Default)]
pub struct FixedClock {
    now: AtomicI64,
}

impl FixedClock {
    pub fn new(now_millis: i64) -> Self {
        Self {
            now: AtomicI64::new(now_millis),
        }
    }

    pub fn set(&self, now_millis: i64) {
        self.now.store(now_millis, Ordering::SeqCst);
    }

    pub fn advance(&self, millis: i64) {
        self.now.fetch_add(millis, Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now_millis(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Source of the acting principal.
pub trait Auditor: Send + Sync {
    fn current_auditor(&self) -> Option<String>;
}

/// Always reports the same principal.
#[derive(Debug, Clone)]
pub struct FixedAuditor(pub String);

impl Auditor for FixedAuditor {
    fn current_auditor(&self) -> Option<String> {
        Some(self.0.clone())
    }
}

/// Reports a fresh UUID v4 per stamp.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomAuditor;

impl Auditor for RandomAuditor {
    fn current_auditor(&self) -> Option<String> {
        Some(Uuid::new_v4().to_string())
    }
}

/// Clock + auditor pair applied by a session.
#[derive(Clone)]
pub struct AuditContext {
    clock: Arc<dyn Clock>,
    auditor: Arc<dyn Auditor>,
}

impl AuditContext {
    pub fn new(clock: Arc<dyn Clock>, auditor: Arc<dyn Auditor>) -> Self {
        Self { clock, auditor }
    }

    /// Stamps all four fields; used once, at persist.
    pub(crate) fn stamp_created(&self, audit: &mut Audit) {
        let now = self.clock.now_millis();
        let who = self.auditor.current_auditor();
        audit.created_at = Some(now);
        audit.updated_at = Some(now);
        audit.created_by = who.clone();
        audit.updated_by = who;
    }

    pub(crate) fn stamp_updated(&self, audit: &mut Audit) {
        audit.updated_at = Some(self.clock.now_millis());
        audit.updated_by = self.auditor.current_auditor();
    }
}

impl Default for AuditContext {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock), Arc::new(RandomAuditor))
    }
}

impl Debug for AuditContext {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditContext")
            .field("now_millis", &self.clock.now_millis())
            .finish_non_exhaustive()
    }
}
