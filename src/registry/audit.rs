//! Audit trail of registry mutations.
//!
//! Every register / unregister / clear / freeze performed on a
//! [`CapabilityRegistry`](super::CapabilityRegistry) is appended here along
//! with the caller's source location, so unexpected rebinding of a
//! process-wide capability can be traced back to the code that did it.

use std::collections::VecDeque;
use std::fmt;
use std::panic::Location;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Events retained by a log built with [`RegistryAuditLog::new`].
pub const DEFAULT_AUDIT_CAPACITY: usize = 1024;

static GLOBAL_AUDIT_LOG: Lazy<Arc<RegistryAuditLog>> =
    Lazy::new(|| Arc::new(RegistryAuditLog::new()));

// ---------------------------------------------------------------------------
// RegistryAction / RegistryEvent
// ---------------------------------------------------------------------------

/// Kind of registry mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistryAction {
    Register,
    RegisterFactory,
    SetDefault,
    SetDefaultFactory,
    Unregister,
    Clear,
    Freeze,
    Unfreeze,
    Reset,
}

impl RegistryAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegistryAction::Register => "register",
            RegistryAction::RegisterFactory => "register_factory",
            RegistryAction::SetDefault => "set_default",
            RegistryAction::SetDefaultFactory => "set_default_factory",
            RegistryAction::Unregister => "unregister",
            RegistryAction::Clear => "clear",
            RegistryAction::Freeze => "freeze",
            RegistryAction::Unfreeze => "unfreeze",
            RegistryAction::Reset => "reset",
        }
    }
}

impl fmt::Display for RegistryAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One recorded registry mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryEvent {
    pub action: RegistryAction,
    /// Affected slot, e.g. `'db'` or `default capability`. Empty for
    /// registry-wide actions.
    pub target: String,
    /// Type name of the capability interface.
    pub capability: String,
    pub file: String,
    pub line: u32,
    pub timestamp: DateTime<Utc>,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RegistryEvent {
    /// A successful event attributed to the caller of this function.
    #[track_caller]
    pub fn new(
        action: RegistryAction,
        target: impl Into<String>,
        capability: impl Into<String>,
    ) -> Self {
        Self::at(action, target, capability, Location::caller())
    }

    /// A successful event attributed to `location`.
    pub fn at(
        action: RegistryAction,
        target: impl Into<String>,
        capability: impl Into<String>,
        location: &'static Location<'static>,
    ) -> Self {
        Self {
            action,
            target: target.into(),
            capability: capability.into(),
            file: location.file().to_string(),
            line: location.line(),
            timestamp: Utc::now(),
            success: true,
            error: None,
        }
    }

    /// Mark the event as failed with `error`.
    pub fn failed(mut self, error: impl ToString) -> Self {
        self.success = false;
        self.error = Some(error.to_string());
        self
    }
}

// ---------------------------------------------------------------------------
// RegistryAuditLog
// ---------------------------------------------------------------------------

/// Bounded, thread-safe store of [`RegistryEvent`]s.
///
/// When full, the oldest event is dropped. A capacity of `0` means
/// unbounded.
pub struct RegistryAuditLog {
    events: Mutex<VecDeque<RegistryEvent>>,
    enabled: AtomicBool,
    capacity: AtomicUsize,
}

impl RegistryAuditLog {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_AUDIT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: Mutex::new(VecDeque::new()),
            enabled: AtomicBool::new(true),
            capacity: AtomicUsize::new(capacity),
        }
    }

    /// The process-wide audit log used by registries that were not given
    /// their own.
    pub fn global() -> Arc<RegistryAuditLog> {
        Arc::clone(&GLOBAL_AUDIT_LOG)
    }

    /// Append `event` unless recording is disabled.
    pub fn record(&self, event: RegistryEvent) {
        if !self.is_enabled() {
            return;
        }
        if !event.success {
            log::debug!(
                "registry {} on {} failed: {}",
                event.action,
                event.target,
                event.error.as_deref().unwrap_or("unknown error")
            );
        }
        let capacity = self.capacity();
        let mut events = self.events.lock();
        events.push_back(event);
        if capacity > 0 {
            while events.len() > capacity {
                events.pop_front();
            }
        }
    }

    /// All retained events, oldest first.
    pub fn events(&self) -> Vec<RegistryEvent> {
        self.events.lock().iter().cloned().collect()
    }

    pub fn events_by_action(&self, action: RegistryAction) -> Vec<RegistryEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.action == action)
            .cloned()
            .collect()
    }

    /// Events with `start <= timestamp <= end`.
    pub fn events_in_range(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<RegistryEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.timestamp >= start && e.timestamp <= end)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    pub fn capacity(&self) -> usize {
        self.capacity.load(Ordering::Acquire)
    }

    /// Change the retention bound, dropping the oldest events if needed.
    pub fn set_capacity(&self, capacity: usize) {
        self.capacity.store(capacity, Ordering::Release);
        if capacity > 0 {
            let mut events = self.events.lock();
            while events.len() > capacity {
                events.pop_front();
            }
        }
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }

    /// Retained events as a pretty-printed JSON array.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.events())
    }
}

impl Default for RegistryAuditLog {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RegistryAuditLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryAuditLog")
            .field("events", &self.len())
            .field("enabled", &self.is_enabled())
            .field("capacity", &self.capacity())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn event(action: RegistryAction, target: &str) -> RegistryEvent {
        RegistryEvent::new(action, target, "dyn Test")
    }

    #[test]
    fn test_event_captures_caller_location() {
        let e = event(RegistryAction::Register, "'a'");
        assert!(e.file.ends_with("audit.rs"));
        assert!(e.line > 0);
        assert!(e.success);
        assert!(e.error.is_none());
    }

    #[test]
    fn test_failed_event() {
        let e = event(RegistryAction::Clear, "").failed("Registry is frozen, cannot clear");
        assert!(!e.success);
        assert_eq!(e.error.as_deref(), Some("Registry is frozen, cannot clear"));
    }

    #[test]
    fn test_query_by_action() {
        let log = RegistryAuditLog::new();
        log.record(event(RegistryAction::Register, "'a'"));
        log.record(event(RegistryAction::Unregister, "'a'"));
        log.record(event(RegistryAction::Register, "'b'"));

        let registers = log.events_by_action(RegistryAction::Register);
        assert_eq!(registers.len(), 2);
        assert_eq!(registers[1].target, "'b'");
        assert_eq!(log.len(), 3);
    }

    #[test]
    fn test_query_by_time_range() {
        let log = RegistryAuditLog::new();
        let before = Utc::now() - Duration::seconds(1);
        log.record(event(RegistryAction::Freeze, ""));
        let after = Utc::now() + Duration::seconds(1);

        assert_eq!(log.events_in_range(before, after).len(), 1);
        assert!(log.events_in_range(after, after + Duration::seconds(5)).is_empty());
    }

    #[test]
    fn test_disabled_log_records_nothing() {
        let log = RegistryAuditLog::new();
        log.set_enabled(false);
        log.record(event(RegistryAction::Register, "'a'"));
        assert!(log.is_empty());

        log.set_enabled(true);
        log.record(event(RegistryAction::Register, "'a'"));
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn test_capacity_drops_oldest() {
        let log = RegistryAuditLog::with_capacity(2);
        log.record(event(RegistryAction::Register, "'a'"));
        log.record(event(RegistryAction::Register, "'b'"));
        log.record(event(RegistryAction::Register, "'c'"));

        let targets: Vec<String> = log.events().into_iter().map(|e| e.target).collect();
        assert_eq!(targets, vec!["'b'", "'c'"]);

        log.set_capacity(1);
        assert_eq!(log.len(), 1);
        assert_eq!(log.events()[0].target, "'c'");
    }

    #[test]
    fn test_zero_capacity_is_unbounded() {
        let log = RegistryAuditLog::with_capacity(0);
        for i in 0..50 {
            log.record(event(RegistryAction::Register, &format!("'{}'", i)));
        }
        assert_eq!(log.len(), 50);
    }

    #[test]
    fn test_json_export() {
        let log = RegistryAuditLog::new();
        log.record(event(RegistryAction::SetDefaultFactory, "default capability"));
        let json = log.to_json().unwrap();

        let parsed: Vec<RegistryEvent> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].action, RegistryAction::SetDefaultFactory);
        assert!(json.contains("\"set_default_factory\""));
        assert!(!json.contains("\"error\""));
    }

    #[test]
    fn test_clear() {
        let log = RegistryAuditLog::new();
        log.record(event(RegistryAction::Reset, ""));
        log.clear();
        assert!(log.is_empty());
    }
}
