//! Session registry partitioned by execution context and base URL.
//!
//! Each (context, base URL) pair owns exactly one [`SessionEntry`] holding
//! the credentials and headers cached for that backend. Entries are created
//! lazily on first client construction and live for the registry's lifetime.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};

/// Identifier for a unit of concurrent execution (thread, task, worker).
///
/// Clients constructed with the same `ContextId` against the same base URL
/// share one session; distinct contexts are fully isolated from each other.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContextId(Arc<str>);

impl ContextId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into().into())
    }

    /// Derive a context identifier from the calling thread.
    pub fn current_thread() -> Self {
        Self::new(format!("{:?}", std::thread::current().id()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Credential and header state cached for one (context, base URL) pair.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    pub username: Option<String>,
    pub password: Option<String>,
    pub domain: Option<String>,
    pub headers: HashMap<String, String>,
    pub last_authenticated: Option<DateTime<Utc>>,
}

/// One cached session, shared by every client handle for its pair.
///
/// All mutation goes through the internal mutex so concurrent authenticate,
/// domain/tenant updates, and header-merge-then-send never race.
#[derive(Debug, Default)]
pub struct SessionEntry {
    state: Mutex<SessionState>,
}

impl SessionEntry {
    /// Run `f` with exclusive access to the session state.
    pub fn with_state<R>(&self, f: impl FnOnce(&mut SessionState) -> R) -> R {
        let mut state = self.state.lock().expect("session state poisoned");
        f(&mut state)
    }

    /// Snapshot of the current headers.
    pub fn headers(&self) -> HashMap<String, String> {
        self.with_state(|s| s.headers.clone())
    }

    /// Stored username, password, and domain.
    pub fn credentials(&self) -> (Option<String>, Option<String>, Option<String>) {
        self.with_state(|s| (s.username.clone(), s.password.clone(), s.domain.clone()))
    }

    pub fn set_header(&self, name: &str, value: &str) {
        self.with_state(|s| {
            s.headers.insert(name.to_string(), value.to_string());
        });
    }

    /// Record a successful login.
    pub fn mark_authenticated(&self) {
        self.with_state(|s| s.last_authenticated = Some(Utc::now()));
    }

    /// Whether the last successful login is older than `max_age`.
    /// A session that never authenticated is always stale.
    pub fn is_stale(&self, max_age: Duration) -> bool {
        self.with_state(|s| match s.last_authenticated {
            Some(at) => Utc::now() > at + max_age,
            None => true,
        })
    }
}

/// Registry of sessions, partitioned by [`ContextId`] and base URL.
///
/// Passed by reference (`Arc`) into every client constructor instead of
/// living in ambient global state, so the partition key stays explicit
/// and testable. Entries are never evicted.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    slots: Mutex<HashMap<ContextId, HashMap<String, Arc<SessionEntry>>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up or create the entry for `(context, base_url)`.
    ///
    /// Returns the shared entry and whether this call created it. Lookup
    /// and creation happen under one lock, so at most one entry ever
    /// exists per pair.
    pub fn entry(&self, context: &ContextId, base_url: &str) -> (Arc<SessionEntry>, bool) {
        let mut slots = self.slots.lock().expect("session registry poisoned");
        let slot = slots.entry(context.clone()).or_default();
        match slot.get(base_url) {
            Some(entry) => (Arc::clone(entry), false),
            None => {
                let entry = Arc::new(SessionEntry::default());
                slot.insert(base_url.to_string(), Arc::clone(&entry));
                (entry, true)
            }
        }
    }

    /// Entry for `(context, base_url)` if one exists.
    pub fn get(&self, context: &ContextId, base_url: &str) -> Option<Arc<SessionEntry>> {
        let slots = self.slots.lock().expect("session registry poisoned");
        slots.get(context).and_then(|slot| slot.get(base_url)).map(Arc::clone)
    }

    /// Total number of cached sessions across all contexts.
    pub fn len(&self) -> usize {
        let slots = self.slots.lock().expect("session registry poisoned");
        slots.values().map(|slot| slot.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
