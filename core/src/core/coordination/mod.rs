//! Coordination of one shared metadata database across execution contexts.
//!
//! A [`DatabaseHub`] owns the single redb handle for a database file. Every context
//! (background worker, options page, side panel, popup) gets its own [`Connection`] and
//! calls [`Connection::ensure_open`] before touching the stores.
//!
//! Opening at a newer schema version than the one on disk is an upgrade. The hub sends a
//! version-change notice to every connection still open at an older version; those
//! connections close themselves, and only then does the upgrade run and the new
//! connection open. A connection that refuses to close leaves the upgrade blocked: the
//! condition is logged and reported, never forced, and the open fails after the
//! configured timeout so the next `ensure_open` can retry.

use crate::core::db::error::DatabaseError;
use crate::core::db::schema;
use crate::types::CoordinationConfig;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// The kinds of execution contexts that share the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextKind {
    Background,
    Options,
    SidePanel,
    Popup,
    /// Injected into a web page; has no binary storage capability.
    Capture,
}

impl ContextKind {
    pub fn supports_blob_storage(self) -> bool {
        !matches!(self, ContextKind::Capture)
    }
}

impl fmt::Display for ContextKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextKind::Background => write!(f, "background"),
            ContextKind::Options => write!(f, "options"),
            ContextKind::SidePanel => write!(f, "side-panel"),
            ContextKind::Popup => write!(f, "popup"),
            ContextKind::Capture => write!(f, "capture"),
        }
    }
}

/// Observable lifecycle of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Closed,
    Opening,
    Open,
    Closing,
}

/// Notifications delivered to a connection's subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// Another context wants to upgrade from `old_version` to `new_version`.
    VersionChange { old_version: u32, new_version: u32 },
    /// This connection's open is waiting on connections that have not closed.
    Blocked { waiting_on: usize },
    Opened { version: u32 },
    Closed,
}

#[derive(Debug, Clone, Copy)]
pub struct OpenOptions {
    pub blocked_after: Duration,
    pub open_timeout: Duration,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self::from(&CoordinationConfig::default())
    }
}

impl From<&CoordinationConfig> for OpenOptions {
    fn from(config: &CoordinationConfig) -> Self {
        Self {
            blocked_after: Duration::from_millis(config.blocked_after_ms),
            open_timeout: Duration::from_millis(config.open_timeout_ms),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Owner of the shared database handle for one file.
#[derive(Clone)]
pub struct DatabaseHub {
    shared: Arc<Shared>,
}

struct Shared {
    path: PathBuf,
    options: OpenOptions,
    state: Mutex<HubState>,
    changed: Condvar,
}

#[derive(Default)]
struct HubState {
    db: Option<Arc<redb::Database>>,
    version: u32,
    upgrading: bool,
    next_id: u64,
    registrations: HashMap<u64, Registration>,
}

struct Registration {
    version: u32,
    context: ContextKind,
    connection: Weak<ConnectionInner>,
}

impl HubState {
    fn live_older_than(&self, version: u32) -> usize {
        self.registrations
            .values()
            .filter(|r| r.version < version && r.connection.strong_count() > 0)
            .count()
    }
}

impl DatabaseHub {
    pub fn new(path: impl Into<PathBuf>, options: OpenOptions) -> Self {
        Self {
            shared: Arc::new(Shared {
                path: path.into(),
                options,
                state: Mutex::new(HubState::default()),
                changed: Condvar::new(),
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.shared.path
    }

    /// Creates a closed connection for `context` at schema `version`.
    pub fn connect(&self, context: ContextKind, version: u32) -> Connection {
        Connection {
            inner: Arc::new(ConnectionInner {
                hub: self.clone(),
                context,
                version,
                slot: Mutex::new(Slot::Closed),
                changed: Condvar::new(),
                release_on_version_change: AtomicBool::new(true),
                subscribers: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Schema version of the file, 0 until the first connection opens it.
    pub fn current_version(&self) -> u32 {
        lock(&self.shared.state).version
    }

    /// Number of connections currently registered as open.
    pub fn open_connections(&self) -> usize {
        let state = lock(&self.shared.state);
        state
            .registrations
            .values()
            .filter(|r| r.connection.strong_count() > 0)
            .count()
    }

    fn open(
        &self,
        connection: &Arc<ConnectionInner>,
    ) -> Result<(u64, Arc<redb::Database>), DatabaseError> {
        let shared = &self.shared;
        let requested = connection.version;

        let mut state = lock(&shared.state);
        while state.upgrading {
            state = shared
                .changed
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }

        let db = match &state.db {
            Some(db) => db.clone(),
            None => {
                let db = Arc::new(schema::open(&shared.path)?);
                state.version = schema::stored_version(&db)?;
                state.db = Some(db.clone());
                db
            }
        };

        let current = state.version;
        if requested < current {
            return Err(DatabaseError::VersionTooLow { requested, current });
        }

        if requested > current {
            state.upgrading = true;
            let stale: Vec<Arc<ConnectionInner>> = state
                .registrations
                .values()
                .filter(|r| r.version < requested)
                .filter_map(|r| r.connection.upgrade())
                .collect();
            drop(state);

            for other in &stale {
                other.version_change(current, requested);
            }
            drop(stale);

            state = lock(&shared.state);
            let started = Instant::now();
            let mut reported = false;

            loop {
                let waiting_on = state.live_older_than(requested);
                if waiting_on == 0 {
                    break;
                }

                let elapsed = started.elapsed();
                if elapsed >= shared.options.open_timeout {
                    state.upgrading = false;
                    shared.changed.notify_all();
                    warn!(
                        context = %connection.context,
                        requested,
                        current,
                        waiting_on,
                        "upgrade still blocked by open connections; giving up this attempt"
                    );
                    return Err(DatabaseError::Blocked {
                        requested,
                        current,
                        waiting_on,
                    });
                }

                if !reported && elapsed >= shared.options.blocked_after {
                    reported = true;
                    warn!(
                        context = %connection.context,
                        requested,
                        current,
                        waiting_on,
                        "upgrade blocked by another open connection; close other pages to proceed"
                    );
                    connection.emit(ConnectionEvent::Blocked { waiting_on });
                }

                let deadline = if reported {
                    shared.options.open_timeout
                } else {
                    shared.options.blocked_after
                };
                let wait_for = deadline.saturating_sub(elapsed);
                state = shared
                    .changed
                    .wait_timeout(state, wait_for)
                    .unwrap_or_else(PoisonError::into_inner)
                    .0;
            }

            if let Err(e) = schema::upgrade(&db, current, requested) {
                state.upgrading = false;
                shared.changed.notify_all();
                return Err(e);
            }
            state.version = requested;
            state.upgrading = false;
        }

        let id = state.next_id;
        state.next_id += 1;
        state.registrations.insert(
            id,
            Registration {
                version: requested,
                context: connection.context,
                connection: Arc::downgrade(connection),
            },
        );
        shared.changed.notify_all();

        debug!(context = %connection.context, version = requested, id, "connection opened");
        Ok((id, db))
    }

    fn release(&self, id: u64) {
        let mut state = lock(&self.shared.state);
        if let Some(registration) = state.registrations.remove(&id) {
            debug!(context = %registration.context, id, "connection released");
        }
        self.shared.changed.notify_all();
    }
}

enum Slot {
    Closed,
    Opening,
    Open { id: u64, db: Arc<redb::Database> },
    Closing,
}

struct ConnectionInner {
    hub: DatabaseHub,
    context: ContextKind,
    version: u32,
    slot: Mutex<Slot>,
    changed: Condvar,
    release_on_version_change: AtomicBool,
    subscribers: Mutex<Vec<Sender<ConnectionEvent>>>,
}

impl ConnectionInner {
    fn emit(&self, event: ConnectionEvent) {
        lock(&self.subscribers).retain(|tx| tx.send(event.clone()).is_ok());
    }

    fn version_change(&self, old_version: u32, new_version: u32) {
        self.emit(ConnectionEvent::VersionChange {
            old_version,
            new_version,
        });

        if self.release_on_version_change.load(Ordering::SeqCst) {
            warn!(
                context = %self.context,
                old_version,
                new_version,
                "version change detected; closing connection to allow upgrade"
            );
            self.close();
        } else {
            warn!(
                context = %self.context,
                old_version,
                new_version,
                "version change detected but connection is held open"
            );
        }
    }

    fn close(&self) {
        let id = {
            let mut slot = lock(&self.slot);
            match std::mem::replace(&mut *slot, Slot::Closing) {
                Slot::Open { id, db } => {
                    drop(db);
                    id
                }
                other => {
                    *slot = other;
                    return;
                }
            }
        };

        self.hub.release(id);

        *lock(&self.slot) = Slot::Closed;
        self.changed.notify_all();
        self.emit(ConnectionEvent::Closed);
    }
}

impl Drop for ConnectionInner {
    fn drop(&mut self) {
        let open_id = match self.slot.get_mut().unwrap_or_else(PoisonError::into_inner) {
            Slot::Open { id, .. } => Some(*id),
            _ => None,
        };
        if let Some(id) = open_id {
            self.hub.release(id);
        }
    }
}

/// One context's handle onto the shared database. Clones share the same handle.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

impl Connection {
    pub fn context(&self) -> ContextKind {
        self.inner.context
    }

    pub fn version(&self) -> u32 {
        self.inner.version
    }

    pub fn state(&self) -> ConnectionState {
        match *lock(&self.inner.slot) {
            Slot::Closed => ConnectionState::Closed,
            Slot::Opening => ConnectionState::Opening,
            Slot::Open { .. } => ConnectionState::Open,
            Slot::Closing => ConnectionState::Closing,
        }
    }

    /// Opens the connection unless it already is. Concurrent callers share one open attempt.
    ///
    /// A failed attempt leaves the connection closed; the next call retries.
    pub fn ensure_open(&self) -> Result<(), DatabaseError> {
        let inner = &self.inner;

        {
            let mut slot = lock(&inner.slot);
            loop {
                match *slot {
                    Slot::Open { .. } => return Ok(()),
                    Slot::Opening | Slot::Closing => {
                        slot = inner
                            .changed
                            .wait(slot)
                            .unwrap_or_else(PoisonError::into_inner);
                    }
                    Slot::Closed => {
                        *slot = Slot::Opening;
                        break;
                    }
                }
            }
        }

        let result = inner.hub.open(inner);

        let outcome = {
            let mut slot = lock(&inner.slot);
            match result {
                Ok((id, db)) => {
                    *slot = Slot::Open { id, db };
                    Ok(())
                }
                Err(e) => {
                    *slot = Slot::Closed;
                    Err(e)
                }
            }
        };
        inner.changed.notify_all();

        match &outcome {
            Ok(()) => {
                info!(context = %inner.context, version = inner.version, "database open");
                inner.emit(ConnectionEvent::Opened {
                    version: inner.version,
                });
            }
            Err(e) => warn!(context = %inner.context, error = %e, "database open failed"),
        }
        outcome
    }

    /// Returns the live handle, or `Closed` if the connection is not open.
    pub fn handle(&self) -> Result<Arc<redb::Database>, DatabaseError> {
        match &*lock(&self.inner.slot) {
            Slot::Open { db, .. } => Ok(db.clone()),
            _ => Err(DatabaseError::Closed),
        }
    }

    pub fn close(&self) {
        self.inner.close();
    }

    /// Whether a version-change notice closes this connection. Defaults to `true`.
    pub fn set_release_on_version_change(&self, release: bool) {
        self.inner
            .release_on_version_change
            .store(release, Ordering::SeqCst);
    }

    pub fn subscribe(&self) -> Receiver<ConnectionEvent> {
        let (tx, rx) = mpsc::channel();
        lock(&self.inner.subscribers).push(tx);
        rx
    }
}
