//! Parse cache and scheduler.
//!
//! Owns the per-document parse state and runs parses on tokio's blocking
//! pool. Every document is in exactly one of two states:
//!
//! ```text
//!             request / edit                  store
//!  (absent) ─────────────────► Pending ─────────────────► Ready
//!                               ▲   │ edit while pending     │
//!                               │   └─► dirty: reparse       │ request / edit
//!                               └────────────────────────────┘
//! ```
//!
//! Both states live in one `DashMap` entry, so "is a parse in flight" and
//! "is there a cached outcome" are always read and replaced together. A query
//! racing a completing parse sees either the pending task (and waits for it)
//! or the stored outcome, never neither.
//!
//! # Revisions
//!
//! Each parse task gets a revision from a session-wide counter. An outcome is
//! only stored if it is newer than what the entry holds, so a parse that
//! finishes after its document was closed (or re-opened) cannot overwrite
//! fresher results.

use crate::config::JmlConfig;
use crate::publisher::DiagnosticsPublisher;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry as MapEntry;
use jml_core::{FileIdentity, JmlError, ParseOutcome, ParserAdapter, Problem, Result};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;
use tokio::sync::{Semaphore, watch};
use tokio::task::AbortHandle;
use tower_lsp_server::ls_types::Uri;

/// A stored parse outcome and the revision that produced it.
#[derive(Debug, Clone)]
pub struct ParseSnapshot {
    pub revision: u64,
    pub outcome: Arc<ParseOutcome>,
}

/// Awaitable handle to an in-flight parse.
///
/// Several handles may refer to the same task; they all complete when the
/// task is done with its entry: its outcome was stored, discarded as stale, or
/// superseded by a reparse of newer text. Use [`ParseCache::snapshot`] to wait
/// for the outcome of the latest text.
#[derive(Debug, Clone)]
pub struct ParseHandle {
    id: FileIdentity,
    revision: u64,
    done: watch::Receiver<bool>,
}

impl ParseHandle {
    /// Handle for an outcome that is already stored.
    fn completed(id: FileIdentity, revision: u64) -> Self {
        let (_, done) = watch::channel(true);
        Self { id, revision, done }
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Waits until the task has finished with its entry.
    ///
    /// # Errors
    ///
    /// Returns [`JmlError::TaskAbandoned`] if the task was dropped without
    /// finishing (server shutdown).
    pub async fn wait(mut self) -> Result<()> {
        let finished = self.done.wait_for(|done| *done).await.is_ok();
        if finished {
            Ok(())
        } else {
            Err(JmlError::TaskAbandoned {
                path: self.id.to_string(),
            })
        }
    }
}

struct PendingParse {
    revision: u64,
    done: watch::Receiver<bool>,
    /// The document changed after this parse was scheduled.
    dirty: bool,
    /// The document was closed; the outcome is dropped and so is the entry.
    closed: bool,
    task: AbortHandle,
}

impl PendingParse {
    fn handle(&self, id: &FileIdentity) -> ParseHandle {
        ParseHandle {
            id: id.clone(),
            revision: self.revision,
            done: self.done.clone(),
        }
    }
}

enum CacheEntry {
    Pending(PendingParse),
    Ready(ParseSnapshot),
}

enum Lookup {
    Ready(ParseSnapshot),
    InFlight(ParseHandle),
}

enum Stored {
    Accepted,
    /// The document was closed while it was parsed.
    Evicted,
    /// Replaced by a reparse of newer text.
    Superseded,
    Rejected,
}

/// A document open in the editor.
#[derive(Clone)]
struct OpenDocument {
    /// URI the client opened the document under; diagnostics are pushed here.
    uri: Uri,
    text: Arc<str>,
}

/// Per-session parse cache. Cheap to clone.
#[derive(Clone)]
pub struct ParseCache {
    inner: Arc<CacheInner>,
}

struct CacheInner {
    adapter: Arc<ParserAdapter>,
    publisher: Arc<DiagnosticsPublisher>,
    entries: DashMap<FileIdentity, CacheEntry>,
    documents: DashMap<FileIdentity, OpenDocument>,
    permits: Arc<Semaphore>,
    next_revision: AtomicU64,
    accepting: AtomicBool,
    evict_on_close: bool,
}

impl ParseCache {
    pub fn new(
        adapter: Arc<ParserAdapter>,
        publisher: Arc<DiagnosticsPublisher>,
        config: &JmlConfig,
    ) -> Self {
        let workers = config.parallelism();
        tracing::debug!("parse cache using {} worker(s)", workers);

        Self {
            inner: Arc::new(CacheInner {
                adapter,
                publisher,
                entries: DashMap::new(),
                documents: DashMap::new(),
                permits: Arc::new(Semaphore::new(workers)),
                next_revision: AtomicU64::new(0),
                accepting: AtomicBool::new(true),
                evict_on_close: config.evict_on_close,
            }),
        }
    }

    /// Schedules a parse of `id` without waiting for it.
    ///
    /// If a parse of `id` is already running the returned handle is attached
    /// to it; no second parse is started.
    ///
    /// # Errors
    ///
    /// Returns [`JmlError::SchedulerShutdown`] after [`ParseCache::shutdown`].
    pub fn request_parse(&self, id: &FileIdentity) -> Result<ParseHandle> {
        self.inner.attach_or_start(id)
    }

    /// Current outcome for `id`, parsing it first if nothing is cached.
    ///
    /// Waits for an in-flight parse of `id` (including a reparse queued by an
    /// edit) before answering. Never waits on other documents.
    ///
    /// # Errors
    ///
    /// Only scheduling failures: [`JmlError::SchedulerShutdown`] or
    /// [`JmlError::TaskAbandoned`]. Unparseable documents are reported in the
    /// outcome.
    pub async fn snapshot(&self, id: &FileIdentity) -> Result<ParseSnapshot> {
        loop {
            match self.inner.lookup_or_start(id)? {
                Lookup::Ready(snapshot) => return Ok(snapshot),
                Lookup::InFlight(handle) => handle.wait().await?,
            }
        }
    }

    /// Problems of the current outcome for `id`; empty if it parsed.
    pub async fn get_diagnostics(&self, id: &FileIdentity) -> Result<Vec<Problem>> {
        let snapshot = self.snapshot(id).await?;
        Ok(snapshot.outcome.problems().to_vec())
    }

    /// Records the editor's text for `id`, opened as `uri`, and reparses it.
    ///
    /// Text identical to what is already open does not start a parse: the
    /// handle refers to the running parse, or is already complete when the
    /// cached outcome is current. Changed text that lands while `id` is being
    /// parsed marks that parse dirty; a follow-up parse replaces it as soon as
    /// it finishes, and the returned handle completes at that point.
    pub fn update_document(
        &self,
        id: FileIdentity,
        uri: Uri,
        text: String,
    ) -> Result<ParseHandle> {
        let text: Arc<str> = Arc::from(text);
        let previous = self.inner.documents.insert(
            id.clone(),
            OpenDocument {
                uri,
                text: Arc::clone(&text),
            },
        );
        let unchanged = previous.is_some_and(|doc| doc.text == text);

        if let Some(mut entry) = self.inner.entries.get_mut(&id) {
            match &mut *entry {
                CacheEntry::Pending(pending) => {
                    pending.closed = false;
                    if unchanged {
                        tracing::debug!("{} reopened unchanged during parse", id);
                    } else {
                        tracing::debug!(
                            "{} changed during parse (revision {})",
                            id,
                            pending.revision
                        );
                        pending.dirty = true;
                    }
                    return Ok(pending.handle(&id));
                }
                CacheEntry::Ready(snapshot) if unchanged => {
                    tracing::debug!("{} unchanged, keeping revision {}", id, snapshot.revision);
                    return Ok(ParseHandle::completed(id.clone(), snapshot.revision));
                }
                CacheEntry::Ready(_) => {}
            }
        }

        self.request_parse(&id)
    }

    pub fn is_open(&self, id: &FileIdentity) -> bool {
        self.inner.documents.contains_key(id)
    }

    /// Forgets the editor's text for `id`, and its cached outcome when
    /// eviction on close is enabled.
    ///
    /// A parse still running for `id` keeps its entry until it finishes, so a
    /// reopen attaches to it instead of starting a second parse of the same
    /// file. Its outcome is dropped unless the document was reopened.
    pub fn close_document(&self, id: &FileIdentity) {
        self.inner.documents.remove(id);
        if !self.inner.evict_on_close {
            return;
        }

        let removed = self.inner.entries.remove_if_mut(id, |_, entry| match entry {
            CacheEntry::Pending(pending) => {
                pending.closed = true;
                pending.dirty = false;
                false
            }
            CacheEntry::Ready(_) => true,
        });
        if removed.is_some() {
            tracing::debug!("evicted {}", id);
        }
    }

    pub fn is_in_flight(&self, id: &FileIdentity) -> bool {
        self.inner
            .entries
            .get(id)
            .is_some_and(|entry| matches!(*entry, CacheEntry::Pending(_)))
    }

    /// Cached outcome for `id`, without scheduling or waiting.
    pub fn cached(&self, id: &FileIdentity) -> Option<ParseSnapshot> {
        self.inner.entries.get(id).and_then(|entry| match &*entry {
            CacheEntry::Ready(snapshot) => Some(snapshot.clone()),
            CacheEntry::Pending(_) => None,
        })
    }

    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    /// Stops accepting parses and abandons the ones in flight.
    ///
    /// Returns without waiting for running parsers; their results are
    /// discarded. Cached outcomes stay readable.
    pub fn shutdown(&self) {
        if !self.inner.accepting.swap(false, Ordering::AcqRel) {
            return;
        }
        self.inner.permits.close();

        let mut abandoned = 0;
        self.inner.entries.retain(|_, entry| match entry {
            CacheEntry::Pending(pending) => {
                pending.task.abort();
                abandoned += 1;
                false
            }
            CacheEntry::Ready(_) => true,
        });

        tracing::info!("parse scheduler stopped ({} parse(s) abandoned)", abandoned);
    }
}

impl CacheInner {
    /// Handle to the running parse of `id`, starting one if there is none.
    fn attach_or_start(self: &Arc<Self>, id: &FileIdentity) -> Result<ParseHandle> {
        match self.entries.entry(id.clone()) {
            MapEntry::Occupied(mut occupied) => {
                if let CacheEntry::Pending(pending) = occupied.get() {
                    return Ok(pending.handle(id));
                }
                let pending = self.start(id)?;
                let handle = pending.handle(id);
                occupied.insert(CacheEntry::Pending(pending));
                Ok(handle)
            }
            MapEntry::Vacant(vacant) => {
                let pending = self.start(id)?;
                let handle = pending.handle(id);
                vacant.insert(CacheEntry::Pending(pending));
                Ok(handle)
            }
        }
    }

    /// Cached outcome of `id`, or a handle to the parse that will produce it.
    fn lookup_or_start(self: &Arc<Self>, id: &FileIdentity) -> Result<Lookup> {
        match self.entries.entry(id.clone()) {
            MapEntry::Occupied(occupied) => Ok(match occupied.get() {
                CacheEntry::Pending(pending) => Lookup::InFlight(pending.handle(id)),
                CacheEntry::Ready(snapshot) => Lookup::Ready(snapshot.clone()),
            }),
            MapEntry::Vacant(vacant) => {
                let pending = self.start(id)?;
                let handle = pending.handle(id);
                vacant.insert(CacheEntry::Pending(pending));
                Ok(Lookup::InFlight(handle))
            }
        }
    }

    fn start(self: &Arc<Self>, id: &FileIdentity) -> Result<PendingParse> {
        if !self.accepting.load(Ordering::Acquire) {
            return Err(JmlError::SchedulerShutdown);
        }

        let revision = self.next_revision.fetch_add(1, Ordering::Relaxed) + 1;
        let (done_tx, done_rx) = watch::channel(false);
        tracing::debug!("scheduling parse of {} (revision {})", id, revision);

        let inner = Arc::clone(self);
        let task_id = id.clone();
        let task = tokio::spawn(async move {
            inner.run(task_id, revision, done_tx).await;
        });

        Ok(PendingParse {
            revision,
            done: done_rx,
            dirty: false,
            closed: false,
            task: task.abort_handle(),
        })
    }

    async fn run(self: Arc<Self>, id: FileIdentity, revision: u64, done: watch::Sender<bool>) {
        let Ok(permit) = Arc::clone(&self.permits).acquire_owned().await else {
            tracing::debug!("scheduler stopped before {} was parsed", id);
            self.discard_pending(&id, revision);
            return;
        };

        // edits after this point mark the entry dirty
        let document = self.documents.get(&id).map(|doc| doc.value().clone());
        let (uri, text) = match document {
            Some(doc) => (Some(doc.uri), Some(doc.text)),
            None => (None, None),
        };
        let adapter = Arc::clone(&self.adapter);
        let parse_id = id.clone();
        let started = Instant::now();

        let outcome = match tokio::task::spawn_blocking(move || {
            let _permit = permit;
            adapter.parse(&parse_id, text.as_deref())
        })
        .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!("parse worker for {} failed: {}", id, e);
                ParseOutcome::failure(Problem::unlocated(format!("parse worker failed: {e}")))
            }
        };

        tracing::debug!(
            "parsed {} (revision {}) in {:?}: {} problem(s)",
            id,
            revision,
            started.elapsed(),
            outcome.problems().len()
        );

        let outcome = Arc::new(outcome);
        let stored = self.store(&id, revision, Arc::clone(&outcome));
        done.send_replace(true);

        match stored {
            Stored::Accepted => self.publisher.publish(&id, uri, &outcome).await,
            Stored::Evicted => {
                tracing::debug!("{} was closed while parsing, dropping outcome", id);
            }
            Stored::Superseded => {
                tracing::debug!("{} changed while parsing, reparsing", id);
            }
            Stored::Rejected => {
                tracing::debug!("discarding stale parse of {} (revision {})", id, revision);
            }
        }
    }

    /// Installs `outcome` if it is newer than what the entry holds.
    ///
    /// If the document was edited while it was parsed, the entry moves
    /// straight to a new pending parse instead, so waiters never observe the
    /// outdated outcome.
    fn store(
        self: &Arc<Self>,
        id: &FileIdentity,
        revision: u64,
        outcome: Arc<ParseOutcome>,
    ) -> Stored {
        let Some(mut entry) = self.entries.get_mut(id) else {
            return Stored::Rejected;
        };

        let (closed, dirty) = match &*entry {
            CacheEntry::Pending(pending) if pending.revision == revision => {
                (pending.closed, pending.dirty)
            }
            CacheEntry::Pending(_) => return Stored::Rejected,
            CacheEntry::Ready(snapshot) if snapshot.revision < revision => (false, false),
            CacheEntry::Ready(_) => return Stored::Rejected,
        };

        if closed {
            drop(entry);
            self.discard_pending(id, revision);
            return Stored::Evicted;
        }

        if dirty {
            match self.start(id) {
                Ok(next) => {
                    *entry = CacheEntry::Pending(next);
                    return Stored::Superseded;
                }
                Err(e) => tracing::debug!("cannot reparse {}: {}", id, e),
            }
        }

        *entry = CacheEntry::Ready(ParseSnapshot { revision, outcome });
        Stored::Accepted
    }

    fn discard_pending(&self, id: &FileIdentity, revision: u64) {
        self.entries.remove_if(id, |_, entry| {
            matches!(entry, CacheEntry::Pending(pending) if pending.revision == revision)
        });
    }
}
