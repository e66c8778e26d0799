//! File watch trigger.
//!
//! A `notify` watcher feeds raw events into a bounded channel. A single
//! consumer task owns the per-path debounce deadlines and, once a path has
//! been quiet for the debounce window, hands it to the orchestrator as a
//! `file_to_db` sync. Syncs run on the blocking pool one at a time.

use notify::event::EventKind;
use notify::{Event, RecursiveMode, Watcher};
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::DATA_DIR;
use crate::error::Result;
use crate::sync::file::TEMP_SUFFIX;
use crate::sync::orchestrator::{SyncAction, SyncDirection, SyncOrchestrator, SyncReport};

/// Default quiet window before a changed path is synced.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

/// Capacity of the channel between the OS watcher and the debouncer.
const CHANNEL_CAPACITY: usize = 1024;

/// Per-path trailing-edge debouncer.
///
/// Every push restarts the path's timer; a path is due once `delay` has
/// passed without another push.
#[derive(Debug)]
pub struct Debouncer {
    delay: Duration,
    deadlines: HashMap<PathBuf, Instant>,
}

impl Debouncer {
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            deadlines: HashMap::new(),
        }
    }

    pub fn push(&mut self, path: PathBuf, now: Instant) {
        self.deadlines.insert(path, now + self.delay);
    }

    /// Earliest pending deadline.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.deadlines.values().min().copied()
    }

    /// Remove and return every path whose deadline has passed, sorted.
    pub fn take_due(&mut self, now: Instant) -> Vec<PathBuf> {
        let mut due: Vec<PathBuf> = self
            .deadlines
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(path, _)| path.clone())
            .collect();
        for path in &due {
            self.deadlines.remove(path);
        }
        due.sort();
        due
    }

    /// Remove and return every pending path regardless of deadline.
    pub fn drain(&mut self) -> Vec<PathBuf> {
        let mut all: Vec<PathBuf> = self.deadlines.drain().map(|(path, _)| path).collect();
        all.sort();
        all
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.deadlines.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.deadlines.is_empty()
    }
}

/// Counters for one watch session.
#[derive(Debug, Clone, Default, Serialize)]
pub struct WatchStats {
    /// Raw events received from the watcher.
    pub events: usize,
    /// Event paths dropped by the ignore rules.
    pub ignored: usize,
    /// Settled paths with no registered document.
    pub unregistered: usize,
    /// Settled paths whose sync changed something.
    pub synced: usize,
    /// Settled paths that were already in sync.
    pub unchanged: usize,
    pub failed: usize,
}

/// Watches the project root and syncs registered documents on change.
#[derive(Debug)]
pub struct WatchTrigger {
    orchestrator: Arc<SyncOrchestrator>,
    root: PathBuf,
    canonical_root: Option<PathBuf>,
    delay: Duration,
}

impl WatchTrigger {
    #[must_use]
    pub fn new(orchestrator: Arc<SyncOrchestrator>) -> Self {
        let root = orchestrator.root().to_path_buf();
        let canonical_root = std::fs::canonicalize(&root).ok();
        Self {
            orchestrator,
            root,
            canonical_root,
            delay: DEFAULT_DEBOUNCE,
        }
    }

    #[must_use]
    pub const fn with_debounce(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    #[must_use]
    pub const fn debounce(&self) -> Duration {
        self.delay
    }

    /// Watch the root until `cancel` fires.
    ///
    /// # Errors
    ///
    /// Returns `Watch` if the OS watcher cannot be created or registered.
    pub async fn run(&self, cancel: CancellationToken) -> Result<WatchStats> {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);

        let mut watcher = notify::recommended_watcher(
            move |res: std::result::Result<Event, notify::Error>| match res {
                Ok(event) => {
                    // Runs on the watcher's own thread, so blocking is fine
                    if tx.blocking_send(event).is_err() {
                        debug!("Watch channel closed, dropping event");
                    }
                }
                Err(e) => warn!(error = %e, "Filesystem watcher error"),
            },
        )?;
        watcher.watch(&self.root, RecursiveMode::Recursive)?;

        info!(
            root = %self.root.display(),
            debounce_ms = u64::try_from(self.delay.as_millis()).unwrap_or(u64::MAX),
            "Watching for file changes"
        );

        let stats = self.run_with_events(rx, cancel).await;
        drop(watcher);
        Ok(stats)
    }

    /// Consume events from `rx` until it closes or `cancel` fires.
    ///
    /// When the channel closes, paths still waiting out their debounce window
    /// are synced immediately. Cancellation drops them.
    pub async fn run_with_events(
        &self,
        mut rx: mpsc::Receiver<Event>,
        cancel: CancellationToken,
    ) -> WatchStats {
        let mut debouncer = Debouncer::new(self.delay);
        let mut stats = WatchStats::default();

        loop {
            let deadline = debouncer.next_deadline();
            tokio::select! {
                biased;

                () = cancel.cancelled() => {
                    if !debouncer.is_empty() {
                        debug!(pending = debouncer.len(), "Watch cancelled with pending paths");
                    }
                    break;
                }

                received = rx.recv() => match received {
                    Some(event) => {
                        stats.events += 1;
                        let (paths, ignored) = self.relevant_paths(&event);
                        stats.ignored += ignored;
                        let now = Instant::now();
                        for path in paths {
                            debouncer.push(path, now);
                        }
                    }
                    None => {
                        for path in debouncer.drain() {
                            self.dispatch(path, &mut stats).await;
                        }
                        break;
                    }
                },

                () = sleep_until(deadline) => {
                    for path in debouncer.take_due(Instant::now()) {
                        self.dispatch(path, &mut stats).await;
                    }
                }
            }
        }

        info!(
            events = stats.events,
            synced = stats.synced,
            failed = stats.failed,
            "Watch stopped"
        );
        stats
    }

    /// Split an event's paths into ones worth syncing and a count of ignored ones.
    fn relevant_paths(&self, event: &Event) -> (Vec<PathBuf>, usize) {
        if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
            return (Vec::new(), event.paths.len());
        }

        let mut keep = Vec::new();
        let mut ignored = 0;
        for path in &event.paths {
            if self.is_ignored(path) {
                ignored += 1;
            } else {
                keep.push(path.clone());
            }
        }
        (keep, ignored)
    }

    fn is_ignored(&self, path: &Path) -> bool {
        if path.is_dir() {
            return true;
        }
        if path
            .file_name()
            .is_some_and(|n| n.to_string_lossy().ends_with(TEMP_SUFFIX))
        {
            return true;
        }
        let Some(relative) = self.relative(path) else {
            return true;
        };
        relative.split('/').any(|segment| segment == ".git" || segment == DATA_DIR)
    }

    /// Root-relative, `/`-separated form of an absolute event path.
    fn relative(&self, path: &Path) -> Option<String> {
        let stripped = path
            .strip_prefix(&self.root)
            .ok()
            .or_else(|| {
                self.canonical_root
                    .as_ref()
                    .and_then(|root| path.strip_prefix(root).ok())
            })?;

        let segments: Vec<String> = stripped
            .components()
            .filter_map(|c| match c {
                Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();
        (!segments.is_empty()).then(|| segments.join("/"))
    }

    async fn dispatch(&self, path: PathBuf, stats: &mut WatchStats) {
        let Some(relative) = self.relative(&path) else {
            stats.ignored += 1;
            return;
        };

        let orchestrator = Arc::clone(&self.orchestrator);
        let lookup = relative.clone();
        let joined = tokio::task::spawn_blocking(move || -> Result<Option<SyncReport>> {
            let Some(doc) = orchestrator.store().find_by_path(&lookup)? else {
                return Ok(None);
            };
            orchestrator
                .sync_document(&doc.id, SyncDirection::FileToDb)
                .map(Some)
        })
        .await;

        match joined {
            Ok(Ok(Some(report))) if report.action == SyncAction::None => {
                debug!(path = %relative, "Watched file already in sync");
                stats.unchanged += 1;
            }
            Ok(Ok(Some(report))) => {
                info!(
                    path = %relative,
                    document_id = %report.document_id,
                    action = report.action.as_str(),
                    "Synced watched file"
                );
                stats.synced += 1;
            }
            Ok(Ok(None)) => {
                debug!(path = %relative, "Ignoring unregistered file");
                stats.unregistered += 1;
            }
            Ok(Err(e)) => {
                warn!(path = %relative, error = %e, "Watched file sync failed");
                stats.failed += 1;
            }
            Err(e) => {
                warn!(path = %relative, error = %e, "Watched file sync task panicked");
                stats.failed += 1;
            }
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)).await,
        None => std::future::pending::<()>().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DocumentType, NewDocument, Owner};
    use crate::storage::DocumentStore;
    use notify::event::{CreateKind, DataChange, ModifyKind, RemoveKind};
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_debouncer_restarts_timer() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(Duration::from_millis(100));
        let a = PathBuf::from("/p/a.md");
        let b = PathBuf::from("/p/b.md");

        debouncer.push(a.clone(), start);
        debouncer.push(b.clone(), start + Duration::from_millis(30));
        // A second event for `a` pushes its deadline past `b`'s
        debouncer.push(a.clone(), start + Duration::from_millis(60));

        assert_eq!(debouncer.next_deadline(), Some(start + Duration::from_millis(130)));
        assert!(debouncer.take_due(start + Duration::from_millis(120)).is_empty());
        assert_eq!(debouncer.take_due(start + Duration::from_millis(140)), vec![b]);
        assert_eq!(debouncer.take_due(start + Duration::from_millis(160)), vec![a]);
        assert!(debouncer.is_empty());
        assert_eq!(debouncer.next_deadline(), None);
    }

    #[test]
    fn test_debouncer_drain() {
        let now = Instant::now();
        let mut debouncer = Debouncer::new(Duration::from_secs(60));
        debouncer.push(PathBuf::from("/p/b.md"), now);
        debouncer.push(PathBuf::from("/p/a.md"), now);
        assert_eq!(
            debouncer.drain(),
            vec![PathBuf::from("/p/a.md"), PathBuf::from("/p/b.md")]
        );
        assert!(debouncer.is_empty());
    }

    fn setup() -> (TempDir, Arc<SyncOrchestrator>) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(DocumentStore::open_memory().unwrap());
        let orchestrator = Arc::new(SyncOrchestrator::new(store, dir.path()));
        (dir, orchestrator)
    }

    fn modified(path: PathBuf) -> Event {
        Event::new(EventKind::Modify(ModifyKind::Data(DataChange::Content))).add_path(path)
    }

    #[tokio::test]
    async fn test_settled_edit_is_pulled_into_database() {
        let (dir, orch) = setup();
        let rel = "docs/guides/tutorial/intro.md";
        let doc = orch
            .store()
            .create(
                NewDocument::new(Owner::Project(1), rel, DocumentType::Tutorial)
                    .with_content("v1"),
            )
            .unwrap();
        orch.sync_document(&doc.id, SyncDirection::DbToFile).unwrap();

        let abs = dir.path().join(rel);
        fs::write(&abs, "v2 from editor").unwrap();
        let stray = dir.path().join("notes/scratch.md");
        fs::create_dir_all(stray.parent().unwrap()).unwrap();
        fs::write(&stray, "unregistered").unwrap();

        let (tx, rx) = mpsc::channel(16);
        tx.send(modified(abs.clone())).await.unwrap();
        tx.send(modified(abs.clone())).await.unwrap();
        tx.send(Event::new(EventKind::Create(CreateKind::File)).add_path(stray))
            .await
            .unwrap();
        tx.send(modified(dir.path().join(".git/index"))).await.unwrap();
        tx.send(modified(dir.path().join("docs/guides/tutorial/.intro.md.docsync-tmp")))
            .await
            .unwrap();
        tx.send(Event::new(EventKind::Remove(RemoveKind::File)).add_path(abs))
            .await
            .unwrap();
        drop(tx);

        let trigger = WatchTrigger::new(Arc::clone(&orch)).with_debounce(Duration::from_millis(10));
        let stats = trigger.run_with_events(rx, CancellationToken::new()).await;

        assert_eq!(stats.events, 6);
        assert_eq!(stats.ignored, 3);
        // Two events for the same path collapse into one sync
        assert_eq!(stats.synced, 1);
        assert_eq!(stats.unregistered, 1);
        assert_eq!(stats.failed, 0);

        let after = orch.store().read(&doc.id).unwrap();
        assert_eq!(after.content.as_deref(), Some("v2 from editor"));
    }

    #[tokio::test]
    async fn test_debounce_window_elapses_while_channel_open() {
        let (dir, orch) = setup();
        let rel = "docs/guides/tutorial/intro.md";
        let doc = orch
            .store()
            .create(NewDocument::new(Owner::Project(1), rel, DocumentType::Tutorial))
            .unwrap();
        let abs = dir.path().join(rel);
        fs::create_dir_all(abs.parent().unwrap()).unwrap();
        fs::write(&abs, "appeared").unwrap();

        let (tx, rx) = mpsc::channel(16);
        let trigger = WatchTrigger::new(Arc::clone(&orch)).with_debounce(Duration::from_millis(20));
        let cancel = CancellationToken::new();
        let runner = {
            let cancel = cancel.clone();
            tokio::spawn(async move { trigger.run_with_events(rx, cancel).await })
        };

        tx.send(modified(abs)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;
        cancel.cancel();
        let stats = runner.await.unwrap();

        assert_eq!(stats.synced, 1);
        assert_eq!(
            orch.store().read(&doc.id).unwrap().content.as_deref(),
            Some("appeared")
        );
    }

    #[tokio::test]
    async fn test_cancel_drops_pending_paths() {
        let (dir, orch) = setup();
        let (tx, rx) = mpsc::channel(16);
        tx.send(modified(dir.path().join("docs/guides/tutorial/x.md")))
            .await
            .unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let stats = WatchTrigger::new(orch)
            .run_with_events(rx, cancel)
            .await;
        assert_eq!(stats.events, 0);
        assert_eq!(stats.synced + stats.unregistered, 0);
    }
}
