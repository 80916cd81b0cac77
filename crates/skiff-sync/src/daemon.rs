//! The refresh scheduler daemon.
//!
//! One loop coordinates every refresh trigger: raw watcher events feed the
//! debouncer, the debounce deadline fires a full refresh, two periodic
//! timers drive the files cadence and the remote-freshness check, and a stop
//! token terminates the loop. The loop itself never fetches: every fetch
//! runs in a blocking worker behind its category gate, so a slow git
//! invocation can never stall the next trigger.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use skiff_git::GitError;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::SyncConfig;
use crate::debounce::Debouncer;
use crate::events::EventBus;
use crate::gate::{GateSet, RefreshCategory};
use crate::watcher::{RepoWatcher, is_relevant_event};

/// The opaque "fetch a category" seam the rendering layer implements.
///
/// Implementations typically shell out to git and overwrite their cached
/// snapshot; they may block for unbounded wall-clock time and are therefore
/// always called from a blocking worker, never from the scheduler loop.
pub trait StateFetcher: Send + Sync + 'static {
    fn fetch(&self, category: RefreshCategory) -> Result<(), GitError>;

    /// Periodic remote-freshness probe. Default: nothing to probe.
    fn check_remote(&self) -> Result<(), GitError> {
        Ok(())
    }
}

/// Watches the repository and schedules gated refreshes.
///
/// The only states are Running and Stopped, and Stopped is terminal: a
/// stopped daemon cannot be restarted, a fresh one must be constructed.
pub struct SyncDaemon {
    config: SyncConfig,
    git_dir: PathBuf,
    gates: Arc<GateSet>,
    fetcher: Arc<dyn StateFetcher>,
    bus: EventBus,
    stop: CancellationToken,
    started: AtomicBool,
}

impl SyncDaemon {
    pub fn new(
        config: SyncConfig,
        repo_root: &Path,
        fetcher: Arc<dyn StateFetcher>,
        bus: EventBus,
    ) -> Self {
        Self {
            config,
            git_dir: repo_root.join(".git"),
            gates: Arc::new(GateSet::new()),
            fetcher,
            bus,
            stop: CancellationToken::new(),
            started: AtomicBool::new(false),
        }
    }

    /// Begin the watcher and scheduler loop.
    ///
    /// Only the first call does anything; later calls (including after a
    /// stop) are no-ops, so two competing loops can never exist.
    pub fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) || self.stop.is_cancelled() {
            warn!(
                event = "sync.daemon.start_ignored",
                "Daemon already started or stopped"
            );
            return;
        }

        let watcher = RepoWatcher::new(&self.git_dir);

        tokio::spawn(run_loop(
            self.config.clone(),
            self.git_dir.clone(),
            watcher,
            Arc::clone(&self.gates),
            Arc::clone(&self.fetcher),
            self.bus.clone(),
            self.stop.clone(),
        ));
    }

    /// Signal the loop to exit and tear down the watcher. Terminal.
    pub fn stop(&self) {
        info!(event = "sync.daemon.stop_requested");
        self.stop.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.is_cancelled()
    }

    /// Immediate gated fetch for one category, bypassing the cadence.
    pub fn refresh_now(&self, category: RefreshCategory) {
        spawn_fetch(&self.gates, &self.fetcher, &self.bus, category);
    }

    /// Immediate gated fetch of all categories, concurrently and
    /// independently.
    pub fn full_refresh(&self) {
        for category in RefreshCategory::ALL {
            self.refresh_now(category);
        }
    }
}

async fn run_loop(
    config: SyncConfig,
    git_dir: PathBuf,
    mut watcher: Option<RepoWatcher>,
    gates: Arc<GateSet>,
    fetcher: Arc<dyn StateFetcher>,
    bus: EventBus,
    stop: CancellationToken,
) {
    let mut debounce = Debouncer::new(config.debounce());

    // Both timers are armed for a full period up front; the immediate full
    // refresh below covers time zero.
    let mut files_tick = interval_at(
        Instant::now() + config.files_refresh(),
        config.files_refresh(),
    );
    files_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut remote_tick = interval_at(
        Instant::now() + config.remote_check(),
        config.remote_check(),
    );
    remote_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(
        event = "sync.daemon.started",
        path = %git_dir.display(),
        watching = watcher.is_some()
    );

    for category in RefreshCategory::ALL {
        spawn_fetch(&gates, &fetcher, &bus, category);
    }

    loop {
        tokio::select! {
            maybe = next_fs_event(&mut watcher) => match maybe {
                Some(Ok(fs_event)) => {
                    if is_relevant_event(&git_dir, &fs_event) {
                        debounce.record();
                    }
                }
                Some(Err(e)) => {
                    warn!(event = "sync.daemon.watch_error", error = %e);
                }
                None => {
                    warn!(
                        event = "sync.daemon.watcher_disconnected",
                        "Continuing on periodic timers only"
                    );
                    watcher = None;
                }
            },
            _ = tokio::time::sleep_until(debounce.deadline()), if debounce.is_armed() => {
                debounce.disarm();
                debug!(event = "sync.daemon.debounce_fired");
                for category in RefreshCategory::ALL {
                    spawn_fetch(&gates, &fetcher, &bus, category);
                }
            }
            // The tick completes before the worker spawns: a slow fetch
            // cannot stall the next tick.
            _ = files_tick.tick() => {
                spawn_fetch(&gates, &fetcher, &bus, RefreshCategory::Files);
            }
            _ = remote_tick.tick() => {
                spawn_remote_check(&gates, &fetcher, &bus);
            }
            _ = stop.cancelled() => break,
        }
    }

    drop(watcher);
    info!(event = "sync.daemon.stopped");
}

async fn next_fs_event(
    watcher: &mut Option<RepoWatcher>,
) -> Option<Result<notify::Event, notify::Error>> {
    match watcher {
        Some(w) => w.next().await,
        None => std::future::pending().await,
    }
}

/// Run one gated fetch in a blocking worker.
///
/// Losing the gate race drops the request outright. The worker boundary
/// converts a panicking callback into a logged event; the gate resets and
/// the category event is emitted on every path.
fn spawn_fetch(
    gates: &Arc<GateSet>,
    fetcher: &Arc<dyn StateFetcher>,
    bus: &EventBus,
    category: RefreshCategory,
) {
    let Some(guard) = gates.gate(category).try_begin() else {
        return;
    };

    let fetcher = Arc::clone(fetcher);
    let bus = bus.clone();
    tokio::spawn(async move {
        let worker = tokio::task::spawn_blocking(move || fetcher.fetch(category));
        match worker.await {
            Ok(Ok(())) => {
                debug!(
                    event = "sync.daemon.fetch_completed",
                    category = category.as_str()
                );
            }
            Ok(Err(e)) => {
                warn!(
                    event = "sync.daemon.fetch_failed",
                    category = category.as_str(),
                    error = %e
                );
            }
            Err(e) => {
                error!(
                    event = "sync.daemon.fetch_panicked",
                    category = category.as_str(),
                    error = %e
                );
            }
        }
        drop(guard);
        bus.emit(category.update_event());
    });
}

/// Run the remote-freshness probe; fresh remote state lands in branch
/// heads, so a successful probe refreshes the Branches category.
fn spawn_remote_check(gates: &Arc<GateSet>, fetcher: &Arc<dyn StateFetcher>, bus: &EventBus) {
    let gates = Arc::clone(gates);
    let fetcher = Arc::clone(fetcher);
    let bus = bus.clone();
    tokio::spawn(async move {
        let probe = tokio::task::spawn_blocking({
            let fetcher = Arc::clone(&fetcher);
            move || fetcher.check_remote()
        });
        match probe.await {
            Ok(Ok(())) => {
                spawn_fetch(&gates, &fetcher, &bus, RefreshCategory::Branches);
            }
            Ok(Err(e)) => {
                warn!(event = "sync.daemon.remote_check_failed", error = %e);
            }
            Err(e) => {
                error!(event = "sync.daemon.remote_check_panicked", error = %e);
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    struct CountingFetcher {
        branches: AtomicUsize,
        files: AtomicUsize,
        stashes: AtomicUsize,
        remote_checks: AtomicUsize,
    }

    impl CountingFetcher {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                branches: AtomicUsize::new(0),
                files: AtomicUsize::new(0),
                stashes: AtomicUsize::new(0),
                remote_checks: AtomicUsize::new(0),
            })
        }

        fn count(&self, category: RefreshCategory) -> usize {
            match category {
                RefreshCategory::Branches => self.branches.load(Ordering::SeqCst),
                RefreshCategory::Files => self.files.load(Ordering::SeqCst),
                RefreshCategory::Stashes => self.stashes.load(Ordering::SeqCst),
            }
        }

        fn total(&self) -> usize {
            RefreshCategory::ALL.iter().map(|c| self.count(*c)).sum()
        }
    }

    impl StateFetcher for CountingFetcher {
        fn fetch(&self, category: RefreshCategory) -> Result<(), GitError> {
            match category {
                RefreshCategory::Branches => self.branches.fetch_add(1, Ordering::SeqCst),
                RefreshCategory::Files => self.files.fetch_add(1, Ordering::SeqCst),
                RefreshCategory::Stashes => self.stashes.fetch_add(1, Ordering::SeqCst),
            };
            Ok(())
        }

        fn check_remote(&self) -> Result<(), GitError> {
            self.remote_checks.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn repo_fixture() -> tempfile::TempDir {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join(".git")).unwrap();
        dir
    }

    fn slow_config() -> SyncConfig {
        // Long cadences so tests only observe what they trigger.
        SyncConfig {
            debounce_ms: 100,
            files_refresh_secs: 3600,
            remote_check_secs: 3600,
            ..SyncConfig::default()
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_start_issues_initial_full_refresh() {
        let repo = repo_fixture();
        let fetcher = CountingFetcher::new();
        let (bus, mut rx) = EventBus::new(64);
        let daemon = SyncDaemon::new(slow_config(), repo.path(), fetcher.clone(), bus);

        daemon.start();
        for _ in 0..3 {
            tokio::time::timeout(Duration::from_secs(2), rx.recv())
                .await
                .expect("initial refresh event")
                .expect("bus open");
        }
        assert_eq!(fetcher.count(RefreshCategory::Branches), 1);
        assert_eq!(fetcher.count(RefreshCategory::Files), 1);
        assert_eq!(fetcher.count(RefreshCategory::Stashes), 1);

        daemon.stop();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_second_start_is_noop() {
        let repo = repo_fixture();
        let fetcher = CountingFetcher::new();
        let (bus, _rx) = EventBus::new(64);
        let daemon = SyncDaemon::new(slow_config(), repo.path(), fetcher.clone(), bus);

        daemon.start();
        daemon.start();
        tokio::time::sleep(Duration::from_millis(300)).await;

        // One loop, one initial full refresh: exactly 3 fetches, not 6.
        assert_eq!(fetcher.total(), 3);

        daemon.stop();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_debounce_coalesces_event_bursts() {
        let repo = repo_fixture();
        let fetcher = CountingFetcher::new();
        let (bus, _rx) = EventBus::new(64);
        let daemon = SyncDaemon::new(slow_config(), repo.path(), fetcher.clone(), bus);

        daemon.start();
        tokio::time::sleep(Duration::from_millis(400)).await;
        let baseline = fetcher.total();

        // A burst of qualifying writes spaced well under the 100ms debounce.
        for i in 0..5 {
            std::fs::write(repo.path().join(".git").join(format!("ref{i}")), "x").unwrap();
            tokio::time::sleep(Duration::from_millis(15)).await;
        }
        tokio::time::sleep(Duration::from_millis(600)).await;

        // One full refresh for the whole burst, not five.
        assert_eq!(fetcher.total(), baseline + 3);

        daemon.stop();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_noise_never_triggers_refresh() {
        let repo = repo_fixture();
        let fetcher = CountingFetcher::new();
        let (bus, _rx) = EventBus::new(64);
        let daemon = SyncDaemon::new(slow_config(), repo.path(), fetcher.clone(), bus);

        daemon.start();
        tokio::time::sleep(Duration::from_millis(400)).await;
        let baseline = fetcher.total();

        std::fs::write(repo.path().join(".git").join("index.lock"), "x").unwrap();
        std::fs::write(repo.path().join(".git").join("FETCH_HEAD"), "x").unwrap();
        tokio::time::sleep(Duration::from_millis(600)).await;

        assert_eq!(fetcher.total(), baseline, "noise must not reset the debounce");

        daemon.stop();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_stop_is_terminal() {
        let repo = repo_fixture();
        let fetcher = CountingFetcher::new();
        let (bus, _rx) = EventBus::new(64);
        let daemon = SyncDaemon::new(slow_config(), repo.path(), fetcher.clone(), bus);

        daemon.start();
        tokio::time::sleep(Duration::from_millis(300)).await;
        daemon.stop();
        assert!(daemon.is_stopped());
        tokio::time::sleep(Duration::from_millis(200)).await;
        let after_stop = fetcher.total();

        // Neither filesystem changes nor a restart attempt revive the loop.
        std::fs::write(repo.path().join(".git").join("HEAD"), "ref: x").unwrap();
        daemon.start();
        tokio::time::sleep(Duration::from_millis(400)).await;

        assert_eq!(fetcher.total(), after_stop);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_periodic_files_tick_keeps_firing() {
        let repo = repo_fixture();
        let fetcher = CountingFetcher::new();
        let (bus, _rx) = EventBus::new(64);
        let config = SyncConfig {
            debounce_ms: 50,
            files_refresh_secs: 1,
            remote_check_secs: 3600,
            ..SyncConfig::default()
        };
        let daemon = SyncDaemon::new(config, repo.path(), fetcher.clone(), bus);

        daemon.start();
        tokio::time::sleep(Duration::from_millis(2500)).await;

        // Initial refresh plus at least two timer ticks for Files only.
        assert!(fetcher.count(RefreshCategory::Files) >= 3);
        assert_eq!(fetcher.count(RefreshCategory::Stashes), 1);

        daemon.stop();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_remote_tick_probes_and_refreshes_branches() {
        let repo = repo_fixture();
        let fetcher = CountingFetcher::new();
        let (bus, _rx) = EventBus::new(64);
        let config = SyncConfig {
            debounce_ms: 50,
            files_refresh_secs: 3600,
            remote_check_secs: 1,
            ..SyncConfig::default()
        };
        let daemon = SyncDaemon::new(config, repo.path(), fetcher.clone(), bus);

        daemon.start();
        tokio::time::sleep(Duration::from_millis(2500)).await;

        assert!(fetcher.remote_checks.load(Ordering::SeqCst) >= 2);
        assert!(fetcher.count(RefreshCategory::Branches) >= 3);

        daemon.stop();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_refresh_now_is_gated_single_flight() {
        struct BlockingFetcher {
            calls: AtomicUsize,
            release: std::sync::Mutex<std::sync::mpsc::Receiver<()>>,
        }

        impl StateFetcher for BlockingFetcher {
            fn fetch(&self, _category: RefreshCategory) -> Result<(), GitError> {
                self.calls.fetch_add(1, Ordering::SeqCst);
                if let Ok(release) = self.release.lock() {
                    let _ = release.recv_timeout(Duration::from_secs(5));
                }
                Ok(())
            }
        }

        let repo = repo_fixture();
        let (release_tx, release_rx) = std::sync::mpsc::channel();
        let fetcher = Arc::new(BlockingFetcher {
            calls: AtomicUsize::new(0),
            release: std::sync::Mutex::new(release_rx),
        });
        let (bus, _rx) = EventBus::new(64);
        let daemon = SyncDaemon::new(slow_config(), repo.path(), fetcher.clone(), bus);

        // Not started: no initial refresh interferes.
        daemon.refresh_now(RefreshCategory::Files);
        tokio::time::sleep(Duration::from_millis(200)).await;
        daemon.refresh_now(RefreshCategory::Files);
        daemon.refresh_now(RefreshCategory::Files);
        tokio::time::sleep(Duration::from_millis(200)).await;

        // The first fetch is still in flight; the later attempts were dropped.
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);

        let _ = release_tx.send(());
        tokio::time::sleep(Duration::from_millis(300)).await;

        // After completion the gate admits a new fetch.
        daemon.refresh_now(RefreshCategory::Files);
        tokio::time::sleep(Duration::from_millis(200)).await;
        let _ = release_tx.send(());
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_panicking_fetch_does_not_kill_daemon() {
        struct PanickyFetcher {
            calls: AtomicUsize,
        }

        impl StateFetcher for PanickyFetcher {
            fn fetch(&self, category: RefreshCategory) -> Result<(), GitError> {
                self.calls.fetch_add(1, Ordering::SeqCst);
                if category == RefreshCategory::Files {
                    panic!("defective fetch callback");
                }
                Ok(())
            }
        }

        let repo = repo_fixture();
        let fetcher = Arc::new(PanickyFetcher {
            calls: AtomicUsize::new(0),
        });
        let (bus, _rx) = EventBus::new(64);
        let daemon = SyncDaemon::new(slow_config(), repo.path(), fetcher.clone(), bus);

        daemon.start();
        tokio::time::sleep(Duration::from_millis(400)).await;
        let after_initial = fetcher.calls.load(Ordering::SeqCst);
        assert_eq!(after_initial, 3);

        // The loop survived the panic and the Files gate was reset.
        daemon.refresh_now(RefreshCategory::Files);
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), after_initial + 1);

        daemon.stop();
    }
}
