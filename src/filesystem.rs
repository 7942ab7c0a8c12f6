//! Owner of the two Indexes and the auto-refresh scheduler.
//!
//! `Default` covers the configured home subtree on a fast cadence, `Extended`
//! the rest of the filesystem on a slow one. A refresh crawls into a fresh
//! snapshot and installs it with a single pointer swap; searches that started
//! on the old snapshot keep reading it untouched. The Default crawl feeds
//! newly discovered excluded-from-default directories to Extended through a
//! promote queue drained here, never by direct mutation from the crawler.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::unbounded;

use crate::config::{Config, DirsRules};
use crate::crawler::{crawl, CrawlRules};
use crate::index::{Index, Snapshot};
use crate::{perf_log, AppResult};

/// Which Index a forced refresh covers. `Both` runs Default first so newly
/// promoted roots are visible to the Extended crawl.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshScope {
    Default,
    Both,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    Default,
    Extended,
}

#[derive(Debug)]
pub struct Filesystem {
    pub default_dirs: Arc<Index>,
    pub extended_dirs: Arc<Index>,
    config: Config,
    default_refreshing: AtomicBool,
    extended_refreshing: AtomicBool,
}

impl Filesystem {
    /// Build both Indexes from config, run the initial refreshes (Default
    /// first, so promoted roots reach Extended), then start the scheduler.
    pub fn new(config: Config) -> AppResult<Arc<Self>> {
        if config.default_dirs.is_empty() {
            return Err("Filesystem::new: no default dirs configured".to_string());
        }
        if config.max_cpu_threads == 0 {
            return Err("Filesystem::new: worker thread count is zero".to_string());
        }

        let fs = Arc::new(Filesystem {
            default_dirs: Arc::new(Index::new(
                config.default_dirs.clone(),
                config.default_cache_path.clone(),
            )),
            extended_dirs: Arc::new(Index::new(
                config.extended_dirs.clone(),
                config.extended_cache_path.clone(),
            )),
            config,
            default_refreshing: AtomicBool::new(false),
            extended_refreshing: AtomicBool::new(false),
        });

        fs.refresh(Target::Default);
        fs.refresh(Target::Extended);
        fs.spawn_scheduler();

        Ok(fs)
    }

    /// Immediately refresh outside the regular cadence.
    pub fn force_refresh(&self, scope: RefreshScope) {
        self.refresh(Target::Default);
        if scope == RefreshScope::Both {
            self.refresh(Target::Extended);
        }
    }

    fn refresh(&self, target: Target) {
        let (index, guard) = match target {
            Target::Default => (&self.default_dirs, &self.default_refreshing),
            Target::Extended => (&self.extended_dirs, &self.extended_refreshing),
        };
        if guard
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            perf_log(format!("refresh_skipped target={target:?} already_active"));
            return;
        }

        let started = Instant::now();
        let other = match target {
            Target::Default => self.extended_dirs.clone(),
            Target::Extended => self.default_dirs.clone(),
        };
        let rules = CrawlRules {
            exclude: DirsRules::compile(&self.config.exclude_dirs),
            exclude_from_default: DirsRules::compile(&self.config.exclude_from_default_dirs),
            building_default: target == Target::Default,
        };

        let (results_tx, results_rx) = unbounded();
        let (promote_tx, promote_rx) = unbounded();

        // promote events mutate Extended's roots under its own lock, while
        // the crawl is still running
        let extended = self.extended_dirs.clone();
        let drainer = thread::spawn(move || {
            for dir in promote_rx {
                extended.add_base_dir(dir);
            }
        });

        let roots: Vec<String> = index.base_dirs().into_iter().collect();
        let workers = self.config.max_cpu_threads;
        let crawler = thread::spawn(move || {
            crawl(roots, workers, rules, other, results_tx, promote_tx);
        });

        let snapshot = Snapshot::from_entries(results_rx);
        let _ = crawler.join();
        let _ = drainer.join();

        perf_log(format!(
            "refresh_done target={target:?} entries={} elapsed_ms={}",
            snapshot.entry_count(),
            started.elapsed().as_millis()
        ));

        index.install(snapshot);
        guard.store(false, Ordering::Release);

        // snapshot write stays off the hot path
        let index = index.clone();
        thread::spawn(move || index.persist());
    }

    /// One background thread, two independent deadlines. Exits when the
    /// Filesystem is dropped.
    fn spawn_scheduler(self: &Arc<Self>) {
        let weak: Weak<Filesystem> = Arc::downgrade(self);
        let default_every = Duration::from_secs(self.config.default_dirs_cache_update_time);
        let extended_every = Duration::from_secs(self.config.extended_dirs_cache_update_time);

        thread::spawn(move || {
            let mut next_default = Instant::now() + default_every;
            let mut next_extended = Instant::now() + extended_every;

            loop {
                let wake = next_default.min(next_extended);
                while Instant::now() < wake {
                    if weak.strong_count() == 0 {
                        return;
                    }
                    let remaining = wake.saturating_duration_since(Instant::now());
                    thread::sleep(remaining.min(Duration::from_millis(500)));
                }

                let Some(fs) = weak.upgrade() else {
                    return;
                };
                let now = Instant::now();
                if now >= next_default {
                    fs.refresh(Target::Default);
                    next_default = Instant::now() + default_every;
                }
                if now >= next_extended {
                    fs.refresh(Target::Extended);
                    next_extended = Instant::now() + extended_every;
                }
            }
        });
    }
}
