//! Top-level search entry point.
//!
//! Each keystroke becomes a `search` call; the previous search's
//! cancellation token is tripped before the new one starts, so at most one
//! search does real work at a time. Results land in a single-slot sink
//! where the newest list silently replaces an unconsumed older one.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::{Mutex, RwLock};

use crate::config::Config;
use crate::filesystem::{Filesystem, RefreshScope};
use crate::query::parse_query;
use crate::{perf_log, rank, search, AppResult};

/// How often a pending Extended search re-checks the warm-start import.
const IMPORT_POLL: Duration = Duration::from_millis(5);

pub struct SearchHandler {
    filesystem: RwLock<Arc<Filesystem>>,
    current_cancel: Mutex<Arc<AtomicBool>>,
    results_tx: Sender<Vec<String>>,
    results_rx: Receiver<Vec<String>>,
}

impl SearchHandler {
    pub fn new(filesystem: Arc<Filesystem>) -> Self {
        let (results_tx, results_rx) = bounded(1);
        SearchHandler {
            filesystem: RwLock::new(filesystem),
            current_cancel: Mutex::new(Arc::new(AtomicBool::new(false))),
            results_tx,
            results_rx,
        }
    }

    /// The sink search results are emitted on. Each item is a ranked list of
    /// absolute paths; folder paths end in the platform separator.
    pub fn results(&self) -> Receiver<Vec<String>> {
        self.results_rx.clone()
    }

    /// Cancel whatever search is still in flight and start a new one on a
    /// background thread. An empty parsed name emits nothing.
    pub fn search(&self, input: &str) {
        let cancel = {
            let mut current = self.current_cancel.lock();
            current.store(true, Ordering::Release);
            *current = Arc::new(AtomicBool::new(false));
            current.clone()
        };

        let pattern = Arc::new(parse_query(input));
        if pattern.name.is_empty() {
            return;
        }

        let filesystem = self.filesystem.read().clone();
        let results_tx = self.results_tx.clone();
        let results_rx = self.results_rx.clone();

        thread::spawn(move || {
            if pattern.extended {
                // the Extended warm start may still be loading on another
                // thread; wait for it, yielding to cancellation
                while !filesystem.extended_dirs.is_imported() {
                    if cancel.load(Ordering::Acquire) {
                        return;
                    }
                    thread::sleep(IMPORT_POLL);
                }
            }

            let candidates = search::spawn_scans(pattern.clone(), &filesystem, cancel.clone());
            let ranked = rank::rank(
                &pattern,
                candidates,
                &filesystem.default_dirs.base_dirs(),
                &cancel,
            );

            if cancel.load(Ordering::Acquire) {
                return;
            }
            perf_log(format!(
                "search_done name={:?} results={}",
                pattern.name,
                ranked.len()
            ));
            emit(&results_tx, &results_rx, ranked);
        });
    }

    /// Warm-start both Indexes from their JSON snapshots. The Extended load
    /// may be large, so it runs concurrently with the caller returning.
    pub fn import_cache(&self) {
        let filesystem = self.filesystem.read().clone();
        filesystem.default_dirs.import_from_disk();

        let extended = filesystem.extended_dirs.clone();
        thread::spawn(move || extended.import_from_disk());
    }

    /// Drop both Indexes' in-memory maps (the UI hid the window); the next
    /// [`SearchHandler::import_cache`] reloads them.
    pub fn clear_imported_cache(&self) {
        let filesystem = self.filesystem.read().clone();
        filesystem.default_dirs.clear();
        filesystem.extended_dirs.clear();
    }

    /// Refresh outside the regular cadence.
    pub fn force_refresh(&self, scope: RefreshScope) {
        self.filesystem.read().force_refresh(scope);
    }

    /// Tear down and reconstruct the whole Filesystem from config.
    pub fn rebuild(&self, config: Config) -> AppResult<()> {
        let fresh = Filesystem::new(config)?;
        *self.filesystem.write() = fresh;
        Ok(())
    }
}

/// Single-slot emit: never blocks for longer than one replacement. If the
/// slot is full the stale list is dropped in favor of the newest, since the
/// next keystroke overwrites search results anyway.
fn emit(tx: &Sender<Vec<String>>, rx: &Receiver<Vec<String>>, results: Vec<String>) {
    if let Err(TrySendError::Full(results)) = tx.try_send(results) {
        let _ = rx.try_recv();
        let _ = tx.try_send(results);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sink_keeps_only_the_newest_result() {
        let (tx, rx) = bounded(1);

        emit(&tx, &rx, vec!["first".to_string()]);
        emit(&tx, &rx, vec!["second".to_string()]);
        emit(&tx, &rx, vec!["third".to_string()]);

        assert_eq!(rx.try_recv().unwrap(), vec!["third".to_string()]);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn cancel_token_is_replaced_per_search() {
        let first = Arc::new(AtomicBool::new(false));
        let holder = Mutex::new(first.clone());

        // the swap a new search performs
        let second = {
            let mut current = holder.lock();
            current.store(true, Ordering::Release);
            *current = Arc::new(AtomicBool::new(false));
            current.clone()
        };

        assert!(first.load(Ordering::Acquire));
        assert!(!second.load(Ordering::Acquire));
    }
}
