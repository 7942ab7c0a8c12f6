//! Parallel filesystem walk that feeds a fresh snapshot build.
//!
//! A shared work queue of pending directories is consumed and extended by a
//! pool of worker threads. A wait counter tracks directories that have been
//! enqueued but not fully processed; the worker that drops it to zero
//! broadcasts a shutdown sentinel to the pool. Result senders stay alive
//! until every worker has exited, so the consumer never misses an entry.

use std::fs;
use std::path::MAIN_SEPARATOR;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use crossbeam_channel::{unbounded, Sender};

use crate::config::DirsRules;
use crate::index::{BasicEntry, Index};
use crate::perf_log;

/// Exclusion rules for one crawl.
#[derive(Debug, Clone)]
pub struct CrawlRules {
    pub exclude: DirsRules,
    pub exclude_from_default: DirsRules,
    /// True when this crawl builds the Default index. Only then does the
    /// exclude-from-default rule apply (and promote matches to Extended).
    pub building_default: bool,
}

/// Walk every root, emitting a [`BasicEntry`] per surviving file and
/// directory on `results`. Directories matching the exclude-from-default
/// rules during a Default crawl are sent on `promotions` instead so the
/// owner can register them as Extended roots. Blocks until the walk is
/// complete; both senders are dropped on return.
pub fn crawl(
    roots: Vec<String>,
    worker_count: usize,
    rules: CrawlRules,
    other_index: Arc<Index>,
    results: Sender<BasicEntry>,
    promotions: Sender<String>,
) {
    let worker_count = worker_count.max(1);
    let (work_tx, work_rx) = unbounded::<Option<String>>();
    let pending = Arc::new(AtomicUsize::new(0));

    pending.store(roots.len(), Ordering::Release);
    for root in roots {
        // queue is unbounded, a send cannot fail while we hold a receiver
        let _ = work_tx.send(Some(root));
    }
    if pending.load(Ordering::Acquire) == 0 {
        return;
    }

    let rules = Arc::new(rules);
    let mut workers = Vec::with_capacity(worker_count);
    for _ in 0..worker_count {
        let work_tx = work_tx.clone();
        let work_rx = work_rx.clone();
        let pending = pending.clone();
        let rules = rules.clone();
        let other_index = other_index.clone();
        let results = results.clone();
        let promotions = promotions.clone();

        workers.push(thread::spawn(move || {
            while let Ok(Some(dir)) = work_rx.recv() {
                process_dir(
                    &dir,
                    &rules,
                    &other_index,
                    &results,
                    &promotions,
                    &work_tx,
                    &pending,
                );

                if pending.fetch_sub(1, Ordering::AcqRel) == 1 {
                    // last pending directory done: wake the whole pool
                    for _ in 0..worker_count {
                        let _ = work_tx.send(None);
                    }
                }
            }
        }));
    }

    drop(work_tx);
    drop(results);
    drop(promotions);

    for worker in workers {
        let _ = worker.join();
    }
}

/// Read one directory and emit its children. `dir` carries a trailing
/// separator. An unreadable directory contributes nothing.
fn process_dir(
    dir: &str,
    rules: &CrawlRules,
    other_index: &Index,
    results: &Sender<BasicEntry>,
    promotions: &Sender<String>,
    work_tx: &Sender<Option<String>>,
    pending: &AtomicUsize,
) {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => {
            perf_log(format!("crawl_skip_unreadable dir={dir}"));
            return;
        }
    };

    for entry in entries.flatten() {
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        let name = entry.file_name().to_string_lossy().into_owned();

        if file_type.is_dir() {
            let dir_path = format!("{dir}{name}{MAIN_SEPARATOR}");

            if rules.exclude.matches(&dir_path) {
                continue;
            }
            if rules.building_default && rules.exclude_from_default.matches(&dir_path) {
                // stays out of Default but becomes an Extended root
                let _ = promotions.send(dir_path);
                continue;
            }
            if other_index.contains_base_dir(&dir_path) {
                continue;
            }

            let _ = results.send(BasicEntry {
                extension: String::new(),
                is_folder: true,
                name,
                path: dir_path.clone(),
            });
            pending.fetch_add(1, Ordering::AcqRel);
            let _ = work_tx.send(Some(dir_path));
        } else {
            // symlinks and other non-directories index as plain files
            let (stem, extension) = match name.rfind('.') {
                Some(pos) => (name[..pos].to_string(), name[pos..].to_string()),
                None => (name, String::new()),
            };

            let _ = results.send(BasicEntry {
                extension,
                is_folder: false,
                name: stem,
                path: dir.to_string(),
            });
        }
    }
}
