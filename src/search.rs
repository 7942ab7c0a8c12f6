//! Candidate scan over one or both Index snapshots. Entries only get the
//! substring test after surviving the length-bucket skip and the fingerprint
//! AND, which reject the bulk of the index without touching a string.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::encoder;
use crate::filesystem::Filesystem;
use crate::index::Snapshot;
use crate::query::SearchPattern;

/// One match, not yet ranked. `match_index` is the byte offset of the first
/// occurrence of the pattern in the lowercased name.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub parent_path: String,
    pub name: String,
    pub extension: String,
    pub match_index: usize,
}

/// Launch the per-Index scan threads and hand back the candidate stream.
/// The channel closes once every scan thread has finished or bailed out on
/// cancellation.
pub fn spawn_scans(
    pattern: Arc<SearchPattern>,
    filesystem: &Filesystem,
    cancel: Arc<AtomicBool>,
) -> Receiver<Candidate> {
    let (tx, rx) = unbounded();

    let mut snapshots = vec![filesystem.default_dirs.snapshot()];
    if pattern.extended {
        snapshots.push(filesystem.extended_dirs.snapshot());
    }

    for snapshot in snapshots {
        let pattern = pattern.clone();
        let cancel = cancel.clone();
        let tx = tx.clone();
        thread::spawn(move || scan_snapshot(&pattern, &snapshot, &tx, &cancel));
    }

    rx
}

/// Scan a single snapshot, emitting every entry whose lowercased name
/// contains the pattern. Checks the cancellation signal between entries.
pub fn scan_snapshot(
    pattern: &SearchPattern,
    snapshot: &Snapshot,
    found: &Sender<Candidate>,
    cancel: &AtomicBool,
) {
    // only visit extension buckets that both sides know about
    let extensions: Vec<&String> = if pattern.extensions.is_empty() {
        snapshot.dir_map.keys().collect()
    } else {
        pattern
            .extensions
            .iter()
            .filter(|ext| snapshot.dir_map.contains_key(*ext))
            .collect()
    };

    for extension in extensions {
        for (length, entries) in &snapshot.dir_map[extension] {
            if *length < pattern.name.len() {
                continue;
            }

            for entry in entries {
                if cancel.load(Ordering::Acquire) {
                    return;
                }
                if !encoder::contains_all(pattern.encoded, entry.encoded_name) {
                    continue;
                }
                let Some(match_index) = entry.name.to_lowercase().find(&pattern.name) else {
                    continue;
                };
                let Some(parent_path) = snapshot.paths.get(&entry.path_key) else {
                    continue;
                };

                if found
                    .send(Candidate {
                        parent_path: parent_path.clone(),
                        name: entry.name.clone(),
                        extension: extension.clone(),
                        match_index,
                    })
                    .is_err()
                {
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{BasicEntry, FOLDER_EXT};
    use crate::query::parse_query;

    fn snapshot_of(entries: Vec<(&str, &str, bool, &str)>) -> Snapshot {
        let (tx, rx) = unbounded();
        for (name, ext, is_folder, path) in entries {
            tx.send(BasicEntry {
                extension: ext.to_string(),
                is_folder,
                name: name.to_string(),
                path: path.to_string(),
            })
            .unwrap();
        }
        drop(tx);
        Snapshot::from_entries(rx)
    }

    fn scan(pattern: &SearchPattern, snapshot: &Snapshot) -> Vec<Candidate> {
        let (tx, rx) = unbounded();
        scan_snapshot(pattern, snapshot, &tx, &AtomicBool::new(false));
        drop(tx);
        rx.iter().collect()
    }

    fn fixture() -> Snapshot {
        snapshot_of(vec![
            ("README", ".md", false, "/home/u/"),
            ("api", ".md", false, "/home/u/proj/docs/"),
            ("main", ".go", false, "/home/u/proj/"),
            ("proj", "", true, "/home/u/proj/"),
        ])
    }

    #[test]
    fn substring_match_is_case_insensitive() {
        let found = scan(&parse_query("readme"), &fixture());
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "README");
        assert_eq!(found[0].match_index, 0);
        assert_eq!(found[0].parent_path, "/home/u/");
        assert_eq!(found[0].extension, ".md");
    }

    #[test]
    fn extension_filter_restricts_buckets() {
        let all = scan(&parse_query("a"), &fixture());
        assert!(all.iter().any(|c| c.extension == ".go"));

        let md_only = scan(&parse_query("a <md>"), &fixture());
        assert!(!md_only.is_empty());
        assert!(md_only.iter().all(|c| c.extension == ".md"));
    }

    #[test]
    fn folder_filter_matches_directories() {
        let found = scan(&parse_query("proj <folder>"), &fixture());
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].extension, FOLDER_EXT);
        assert_eq!(found[0].parent_path, "/home/u/proj/");
    }

    #[test]
    fn absent_extension_filter_yields_nothing() {
        let found = scan(&parse_query("a <pdf>"), &fixture());
        assert!(found.is_empty());
    }

    #[test]
    fn short_names_are_skipped_by_length_bucket() {
        let found = scan(&parse_query("readme_longer_than_any_name"), &fixture());
        assert!(found.is_empty());
    }

    #[test]
    fn match_index_is_first_occurrence() {
        let snapshot = snapshot_of(vec![("domain_main", ".rs", false, "/r/")]);
        let found = scan(&parse_query("main"), &snapshot);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].match_index, 2);
    }

    #[test]
    fn cancellation_stops_the_scan_immediately() {
        let (tx, rx) = unbounded();
        scan_snapshot(
            &parse_query("a"),
            &fixture(),
            &tx,
            &AtomicBool::new(true),
        );
        drop(tx);
        assert_eq!(rx.iter().count(), 0);
    }

    #[test]
    fn every_emitted_candidate_satisfies_the_match_invariants() {
        let pattern = parse_query("ma");
        for candidate in scan(&pattern, &fixture()) {
            assert!(candidate.name.to_lowercase().contains(&pattern.name));
            assert!(encoder::contains_all(
                pattern.encoded,
                encoder::encode(&candidate.name)
            ));
        }
    }
}
