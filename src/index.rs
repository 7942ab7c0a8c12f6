//! The two-level in-memory cache and its JSON warm-start persistence.
//!
//! Entries are bucketed `extension -> name length -> Vec<FileEntry>` so a
//! search touches only the buckets that can possibly match: at most the
//! user-supplied extensions, and only length buckets at least as long as the
//! pattern. Directory paths are interned once in `paths`; file entries refer
//! to their parent directory by key.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::Receiver;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::encoder;
use crate::{perf_log, AppResult};

/// Extension sentinel under which directories are bucketed.
pub const FOLDER_EXT: &str = "folder";

/// One crawled file or directory, as emitted by the crawler.
///
/// For a file, `path` is the parent directory (trailing separator) and
/// `name` carries no extension. For a directory, `path` is the directory
/// itself (trailing separator) and `name` is its base name.
#[derive(Debug, Clone)]
pub struct BasicEntry {
    pub extension: String,
    pub is_folder: bool,
    pub name: String,
    pub path: String,
}

mod fingerprint_bytes {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(value: &u64, serializer: S) -> Result<S::Ok, S::Error> {
        value.to_le_bytes().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        let bytes = <[u8; 8]>::deserialize(deserializer)?;
        Ok(u64::from_le_bytes(bytes))
    }
}

/// An indexed file or directory. Immutable once created; a refresh builds a
/// whole new entry set instead of mutating this one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileEntry {
    #[serde(rename = "e", with = "fingerprint_bytes")]
    pub encoded_name: u64,
    #[serde(rename = "n")]
    pub name: String,
    #[serde(rename = "p")]
    pub path_key: usize,
}

/// One consistent `dir_map` + `paths` pair. Installed behind an `Arc` and
/// replaced wholesale, so readers can never observe a torn view.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(rename = "d")]
    pub dir_map: HashMap<String, HashMap<usize, Vec<FileEntry>>>,
    #[serde(rename = "p")]
    pub paths: HashMap<usize, String>,
}

impl Snapshot {
    pub fn is_empty(&self) -> bool {
        self.dir_map.is_empty()
    }

    pub fn entry_count(&self) -> usize {
        self.dir_map
            .values()
            .flat_map(|by_len| by_len.values())
            .map(|bucket| bucket.len())
            .sum()
    }

    /// Drain the crawl result stream into a fresh snapshot.
    pub fn from_entries(results: Receiver<BasicEntry>) -> Self {
        let mut snapshot = Snapshot::default();
        let mut keys_by_path: HashMap<String, usize> = HashMap::new();

        for entry in results {
            snapshot.add(&mut keys_by_path, entry);
        }

        snapshot
    }

    fn add(&mut self, keys_by_path: &mut HashMap<String, usize>, entry: BasicEntry) {
        // folders intern themselves, files intern (or reuse) their parent
        let path_key = match keys_by_path.get(&entry.path).copied() {
            Some(key) => key,
            None => {
                let key = self.paths.len();
                self.paths.insert(key, entry.path.clone());
                keys_by_path.insert(entry.path, key);
                key
            }
        };

        let extension = if entry.is_folder {
            FOLDER_EXT.to_string()
        } else {
            entry.extension.to_lowercase()
        };

        self.dir_map
            .entry(extension)
            .or_default()
            .entry(entry.name.len())
            .or_default()
            .push(FileEntry {
                encoded_name: encoder::encode(&entry.name),
                name: entry.name,
                path_key,
            });
    }
}

/// One of the two caches (`Default` or `Extended`): a set of crawl roots, the
/// current snapshot, and the warm-start file it persists to.
#[derive(Debug)]
pub struct Index {
    base_dirs: RwLock<HashSet<String>>,
    snapshot: RwLock<Arc<Snapshot>>,
    cache_path: PathBuf,
    imported: AtomicBool,
}

impl Index {
    pub fn new(base_dirs: Vec<String>, cache_path: PathBuf) -> Self {
        Index {
            base_dirs: RwLock::new(base_dirs.into_iter().collect()),
            snapshot: RwLock::new(Arc::new(Snapshot::default())),
            cache_path,
            imported: AtomicBool::new(false),
        }
    }

    /// Stable reference to the current snapshot. Searches hold this across
    /// their whole scan; a concurrent refresh swap cannot tear their view.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.snapshot.read().clone()
    }

    /// Atomically replace the snapshot with a freshly crawled one. Crawled
    /// data supersedes any warm start, so the index counts as imported.
    pub fn install(&self, snapshot: Snapshot) {
        *self.snapshot.write() = Arc::new(snapshot);
        self.imported.store(true, Ordering::Release);
    }

    pub fn base_dirs(&self) -> HashSet<String> {
        self.base_dirs.read().clone()
    }

    pub fn contains_base_dir(&self, path: &str) -> bool {
        self.base_dirs.read().contains(path)
    }

    /// Register a root discovered during another Index's crawl.
    pub fn add_base_dir(&self, path: String) {
        self.base_dirs.write().insert(path);
    }

    pub fn cache_path(&self) -> &PathBuf {
        &self.cache_path
    }

    pub fn is_imported(&self) -> bool {
        self.imported.load(Ordering::Acquire)
    }

    /// Load the warm-start snapshot from disk, unless live data is already
    /// in place (then the disk copy is at best as fresh and at worst stale).
    /// A read or decode failure aborts the warm start: the index stays empty
    /// until the next crawl, which is not an error. Either way the import
    /// attempt is marked done so waiters stop polling.
    pub fn import_from_disk(&self) {
        if self.is_imported() {
            return;
        }
        match self.read_snapshot_file() {
            Ok(snapshot) => {
                perf_log(format!(
                    "cache_import path={} entries={}",
                    self.cache_path.display(),
                    snapshot.entry_count()
                ));
                self.install(snapshot);
            }
            Err(e) => eprintln!(
                "[cache] warm start aborted for {}: {e}",
                self.cache_path.display()
            ),
        }
        self.imported.store(true, Ordering::Release);
    }

    fn read_snapshot_file(&self) -> AppResult<Snapshot> {
        let raw = fs::read(&self.cache_path).map_err(|e| e.to_string())?;
        serde_json::from_slice(&raw).map_err(|e| e.to_string())
    }

    /// Drop the in-memory maps to give memory back; the snapshot on disk is
    /// reloaded on the next import.
    pub fn clear(&self) {
        self.install(Snapshot::default());
        self.imported.store(false, Ordering::Release);
    }

    /// Write the current snapshot to the warm-start file. Runs off the hot
    /// path; a failure is logged and the in-memory index stays authoritative.
    pub fn persist(&self) {
        let snapshot = self.snapshot();
        let encoded = match serde_json::to_vec(&*snapshot) {
            Ok(bytes) => bytes,
            Err(e) => {
                eprintln!("[cache] couldn't encode {}: {e}", self.cache_path.display());
                return;
            }
        };
        if let Err(e) = fs::write(&self.cache_path, encoded) {
            eprintln!("[cache] couldn't write {}: {e}", self.cache_path.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;

    fn folder(name: &str, path: &str) -> BasicEntry {
        BasicEntry {
            extension: String::new(),
            is_folder: true,
            name: name.to_string(),
            path: path.to_string(),
        }
    }

    fn file(name: &str, ext: &str, parent: &str) -> BasicEntry {
        BasicEntry {
            extension: ext.to_string(),
            is_folder: false,
            name: name.to_string(),
            path: parent.to_string(),
        }
    }

    fn build(entries: Vec<BasicEntry>) -> Snapshot {
        let (tx, rx) = unbounded();
        for entry in entries {
            tx.send(entry).unwrap();
        }
        drop(tx);
        Snapshot::from_entries(rx)
    }

    #[test]
    fn folders_intern_themselves_files_reuse_parent() {
        let snapshot = build(vec![
            folder("proj", "/home/u/proj/"),
            file("main", ".go", "/home/u/proj/"),
            file("notes", ".md", "/home/u/proj/"),
        ]);

        assert_eq!(snapshot.paths.len(), 1);
        let dir_key = *snapshot.paths.keys().next().unwrap();
        assert_eq!(snapshot.paths[&dir_key], "/home/u/proj/");

        let folder_entry = &snapshot.dir_map[FOLDER_EXT][&4][0];
        assert_eq!(folder_entry.path_key, dir_key);
        let file_entry = &snapshot.dir_map[".go"][&4][0];
        assert_eq!(file_entry.path_key, dir_key);
        assert_eq!(file_entry.name, "main");
    }

    #[test]
    fn root_files_intern_their_uncrawled_parent() {
        // base dirs are never emitted as folder entries, so a file directly
        // under one must intern the parent itself
        let snapshot = build(vec![file("README", ".md", "/home/u/")]);

        assert_eq!(snapshot.paths.len(), 1);
        let entry = &snapshot.dir_map[".md"][&6][0];
        assert_eq!(snapshot.paths[&entry.path_key], "/home/u/");
    }

    #[test]
    fn extension_keys_are_lowercased() {
        let snapshot = build(vec![file("Report", ".PDF", "/home/u/")]);
        assert!(snapshot.dir_map.contains_key(".pdf"));
        assert_eq!(snapshot.dir_map[".pdf"][&6][0].name, "Report");
    }

    #[test]
    fn entries_keep_length_and_fingerprint_invariants() {
        let snapshot = build(vec![
            file("main", ".go", "/home/u/proj/"),
            file("api", ".md", "/home/u/proj/docs/"),
            folder("docs", "/home/u/proj/docs/"),
        ]);

        for (ext, by_len) in &snapshot.dir_map {
            assert_eq!(ext.to_lowercase(), *ext);
            for (len, bucket) in by_len {
                assert!(!bucket.is_empty());
                for entry in bucket {
                    assert_eq!(entry.name.len(), *len);
                    assert_eq!(entry.encoded_name, encoder::encode(&entry.name));
                    assert!(snapshot.paths.contains_key(&entry.path_key));
                }
            }
        }
    }

    #[test]
    fn snapshot_wire_format_uses_short_keys() {
        let snapshot = build(vec![file("a", ".txt", "/r/")]);
        let json: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&snapshot).unwrap()).unwrap();

        let bucket = &json["d"][".txt"]["1"][0];
        assert_eq!(bucket["n"], "a");
        assert_eq!(bucket["p"], 0);
        assert_eq!(bucket["e"].as_array().unwrap().len(), 8);
        assert_eq!(json["p"]["0"], "/r/");
    }

    #[test]
    fn snapshot_round_trips_through_json() {
        let snapshot = build(vec![
            folder("proj", "/home/u/proj/"),
            file("main", ".go", "/home/u/proj/"),
        ]);
        let decoded: Snapshot =
            serde_json::from_str(&serde_json::to_string(&snapshot).unwrap()).unwrap();

        assert_eq!(decoded.entry_count(), snapshot.entry_count());
        let original = &snapshot.dir_map[".go"][&4][0];
        let restored = &decoded.dir_map[".go"][&4][0];
        assert_eq!(restored.encoded_name, original.encoded_name);
        assert_eq!(decoded.paths[&restored.path_key], "/home/u/proj/");
    }

    #[test]
    fn failed_warm_start_leaves_index_empty_but_imported() {
        let dir = tempfile::tempdir().unwrap();
        let cache_path = dir.path().join("cache.json");
        fs::write(&cache_path, b"{ not json").unwrap();

        let index = Index::new(vec!["/home/u/".to_string()], cache_path);
        index.import_from_disk();

        assert!(index.is_imported());
        assert!(index.snapshot().is_empty());
    }

    #[test]
    fn persist_then_import_restores_entries() {
        let dir = tempfile::tempdir().unwrap();
        let index = Index::new(vec!["/home/u/".to_string()], dir.path().join("cache.json"));
        index.install(build(vec![file("README", ".md", "/home/u/")]));
        index.persist();

        index.clear();
        assert!(!index.is_imported());
        assert!(index.snapshot().is_empty());

        index.import_from_disk();
        assert!(index.is_imported());
        assert_eq!(index.snapshot().entry_count(), 1);
    }
}
