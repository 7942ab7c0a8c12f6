//! Scoring and ordering of search candidates.
//!
//! Candidates are drained from the scan stream, stat'ed (entries that
//! vanished since the last crawl are dropped), scored against a fixed
//! weight table, and sorted descending. Given identical stat results the
//! score is fully deterministic.

use std::collections::HashSet;
use std::fs;
use std::path::MAIN_SEPARATOR;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::SystemTime;

use crossbeam_channel::Receiver;

use crate::index::FOLDER_EXT;
use crate::query::SearchPattern;
use crate::search::Candidate;

const FOUR_YEARS_SECS: f64 = 4.0 * 365.25 * 24.0 * 60.0 * 60.0;
const MINIMUM_SIZE_BYTES: u64 = 100;

const EXACT_MATCH: i64 = 500;
const SUBSTRING_EARLY_MAX: i64 = 325;
const RECENTLY_MODIFIED_MAX: f64 = 250.0;
const NOT_DEEPLY_NESTED_MAX: i64 = 150;
const LENGTH_RATIO_MAX: f64 = 125.0;
const IN_DEFAULT_DIRS: i64 = 75;
const MINIMUM_SIZE: i64 = 25;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankedFile {
    pub path: String,
    pub points: i64,
}

/// Drain, stat, score and sort. Returns the ordered absolute paths, best
/// first. Folder paths keep their trailing separator. A cancelled search
/// returns nothing.
pub fn rank(
    pattern: &SearchPattern,
    candidates: Receiver<Candidate>,
    default_base_dirs: &HashSet<String>,
    cancel: &AtomicBool,
) -> Vec<String> {
    let now = SystemTime::now();
    let mut ranked: Vec<RankedFile> = Vec::new();

    for candidate in candidates {
        if cancel.load(Ordering::Acquire) {
            return Vec::new();
        }

        let full_path = if candidate.extension == FOLDER_EXT {
            candidate.parent_path.clone()
        } else {
            format!(
                "{}{}{}",
                candidate.parent_path, candidate.name, candidate.extension
            )
        };

        // a stat failure means the entry vanished since the last crawl
        let Ok(metadata) = fs::metadata(&full_path) else {
            continue;
        };

        let points = score(pattern, &candidate, &metadata, now, default_base_dirs);
        ranked.push(RankedFile {
            path: full_path,
            points,
        });
    }

    if cancel.load(Ordering::Acquire) {
        return Vec::new();
    }

    ranked.sort_unstable_by(|a, b| b.points.cmp(&a.points));
    ranked.into_iter().map(|file| file.path).collect()
}

fn score(
    pattern: &SearchPattern,
    candidate: &Candidate,
    metadata: &fs::Metadata,
    now: SystemTime,
    default_base_dirs: &HashSet<String>,
) -> i64 {
    let mut points: i64 = 0;

    if candidate.name.to_lowercase() == pattern.name {
        points += EXACT_MATCH;
    }

    points += SUBSTRING_EARLY_MAX - 10 * candidate.match_index as i64;

    let age_secs = metadata
        .modified()
        .ok()
        .and_then(|mtime| now.duration_since(mtime).ok())
        .map(|age| age.as_secs_f64())
        .unwrap_or(0.0)
        .min(FOUR_YEARS_SECS);
    points += (RECENTLY_MODIFIED_MAX * (1.0 - age_secs / FOUR_YEARS_SECS)) as i64;

    let depth = candidate
        .parent_path
        .matches(MAIN_SEPARATOR)
        .count() as i64;
    points += NOT_DEEPLY_NESTED_MAX - 10 * depth;

    points += (LENGTH_RATIO_MAX * pattern.name.len() as f64 / candidate.name.len() as f64) as i64;

    if default_base_dirs
        .iter()
        .any(|dir| candidate.parent_path.starts_with(dir.as_str()))
    {
        points += IN_DEFAULT_DIRS;
    }

    if metadata.len() > MINIMUM_SIZE_BYTES {
        points += MINIMUM_SIZE;
    }

    points
}
