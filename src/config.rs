//! Configuration loading and first-run setup.
//!
//! The config lives at `<config_dir>/blink/config.json`; warm-start caches
//! live under `<cache_dir>/blink/`. A missing config file is replaced with
//! the built-in defaults so the tool works on first launch.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf, MAIN_SEPARATOR};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::AppResult;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Rules {
    #[serde(rename = "Name")]
    pub name: Vec<String>,
    #[serde(rename = "Path")]
    pub path: Vec<String>,
    #[serde(rename = "Regex")]
    pub regex: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "MaxCPUThreadPercentage")]
    pub max_cpu_thread_percentage: f64,
    #[serde(rename = "ShortCutEnd")]
    pub shortcut_end: String,
    #[serde(rename = "DefaultDirsCacheUpdateTime")]
    pub default_dirs_cache_update_time: u64,
    #[serde(rename = "ExtendedDirsCacheUpdateTime")]
    pub extended_dirs_cache_update_time: u64,
    #[serde(rename = "DefaultDirs")]
    pub default_dirs: Vec<String>,
    #[serde(rename = "ExtendedDirs")]
    pub extended_dirs: Vec<String>,
    #[serde(rename = "ExcludeFromDefaultDirs")]
    pub exclude_from_default_dirs: Rules,
    #[serde(rename = "ExcludeDirs")]
    pub exclude_dirs: Rules,

    #[serde(skip)]
    pub max_cpu_threads: usize,
    #[serde(skip)]
    pub default_cache_path: PathBuf,
    #[serde(skip)]
    pub extended_cache_path: PathBuf,
}

impl Config {
    /// Load `<config_dir>/blink/config.json`, creating directories and a
    /// default config on first run. Fatal on unreadable or invalid config.
    pub fn load() -> AppResult<Self> {
        let config_dir = dirs::config_dir()
            .ok_or("Config::load: couldn't resolve the user's config dir")?
            .join("blink");
        let cache_dir = dirs::cache_dir()
            .ok_or("Config::load: couldn't resolve the user's cache dir")?
            .join("blink");

        Self::load_from(&config_dir.join("config.json"), &cache_dir)
    }

    /// Like [`Config::load`] with explicit locations. Used directly by tests.
    pub fn load_from(config_path: &Path, cache_dir: &Path) -> AppResult<Self> {
        for dir in [config_path.parent(), Some(cache_dir)].into_iter().flatten() {
            fs::create_dir_all(dir)
                .map_err(|e| format!("Config::load: couldn't create {}: {e}", dir.display()))?;
        }

        if !config_path.exists() {
            let default = serde_json::to_string_pretty(&Self::default_values())
                .map_err(|e| format!("Config::load: couldn't encode default config: {e}"))?;
            fs::write(config_path, default).map_err(|e| {
                format!(
                    "Config::load: couldn't write default config {}: {e}",
                    config_path.display()
                )
            })?;
        }

        let raw = fs::read_to_string(config_path).map_err(|e| {
            format!("Config::load: couldn't read {}: {e}", config_path.display())
        })?;
        let mut config: Config = serde_json::from_str(&raw).map_err(|e| {
            format!("Config::load: couldn't decode {}: {e}", config_path.display())
        })?;

        config.default_cache_path = cache_dir.join("default_cache.json");
        config.extended_cache_path = cache_dir.join("extended_cache.json");
        config.finish()?;
        Ok(config)
    }

    fn default_values() -> Self {
        let home = dirs::home_dir()
            .map(|h| h.to_string_lossy().into_owned())
            .unwrap_or_else(|| MAIN_SEPARATOR.to_string());

        Config {
            max_cpu_thread_percentage: 0.25,
            shortcut_end: "s".to_string(),
            default_dirs_cache_update_time: 120,
            extended_dirs_cache_update_time: 1800,
            default_dirs: vec![home],
            extended_dirs: vec![MAIN_SEPARATOR.to_string()],
            exclude_from_default_dirs: Rules {
                name: Vec::new(),
                path: Vec::new(),
                // hidden directories stay out of the fast index but remain
                // reachable through the extended one
                regex: vec![format!(
                    "{0}\\.[^{0}]+{0}$",
                    regex::escape(&MAIN_SEPARATOR.to_string())
                )],
            },
            exclude_dirs: Rules {
                name: vec![
                    ".git".to_string(),
                    "node_modules".to_string(),
                    "steamapps".to_string(),
                ],
                path: Vec::new(),
                regex: Vec::new(),
            },
            max_cpu_threads: 0,
            default_cache_path: PathBuf::new(),
            extended_cache_path: PathBuf::new(),
        }
    }

    /// Validate the decoded values and derive the worker-thread count.
    fn finish(&mut self) -> AppResult<()> {
        if !(self.max_cpu_thread_percentage > 0.0 && self.max_cpu_thread_percentage <= 1.0) {
            return Err(format!(
                "Config::load: MaxCPUThreadPercentage must be in (0, 1], got {}",
                self.max_cpu_thread_percentage
            ));
        }
        if self.default_dirs_cache_update_time == 0 || self.extended_dirs_cache_update_time == 0 {
            return Err("Config::load: cache update times must be positive".to_string());
        }
        if self.default_dirs.is_empty() {
            return Err("Config::load: DefaultDirs must not be empty".to_string());
        }
        if self.shortcut_end.trim().is_empty() {
            return Err("Config::load: ShortCutEnd must not be empty".to_string());
        }

        for dirs in [&mut self.default_dirs, &mut self.extended_dirs] {
            for dir in dirs.iter_mut() {
                if !dir.ends_with(MAIN_SEPARATOR) {
                    dir.push(MAIN_SEPARATOR);
                }
            }
        }

        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        self.max_cpu_threads =
            ((cores as f64 * self.max_cpu_thread_percentage).ceil() as usize).max(1);

        Ok(())
    }
}

/// Compiled exclusion rules: exact base names, exact absolute paths (with
/// trailing separator), and full-path regex patterns. A directory is excluded
/// when any of the three matches.
#[derive(Debug, Default, Clone)]
pub struct DirsRules {
    name: HashSet<String>,
    path: HashSet<String>,
    regex: Vec<Regex>,
}

impl DirsRules {
    /// Compile raw rules. A pattern that fails to compile is logged and
    /// skipped for this crawl.
    pub fn compile(rules: &Rules) -> Self {
        let mut regexes = Vec::with_capacity(rules.regex.len());
        for pattern in &rules.regex {
            match Regex::new(pattern) {
                Ok(re) => regexes.push(re),
                Err(e) => eprintln!("[rules] skipping invalid regex {pattern:?}: {e}"),
            }
        }

        DirsRules {
            name: rules.name.iter().cloned().collect(),
            path: rules.path.iter().cloned().collect(),
            regex: regexes,
        }
    }

    /// `dir_path` is absolute with a trailing separator.
    pub fn matches(&self, dir_path: &str) -> bool {
        if self.path.contains(dir_path) {
            return true;
        }

        let base = dir_path
            .trim_end_matches(MAIN_SEPARATOR)
            .rsplit(MAIN_SEPARATOR)
            .next()
            .unwrap_or("");
        if self.name.contains(base) {
            return true;
        }

        self.regex.iter().any(|re| re.is_match(dir_path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules(name: &[&str], path: &[&str], regex: &[&str]) -> DirsRules {
        DirsRules::compile(&Rules {
            name: name.iter().map(|s| s.to_string()).collect(),
            path: path.iter().map(|s| s.to_string()).collect(),
            regex: regex.iter().map(|s| s.to_string()).collect(),
        })
    }

    #[test]
    fn name_rule_matches_base_name() {
        let r = rules(&["node_modules"], &[], &[]);
        assert!(r.matches("/home/u/proj/node_modules/"));
        assert!(!r.matches("/home/u/proj/src/"));
    }

    #[test]
    fn path_rule_is_exact() {
        let r = rules(&[], &["/home/u/tmp/"], &[]);
        assert!(r.matches("/home/u/tmp/"));
        assert!(!r.matches("/home/u/tmp/sub/"));
    }

    #[test]
    fn regex_rule_matches_full_path() {
        let r = rules(&[], &[], &[r"^/home/u/\.[^/]+/?$"]);
        assert!(r.matches("/home/u/.cache/"));
        assert!(!r.matches("/home/u/docs/"));
    }

    #[test]
    fn invalid_regex_is_skipped_not_fatal() {
        let r = rules(&[], &[], &["[unclosed", r"^/ok/$"]);
        assert!(r.matches("/ok/"));
    }

    #[test]
    fn default_config_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config.json");
        let cache_dir = dir.path().join("cache");

        let first = Config::load_from(&config_path, &cache_dir).unwrap();
        assert!(config_path.exists());
        assert!(first.max_cpu_threads >= 1);
        assert!(first.default_dirs[0].ends_with(MAIN_SEPARATOR));
        assert_eq!(first.default_cache_path, cache_dir.join("default_cache.json"));

        // second load reads the generated file rather than regenerating
        let second = Config::load_from(&config_path, &cache_dir).unwrap();
        assert_eq!(second.default_dirs, first.default_dirs);
        assert_eq!(second.shortcut_end, "s");
    }

    #[test]
    fn out_of_range_thread_percentage_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config.json");
        let mut bad = Config::default_values();
        bad.max_cpu_thread_percentage = 1.5;
        fs::write(&config_path, serde_json::to_string(&bad).unwrap()).unwrap();

        let err = Config::load_from(&config_path, dir.path()).unwrap_err();
        assert!(err.contains("MaxCPUThreadPercentage"));
    }
}
