pub mod config;
pub mod crawler;
pub mod encoder;
pub mod filesystem;
pub mod handler;
pub mod index;
pub mod query;
pub mod rank;
pub mod search;

use std::sync::OnceLock;

pub type AppResult<T> = Result<T, String>;

static PERF_LOG_ENABLED: OnceLock<bool> = OnceLock::new();

fn env_truthy(key: &str) -> bool {
    std::env::var(key)
        .ok()
        .map(|value| {
            matches!(
                value.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            )
        })
        .unwrap_or(false)
}

fn perf_log_enabled() -> bool {
    *PERF_LOG_ENABLED.get_or_init(|| env_truthy("BLINK_PERF_LOG"))
}

pub(crate) fn perf_log(message: impl AsRef<str>) {
    if perf_log_enabled() {
        eprintln!("[perf] {}", message.as_ref());
    }
}
