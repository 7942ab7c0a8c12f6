//! Line-oriented shell around the search core.
//!
//! Reads one query per line from stdin and prints the ranked paths the
//! handler emits. The desktop frame (tray, hotkey, window) talks to the
//! same [`SearchHandler`] surface this binary drives.

use std::io::{self, BufRead, Write};
use std::thread;

use blink::config::Config;
use blink::filesystem::{Filesystem, RefreshScope};
use blink::handler::SearchHandler;

fn main() {
    if let Err(e) = run() {
        eprintln!("blink: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let config = Config::load()?;
    let filesystem = Filesystem::new(config)?;
    let handler = SearchHandler::new(filesystem);
    handler.import_cache();

    let results = handler.results();
    thread::spawn(move || {
        for paths in results {
            let mut stdout = io::stdout().lock();
            for path in &paths {
                let _ = writeln!(stdout, "{path}");
            }
            let _ = writeln!(stdout, "-- {} results", paths.len());
        }
    });

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line.map_err(|e| format!("stdin: {e}"))?;
        match line.trim() {
            ":quit" => break,
            ":refresh" => handler.force_refresh(RefreshScope::Default),
            ":refresh all" => handler.force_refresh(RefreshScope::Both),
            // re-read config.json and rebuild both indexes from scratch
            ":rebuild" => handler.rebuild(Config::load()?)?,
            query => handler.search(query),
        }
    }

    Ok(())
}
