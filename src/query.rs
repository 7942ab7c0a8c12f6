use std::sync::OnceLock;

use regex::Regex;

use crate::encoder;
use crate::index::FOLDER_EXT;

#[derive(Debug, Clone, PartialEq)]
pub struct SearchPattern {
    /// Lowercased query with all flags stripped.
    pub name: String,
    /// Fingerprint of `name`.
    pub encoded: u64,
    /// Normalized filters: `"folder"` or dotted lowercase extensions.
    pub extensions: Vec<String>,
    /// Search the Extended index in addition to Default.
    pub extended: bool,
}

fn bracket_group_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new("<[^>]*>").expect("bracket group pattern"))
}

/// Clean the input and pull the flag values out of it.
///
/// Flags:
/// - `/e` (or `/E`) anywhere: also search the Extended index.
/// - `<txt, go>` bracket groups: extension filters, comma separated.
/// - a trailing `.ext` on what remains: shorthand for an extension filter,
///   so `"report.pdf"` searches names containing `report` filtered to
///   `.pdf`. `"folder"` is a valid pseudo-extension selecting directories.
///
/// Example: `"myFile /e <txt, go>"` -> (`"myfile"`, `[".txt", ".go"]`, extended).
pub fn parse_query(input: &str) -> SearchPattern {
    let mut input = input.to_lowercase();

    let extended = input.contains("/e");
    if extended {
        input = input.replace("/e", "");
    }

    let mut extensions = Vec::new();
    for group in bracket_group_re().find_iter(&input) {
        let cleaned: String = group
            .as_str()
            .chars()
            .filter(|c| !matches!(c, '<' | '>' | ' '))
            .collect();
        extensions.extend(
            cleaned
                .split(',')
                .filter(|piece| !piece.is_empty())
                .map(String::from),
        );
    }
    let without_groups = bracket_group_re().replace_all(&input, "");

    let mut name = without_groups
        .trim_matches(|c: char| matches!(c, ' ' | '/' | '<' | '>'))
        .to_string();

    // a trailing dotted extension doubles as a filter, unless the query
    // already targets folders
    if let Some(dot) = name.rfind('.') {
        if !extensions.iter().any(|e| e == FOLDER_EXT) {
            extensions.push(name[dot..].to_string());
            name.truncate(dot);
            name.truncate(name.trim_end().len());
        }
    }

    for extension in extensions.iter_mut() {
        if extension != FOLDER_EXT && !extension.starts_with('.') {
            extension.insert(0, '.');
        }
    }

    SearchPattern {
        encoded: encoder::encode(&name),
        name,
        extensions,
        extended,
    }
}
