// crates/core/src/filename.rs
//! Filename sanitisation for user-facing names and served artifacts.

use std::sync::OnceLock;

use regex_lite::Regex;
use unicode_normalization::UnicodeNormalization;

fn strip_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^A-Za-z0-9_.-]").expect("valid filename regex"))
}

/// Reduce `name` to a flat ASCII filename that is safe to join onto a
/// directory.
///
/// The name is NFKD-decomposed first, so accented letters keep their base
/// letter and combining marks fall away with the rest of the non-ASCII
/// input. Path separators become word breaks, runs of whitespace collapse
/// into a single `_`, every character outside `[A-Za-z0-9_.-]` is dropped,
/// and leading/trailing dots and underscores are trimmed. The result may be
/// empty.
pub fn secure_filename(name: &str) -> String {
    let spaced: String = name
        .nfkd()
        .filter(char::is_ascii)
        .map(|c| if c == '/' || c == '\\' { ' ' } else { c })
        .collect();
    let joined = spaced.split_whitespace().collect::<Vec<_>>().join("_");
    strip_re()
        .replace_all(&joined, "")
        .trim_matches(|c| c == '.' || c == '_')
        .to_string()
}

/// Build the name shown to the user for a finished download.
pub fn display_name(title: Option<&str>, ext: &str) -> String {
    let title = title.filter(|t| !t.trim().is_empty()).unwrap_or("downloaded_file");
    let name = secure_filename(&format!("{title}.{ext}"));
    if name.is_empty() || name == ext {
        format!("downloaded_file.{ext}")
    } else {
        name
    }
}

/// Whether `name` is already in sanitised form, i.e. safe to look up
/// directly inside the download directory.
pub fn is_secure_filename(name: &str) -> bool {
    !name.is_empty() && secure_filename(name) == name
}
