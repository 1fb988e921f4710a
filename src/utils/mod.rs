//! Utility functions and helpers

mod multimap;

use std::path::Path;

use sha2::{Digest, Sha256};

pub use multimap::MultiMap;

/// Generate a hash of the given content
pub fn hash_content(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    let result = hasher.finalize();
    hex::encode(&result[..8])
}

/// Get relative path from base to target, always usable as an ES import specifier
pub fn relative_specifier(from_dir: &Path, to: &Path) -> String {
    let relative = pathdiff::diff_paths(to, from_dir)
        .map(|p| to_unix(&p.display().to_string()))
        .unwrap_or_else(|| to_unix(&to.display().to_string()));

    if relative.starts_with("../") || relative.starts_with("./") {
        relative
    } else {
        format!("./{}", relative)
    }
}

/// Clean a path by removing . and .. components
pub fn clean_path(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();

    for part in path.split('/') {
        match part {
            "" | "." => continue,
            ".." => {
                parts.pop();
            }
            _ => parts.push(part),
        }
    }

    if path.starts_with('/') {
        format!("/{}", parts.join("/"))
    } else {
        parts.join("/")
    }
}

/// Resolve a relative import specifier against the id of the importing module
pub fn join_specifier(importer: &str, specifier: &str) -> String {
    let importer = to_unix(importer);
    let dir = match importer.rfind('/') {
        Some(pos) => &importer[..pos],
        None => "",
    };

    if dir.is_empty() {
        clean_path(specifier)
    } else {
        clean_path(&format!("{}/{}", dir, to_unix(specifier)))
    }
}

/// Whether an import specifier is relative (`./` or `../`)
pub fn is_relative_specifier(specifier: &str) -> bool {
    specifier.starts_with("./") || specifier.starts_with("../")
}

/// Use posix separators, as module ids require
pub fn to_unix(path: &str) -> String {
    path.replace('\\', "/")
}

/// Strip a trailing `.js` extension
pub fn strip_js_extension(name: &str) -> &str {
    name.strip_suffix(".js").unwrap_or(name)
}

/// Turn an output file name into an identifier usable as a global variable
///
/// `dist/another-entry.js` becomes `another_entry`.
pub fn file_namespace(file_name: &str) -> String {
    let unix = to_unix(file_name);
    let base = unix.rsplit('/').next().unwrap_or(&unix);
    let stem = strip_js_extension(base);

    let mut namespace: String = stem
        .chars()
        .map(|c| if is_identifier_char(c) { c } else { '_' })
        .collect();

    if let Some(first) = namespace.chars().next() {
        if !(first.is_ascii_alphabetic() || first == '_' || first == '$') {
            namespace.replace_range(..first.len_utf8(), "_");
        }
    } else {
        namespace.push('_');
    }

    namespace
}

/// Characters allowed in generated identifiers
pub fn is_identifier_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '$'
}

/// Format bytes as human-readable size
pub fn format_size(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = KB * 1024;
    const GB: usize = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Format duration as human-readable string
pub fn format_duration(duration: std::time::Duration) -> String {
    let secs = duration.as_secs_f64();

    if secs >= 60.0 {
        let mins = (secs / 60.0).floor() as u64;
        let remaining_secs = secs - (mins as f64 * 60.0);
        format!("{}m {:.2}s", mins, remaining_secs)
    } else if secs >= 1.0 {
        format!("{:.2}s", secs)
    } else {
        format!("{:.0}ms", secs * 1000.0)
    }
}
