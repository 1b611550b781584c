//! Lexical helpers shared by the sandbox and the providers. Store keys are always
//! root-relative, `/`-separated and carry no leading or trailing separator.

pub(crate) fn is_separator(c: char) -> bool {
    c == '/' || c == '\\'
}

/// Non-empty segments of `path`, accepting both separator styles.
pub(crate) fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split(is_separator).filter(|s| !s.is_empty())
}

/// Drive designator (`X:`) at the start of `path`, if any. The designator must be the
/// whole first segment, so `a:b.txt` is a plain file name.
pub(crate) fn drive_prefix(path: &str) -> Option<&str> {
    let bytes = path.as_bytes();
    let ends_segment = bytes.get(2).is_none_or(|&c| is_separator(c as char));
    if bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' && ends_segment {
        Some(&path[..2])
    } else {
        None
    }
}

/// `true` for paths anchored to a filesystem root or a drive.
pub(crate) fn is_rooted(path: &str) -> bool {
    path.starts_with(is_separator) || drive_prefix(path).is_some()
}

/// Collapses `.` and `..` segments. `..` never climbs above the first segment.
pub(crate) fn collapse<'a>(parts: impl Iterator<Item = &'a str>) -> Vec<&'a str> {
    let mut result: Vec<&str> = Vec::new();
    for part in parts {
        match part {
            "." => {}
            ".." => {
                result.pop();
            }
            _ => result.push(part),
        }
    }
    result
}

/// Canonical key form of `path`: separators unified, no leading/trailing separator.
pub(crate) fn normalize_key(path: &str) -> String {
    collapse(segments(path)).join("/")
}

pub(crate) fn join_key(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{parent}/{name}")
    }
}

/// Last segment of a key (the key itself when it has no separator).
pub(crate) fn file_name(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}

/// Every ancestor of `key`, outermost first (`a/b/c` → `a`, `a/b`).
pub(crate) fn ancestors(key: &str) -> Vec<&str> {
    key.match_indices('/').map(|(idx, _)| &key[..idx]).collect()
}

/// Listing prefix for the directory `key` (`""` for the store root).
pub(crate) fn dir_prefix(key: &str) -> String {
    if key.is_empty() {
        String::new()
    } else {
        format!("{key}/")
    }
}
