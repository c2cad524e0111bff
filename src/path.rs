//! Path helpers for cache keys
//!
//! Every cache key is a normalized, root-relative path: no leading or trailing
//! slashes, no `.` or `..` components. The empty string is the root directory.

/// Normalize a path for consistent lookup
pub fn normalize_path(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split(['/', '\\']) {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    parts.join("/")
}

/// Parent directory of a normalized path ("" for top-level entries and the root)
pub fn dirname(path: &str) -> &str {
    match path.rfind('/') {
        Some(last_slash) => &path[..last_slash],
        None => "",
    }
}

/// Whether `path` lies strictly below `dir` (component-wise)
pub fn is_within(path: &str, dir: &str) -> bool {
    if dir.is_empty() {
        return !path.is_empty();
    }
    path.len() > dir.len() && path.starts_with(dir) && path.as_bytes()[dir.len()] == b'/'
}

/// Rebase `path` from under `from` to under `to`
///
/// Returns None when `path` is neither `from` nor below it.
pub fn rebase(path: &str, from: &str, to: &str) -> Option<String> {
    if path == from {
        return Some(to.to_string());
    }
    if !is_within(path, from) {
        return None;
    }
    let rest = if from.is_empty() {
        path
    } else {
        &path[from.len() + 1..]
    };
    if to.is_empty() {
        Some(rest.to_string())
    } else {
        Some(format!("{}/{}", to, rest))
    }
}

/// Guess a MIME type from the file extension
pub fn guess_mimetype(path: &str) -> &'static str {
    let ext = match path.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.contains('/') => ext.to_ascii_lowercase(),
        _ => return "application/octet-stream",
    };

    match ext.as_str() {
        "txt" | "text" | "log" => "text/plain",
        "md" | "markdown" => "text/markdown",
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "csv" => "text/csv",
        "js" | "mjs" => "text/javascript",
        "json" => "application/json",
        "xml" => "application/xml",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "gz" => "application/gzip",
        "tar" => "application/x-tar",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "webp" => "image/webp",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "mp4" => "video/mp4",
        _ => "application/octet-stream",
    }
}
