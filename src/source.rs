//! Artifact naming from a document's source identity (a filename, path or URL).

use crate::error::{RetrievalError, RetrievalResult};
use percent_encoding::percent_decode_str;
use std::path::Path;
use url::Url;

pub fn is_remote(source: &str) -> bool {
    Url::parse(source)
        .map(|url| matches!(url.scheme(), "http" | "https"))
        .unwrap_or(false)
}

/// Base name without extension, percent-decoded.
///
/// For `http(s)` sources the last path segment is used, so query strings and fragments
/// never leak into the name. Path separators surviving the decode (`%2F`) are replaced
/// with `_` so a name always maps to a file directly inside the store directory.
pub fn artifact_name(source: &str) -> RetrievalResult<String> {
    let trimmed = source.trim();

    let base = match Url::parse(trimmed) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .unwrap_or_default()
            .to_string(),
        _ => Path::new(trimmed)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default(),
    };

    let decoded = percent_decode_str(&base).decode_utf8_lossy().into_owned();
    let name: String = strip_extension(&decoded)
        .chars()
        .map(|c| if c == '/' || c == '\\' || c == '\0' { '_' } else { c })
        .collect();

    if name.is_empty() || name == "." || name == ".." {
        return Err(RetrievalError::InvalidSource(source.to_string()));
    }
    Ok(name)
}

/// Drop the last `.ext`, keeping names made only of leading dots (`.bashrc`, `..`) intact.
fn strip_extension(name: &str) -> &str {
    match name.rfind('.') {
        Some(dot) if name[..dot].chars().any(|c| c != '.') => &name[..dot],
        _ => name,
    }
}
