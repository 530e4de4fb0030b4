//! File identifier extraction from share links and raw ids.
//!
//! Users paste whatever the drive UI gives them: a bare id, a
//! `/file/d/{id}/view` link, or an `open?id={id}` link. Everything is reduced
//! to the bare id before it reaches the upstream API.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use crate::relay::RelayError;

/// Patterns tried in priority order; the first capture wins.
static FILE_ID_PATTERNS: LazyLock<[Regex; 3]> = LazyLock::new(|| {
    [
        Regex::new(r"/file/d/([A-Za-z0-9_-]+)").expect("static pattern"),
        Regex::new(r"[?&]id=([A-Za-z0-9_-]+)").expect("static pattern"),
        Regex::new(r"/open\?id=([A-Za-z0-9_-]+)").expect("static pattern"),
    ]
});

/// Extracts a file id from a share URL, or returns the trimmed input.
///
/// Total and idempotent: extracting from an already extracted id is a no-op.
///
/// # Examples
/// ```
/// use drivecast_core::identifier::extract_file_id;
///
/// assert_eq!(extract_file_id("https://drive.example.com/file/d/ABC123/view"), "ABC123");
/// assert_eq!(extract_file_id("  RAWID42  "), "RAWID42");
/// ```
pub fn extract_file_id(raw: &str) -> String {
    let trimmed = raw.trim();

    FILE_ID_PATTERNS
        .iter()
        .find_map(|pattern| pattern.captures(trimmed))
        .and_then(|captures| captures.get(1))
        .map_or_else(|| trimmed.to_string(), |id| id.as_str().to_string())
}

/// Returns true if `c` may appear in a file id.
pub fn is_file_id_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

/// Validated upstream file identifier.
///
/// Non-empty and restricted to `[A-Za-z0-9_-]`, so it can be placed in a URL
/// path segment without escaping.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileId(String);

impl FileId {
    /// Runs extraction on `raw` and validates the result.
    ///
    /// # Errors
    ///
    /// - `RelayError::MissingIdentifier` - If nothing is left after extraction
    /// - `RelayError::InvalidIdentifier` - If the result contains characters outside `[A-Za-z0-9_-]`
    pub fn parse(raw: &str) -> Result<Self, RelayError> {
        let id = extract_file_id(raw);

        if id.is_empty() {
            return Err(RelayError::MissingIdentifier);
        }

        if !id.chars().all(is_file_id_char) {
            return Err(RelayError::InvalidIdentifier { id });
        }

        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
