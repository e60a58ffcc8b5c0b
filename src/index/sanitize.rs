//! Path sanitization for freshness-driver input (spec §4.6).
//!
//! Version-control drivers (`git diff --name-only`, `git status --porcelain`)
//! commonly quote paths containing special characters and escape non-ASCII
//! bytes as octal sequences (`"caf\\303\\251.ts"`). Before any such path is
//! used to look up or enqueue a file, it is normalized here; paths that
//! cannot be made sense of are dropped with a diagnostic rather than passed
//! through (spec §7 `PathSanitizationFailure`).

use crate::error::IndexError;

/// Sanitize one path string reported by an external driver.
///
/// Returns `Err` only when the input cannot be interpreted as a path at
/// all (e.g. an odd-length trailing octal escape); a path that is merely
/// unusual (leading dot, unicode name) is still accepted.
pub fn sanitize_path(raw: &str) -> Result<String, IndexError> {
    let stripped = strip_surrounding_quotes(raw);
    let unescaped = decode_octal_escapes(stripped)?;
    let normalized = unescaped.replace('\\', "/");
    if normalized.is_empty() {
        return Err(IndexError::PathSanitizationFailure {
            path: raw.to_string(),
            reason: "empty path after sanitization".to_string(),
        });
    }
    Ok(normalized)
}

fn strip_surrounding_quotes(s: &str) -> &str {
    let trimmed = s.trim();
    if trimmed.len() >= 2 && trimmed.starts_with('"') && trimmed.ends_with('"') {
        &trimmed[1..trimmed.len() - 1]
    } else {
        trimmed
    }
}

/// Decode `git`-style octal byte escapes (`\NNN`) and drop stray embedded
/// quote characters the escaping sometimes leaves behind.
fn decode_octal_escapes(s: &str) -> Result<String, IndexError> {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 3 < bytes.len() && bytes[i + 1..i + 4].iter().all(u8::is_ascii_digit) {
            let octal_str = std::str::from_utf8(&bytes[i + 1..i + 4]).map_err(|_| {
                IndexError::PathSanitizationFailure {
                    path: s.to_string(),
                    reason: "invalid octal escape".to_string(),
                }
            })?;
            let byte = u8::from_str_radix(octal_str, 8).map_err(|_| IndexError::PathSanitizationFailure {
                path: s.to_string(),
                reason: "invalid octal escape".to_string(),
            })?;
            out.push(byte);
            i += 4;
        } else if bytes[i] == b'"' {
            i += 1;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).map_err(|_| IndexError::PathSanitizationFailure {
        path: s.to_string(),
        reason: "not valid UTF-8 after decoding".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_surrounding_quotes() {
        assert_eq!(sanitize_path("\"src/a.ts\"").unwrap(), "src/a.ts");
    }

    #[test]
    fn decodes_octal_escaped_utf8() {
        // "café.ts" as git would escape the é (U+00E9, UTF-8 0xC3 0xA9)
        let escaped = "caf\\303\\251.ts";
        assert_eq!(sanitize_path(escaped).unwrap(), "café.ts");
    }

    #[test]
    fn normalizes_backslash_separators() {
        assert_eq!(sanitize_path("src\\a.ts").unwrap(), "src/a.ts");
    }

    #[test]
    fn rejects_empty_path() {
        assert!(sanitize_path("\"\"").is_err());
    }

    #[test]
    fn plain_paths_pass_through_unchanged() {
        assert_eq!(sanitize_path("src/components/Page.tsx").unwrap(), "src/components/Page.tsx");
    }
}
