//! Fixed text patches applied to the cloned sources.
//!
//! Each patch is a pure `&str -> String` transform so it can be exercised
//! without cloning anything. A patch whose target is missing fails instead of
//! silently producing an unpatched build.

use anyhow::{Context, Result};
use regex::Regex;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

/// First removed line (0-based) in librespot's `core/src/session.rs`.
pub const SESSION_SPLICE_START: usize = 254;
/// Number of lines removed from `session.rs`.
pub const SESSION_SPLICE_LEN: usize = 9;

const CARGO_GIT_DEPENDENCY: &str =
    r#"git = "https://github.com/librespot-org/librespot", branch = "dev""#;
const CARGO_PATH_DEPENDENCY: &str = r#"path = "./librespot-custom""#;

const BITRATE_PATTERN: &str = r#"(?s)Bitrate::from_str\(obj\.get::<JsString, _, _>\(cx, "bitrate"\)\?\.value\(cx\)\.as_str\(\)\).\s+\.unwrap_or_default\(\)"#;
const BITRATE_REPLACEMENT: &str = "Bitrate::Bitrate160";

#[derive(Debug, Error)]
pub enum PatchError {
    #[error("File has {lines} lines, expected at least {required}")]
    TooShort { lines: usize, required: usize },

    #[error("Patch target not found: {0}")]
    NotFound(&'static str),

    #[error("Invalid patch pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// Removes the session lines that reject the addon's client id.
pub fn patch_session(text: &str) -> Result<String, PatchError> {
    let mut lines: Vec<&str> = text.split('\n').collect();
    let required = SESSION_SPLICE_START + SESSION_SPLICE_LEN;
    if lines.len() < required {
        return Err(PatchError::TooShort {
            lines: lines.len(),
            required,
        });
    }

    lines.drain(SESSION_SPLICE_START..required);
    Ok(lines.join("\n"))
}

/// Points the addon's librespot dependency at the local checkout.
pub fn patch_cargo(text: &str) -> Result<String, PatchError> {
    if !text.contains(CARGO_GIT_DEPENDENCY) {
        return Err(PatchError::NotFound("librespot git dependency in Cargo.toml"));
    }
    Ok(text.replace(CARGO_GIT_DEPENDENCY, CARGO_PATH_DEPENDENCY))
}

/// Pins the requested bitrate to 160 kbps.
pub fn patch_bitrate(text: &str) -> Result<String, PatchError> {
    let re = Regex::new(BITRATE_PATTERN)?;
    if !re.is_match(text) {
        return Err(PatchError::NotFound("bitrate parsing in utils.rs"));
    }
    Ok(re.replace_all(text, BITRATE_REPLACEMENT).into_owned())
}

/// Reads `path`, applies `patch` and writes the result back.
pub async fn apply_to_file<F>(path: &Path, patch: F) -> Result<()>
where
    F: FnOnce(&str) -> Result<String, PatchError>,
{
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let patched = patch(&text).with_context(|| format!("Failed to patch {}", path.display()))?;

    tokio::fs::write(path, patched)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;

    debug!("Patched {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn numbered_lines(n: usize) -> String {
        (0..n)
            .map(|i| format!("line {}", i))
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn test_patch_session_removes_nine_lines() {
        let text = numbered_lines(300);
        let patched = patch_session(&text).unwrap();
        let lines: Vec<&str> = patched.split('\n').collect();

        assert_eq!(lines.len(), 291);
        assert_eq!(lines[253], "line 253");
        assert_eq!(lines[254], "line 263");
        assert!(!patched.contains("line 254\n"));
        assert!(!patched.contains("line 262\n"));
    }

    #[test]
    fn test_patch_session_preserves_trailing_newline() {
        let text = format!("{}\n", numbered_lines(270));
        assert!(patch_session(&text).unwrap().ends_with("line 269\n"));
    }

    #[test]
    fn test_patch_session_exact_minimum() {
        let patched = patch_session(&numbered_lines(263)).unwrap();
        assert_eq!(patched.split('\n').count(), 254);
    }

    #[test]
    fn test_patch_session_too_short() {
        let err = patch_session(&numbered_lines(100)).unwrap_err();
        assert!(matches!(
            err,
            PatchError::TooShort {
                lines: 100,
                required: 263
            }
        ));
    }

    #[test]
    fn test_patch_cargo() {
        let toml = r#"[dependencies]
librespot = { git = "https://github.com/librespot-org/librespot", branch = "dev" }
neon = "0.10"
"#;
        let patched = patch_cargo(toml).unwrap();
        assert!(patched.contains(r#"librespot = { path = "./librespot-custom" }"#));
        assert!(!patched.contains("github.com/librespot-org"));
        assert!(patched.contains(r#"neon = "0.10""#));
    }

    #[test]
    fn test_patch_cargo_missing_target() {
        let err = patch_cargo("[dependencies]\nneon = \"0.10\"\n").unwrap_err();
        assert!(matches!(err, PatchError::NotFound(_)));
    }

    #[test]
    fn test_patch_bitrate_across_lines() {
        let source = r#"let config = PlayerConfig {
    bitrate: Bitrate::from_str(obj.get::<JsString, _, _>(cx, "bitrate")?.value(cx).as_str())
        .unwrap_or_default(),
    ..Default::default()
};"#;
        let patched = patch_bitrate(source).unwrap();
        assert!(patched.contains("bitrate: Bitrate::Bitrate160,"));
        assert!(!patched.contains("from_str"));
    }

    #[test]
    fn test_patch_bitrate_missing_target() {
        let err = patch_bitrate("bitrate: Bitrate::Bitrate320,").unwrap_err();
        assert!(matches!(err, PatchError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_apply_to_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("Cargo.toml");
        std::fs::write(
            &path,
            r#"librespot = { git = "https://github.com/librespot-org/librespot", branch = "dev" }"#,
        )
        .unwrap();

        apply_to_file(&path, patch_cargo).await.unwrap();

        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            r#"librespot = { path = "./librespot-custom" }"#
        );
    }

    #[tokio::test]
    async fn test_apply_to_file_leaves_file_on_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("session.rs");
        std::fs::write(&path, "short").unwrap();

        let err = apply_to_file(&path, patch_session).await.unwrap_err();
        assert!(err.to_string().contains("Failed to patch"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "short");
    }

    #[tokio::test]
    async fn test_apply_to_missing_file() {
        let temp = TempDir::new().unwrap();
        assert!(apply_to_file(&temp.path().join("nope.rs"), patch_cargo)
            .await
            .is_err());
    }
}
