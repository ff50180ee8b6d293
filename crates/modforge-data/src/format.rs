//! Format detection and deserialization for manifests and configuration.
//!
//! Structured files may be written as RON, TOML or JSON; the extension
//! decides which parser runs. Package members are already in memory, so
//! lookups work on member names as well as on the filesystem.

use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};

// ===========================================================================
// Errors
// ===========================================================================

#[derive(Debug, thiserror::Error)]
pub enum FormatError {
    /// The file has an extension we don't support.
    #[error("unsupported format for file: {file}")]
    UnsupportedFormat { file: PathBuf },

    /// Two files with the same base name but different formats exist.
    #[error("conflicting formats: {a} and {b}")]
    ConflictingFormats { a: PathBuf, b: PathBuf },

    /// A deserialization error occurred.
    #[error("parse error in {file}: {detail}")]
    Parse { file: PathBuf, detail: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

// ===========================================================================
// Format detection
// ===========================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Ron,
    Toml,
    Json,
}

impl Format {
    pub const EXTENSIONS: [&'static str; 3] = ["ron", "toml", "json"];
}

/// Detect the format of a file based on its extension.
pub fn detect_format(path: &Path) -> Result<Format, FormatError> {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("ron") => Ok(Format::Ron),
        Some("toml") => Ok(Format::Toml),
        Some("json") => Ok(Format::Json),
        _ => Err(FormatError::UnsupportedFormat {
            file: path.to_path_buf(),
        }),
    }
}

/// Pick the member called `{base_name}.{ron,toml,json}` from `names`.
///
/// Returns `Ok(None)` if there is none, or `Err(ConflictingFormats)` if
/// more than one format is present.
pub fn find_member<'a>(
    names: impl IntoIterator<Item = &'a str>,
    base_name: &str,
) -> Result<Option<&'a str>, FormatError> {
    let mut found: Option<&'a str> = None;

    for name in names {
        let Some((stem, ext)) = name.rsplit_once('.') else {
            continue;
        };
        if stem != base_name || !Format::EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()) {
            continue;
        }
        if let Some(existing) = found {
            return Err(FormatError::ConflictingFormats {
                a: PathBuf::from(existing),
                b: PathBuf::from(name),
            });
        }
        found = Some(name);
    }

    Ok(found)
}

// ===========================================================================
// Deserialization
// ===========================================================================

/// Deserialize in-memory content. `origin` only labels errors and picks the
/// format.
pub fn deserialize_bytes<T: DeserializeOwned>(origin: &Path, bytes: &[u8]) -> Result<T, FormatError> {
    let format = detect_format(origin)?;
    let parse_err = |detail: String| FormatError::Parse {
        file: origin.to_path_buf(),
        detail,
    };

    match format {
        Format::Json => serde_json::from_slice(bytes).map_err(|e| parse_err(e.to_string())),
        Format::Ron => {
            let text = std::str::from_utf8(bytes).map_err(|e| parse_err(e.to_string()))?;
            ron::from_str(text).map_err(|e| parse_err(e.to_string()))
        }
        Format::Toml => {
            let text = std::str::from_utf8(bytes).map_err(|e| parse_err(e.to_string()))?;
            toml::from_str(text).map_err(|e| parse_err(e.to_string()))
        }
    }
}

/// Read a file and deserialize it according to its extension.
pub fn deserialize_file<T: DeserializeOwned>(path: &Path) -> Result<T, FormatError> {
    detect_format(path)?;
    let bytes = std::fs::read(path)?;
    deserialize_bytes(path, &bytes)
}

// ===========================================================================
// Tests
// ===========================================================================
