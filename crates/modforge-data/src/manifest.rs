//! Package manifest schema and validation.
//!
//! The manifest is the `manifest.{json,toml,ron}` member at a package's
//! root. [`validate`] turns the raw schema into a [`Package`] or explains
//! why the candidate must be skipped.

use crate::format::{Format, FormatError, deserialize_bytes, find_member};
use modforge_core::package::{
    Dependency, FileEntry, MANIFEST_BASE_NAME, Package, RESERVED_ID, is_valid_package_id,
};
use semver::Version;
use serde::Deserialize;
use std::path::{Path, PathBuf};

// ===========================================================================
// Schema
// ===========================================================================

/// Manifest as written by package authors. Every field is optional here so
/// that validation can report which one is missing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ManifestData {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default)]
    pub dependencies: Vec<Dependency>,
    #[serde(default)]
    pub client: bool,
}

// ===========================================================================
// Errors
// ===========================================================================

/// Why a candidate package was rejected.
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("no manifest found in {path}")]
    Missing { path: PathBuf },

    #[error("manifest of {path} has no id")]
    MissingId { path: PathBuf },

    #[error("invalid package id '{id}' in {path} (lowercase letters and '_' only)")]
    InvalidId { path: PathBuf, id: String },

    #[error("package id 'base' is reserved (in {path})")]
    ReservedId { path: PathBuf },

    #[error("package '{id}' has no version")]
    MissingVersion { id: String },

    #[error("package '{id}' has invalid version '{version}': {detail}")]
    InvalidVersion {
        id: String,
        version: String,
        detail: String,
    },

    #[error("package '{id}' lists no authors")]
    NoAuthors { id: String },

    #[error("package '{id}' is already loaded")]
    Duplicate { id: String },

    #[error(transparent)]
    Format(#[from] FormatError),
}

// ===========================================================================
// Reading and validation
// ===========================================================================

/// Locate and parse the manifest among `files`. `origin` names the package
/// source in errors.
pub fn read_manifest(files: &[FileEntry], origin: &Path) -> Result<ManifestData, ManifestError> {
    let name = find_member(files.iter().map(|f| f.name.as_str()), MANIFEST_BASE_NAME)?
        .ok_or_else(|| ManifestError::Missing {
            path: origin.to_path_buf(),
        })?;
    let entry = files
        .iter()
        .find(|f| f.name == name)
        .ok_or_else(|| ManifestError::Missing {
            path: origin.to_path_buf(),
        })?;
    Ok(deserialize_bytes(&origin.join(name), &entry.bytes)?)
}

/// Check the manifest and build a `Success` package owning `files`
/// (manifest excluded).
pub fn validate(
    manifest: ManifestData,
    files: Vec<FileEntry>,
    origin: &Path,
) -> Result<Package, ManifestError> {
    let id = manifest.id.ok_or_else(|| ManifestError::MissingId {
        path: origin.to_path_buf(),
    })?;
    if id == RESERVED_ID {
        return Err(ManifestError::ReservedId {
            path: origin.to_path_buf(),
        });
    }
    if !is_valid_package_id(&id) {
        return Err(ManifestError::InvalidId {
            path: origin.to_path_buf(),
            id,
        });
    }

    let raw_version = manifest
        .version
        .ok_or_else(|| ManifestError::MissingVersion { id: id.clone() })?;
    let version = Version::parse(raw_version.trim()).map_err(|e| ManifestError::InvalidVersion {
        id: id.clone(),
        version: raw_version.clone(),
        detail: e.to_string(),
    })?;

    if manifest.authors.is_empty() {
        return Err(ManifestError::NoAuthors { id });
    }

    let mut package = Package::new(id, version, manifest.authors);
    if let Some(name) = manifest.name {
        package.display_name = name;
    }
    package.description = manifest.description;
    package.dependencies = manifest.dependencies;
    package.client_only = manifest.client;
    package.files = files
        .into_iter()
        .filter(|f| !is_manifest_member(&f.name))
        .collect();
    package.source = Some(origin.to_path_buf());
    Ok(package)
}

fn is_manifest_member(name: &str) -> bool {
    name.rsplit_once('.').is_some_and(|(stem, ext)| {
        stem == MANIFEST_BASE_NAME && Format::EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str())
    })
}

/// [`read_manifest`] followed by [`validate`].
pub fn package_from_files(files: Vec<FileEntry>, origin: &Path) -> Result<Package, ManifestError> {
    let manifest = read_manifest(&files, origin)?;
    validate(manifest, files, origin)
}

// ===========================================================================
// Tests
// ===========================================================================
