//! Package model shared by the loader, resolver and patch engine.
//!
//! A [`Package`] is created by the loader from a validated manifest and
//! never mutated afterwards except for its [`PackageStatus`], which may only
//! be downgraded.

use indexmap::IndexMap;
use semver::Version;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Id reserved for the host's own content. No package may claim it.
pub const RESERVED_ID: &str = "base";

/// Member file holding a package's patch fragment.
pub const PATCH_FILE: &str = "patch.json";
/// Member file holding a package's localization table.
pub const LOCALIZATION_FILE: &str = "localization.json";
/// Member file holding sprite metadata.
pub const SPRITES_FILE: &str = "sprites.json";
/// Base name of the manifest member (extension selects the format).
pub const MANIFEST_BASE_NAME: &str = "manifest";

/// Whether `id` is acceptable as a package id: non-empty, lowercase ASCII
/// letters and underscores only, and not the reserved host id.
pub fn is_valid_package_id(id: &str) -> bool {
    !id.is_empty() && id != RESERVED_ID && id.bytes().all(|b| b.is_ascii_lowercase() || b == b'_')
}

/// Outcome of loading a package.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageStatus {
    Success,
    Error,
    DependenciesUnsatisfied,
}

impl fmt::Display for PackageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PackageStatus::Success => f.write_str("success"),
            PackageStatus::Error => f.write_str("error"),
            PackageStatus::DependenciesUnsatisfied => f.write_str("dependencies unsatisfied"),
        }
    }
}

/// A dependency declared by a package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    pub id: String,
    #[serde(default)]
    pub min: Option<Version>,
    #[serde(default)]
    pub max: Option<Version>,
    #[serde(default = "default_true")]
    pub required: bool,
}

fn default_true() -> bool {
    true
}

impl Dependency {
    /// A required dependency with no version bounds.
    pub fn on(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            min: None,
            max: None,
            required: true,
        }
    }

    /// Whether `version` lies inside `[min, max]`. Missing bounds are open.
    pub fn accepts(&self, version: &Version) -> bool {
        self.min.as_ref().is_none_or(|min| version >= min)
            && self.max.as_ref().is_none_or(|max| version <= max)
    }
}

/// What a member file is used for, decided by its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileRole {
    Patch,
    Localization,
    SpriteInfo,
    Image,
    Audio,
    ManagedCode,
    Other,
}

/// One member file of a package. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// Path relative to the package root, `/`-separated.
    pub name: String,
    pub bytes: Vec<u8>,
}

impl FileEntry {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    /// The final path component.
    pub fn file_name(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or(&self.name)
    }

    /// The file name without its extension.
    pub fn stem(&self) -> &str {
        let file = self.file_name();
        file.rsplit_once('.').map_or(file, |(stem, _)| stem)
    }

    pub fn extension(&self) -> Option<String> {
        self.file_name()
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
    }

    /// Well-known members are only recognized at the package root.
    pub fn role(&self) -> FileRole {
        match self.name.as_str() {
            PATCH_FILE => return FileRole::Patch,
            LOCALIZATION_FILE => return FileRole::Localization,
            SPRITES_FILE => return FileRole::SpriteInfo,
            _ => {}
        }
        match self.extension().as_deref() {
            Some("png") => FileRole::Image,
            Some("wav") => FileRole::Audio,
            Some("dll") => FileRole::ManagedCode,
            _ => FileRole::Other,
        }
    }
}

/// A loaded content package.
#[derive(Debug, Clone)]
pub struct Package {
    pub id: String,
    pub display_name: String,
    pub description: Option<String>,
    pub version: Version,
    pub authors: Vec<String>,
    pub dependencies: Vec<Dependency>,
    pub client_only: bool,
    pub files: Vec<FileEntry>,
    /// Where the package was read from, if it came from disk.
    pub source: Option<PathBuf>,
    status: PackageStatus,
    problems: Vec<String>,
}

impl Package {
    pub fn new(id: impl Into<String>, version: Version, authors: Vec<String>) -> Self {
        let id = id.into();
        Self {
            display_name: id.clone(),
            id,
            description: None,
            version,
            authors,
            dependencies: Vec::new(),
            client_only: false,
            files: Vec::new(),
            source: None,
            status: PackageStatus::Success,
            problems: Vec::new(),
        }
    }

    pub fn status(&self) -> PackageStatus {
        self.status
    }

    pub fn is_success(&self) -> bool {
        self.status == PackageStatus::Success
    }

    /// Downgrade the status and record why. A package that has already
    /// left `Success` keeps its first failure status.
    pub fn fail(&mut self, status: PackageStatus, problem: impl Into<String>) {
        if self.status == PackageStatus::Success {
            self.status = status;
        }
        self.problems.push(problem.into());
    }

    /// Record a non-fatal problem without touching the status.
    pub fn warn(&mut self, problem: impl Into<String>) {
        self.problems.push(problem.into());
    }

    pub fn problems(&self) -> &[String] {
        &self.problems
    }

    /// Look up a member file by its relative name.
    pub fn file(&self, name: &str) -> Option<&FileEntry> {
        self.files.iter().find(|f| f.name == name)
    }

    /// Member files with the given role, in load order.
    pub fn files_with_role(&self, role: FileRole) -> impl Iterator<Item = &FileEntry> {
        self.files.iter().filter(move |f| f.role() == role)
    }

    /// The patch fragment member, if the package ships one.
    pub fn patch_file(&self) -> Option<&FileEntry> {
        self.file(PATCH_FILE)
    }
}

/// Packages keyed by id, in insertion (enumeration) order.
pub type PackageSet = IndexMap<String, Package>;
