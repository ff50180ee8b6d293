//! Package discovery: turns a packages directory into a [`PackageSet`].
//!
//! Every immediate subdirectory and every archive (zip container with one
//! of the configured extensions) under the root is one candidate. Each
//! candidate's members are read into memory, its manifest validated, and
//! accepted packages are returned in file-name order.

use crate::manifest::{ManifestError, package_from_files};
use modforge_core::package::{FileEntry, PackageSet};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;
use zip::ZipArchive;

/// Archive extensions recognized by default.
pub const DEFAULT_ARCHIVE_EXTENSIONS: [&str; 2] = ["zip", "modpack"];

// ===========================================================================
// Errors
// ===========================================================================

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// The archive could not be opened or one of its members read.
    #[error("cannot read archive {path}: {detail}")]
    Archive { path: PathBuf, detail: String },

    /// Walking a package directory failed.
    #[error("cannot walk {path}: {detail}")]
    Walk { path: PathBuf, detail: String },

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A candidate that was skipped, and why.
#[derive(Debug)]
pub struct Rejection {
    pub path: PathBuf,
    pub error: LoadError,
}

/// Output of one discovery pass.
#[derive(Debug, Default)]
pub struct Discovery {
    pub packages: PackageSet,
    pub rejected: Vec<Rejection>,
}

// ===========================================================================
// Loader
// ===========================================================================

/// Reads packages from a root directory.
#[derive(Debug, Clone)]
pub struct PackageLoader {
    root: PathBuf,
    archive_extensions: Vec<String>,
}

impl PackageLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            archive_extensions: DEFAULT_ARCHIVE_EXTENSIONS
                .iter()
                .map(|e| e.to_string())
                .collect(),
        }
    }

    /// Replace the recognized archive extensions (compared case-insensitively).
    pub fn with_archive_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.archive_extensions = extensions
            .into_iter()
            .map(|e| e.into().to_ascii_lowercase())
            .collect();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn is_archive(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| {
                self.archive_extensions
                    .iter()
                    .any(|known| known.eq_ignore_ascii_case(ext))
            })
    }

    /// Candidate sources under the root, sorted by file name. A missing
    /// root yields no candidates.
    pub fn candidates(&self) -> Result<Vec<PathBuf>, LoadError> {
        if !self.root.is_dir() {
            info!("packages directory {} does not exist", self.root.display());
            return Ok(Vec::new());
        }

        let mut candidates = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let path = entry?.path();
            if path.is_dir() || (path.is_file() && self.is_archive(&path)) {
                candidates.push(path);
            } else {
                debug!("ignoring {}", path.display());
            }
        }
        candidates.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
        Ok(candidates)
    }

    /// Read every member of one candidate, sorted by relative name.
    pub fn read_members(&self, path: &Path) -> Result<Vec<FileEntry>, LoadError> {
        if path.is_dir() {
            read_directory(path)
        } else {
            read_archive(path)
        }
    }

    /// Discover and validate every candidate. Only a failure to list the
    /// root itself is an error; bad candidates are logged and skipped.
    pub fn load(&self) -> Result<Discovery, LoadError> {
        let mut discovery = Discovery::default();

        for path in self.candidates()? {
            let accepted = self
                .read_members(&path)
                .and_then(|files| Ok(package_from_files(files, &path)?))
                .and_then(|package| {
                    if discovery.packages.contains_key(&package.id) {
                        let error = ManifestError::Duplicate {
                            id: package.id.clone(),
                        };
                        error!("{}: {error}", path.display());
                        return Err(error.into());
                    }
                    Ok(package)
                });

            match accepted {
                Ok(package) => {
                    info!(
                        "loaded package '{}' {} from {}",
                        package.id,
                        package.version,
                        path.display()
                    );
                    discovery.packages.insert(package.id.clone(), package);
                }
                Err(error) => {
                    if !matches!(error, LoadError::Manifest(ManifestError::Duplicate { .. })) {
                        warn!("skipping {}: {error}", path.display());
                    }
                    discovery.rejected.push(Rejection { path, error });
                }
            }
        }

        Ok(discovery)
    }
}

/// `/`-joined form of a relative path, or `None` if it escapes its root.
fn member_name(relative: &Path) -> Option<String> {
    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            Component::CurDir => {}
            _ => return None,
        }
    }
    (!parts.is_empty()).then(|| parts.join("/"))
}

fn read_directory(dir: &Path) -> Result<Vec<FileEntry>, LoadError> {
    let mut files = Vec::new();

    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(|e| LoadError::Walk {
            path: dir.to_path_buf(),
            detail: e.to_string(),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(name) = entry
            .path()
            .strip_prefix(dir)
            .ok()
            .and_then(member_name)
        else {
            continue;
        };
        files.push(FileEntry::new(name, std::fs::read(entry.path())?));
    }

    files.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(files)
}

fn read_archive(path: &Path) -> Result<Vec<FileEntry>, LoadError> {
    let archive_err = |e: zip::result::ZipError| LoadError::Archive {
        path: path.to_path_buf(),
        detail: e.to_string(),
    };
    let mut archive = ZipArchive::new(BufReader::new(File::open(path)?)).map_err(archive_err)?;
    let mut files = Vec::with_capacity(archive.len());

    for i in 0..archive.len() {
        let mut member = archive.by_index(i).map_err(archive_err)?;
        if member.is_dir() {
            continue;
        }
        let Some(name) = member.enclosed_name().and_then(member_name) else {
            warn!(
                "{}: skipping member with unsafe path '{}'",
                path.display(),
                member.name()
            );
            continue;
        };
        let mut bytes = Vec::with_capacity(usize::try_from(member.size()).unwrap_or(0));
        member.read_to_end(&mut bytes)?;
        files.push(FileEntry::new(name, bytes));
    }

    files.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(files)
}

// ===========================================================================
// Tests
// ===========================================================================
