//! End-to-end content loading: discover, resolve, merge, index assets.
//!
//! [`load_content`] is the single entry point a host calls at startup. It
//! never fails because of one bad package; only an unreadable packages
//! directory, an invalid base document or a broken pipeline config abort
//! the run. A dependency cycle skips the merge phase and is reported.

use crate::assets::AssetTables;
use crate::config::TemplatedPatches;
use crate::format::{FormatError, deserialize_file};
use crate::loader::{DEFAULT_ARCHIVE_EXTENSIONS, LoadError, PackageLoader};
use modforge_core::package::{PackageSet, PackageStatus};
use modforge_core::patch::apply_in_order;
use modforge_core::resolver::{CycleError, resolve};
use modforge_core::session::{
    DEFAULT_CLIMATE_OFFSET, DEFAULT_RESERVED_OFFSET, Session, SessionBuilder, SessionError,
};
use semver::Version;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

// ===========================================================================
// Configuration
// ===========================================================================

/// Settings for one pipeline run. Every field has a default, so a config
/// file only needs the fields it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub packages_dir: PathBuf,
    pub config_dir: PathBuf,
    pub reserved_offset: u32,
    pub climate_offset: u32,
    /// Version the reserved `base` dependency is checked against.
    pub host_version: Option<Version>,
    pub archive_extensions: Vec<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            packages_dir: PathBuf::from("mods"),
            config_dir: PathBuf::from("config"),
            reserved_offset: DEFAULT_RESERVED_OFFSET,
            climate_offset: DEFAULT_CLIMATE_OFFSET,
            host_version: None,
            archive_extensions: DEFAULT_ARCHIVE_EXTENSIONS
                .iter()
                .map(|e| e.to_string())
                .collect(),
        }
    }
}

impl PipelineConfig {
    /// Read a RON, TOML or JSON config file.
    pub fn from_file(path: &Path) -> Result<Self, FormatError> {
        deserialize_file(path)
    }

    /// A default config rooted at `dir` (`dir/mods`, `dir/config`).
    pub fn rooted_at(dir: &Path) -> Self {
        Self {
            packages_dir: dir.join("mods"),
            config_dir: dir.join("config"),
            ..Self::default()
        }
    }
}

// ===========================================================================
// Errors and report
// ===========================================================================

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Final state of one accepted package.
#[derive(Debug, Clone, PartialEq)]
pub struct PackageReport {
    pub id: String,
    pub version: Version,
    pub status: PackageStatus,
    pub problems: Vec<String>,
}

/// A package source the loader skipped.
#[derive(Debug, Clone, PartialEq)]
pub struct RejectedSource {
    pub path: PathBuf,
    pub reason: String,
}

/// Summary of a pipeline run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadReport {
    /// Resolver order: merged packages first, then the rest. Empty when a
    /// cycle skipped the merge.
    pub order: Vec<String>,
    /// Every accepted package, in discovery order.
    pub packages: Vec<PackageReport>,
    pub rejected: Vec<RejectedSource>,
    /// Set when a dependency cycle skipped the merge phase.
    pub cycle: Option<CycleError>,
}

impl LoadReport {
    pub fn cycle_skipped(&self) -> bool {
        self.cycle.is_some()
    }

    pub fn package(&self, id: &str) -> Option<&PackageReport> {
        self.packages.iter().find(|p| p.id == id)
    }

    pub fn count(&self, status: PackageStatus) -> usize {
        self.packages.iter().filter(|p| p.status == status).count()
    }
}

impl fmt::Display for LoadReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} packages loaded, {} ok, {} rejected",
            self.packages.len(),
            self.count(PackageStatus::Success),
            self.rejected.len()
        )?;
        if let Some(cycle) = &self.cycle {
            writeln!(f, "merge skipped: {cycle}")?;
        }
        for package in &self.packages {
            writeln!(f, "  {} {}: {}", package.id, package.version, package.status)?;
            for problem in &package.problems {
                writeln!(f, "    - {problem}")?;
            }
        }
        for rejected in &self.rejected {
            writeln!(f, "  rejected {}: {}", rejected.path.display(), rejected.reason)?;
        }
        Ok(())
    }
}

/// Everything a run produces.
#[derive(Debug)]
pub struct LoadedContent {
    pub session: Session,
    pub packages: PackageSet,
    pub assets: AssetTables,
    pub report: LoadReport,
}

// ===========================================================================
// Pipeline
// ===========================================================================

/// Run the pipeline over `base_document` with no extra built-in names.
pub fn load_content(
    config: &PipelineConfig,
    base_document: Value,
) -> Result<LoadedContent, PipelineError> {
    load_content_with(config, Session::builder(base_document))
}

/// Run the pipeline with a caller-prepared session builder (for built-in
/// skins and climates). The config's offsets override the builder's.
pub fn load_content_with(
    config: &PipelineConfig,
    session: SessionBuilder,
) -> Result<LoadedContent, PipelineError> {
    let mut session = session
        .reserved_offset(config.reserved_offset)
        .climate_offset(config.climate_offset)
        .build()?;

    let discovery = PackageLoader::new(&config.packages_dir)
        .with_archive_extensions(config.archive_extensions.iter().cloned())
        .load()?;
    let mut packages = discovery.packages;
    let rejected = discovery
        .rejected
        .into_iter()
        .map(|r| RejectedSource {
            path: r.path,
            reason: r.error.to_string(),
        })
        .collect();

    let mut assets = AssetTables::new();
    let (order, cycle) = match resolve(&mut packages, config.host_version.as_ref()) {
        Ok(resolution) => {
            let mut source = TemplatedPatches::new(&config.config_dir);
            let outcome = apply_in_order(&mut session, &mut packages, &resolution.order, &mut source);
            info!(
                "merged {} packages, {} failed",
                outcome.applied.len(),
                outcome.failed.len()
            );

            for id in &resolution.order {
                let Some(package) = packages.get_mut(id) else {
                    continue;
                };
                if !package.is_success() {
                    continue;
                }
                if let Err(e) = assets.register_package(package) {
                    warn!("{e}");
                    package.warn(e.to_string());
                }
            }
            (resolution.order, None)
        }
        Err(cycle) => {
            warn!("skipping patch merge: {cycle}");
            (Vec::new(), Some(cycle))
        }
    };

    let report = LoadReport {
        order,
        packages: packages
            .values()
            .map(|p| PackageReport {
                id: p.id.clone(),
                version: p.version.clone(),
                status: p.status(),
                problems: p.problems().to_vec(),
            })
            .collect(),
        rejected,
        cycle,
    };
    info!(
        "content loading finished: {} of {} packages ok",
        report.count(PackageStatus::Success),
        report.packages.len()
    );

    Ok(LoadedContent {
        session,
        packages,
        assets,
        report,
    })
}

// ===========================================================================
// Tests
// ===========================================================================
