//! Shared test helpers for integration tests and benchmarks.
//!
//! Gated behind `#[cfg(any(test, feature = "test-utils"))]` so these helpers
//! are available in unit tests, integration tests, and benchmarks (via the
//! `test-utils` feature).

use crate::category::Category;
use crate::package::{Dependency, FileEntry, PATCH_FILE, Package, PackageSet};
use crate::session::Session;
use semver::Version;
use serde_json::{Value, json};

// ===========================================================================
// Packages
// ===========================================================================

pub fn version(s: &str) -> Version {
    Version::parse(s).expect("valid test version")
}

/// A `Success` package at 1.0.0 with required, unbounded dependencies.
pub fn make_package(id: &str, deps: &[&str]) -> Package {
    let mut package = Package::new(id, version("1.0.0"), vec!["tester".to_string()]);
    package.dependencies = deps.iter().map(|d| Dependency::on(*d)).collect();
    package
}

/// Attach `patch` as the package's `patch.json`.
pub fn with_patch(mut package: Package, patch: Value) -> Package {
    package
        .files
        .push(FileEntry::new(PATCH_FILE, patch.to_string().into_bytes()));
    package
}

pub fn package_set(packages: Vec<Package>) -> PackageSet {
    packages.into_iter().map(|p| (p.id.clone(), p)).collect()
}

// ===========================================================================
// Base document
// ===========================================================================

/// A small base document with a few entries per category.
pub fn sample_document() -> Value {
    json!({
        "tribeData": {
            "bardur": {"idx": 1, "climate": 1, "skins": ["classic"], "startingUnit": "warrior"},
            "oumaji": {"idx": 2, "climate": 2, "skins": [], "startingUnit": "rider"}
        },
        "unitData": {
            "warrior": {"idx": 2, "health": 100, "attack": 2, "abilities": ["dash", "fortify"]},
            "rider": {"idx": 3, "health": 100, "attack": 2, "abilities": ["dash", "escape"]},
            "giant": {"idx": 10, "health": 400, "attack": 5, "abilities": []}
        },
        "improvementData": {
            "farm": {"idx": 5, "cost": 5},
            "sawmill": {"idx": 12, "cost": 5}
        },
        "resourceData": {
            "fruit": {"idx": 1},
            "game": {"idx": 2}
        },
        "terrainData": {
            "field": {"idx": 1},
            "forest": {"idx": 3}
        },
        "techData": {
            "riding": {"idx": 1, "cost": 1, "unlocks": ["rider"]}
        },
        "taskData": {
            "pacifist": {"idx": 1}
        }
    })
}

/// A session over [`sample_document`] with the built-in skin `classic`.
pub fn sample_session() -> Session {
    Session::builder(sample_document())
        .builtin(Category::Skin, "classic", 1)
        .builtin(Category::Climate, "bardur", 1)
        .builtin(Category::Climate, "oumaji", 2)
        .build()
        .expect("sample session builds")
}
