//! Modforge Data -- reading content packages from disk and running the
//! full loading pipeline.
//!
//! - [`loader`] discovers package directories and zip archives.
//! - [`manifest`] validates package manifests (RON, TOML or JSON).
//! - [`config`] persists package configuration and renders config
//!   placeholders in patch fragments.
//! - [`assets`] indexes localization, sprite and audio members.
//! - [`pipeline`] ties everything to `modforge-core` via [`load_content`].

pub mod assets;
pub mod config;
pub mod format;
pub mod loader;
pub mod manifest;
pub mod pipeline;

pub use loader::{LoadError, PackageLoader};
pub use pipeline::{LoadReport, LoadedContent, PipelineConfig, load_content, load_content_with};
