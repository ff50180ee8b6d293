//! Modforge Core -- ordering and merging of content packages into a
//! versioned base document.
//!
//! This crate holds the parts of the content pipeline that do not touch the
//! filesystem: the package model, dependency resolution, identifier
//! allocation and the patch merge engine. Reading packages from disk lives
//! in `modforge-data`.
//!
//! # Pipeline
//!
//! 1. **Resolve** -- [`resolver::resolve`] checks declared dependencies and
//!    computes a topological application order (or a [`resolver::CycleError`]).
//! 2. **Allocate** -- new entries (`"idx": -1`) receive indices from the
//!    [`session::Session`] counters, seeded above every built-in index.
//! 3. **Merge** -- [`patch::apply_in_order`] folds each package's fragment
//!    into the base document, isolating failures per package.
//!
//! # Key Types
//!
//! - [`package::Package`] -- manifest data, member files and load status.
//! - [`session::Session`] -- base document, identifier tables, counters and
//!   side tables for one run.
//! - [`registry::IdentifierRegistry`] -- per-category name ↔ index tables.
//! - [`category::Category`] -- the closed set of content categories.
//! - [`merge`] -- array marker semantics and recursive object merge.

pub mod category;
pub mod id;
pub mod merge;
pub mod package;
pub mod patch;
pub mod registry;
pub mod resolver;
pub mod session;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
