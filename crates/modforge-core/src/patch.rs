//! Patch engine: folds package patch fragments into the session's base
//! document.
//!
//! Applying one fragment runs four passes:
//!
//! 1. **Allocation** -- every `category -> id -> object` whose `idx` is
//!    [`SENTINEL_IDX`] gets a fresh index from the session, plus the
//!    category's [`AllocationHook`] side effects. Tribe `preview` lists move
//!    into the session's preview table.
//! 2. **Skins** -- tribe `skins` lists register new skin names, accumulate
//!    with the document's existing list and drop `-name` removals. The
//!    result is written straight into the document.
//! 3. **Skin data** -- the top-level `skinData` section attaches attributes
//!    to known skins and is then discarded.
//! 4. **Merge** -- the remaining fragment is deep-merged via
//!    [`merge_value`].
//!
//! `skinData` is parsed and every tribe's skin list is computed before the
//! document is written, so a failing fragment leaves the document as it
//! was. Nothing else is rolled back: indices allocated and previews
//! recorded before the failure stay in the session.

use crate::category::{AllocationHook, Category};
use crate::id::{ContentIdx, IDX_FIELD, SENTINEL_IDX};
use crate::merge::{APPEND_ARRAY, merge_value};
use crate::package::{Package, PackageSet, PackageStatus};
use crate::registry::RegistryError;
use crate::session::{PreviewTile, Session, SkinInfo};
use serde_json::{Map, Value};
use tracing::{debug, error, info, warn};

/// Top-level patch section carrying skin attributes.
pub const SKIN_DATA_KEY: &str = "skinData";
/// Field naming the prefab a new entry should borrow.
pub const PREFAB_FIELD: &str = "prefab";
/// Tribe field holding the preview tile list.
pub const PREVIEW_FIELD: &str = "preview";
/// Tribe field receiving the allocated climate style.
pub const CLIMATE_FIELD: &str = "climate";

#[derive(Debug, thiserror::Error)]
pub enum PatchError {
    #[error("patch is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("patch root must be a JSON object")]
    NotAnObject,
    #[error("cannot allocate '{id}': unknown category '{key}'")]
    UnknownCategory { key: String, id: String },
    #[error("invalid preview for tribe '{tribe}': {detail}")]
    Preview { tribe: String, detail: String },
    #[error("skins of tribe '{tribe}' must be an array")]
    SkinsNotArray { tribe: String },
    #[error("invalid skin data for '{skin}': {detail}")]
    SkinData { skin: String, detail: String },
    #[error("base document entry '{path}' is not an object")]
    MalformedDocument { path: String },
    #[error("template error: {detail}")]
    Template { detail: String },
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// One index handed out while applying a fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocation {
    pub category: Category,
    pub name: String,
    pub index: ContentIdx,
}

/// What applying one fragment did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatchSummary {
    pub allocated: Vec<Allocation>,
    pub previews: usize,
    pub skin_data: usize,
}

/// Supplies the parsed patch fragment of a package.
///
/// The default [`RawPatches`] parses `patch.json` as-is; other sources may
/// preprocess the text first (e.g. render config placeholders).
pub trait PatchSource {
    fn patch_for(&mut self, package: &Package) -> Result<Option<Value>, PatchError>;
}

/// Reads `patch.json` verbatim.
#[derive(Debug, Default, Clone, Copy)]
pub struct RawPatches;

impl PatchSource for RawPatches {
    fn patch_for(&mut self, package: &Package) -> Result<Option<Value>, PatchError> {
        package
            .patch_file()
            .map(|file| serde_json::from_slice(&file.bytes).map_err(PatchError::from))
            .transpose()
    }
}

/// Result of folding every package in an order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    /// Packages whose fragment merged (or that had none).
    pub applied: Vec<String>,
    /// Packages downgraded to `Error` during the merge.
    pub failed: Vec<String>,
}

/// Apply every `Success` package's fragment in `order`.
///
/// A failing package is downgraded to [`PackageStatus::Error`] and the
/// loop moves on; earlier packages' effects, and any allocations the
/// failing package made before it failed, remain in `session`.
pub fn apply_in_order(
    session: &mut Session,
    packages: &mut PackageSet,
    order: &[String],
    source: &mut dyn PatchSource,
) -> MergeOutcome {
    let mut outcome = MergeOutcome::default();

    for id in order {
        let Some(package) = packages.get_mut(id) else {
            warn!("package '{id}' is in the load order but was never loaded");
            continue;
        };
        if !package.is_success() {
            continue;
        }

        let result = source.patch_for(package).and_then(|patch| match patch {
            Some(patch) => apply_patch(session, patch).map(Some),
            None => Ok(None),
        });

        match result {
            Ok(Some(summary)) => {
                info!(
                    "applied patch of '{id}' ({} new entries)",
                    summary.allocated.len()
                );
                outcome.applied.push(id.clone());
            }
            Ok(None) => {
                debug!("package '{id}' has no patch");
                outcome.applied.push(id.clone());
            }
            Err(e) => {
                error!("failed to apply patch of '{id}': {e}");
                package.fail(PackageStatus::Error, format!("patch of '{id}' failed: {e}"));
                outcome.failed.push(id.clone());
            }
        }
    }

    outcome
}

/// Apply one fragment to the session's document.
pub fn apply_patch(session: &mut Session, patch: Value) -> Result<PatchSummary, PatchError> {
    let Value::Object(mut patch) = patch else {
        return Err(PatchError::NotAnObject);
    };
    let mut summary = PatchSummary::default();

    let skin_data = patch
        .remove(SKIN_DATA_KEY)
        .map(parse_skin_data)
        .transpose()?
        .unwrap_or_default();

    allocate_new_entries(session, &mut patch, &mut summary)?;
    let skins = merge_skins(session, &mut patch, &mut summary)?;
    for (tribe, list) in skins {
        write_skins(session, &tribe, list);
    }
    summary.skin_data = apply_skin_data(session, skin_data);

    merge_value(session.document_mut(), Value::Object(patch));
    Ok(summary)
}

fn tribe_key() -> &'static str {
    Category::Tribe.document_key().unwrap_or("tribeData")
}

// ===========================================================================
// Allocation pass
// ===========================================================================

fn is_sentinel(entry: &Map<String, Value>) -> bool {
    entry.get(IDX_FIELD).and_then(Value::as_i64) == Some(SENTINEL_IDX)
}

fn allocate_new_entries(
    session: &mut Session,
    patch: &mut Map<String, Value>,
    summary: &mut PatchSummary,
) -> Result<(), PatchError> {
    for (key, section) in patch.iter_mut() {
        let Some(section) = section.as_object_mut() else {
            continue;
        };
        let is_tribe_section = key == tribe_key();

        for (id, entry) in section.iter_mut() {
            let Some(entry) = entry.as_object_mut() else {
                continue;
            };

            if is_sentinel(entry) {
                let category =
                    Category::from_document_key(key).ok_or_else(|| PatchError::UnknownCategory {
                        key: key.clone(),
                        id: id.clone(),
                    })?;
                let index = session.allocate(category, id)?;
                entry.insert(IDX_FIELD.to_string(), index.as_json());
                summary.allocated.push(Allocation {
                    category,
                    name: id.clone(),
                    index,
                });

                match category.hook() {
                    AllocationHook::Tribe => {
                        let climate = session.allocate_climate(id)?;
                        entry.insert(CLIMATE_FIELD.to_string(), climate.as_json());
                        summary.allocated.push(Allocation {
                            category: Category::Climate,
                            name: id.clone(),
                            index: climate,
                        });
                    }
                    AllocationHook::Prefab { fallback } => {
                        bind_prefab(session, category, index, entry, fallback);
                    }
                    AllocationHook::None => {}
                }
            }

            if is_tribe_section {
                if let Some(preview) = entry.remove(PREVIEW_FIELD) {
                    let tiles: Vec<PreviewTile> =
                        serde_json::from_value(preview).map_err(|e| PatchError::Preview {
                            tribe: id.clone(),
                            detail: e.to_string(),
                        })?;
                    session.set_preview(id, tiles);
                    summary.previews += 1;
                }
            }
        }
    }
    Ok(())
}

/// Bind a new entry to the prefab of the entry named by its `prefab`
/// field, or of `fallback`.
fn bind_prefab(
    session: &mut Session,
    category: Category,
    index: ContentIdx,
    entry: &Map<String, Value>,
    fallback: &str,
) {
    let requested = entry
        .get(PREFAB_FIELD)
        .and_then(Value::as_str)
        .map(str::to_lowercase);

    let binding = requested
        .as_deref()
        .and_then(|name| known_prefab(session, category, name))
        .or_else(|| {
            if let Some(name) = &requested {
                warn!("{category} prefab '{name}' is unknown, using '{fallback}'");
            }
            known_prefab(session, category, fallback)
        })
        .unwrap_or_else(|| fallback.to_string());

    session.bind_prefab(category, index, &binding);
}

fn known_prefab(session: &Session, category: Category, name: &str) -> Option<String> {
    let index = session.identifiers().resolve(category, name).ok()?;
    session.prefab(category, index).map(str::to_string)
}

// ===========================================================================
// Skins
// ===========================================================================

/// Compute the new skin list of every tribe the fragment touches. Nothing
/// is written to the document here.
fn merge_skins(
    session: &mut Session,
    patch: &mut Map<String, Value>,
    summary: &mut PatchSummary,
) -> Result<Vec<(String, Vec<Value>)>, PatchError> {
    let Some(tribes) = patch.get_mut(tribe_key()).and_then(Value::as_object_mut) else {
        return Ok(Vec::new());
    };

    let mut lists = Vec::new();
    for (tribe, entry) in tribes.iter_mut() {
        let Some(entry) = entry.as_object_mut() else {
            continue;
        };
        let Some(skins) = entry.remove(APPEND_ARRAY) else {
            continue;
        };
        let Value::Array(skins) = skins else {
            return Err(PatchError::SkinsNotArray {
                tribe: tribe.clone(),
            });
        };
        check_tribe_slot(session, tribe)?;

        let mut contributed = Vec::with_capacity(skins.len());
        let mut removals: Vec<String> = Vec::new();

        for skin in skins {
            let Value::String(name) = skin else {
                contributed.push(skin);
                continue;
            };
            if let Some(removed) = name.strip_prefix('-') {
                if session.identifiers().contains(Category::Skin, removed) {
                    removals.push(removed.to_string());
                } else {
                    warn!("tribe '{tribe}' removes unknown skin '{removed}'");
                }
                continue;
            }
            let name = name.strip_prefix('+').unwrap_or(&name);
            if session.identifiers().contains(Category::Skin, name) {
                contributed.push(Value::String(name.to_string()));
            } else {
                let index = session.allocate(Category::Skin, name)?;
                summary.allocated.push(Allocation {
                    category: Category::Skin,
                    name: name.to_string(),
                    index,
                });
                contributed.push(index.as_json());
            }
        }

        let mut merged = existing_skins(session, tribe);
        for skin in contributed {
            let identity = skin_identity(session, &skin);
            let present = merged.iter().any(|held| {
                *held == skin || (identity.is_some() && skin_identity(session, held) == identity)
            });
            if !present {
                merged.push(skin);
            }
        }
        for name in &removals {
            let index = session.identifiers().resolve(Category::Skin, name)?;
            let prefixed = format!("-{name}");
            merged.retain(|v| {
                v.as_str() != Some(prefixed.as_str()) && skin_identity(session, v) != Some(index)
            });
        }

        lists.push((tribe.clone(), merged));
    }
    Ok(lists)
}

/// The skin index a list entry stands for: a registered name or a bare
/// index.
fn skin_identity(session: &Session, skin: &Value) -> Option<ContentIdx> {
    match skin {
        Value::String(name) => session.identifiers().resolve(Category::Skin, name).ok(),
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()).map(ContentIdx),
        _ => None,
    }
}

fn existing_skins(session: &Session, tribe: &str) -> Vec<Value> {
    session
        .document()
        .get(tribe_key())
        .and_then(|t| t.get(tribe))
        .and_then(|t| t.get(APPEND_ARRAY))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

/// Fails unless `tribeData.<tribe>` can hold a skin list.
fn check_tribe_slot(session: &Session, tribe: &str) -> Result<(), PatchError> {
    let tribes = session.document().get(tribe_key());
    let fits = tribes.is_none_or(|t| t.is_object() || t.is_null())
        && tribes
            .and_then(|t| t.get(tribe))
            .is_none_or(|e| e.is_object() || e.is_null());
    if fits {
        Ok(())
    } else {
        Err(PatchError::MalformedDocument {
            path: format!("{}.{tribe}", tribe_key()),
        })
    }
}

fn write_skins(session: &mut Session, tribe: &str, skins: Vec<Value>) {
    session.document_mut()[tribe_key()][tribe][APPEND_ARRAY] = Value::Array(skins);
}

fn parse_skin_data(skin_data: Value) -> Result<Vec<(String, SkinInfo)>, PatchError> {
    let Value::Object(skin_data) = skin_data else {
        warn!("ignoring non-object '{SKIN_DATA_KEY}' section");
        return Ok(Vec::new());
    };

    skin_data
        .into_iter()
        .map(|(skin, attributes)| {
            serde_json::from_value(attributes)
                .map(|info| (skin.clone(), info))
                .map_err(|e| PatchError::SkinData {
                    skin,
                    detail: e.to_string(),
                })
        })
        .collect()
}

fn apply_skin_data(session: &mut Session, skin_data: Vec<(String, SkinInfo)>) -> usize {
    let mut applied = 0;
    for (skin, info) in skin_data {
        let Ok(index) = session.identifiers().resolve(Category::Skin, &skin) else {
            warn!("ignoring data for unknown skin '{skin}'");
            continue;
        };
        session.set_skin_info(index, info);
        applied += 1;
    }
    applied
}
