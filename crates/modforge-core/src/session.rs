//! The per-run context: base document, identifier tables, counters and the
//! side tables filled while patches merge.
//!
//! A [`Session`] is constructed once at pipeline start via
//! [`SessionBuilder`] and threaded through every component. It is `Clone`
//! and `PartialEq`, so tests can snapshot it before a merge and diff it
//! afterwards.

use crate::category::Category;
use crate::id::{ContentIdx, IDX_FIELD};
use crate::registry::{Allocator, IdentifierRegistry, RegistryError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

/// Default first index handed to package content.
pub const DEFAULT_RESERVED_OFFSET: u32 = 1000;

/// Default first climate style handed to package tribes.
pub const DEFAULT_CLIMATE_OFFSET: u32 = 64;

/// One tile of a tribe's preview map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviewTile {
    pub x: i32,
    pub y: i32,
    #[serde(default)]
    pub terrain: Option<String>,
    #[serde(default)]
    pub resource: Option<String>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub improvement: Option<String>,
}

/// Extra attributes a package may attach to a skin.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkinInfo {
    #[serde(default)]
    pub color: Option<i64>,
    #[serde(default)]
    pub language: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("base document must be a JSON object")]
    NotAnObject,
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Builder for a [`Session`].
#[derive(Debug)]
pub struct SessionBuilder {
    document: Value,
    reserved_offset: u32,
    climate_offset: u32,
    builtins: Vec<(Category, String, ContentIdx)>,
}

impl SessionBuilder {
    pub fn new(document: Value) -> Self {
        Self {
            document,
            reserved_offset: DEFAULT_RESERVED_OFFSET,
            climate_offset: DEFAULT_CLIMATE_OFFSET,
            builtins: Vec::new(),
        }
    }

    pub fn reserved_offset(mut self, offset: u32) -> Self {
        self.reserved_offset = offset;
        self
    }

    pub fn climate_offset(mut self, offset: u32) -> Self {
        self.climate_offset = offset;
        self
    }

    /// Declare a built-in name that does not appear in the document, such
    /// as a skin or climate style.
    pub fn builtin(mut self, category: Category, name: &str, index: u32) -> Self {
        self.builtins
            .push((category, name.to_string(), ContentIdx(index)));
        self
    }

    /// Harvest built-in entries from the document and seed the counters.
    ///
    /// Each counter starts at its offset, or just above the highest
    /// built-in index of its space when a built-in reaches the offset.
    pub fn build(self) -> Result<Session, SessionError> {
        if !self.document.is_object() {
            return Err(SessionError::NotAnObject);
        }

        let mut builtins: Vec<(Category, String, ContentIdx)> = Category::DOCUMENT
            .into_iter()
            .flat_map(|category| {
                builtin_entries(&self.document, category)
                    .into_iter()
                    .map(move |(name, index)| (category, name, index))
            })
            .collect();
        builtins.extend(self.builtins);

        let content_start = counter_start(
            "content",
            self.reserved_offset,
            builtins
                .iter()
                .filter(|(category, ..)| *category != Category::Climate)
                .map(|(.., index)| *index),
        )?;
        let climate_start = counter_start(
            "climate",
            self.climate_offset,
            builtins
                .iter()
                .filter(|(category, ..)| *category == Category::Climate)
                .map(|(.., index)| *index),
        )?;

        let mut session = Session {
            document: self.document,
            identifiers: IdentifierRegistry::new(),
            content_ids: Allocator::new("content", content_start),
            climate_ids: Allocator::new("climate", climate_start),
            prefabs: HashMap::new(),
            previews: BTreeMap::new(),
            skins: BTreeMap::new(),
        };

        for (category, name, index) in builtins {
            session.register_builtin(category, &name, index)?;
        }

        debug!(
            "session ready with {} built-in names, content ids from {content_start}, climates from {climate_start}",
            session.identifiers.len(),
        );
        Ok(session)
    }
}

/// First index of a counter: `offset`, raised above the highest built-in.
fn counter_start(
    space: &'static str,
    offset: u32,
    builtins: impl Iterator<Item = ContentIdx>,
) -> Result<u32, RegistryError> {
    let Some(highest) = builtins.map(|index| index.0).max() else {
        return Ok(offset);
    };
    if highest < offset {
        return Ok(offset);
    }
    let start = highest
        .checked_add(1)
        .ok_or(RegistryError::Exhausted { space })?;
    warn!("built-in {space} index {highest} reaches the reserved offset {offset}, new entries start at {start}");
    Ok(start)
}

/// `(name, idx)` of every entry in a document section with a non-negative index.
fn builtin_entries(document: &Value, category: Category) -> Vec<(String, ContentIdx)> {
    let Some(section) = category
        .document_key()
        .and_then(|key| document.get(key))
        .and_then(Value::as_object)
    else {
        return Vec::new();
    };

    section
        .iter()
        .filter_map(|(name, entry)| {
            let idx = entry.get(IDX_FIELD)?.as_u64()?;
            let idx = u32::try_from(idx).ok()?;
            Some((name.clone(), ContentIdx(idx)))
        })
        .collect()
}

/// Mutable state for one content-loading run.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    document: Value,
    identifiers: IdentifierRegistry,
    content_ids: Allocator,
    climate_ids: Allocator,
    prefabs: HashMap<(Category, ContentIdx), String>,
    previews: BTreeMap<String, Vec<PreviewTile>>,
    skins: BTreeMap<ContentIdx, SkinInfo>,
}

impl Session {
    /// A session over `document` with default offsets.
    pub fn new(document: Value) -> Result<Self, SessionError> {
        SessionBuilder::new(document).build()
    }

    pub fn builder(document: Value) -> SessionBuilder {
        SessionBuilder::new(document)
    }

    fn register_builtin(
        &mut self,
        category: Category,
        name: &str,
        index: ContentIdx,
    ) -> Result<(), RegistryError> {
        self.identifiers.register(category, name, index)?;
        if category.has_prefabs() {
            self.prefabs.insert((category, index), name.to_string());
        }
        Ok(())
    }

    pub fn document(&self) -> &Value {
        &self.document
    }

    pub fn document_mut(&mut self) -> &mut Value {
        &mut self.document
    }

    pub fn into_document(self) -> Value {
        self.document
    }

    pub fn identifiers(&self) -> &IdentifierRegistry {
        &self.identifiers
    }

    /// Allocate a content index for `name` and register it under `category`.
    pub fn allocate(&mut self, category: Category, name: &str) -> Result<ContentIdx, RegistryError> {
        let index = self.content_ids.allocate()?;
        self.identifiers.register(category, name, index)?;
        debug!("allocated {category} '{name}' -> {index}");
        Ok(index)
    }

    /// Allocate a climate style for the tribe `name`.
    pub fn allocate_climate(&mut self, name: &str) -> Result<ContentIdx, RegistryError> {
        let index = self.climate_ids.allocate()?;
        self.identifiers.register(Category::Climate, name, index)?;
        debug!("allocated climate '{name}' -> {index}");
        Ok(index)
    }

    pub fn content_allocator(&self) -> &Allocator {
        &self.content_ids
    }

    pub fn climate_allocator(&self) -> &Allocator {
        &self.climate_ids
    }

    /// The prefab an index renders with.
    pub fn prefab(&self, category: Category, index: ContentIdx) -> Option<&str> {
        self.prefabs.get(&(category, index)).map(String::as_str)
    }

    pub fn bind_prefab(&mut self, category: Category, index: ContentIdx, prefab: &str) {
        self.prefabs.insert((category, index), prefab.to_string());
    }

    pub fn preview(&self, tribe: &str) -> Option<&[PreviewTile]> {
        self.previews.get(tribe).map(Vec::as_slice)
    }

    pub fn previews(&self) -> &BTreeMap<String, Vec<PreviewTile>> {
        &self.previews
    }

    pub fn set_preview(&mut self, tribe: &str, tiles: Vec<PreviewTile>) {
        self.previews.insert(tribe.to_string(), tiles);
    }

    pub fn skin_info(&self, index: ContentIdx) -> Option<&SkinInfo> {
        self.skins.get(&index)
    }

    pub fn set_skin_info(&mut self, index: ContentIdx, info: SkinInfo) {
        self.skins.insert(index, info);
    }
}
