//! Name tables for the non-patch members of merged packages.
//!
//! Nothing here decodes images or audio. The tables only record which
//! package provides which named asset so that the host can fetch the bytes
//! on demand.

use indexmap::IndexMap;
use modforge_core::package::{FileRole, Package};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Pixels per unit assumed when `sprites.json` says nothing.
pub const DEFAULT_PIXELS_PER_UNIT: f32 = 2112.0;

#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    #[error("invalid localization table in '{package}': {detail}")]
    Localization { package: String, detail: String },

    #[error("invalid sprite metadata in '{package}': {detail}")]
    SpriteInfo { package: String, detail: String },
}

/// Per-sprite rendering metadata from `sprites.json`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpriteMeta {
    #[serde(default = "default_pixels_per_unit")]
    pub pixels_per_unit: f32,
    #[serde(default = "default_pivot")]
    pub pivot: [f32; 2],
}

fn default_pixels_per_unit() -> f32 {
    DEFAULT_PIXELS_PER_UNIT
}

fn default_pivot() -> [f32; 2] {
    [0.5, 0.5]
}

impl Default for SpriteMeta {
    fn default() -> Self {
        Self {
            pixels_per_unit: DEFAULT_PIXELS_PER_UNIT,
            pivot: default_pivot(),
        }
    }
}

/// Where a named asset lives.
#[derive(Debug, Clone, PartialEq)]
pub struct AssetRef {
    pub package: String,
    /// Member name inside the package.
    pub file: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpriteAsset {
    pub source: AssetRef,
    pub meta: SpriteMeta,
}

/// `key -> language -> text`.
pub type LocalizationTable = IndexMap<String, IndexMap<String, String>>;

/// Asset name tables accumulated across packages. Later registrations win.
#[derive(Debug, Clone, Default)]
pub struct AssetTables {
    localization: LocalizationTable,
    sprites: IndexMap<String, SpriteAsset>,
    audio: IndexMap<String, AssetRef>,
    managed_code: Vec<AssetRef>,
}

impl AssetTables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record every asset member of `package`.
    pub fn register_package(&mut self, package: &Package) -> Result<(), AssetError> {
        let id = package.id.as_str();

        for file in package.files_with_role(FileRole::Localization) {
            let table: LocalizationTable =
                serde_json::from_slice(&file.bytes).map_err(|e| AssetError::Localization {
                    package: id.to_string(),
                    detail: e.to_string(),
                })?;
            self.merge_localization(table);
        }

        let mut metadata: IndexMap<String, SpriteMeta> = IndexMap::new();
        for file in package.files_with_role(FileRole::SpriteInfo) {
            let parsed: IndexMap<String, SpriteMeta> = serde_json::from_slice(&file.bytes)
                .map_err(|e| AssetError::SpriteInfo {
                    package: id.to_string(),
                    detail: e.to_string(),
                })?;
            metadata.extend(parsed.into_iter().map(|(k, v)| (k.to_lowercase(), v)));
        }

        for file in package.files_with_role(FileRole::Image) {
            let name = file.stem().to_lowercase();
            let meta = metadata.shift_remove(&name).unwrap_or_default();
            let asset = SpriteAsset {
                source: asset_ref(id, &file.name),
                meta,
            };
            if let Some(previous) = self.sprites.insert(name.clone(), asset) {
                info!(
                    "sprite '{name}' from '{}' replaced by '{id}'",
                    previous.source.package
                );
            }
        }
        for name in metadata.keys() {
            warn!("'{id}' has sprite metadata for '{name}' but no such image");
        }

        for file in package.files_with_role(FileRole::Audio) {
            let name = file.stem().to_lowercase();
            self.audio.insert(name, asset_ref(id, &file.name));
        }

        for file in package.files_with_role(FileRole::ManagedCode) {
            debug!("'{id}' ships managed code '{}' (not loaded)", file.name);
            self.managed_code.push(asset_ref(id, &file.name));
        }

        Ok(())
    }

    fn merge_localization(&mut self, table: LocalizationTable) {
        for (key, translations) in table {
            self.localization.entry(key).or_default().extend(translations);
        }
    }

    /// Text for `key` in `language`.
    pub fn translate(&self, key: &str, language: &str) -> Option<&str> {
        self.localization
            .get(key)
            .and_then(|t| t.get(language))
            .map(String::as_str)
    }

    pub fn localization(&self) -> &LocalizationTable {
        &self.localization
    }

    pub fn sprite(&self, name: &str) -> Option<&SpriteAsset> {
        self.sprites.get(&name.to_lowercase())
    }

    pub fn sprites(&self) -> &IndexMap<String, SpriteAsset> {
        &self.sprites
    }

    pub fn audio(&self, name: &str) -> Option<&AssetRef> {
        self.audio.get(&name.to_lowercase())
    }

    pub fn audio_clips(&self) -> &IndexMap<String, AssetRef> {
        &self.audio
    }

    pub fn managed_code(&self) -> &[AssetRef] {
        &self.managed_code
    }
}

fn asset_ref(package: &str, file: &str) -> AssetRef {
    AssetRef {
        package: package.to_string(),
        file: file.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use modforge_core::package::FileEntry;
    use modforge_core::test_utils::make_package;

    fn package_with(id: &str, files: &[(&str, &str)]) -> Package {
        let mut package = make_package(id, &[]);
        package.files = files
            .iter()
            .map(|(name, content)| FileEntry::new(*name, content.as_bytes().to_vec()))
            .collect();
        package
    }

    #[test]
    fn localization_later_package_overrides() {
        let mut tables = AssetTables::new();
        tables
            .register_package(&package_with(
                "first",
                &[(
                    "localization.json",
                    r#"{"tribe.polar": {"en": "Polar", "de": "Polar-Stamm"}}"#,
                )],
            ))
            .unwrap();
        tables
            .register_package(&package_with(
                "second",
                &[("localization.json", r#"{"tribe.polar": {"en": "Frost"}}"#)],
            ))
            .unwrap();

        assert_eq!(tables.translate("tribe.polar", "en"), Some("Frost"));
        assert_eq!(tables.translate("tribe.polar", "de"), Some("Polar-Stamm"));
        assert_eq!(tables.translate("tribe.polar", "fr"), None);
    }

    #[test]
    fn sprites_keyed_by_lowercase_stem() {
        let mut tables = AssetTables::new();
        tables
            .register_package(&package_with(
                "art",
                &[
                    ("sprites/Polar_Warrior.png", "png"),
                    ("icon.png", "png"),
                    (
                        "sprites.json",
                        r#"{"Polar_Warrior": {"pixels_per_unit": 256.0, "pivot": [0.5, 0.0]}}"#,
                    ),
                ],
            ))
            .unwrap();

        let warrior = tables.sprite("POLAR_WARRIOR").unwrap();
        assert_eq!(warrior.source.package, "art");
        assert_eq!(warrior.source.file, "sprites/Polar_Warrior.png");
        assert_eq!(warrior.meta.pixels_per_unit, 256.0);
        assert_eq!(warrior.meta.pivot, [0.5, 0.0]);

        let icon = tables.sprite("icon").unwrap();
        assert_eq!(icon.meta, SpriteMeta::default());
    }

    #[test]
    fn later_sprite_replaces_earlier() {
        let mut tables = AssetTables::new();
        tables
            .register_package(&package_with("a", &[("hero.png", "1")]))
            .unwrap();
        tables
            .register_package(&package_with("b", &[("hero.png", "2")]))
            .unwrap();
        assert_eq!(tables.sprite("hero").unwrap().source.package, "b");
        assert_eq!(tables.sprites().len(), 1);
    }

    #[test]
    fn audio_and_managed_code() {
        let mut tables = AssetTables::new();
        tables
            .register_package(&package_with(
                "sound",
                &[("sfx/Horn.WAV", "wav"), ("Plugin.dll", "mz"), ("notes.txt", "")],
            ))
            .unwrap();
        assert_eq!(tables.audio("horn").unwrap().file, "sfx/Horn.WAV");
        assert_eq!(tables.managed_code().len(), 1);
        assert_eq!(tables.managed_code()[0].file, "Plugin.dll");
        assert_eq!(tables.audio_clips().len(), 1);
    }

    #[test]
    fn malformed_tables_error() {
        let mut tables = AssetTables::new();
        let err = tables
            .register_package(&package_with("bad", &[("localization.json", "[1, 2]")]))
            .unwrap_err();
        assert!(matches!(err, AssetError::Localization { .. }));

        let err = tables
            .register_package(&package_with("bad", &[("sprites.json", "{")]))
            .unwrap_err();
        assert!(matches!(err, AssetError::SpriteInfo { .. }));
    }
}
