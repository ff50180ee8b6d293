//! Persistent package configuration.
//!
//! A package may keep a private document (`<config_dir>/<id>.json`) or a
//! section of the shared, user-editable document
//! (`<config_dir>/exposed_config.json`, keyed by package id). Packages
//! never write each other's sections: saving the shared scope re-reads the
//! file and replaces only the owner's key.
//!
//! Patch fragments may embed `{{ config("key", default) }}` placeholders
//! that read from, and initialize, the package's shared section. See
//! [`TemplatedPatches`].

use modforge_core::package::Package;
use modforge_core::patch::{PatchError, PatchSource};
use regex::{Captures, Regex};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, info};

/// File name of the shared configuration document.
pub const EXPOSED_CONFIG_FILE: &str = "exposed_config.json";

// ===========================================================================
// Errors
// ===========================================================================

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// `get` or `edit` on a config with neither a loaded nor a default value.
    #[error("config of '{package}' has no value (nothing loaded and no default set)")]
    NoValue { package: String },

    #[error("parse error in {file}: {detail}")]
    Parse { file: PathBuf, detail: String },

    #[error("cannot serialize config of '{package}': {detail}")]
    Serialize { package: String, detail: String },

    #[error("template error: {detail}")]
    Template { detail: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

// ===========================================================================
// Config documents
// ===========================================================================

/// Which document a config lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigScope {
    /// `<config_dir>/<package>.json`, owned by one package.
    Package,
    /// The package's key in `<config_dir>/exposed_config.json`.
    Exposed,
}

/// One package's configuration value of type `T`.
#[derive(Debug, Clone)]
pub struct ModConfig<T> {
    package: String,
    scope: ConfigScope,
    path: PathBuf,
    value: Option<T>,
}

impl<T: Serialize + DeserializeOwned> ModConfig<T> {
    /// Read the stored value. A missing file or section loads as "no value".
    pub fn load(
        config_dir: &Path,
        package: &str,
        scope: ConfigScope,
    ) -> Result<Self, ConfigError> {
        let path = match scope {
            ConfigScope::Package => config_dir.join(format!("{package}.json")),
            ConfigScope::Exposed => config_dir.join(EXPOSED_CONFIG_FILE),
        };

        let value = match scope {
            ConfigScope::Package => read_json(&path)?
                .map(|v| from_value(&path, v))
                .transpose()?,
            ConfigScope::Exposed => read_json(&path)?
                .and_then(|mut doc| doc.get_mut(package).map(Value::take))
                .map(|v| from_value(&path, v))
                .transpose()?,
        };

        debug!(
            "config of '{package}' ({scope:?}) loaded from {}: {}",
            path.display(),
            if value.is_some() { "present" } else { "empty" }
        );
        Ok(Self {
            package: package.to_string(),
            scope,
            path,
            value,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn scope(&self) -> ConfigScope {
        self.scope
    }

    pub fn value(&self) -> Option<&T> {
        self.value.as_ref()
    }

    /// Use `default` only if nothing was loaded; persists immediately when
    /// it is taken.
    pub fn set_default(&mut self, default: T) -> Result<(), ConfigError> {
        if self.value.is_some() {
            return Ok(());
        }
        self.value = Some(default);
        self.save()
    }

    /// Overwrite the in-memory value. Call [`ModConfig::save`] to persist.
    pub fn replace(&mut self, value: T) {
        self.value = Some(value);
    }

    pub fn get<R>(&self, read: impl FnOnce(&T) -> R) -> Result<R, ConfigError> {
        self.value.as_ref().map(read).ok_or_else(|| ConfigError::NoValue {
            package: self.package.clone(),
        })
    }

    /// Mutate the in-memory value. Call [`ModConfig::save`] to persist.
    pub fn edit(&mut self, change: impl FnOnce(&mut T)) -> Result<(), ConfigError> {
        let value = self.value.as_mut().ok_or_else(|| ConfigError::NoValue {
            package: self.package.clone(),
        })?;
        change(value);
        Ok(())
    }

    /// Write the value to disk. A config without a value writes nothing.
    pub fn save(&self) -> Result<(), ConfigError> {
        let Some(value) = &self.value else {
            return Ok(());
        };
        let value = serde_json::to_value(value).map_err(|e| ConfigError::Serialize {
            package: self.package.clone(),
            detail: e.to_string(),
        })?;

        let document = match self.scope {
            ConfigScope::Package => value,
            ConfigScope::Exposed => {
                let mut document = match read_json(&self.path)? {
                    Some(Value::Object(map)) => map,
                    _ => Map::new(),
                };
                document.insert(self.package.clone(), value);
                Value::Object(document)
            }
        };

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let text = serde_json::to_string_pretty(&document).map_err(|e| ConfigError::Serialize {
            package: self.package.clone(),
            detail: e.to_string(),
        })?;
        std::fs::write(&self.path, text)?;
        debug!("saved config of '{}' to {}", self.package, self.path.display());
        Ok(())
    }
}

fn read_json(path: &Path) -> Result<Option<Value>, ConfigError> {
    match std::fs::read(path) {
        Ok(bytes) => serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| ConfigError::Parse {
                file: path.to_path_buf(),
                detail: e.to_string(),
            }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn from_value<T: DeserializeOwned>(path: &Path, value: Value) -> Result<T, ConfigError> {
    serde_json::from_value(value).map_err(|e| ConfigError::Parse {
        file: path.to_path_buf(),
        detail: e.to_string(),
    })
}

// ===========================================================================
// Templates
// ===========================================================================

const PLACEHOLDER_PATTERN: &str =
    r#"\{\{\s*config\(\s*"([^"\\]+)"\s*,\s*(.*?)\s*\)\s*\}\}"#;

fn placeholder_regex() -> Result<&'static Regex, ConfigError> {
    static PLACEHOLDER: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();
    PLACEHOLDER
        .get_or_init(|| Regex::new(PLACEHOLDER_PATTERN))
        .as_ref()
        .map_err(|e| ConfigError::Template {
            detail: e.to_string(),
        })
}

/// Whether `text` contains any config placeholder.
pub fn has_placeholders(text: &str) -> Result<bool, ConfigError> {
    Ok(placeholder_regex()?.is_match(text))
}

/// Replace every `{{ config("key", default) }}` in `text` with the JSON
/// form of `section[key]`. Missing keys are initialized from `default`, a
/// JSON literal. Returns the rendered text and whether `section` changed.
pub fn render_template(
    text: &str,
    section: &mut Map<String, Value>,
) -> Result<(String, bool), ConfigError> {
    let regex = placeholder_regex()?;
    let mut changed = false;
    let mut failure = None;

    let rendered = regex.replace_all(text, |caps: &Captures<'_>| {
        let key = &caps[1];
        if !section.contains_key(key) {
            match serde_json::from_str::<Value>(&caps[2]) {
                Ok(default) => {
                    section.insert(key.to_string(), default);
                    changed = true;
                }
                Err(e) => {
                    failure.get_or_insert_with(|| ConfigError::Template {
                        detail: format!("default for '{key}' is not a JSON literal: {e}"),
                    });
                    return String::new();
                }
            }
        }
        section
            .get(key)
            .map(Value::to_string)
            .unwrap_or_default()
    });

    match failure {
        Some(e) => Err(e),
        None => Ok((rendered.into_owned(), changed)),
    }
}

/// Patch source that renders config placeholders before parsing.
///
/// Each package's shared section is loaded only if its patch contains a
/// placeholder, and saved once if rendering introduced new defaults.
#[derive(Debug, Clone)]
pub struct TemplatedPatches {
    config_dir: PathBuf,
}

impl TemplatedPatches {
    pub fn new(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
        }
    }

    fn render(&self, package: &Package, text: &str) -> Result<String, ConfigError> {
        let mut config: ModConfig<Map<String, Value>> =
            ModConfig::load(&self.config_dir, &package.id, ConfigScope::Exposed)?;
        let mut section = config.value().cloned().unwrap_or_default();

        let (rendered, changed) = render_template(text, &mut section)?;
        if changed {
            config.replace(section);
            config.save()?;
            info!("initialized config defaults for '{}'", package.id);
        }
        Ok(rendered)
    }
}

impl PatchSource for TemplatedPatches {
    fn patch_for(&mut self, package: &Package) -> Result<Option<Value>, PatchError> {
        let Some(file) = package.patch_file() else {
            return Ok(None);
        };
        let template_err = |e: ConfigError| PatchError::Template {
            detail: e.to_string(),
        };

        let text = std::str::from_utf8(&file.bytes).map_err(|e| PatchError::Template {
            detail: format!("patch is not UTF-8: {e}"),
        })?;
        if !has_placeholders(text).map_err(template_err)? {
            return Ok(Some(serde_json::from_str(text)?));
        }

        let rendered = self.render(package, text).map_err(template_err)?;
        Ok(Some(serde_json::from_str(&rendered)?))
    }
}

// ===========================================================================
// Tests
// ===========================================================================
