//! The closed set of content categories.
//!
//! Every top-level section of the base document that may receive new,
//! index-allocated entries maps to exactly one [`Category`]. Category
//! specific behaviour during allocation is selected by matching on
//! [`Category::hook`], so adding a category is a compile-time change.

use std::fmt;

/// A category of content with its own identifier mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Category {
    Tribe,
    Unit,
    Improvement,
    Resource,
    Terrain,
    Tech,
    Task,
    /// Skin names referenced from tribe `skins` lists. Not a document section.
    Skin,
    /// Climate styles, allocated alongside new tribes. Not a document section.
    Climate,
}

/// Extra work performed when a new entry of a category is allocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocationHook {
    /// Nothing beyond registering the name.
    None,
    /// Allocate a climate style and extract the `preview` tile list.
    Tribe,
    /// Bind the new index to an existing entry's prefab, falling back to
    /// `fallback` when the patch names no (or an unknown) prefab.
    Prefab { fallback: &'static str },
}

impl Category {
    /// Every category, in a stable order.
    pub const ALL: [Category; 9] = [
        Category::Tribe,
        Category::Unit,
        Category::Improvement,
        Category::Resource,
        Category::Terrain,
        Category::Tech,
        Category::Task,
        Category::Skin,
        Category::Climate,
    ];

    /// Categories that appear as top-level sections of the base document.
    pub const DOCUMENT: [Category; 7] = [
        Category::Tribe,
        Category::Unit,
        Category::Improvement,
        Category::Resource,
        Category::Terrain,
        Category::Tech,
        Category::Task,
    ];

    /// The base document key of this category's section, if it has one.
    pub fn document_key(self) -> Option<&'static str> {
        match self {
            Category::Tribe => Some("tribeData"),
            Category::Unit => Some("unitData"),
            Category::Improvement => Some("improvementData"),
            Category::Resource => Some("resourceData"),
            Category::Terrain => Some("terrainData"),
            Category::Tech => Some("techData"),
            Category::Task => Some("taskData"),
            Category::Skin | Category::Climate => None,
        }
    }

    /// Resolve a base document section key to its category.
    pub fn from_document_key(key: &str) -> Option<Category> {
        Category::DOCUMENT
            .into_iter()
            .find(|c| c.document_key() == Some(key))
    }

    pub fn hook(self) -> AllocationHook {
        match self {
            Category::Tribe => AllocationHook::Tribe,
            Category::Unit => AllocationHook::Prefab {
                fallback: "warrior",
            },
            Category::Improvement => AllocationHook::Prefab { fallback: "farm" },
            Category::Resource => AllocationHook::Prefab { fallback: "fruit" },
            Category::Terrain
            | Category::Tech
            | Category::Task
            | Category::Skin
            | Category::Climate => AllocationHook::None,
        }
    }

    /// Whether built-in entries of this category carry a prefab binding.
    pub fn has_prefabs(self) -> bool {
        matches!(self.hook(), AllocationHook::Prefab { .. })
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Category::Tribe => "tribe",
            Category::Unit => "unit",
            Category::Improvement => "improvement",
            Category::Resource => "resource",
            Category::Terrain => "terrain",
            Category::Tech => "tech",
            Category::Task => "task",
            Category::Skin => "skin",
            Category::Climate => "climate",
        };
        f.write_str(name)
    }
}
