use crate::category::Category;
use crate::id::ContentIdx;
use std::collections::{BTreeMap, HashMap};

/// Bidirectional name ↔ index table for one category.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentifierMapping {
    by_name: HashMap<String, ContentIdx>,
    by_index: BTreeMap<ContentIdx, String>,
}

impl IdentifierMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `name ↔ index`. Returns `true` if the pair was new.
    ///
    /// Re-registering an identical pair is a no-op. Binding an already
    /// mapped name to a different index, or an already mapped index to a
    /// different name, fails and leaves the mapping untouched.
    pub fn register(
        &mut self,
        category: Category,
        name: &str,
        index: ContentIdx,
    ) -> Result<bool, RegistryError> {
        if let Some(&existing) = self.by_name.get(name) {
            if existing == index {
                return Ok(false);
            }
            return Err(RegistryError::Conflict {
                category,
                name: name.to_string(),
                existing,
                requested: index,
            });
        }
        if let Some(owner) = self.by_index.get(&index) {
            return Err(RegistryError::IndexTaken {
                category,
                index,
                owner: owner.clone(),
                requested: name.to_string(),
            });
        }
        self.by_name.insert(name.to_string(), index);
        self.by_index.insert(index, name.to_string());
        Ok(true)
    }

    /// Lookup index by name.
    pub fn index_of(&self, name: &str) -> Option<ContentIdx> {
        self.by_name.get(name).copied()
    }

    /// Lookup name by index.
    pub fn name_of(&self, index: ContentIdx) -> Option<&str> {
        self.by_index.get(&index).map(String::as_str)
    }

    pub fn contains_name(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    /// Entries in ascending index order.
    pub fn iter(&self) -> impl Iterator<Item = (ContentIdx, &str)> {
        self.by_index.iter().map(|(idx, name)| (*idx, name.as_str()))
    }
}

/// Per-category identifier tables for a whole session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentifierRegistry {
    mappings: HashMap<Category, IdentifierMapping>,
}

impl IdentifierRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        category: Category,
        name: &str,
        index: ContentIdx,
    ) -> Result<bool, RegistryError> {
        self.mappings
            .entry(category)
            .or_default()
            .register(category, name, index)
    }

    /// Resolve a name to its index. Fails if the name is unmapped.
    pub fn resolve(&self, category: Category, name: &str) -> Result<ContentIdx, RegistryError> {
        self.mappings
            .get(&category)
            .and_then(|m| m.index_of(name))
            .ok_or_else(|| RegistryError::NotFound {
                category,
                name: name.to_string(),
            })
    }

    /// Reverse-lookup an index. Never fails; unmapped indices yield `None`.
    pub fn reverse(&self, category: Category, index: ContentIdx) -> Option<&str> {
        self.mappings.get(&category).and_then(|m| m.name_of(index))
    }

    pub fn contains(&self, category: Category, name: &str) -> bool {
        self.mappings
            .get(&category)
            .is_some_and(|m| m.contains_name(name))
    }

    pub fn mapping(&self, category: Category) -> Option<&IdentifierMapping> {
        self.mappings.get(&category)
    }

    /// Total number of registered names across all categories.
    pub fn len(&self) -> usize {
        self.mappings.values().map(IdentifierMapping::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Monotonic index counter for one numeric index space.
///
/// Seeded at a reserved offset and never reset for the life of a session.
/// Every value from the offset up to and including `u32::MAX` is handed
/// out once; after that the space is exhausted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocator {
    space: &'static str,
    start: u32,
    /// `None` once `u32::MAX` has been handed out.
    next: Option<u32>,
}

impl Allocator {
    pub fn new(space: &'static str, start: u32) -> Self {
        Self {
            space,
            start,
            next: Some(start),
        }
    }

    /// Hand out the next index.
    pub fn allocate(&mut self) -> Result<ContentIdx, RegistryError> {
        let idx = self
            .next
            .ok_or(RegistryError::Exhausted { space: self.space })?;
        self.next = idx.checked_add(1);
        Ok(ContentIdx(idx))
    }

    /// First index this allocator hands out.
    pub fn start(&self) -> u32 {
        self.start
    }

    /// Index the next call to [`Allocator::allocate`] returns, or `None`
    /// when the space is exhausted.
    pub fn peek(&self) -> Option<u32> {
        self.next
    }

    /// Number of indices handed out so far.
    pub fn allocated(&self) -> u64 {
        let end = self.next.map_or(u64::from(u32::MAX) + 1, u64::from);
        end - u64::from(self.start)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("{category} '{name}' is not registered")]
    NotFound { category: Category, name: String },
    #[error("{category} '{name}' is already registered as {existing}, refusing to rebind to {requested}")]
    Conflict {
        category: Category,
        name: String,
        existing: ContentIdx,
        requested: ContentIdx,
    },
    #[error("{category} index {index} already belongs to '{owner}', cannot register '{requested}'")]
    IndexTaken {
        category: Category,
        index: ContentIdx,
        owner: String,
        requested: String,
    },
    #[error("{space} index space exhausted")]
    Exhausted { space: &'static str },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_registry() -> IdentifierRegistry {
        let mut reg = IdentifierRegistry::new();
        reg.register(Category::Unit, "warrior", ContentIdx(1)).unwrap();
        reg.register(Category::Unit, "archer", ContentIdx(2)).unwrap();
        reg.register(Category::Tribe, "bardur", ContentIdx(1)).unwrap();
        reg
    }

    #[test]
    fn register_and_lookup() {
        let reg = setup_registry();
        assert_eq!(reg.resolve(Category::Unit, "archer").unwrap(), ContentIdx(2));
        assert_eq!(reg.reverse(Category::Unit, ContentIdx(1)), Some("warrior"));
        assert_eq!(reg.len(), 3);
    }

    #[test]
    fn categories_are_independent() {
        let reg = setup_registry();
        // Same index in two categories maps to different names.
        assert_eq!(reg.reverse(Category::Tribe, ContentIdx(1)), Some("bardur"));
        assert!(!reg.contains(Category::Tribe, "warrior"));
    }

    #[test]
    fn resolve_unknown_fails() {
        let reg = setup_registry();
        match reg.resolve(Category::Unit, "dragon") {
            Err(RegistryError::NotFound { category, name }) => {
                assert_eq!(category, Category::Unit);
                assert_eq!(name, "dragon");
            }
            other => panic!("expected NotFound, got: {other:?}"),
        }
    }

    #[test]
    fn reverse_unknown_is_none() {
        let reg = setup_registry();
        assert_eq!(reg.reverse(Category::Unit, ContentIdx(999)), None);
        assert_eq!(reg.reverse(Category::Skin, ContentIdx(0)), None);
    }

    #[test]
    fn identical_reregistration_is_idempotent() {
        let mut reg = setup_registry();
        let inserted = reg.register(Category::Unit, "warrior", ContentIdx(1)).unwrap();
        assert!(!inserted);
        assert_eq!(reg.len(), 3);
    }

    #[test]
    fn rebinding_name_fails() {
        let mut reg = setup_registry();
        let err = reg
            .register(Category::Unit, "warrior", ContentIdx(5))
            .unwrap_err();
        assert!(matches!(
            err,
            RegistryError::Conflict {
                existing: ContentIdx(1),
                requested: ContentIdx(5),
                ..
            }
        ));
        // Untouched.
        assert_eq!(reg.resolve(Category::Unit, "warrior").unwrap(), ContentIdx(1));
        assert_eq!(reg.reverse(Category::Unit, ContentIdx(5)), None);
    }

    #[test]
    fn rebinding_index_fails() {
        let mut reg = setup_registry();
        let err = reg
            .register(Category::Unit, "rider", ContentIdx(2))
            .unwrap_err();
        assert!(matches!(err, RegistryError::IndexTaken { ref owner, .. } if owner == "archer"));
        assert!(!reg.contains(Category::Unit, "rider"));
    }

    #[test]
    fn mapping_iterates_in_index_order() {
        let reg = setup_registry();
        let names: Vec<&str> = reg
            .mapping(Category::Unit)
            .unwrap()
            .iter()
            .map(|(_, n)| n)
            .collect();
        assert_eq!(names, vec!["warrior", "archer"]);
    }

    #[test]
    fn allocator_is_monotonic() {
        let mut alloc = Allocator::new("content", 1000);
        assert_eq!(alloc.allocate().unwrap(), ContentIdx(1000));
        assert_eq!(alloc.allocate().unwrap(), ContentIdx(1001));
        assert_eq!(alloc.peek(), Some(1002));
        assert_eq!(alloc.allocated(), 2);
        assert_eq!(alloc.start(), 1000);
    }

    #[test]
    fn allocator_hands_out_top_value_then_exhausts() {
        let mut alloc = Allocator::new("climate", u32::MAX - 1);
        assert_eq!(alloc.allocate().unwrap(), ContentIdx(u32::MAX - 1));
        assert_eq!(alloc.allocate().unwrap(), ContentIdx(u32::MAX));
        assert_eq!(alloc.peek(), None);
        assert_eq!(alloc.allocated(), 2);

        let err = alloc.allocate().unwrap_err();
        assert!(matches!(err, RegistryError::Exhausted { space: "climate" }));
        let msg = format!("{err}");
        assert!(msg.contains("climate"), "got: {msg}");
        // Exhaustion is sticky.
        assert!(alloc.allocate().is_err());
    }

    #[test]
    fn error_display_messages() {
        let e = RegistryError::NotFound {
            category: Category::Resource,
            name: "gems".to_string(),
        };
        let msg = format!("{e}");
        assert!(msg.contains("resource"));
        assert!(msg.contains("gems"));
    }
}
