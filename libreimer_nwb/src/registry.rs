use fxhash::FxHashMap;

use super::error::SchemaError;

/// Named, insertion-ordered collection of document objects.
///
/// Every group of the output file that holds named children (acquisition, processing
/// modules, segmentation containers...) is one of these. Names are unique within a
/// registry: lazily created containers go through [`ContainerRegistry::get_or_create`],
/// everything else through [`ContainerRegistry::insert`], which refuses duplicates.
#[derive(Debug, Clone)]
pub struct ContainerRegistry<T> {
    owner: String,
    index: FxHashMap<String, usize>,
    items: Vec<(String, T)>,
}

impl<T> ContainerRegistry<T> {
    /// `owner` names the registry in error messages
    pub fn new(owner: &str) -> Self {
        Self {
            owner: owner.to_string(),
            index: FxHashMap::default(),
            items: Vec::new(),
        }
    }

    /// Return the item called `name`, creating it with `factory` first if it does not exist
    pub fn get_or_create<F: FnOnce() -> T>(&mut self, name: &str, factory: F) -> &mut T {
        let idx = match self.index.get(name) {
            Some(idx) => *idx,
            None => {
                spdlog::debug!("Creating {} in {}", name, self.owner);
                self.push(name, factory())
            }
        };
        &mut self.items[idx].1
    }

    /// Add a new item, failing if the name is already taken
    pub fn insert(&mut self, name: &str, item: T) -> Result<&mut T, SchemaError> {
        if self.index.contains_key(name) {
            return Err(SchemaError::DuplicateName {
                container: self.owner.clone(),
                name: name.to_string(),
            });
        }
        let idx = self.push(name, item);
        Ok(&mut self.items[idx].1)
    }

    fn push(&mut self, name: &str, item: T) -> usize {
        let idx = self.items.len();
        self.index.insert(name.to_string(), idx);
        self.items.push((name.to_string(), item));
        idx
    }

    pub fn get(&self, name: &str) -> Option<&T> {
        self.index.get(name).map(|idx| &self.items[*idx].1)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut T> {
        match self.index.get(name) {
            Some(idx) => Some(&mut self.items[*idx].1),
            None => None,
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Items in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &T)> {
        self.items.iter().map(|(name, item)| (name.as_str(), item))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_or_create_reuses() {
        let mut registry: ContainerRegistry<Vec<u32>> = ContainerRegistry::new("processing");
        registry.get_or_create("ophys", Vec::new).push(1);
        registry.get_or_create("ophys", || panic!("must reuse")).push(2);
        registry.get_or_create("behavior", Vec::new);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get("ophys"), Some(&vec![1, 2]));
        let names: Vec<&str> = registry.iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["ophys", "behavior"]);
    }

    #[test]
    fn test_insert_rejects_duplicates() {
        let mut registry: ContainerRegistry<u32> = ContainerRegistry::new("acquisition");
        registry.insert("respiration", 1).unwrap();
        let err = registry.insert("respiration", 2).unwrap_err();
        assert_eq!(
            err,
            SchemaError::DuplicateName {
                container: String::from("acquisition"),
                name: String::from("respiration"),
            }
        );
        assert_eq!(registry.get("respiration"), Some(&1));
    }
}
