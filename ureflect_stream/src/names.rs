use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Name that terminates tagged property lists and label tables.
pub const NONE_NAME: &str = "None";

/// Index of an interned name inside a [`NameTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NameId(pub u32);

impl NameId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Case-insensitive interned name table.
///
/// Lookups ignore ASCII case, matching how the runtime compares names, but
/// the first spelling registered for a name is the one reported back.
#[derive(Debug, Clone)]
pub struct NameTable {
    names: Vec<String>,
    lookup: HashMap<String, NameId>,
}

impl Default for NameTable {
    fn default() -> Self {
        Self::new()
    }
}

impl NameTable {
    /// Empty table with `None` already interned at index 0.
    pub fn new() -> Self {
        let mut table = Self {
            names: Vec::new(),
            lookup: HashMap::new(),
        };
        table.intern(NONE_NAME);
        table
    }

    /// Table populated in package order. Duplicate spellings keep the first
    /// index for lookups but still occupy their own slot.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut table = Self {
            names: Vec::new(),
            lookup: HashMap::new(),
        };
        for name in names {
            let name = name.into();
            let id = NameId(table.names.len() as u32);
            table.lookup.entry(name.to_ascii_lowercase()).or_insert(id);
            table.names.push(name);
        }
        table
    }

    pub fn intern(&mut self, name: &str) -> NameId {
        let key = name.to_ascii_lowercase();
        if let Some(id) = self.lookup.get(&key) {
            return *id;
        }
        let id = NameId(self.names.len() as u32);
        self.names.push(name.to_string());
        self.lookup.insert(key, id);
        id
    }

    pub fn find(&self, name: &str) -> Option<NameId> {
        self.lookup.get(&name.to_ascii_lowercase()).copied()
    }

    pub fn get(&self, id: NameId) -> Option<&str> {
        self.names.get(id.index()).map(String::as_str)
    }

    pub fn is_none(&self, id: NameId) -> bool {
        self.get(id)
            .is_some_and(|name| name.eq_ignore_ascii_case(NONE_NAME))
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NameId, &str)> {
        self.names
            .iter()
            .enumerate()
            .map(|(index, name)| (NameId(index as u32), name.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_is_case_insensitive() {
        let mut table = NameTable::new();
        let location = table.intern("Location");
        assert_eq!(table.intern("location"), location);
        assert_eq!(table.get(location), Some("Location"));
        assert_eq!(table.find("LOCATION"), Some(location));
        assert!(table.is_none(NameId(0)));
    }

    #[test]
    fn package_order_is_preserved() {
        let table = NameTable::from_names(["Core", "None", "Actor", "core"]);
        assert_eq!(table.len(), 4);
        assert_eq!(table.find("None"), Some(NameId(1)));
        assert_eq!(table.find("CORE"), Some(NameId(0)));
        assert_eq!(table.get(NameId(3)), Some("core"));
    }
}
