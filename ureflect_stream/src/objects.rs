use serde::{Deserialize, Serialize};

use crate::names::{NameId, NameTable};
use crate::StreamError;

const IMPORT_BIT: u64 = 1 << 63;

/// Package-local object reference as it appears on the wire.
///
/// `0` is null, positive values name export `n - 1`, negative values name
/// import `-n - 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectRef(pub i32);

impl ObjectRef {
    pub const NULL: ObjectRef = ObjectRef(0);

    pub fn export(index: usize) -> Self {
        ObjectRef(index as i32 + 1)
    }

    pub fn import(index: usize) -> Self {
        ObjectRef(-(index as i32) - 1)
    }

    pub fn is_null(self) -> bool {
        self.0 == 0
    }

    pub fn export_index(self) -> Option<usize> {
        (self.0 > 0).then(|| (self.0 - 1) as usize)
    }

    pub fn import_index(self) -> Option<usize> {
        (self.0 < 0).then(|| (-(self.0 as i64) - 1) as usize)
    }
}

/// Opaque pointer-sized handle stored in property data for object and class
/// references. `0` is the null handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectHandle(pub u64);

impl ObjectHandle {
    pub const NULL: ObjectHandle = ObjectHandle(0);

    pub fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Map the handle back to the package-local reference it was resolved from.
    pub fn to_ref(self) -> ObjectRef {
        if self.0 == 0 {
            ObjectRef::NULL
        } else if self.0 & IMPORT_BIT != 0 {
            ObjectRef::import(((self.0 & !IMPORT_BIT) - 1) as usize)
        } else {
            ObjectRef::export((self.0 - 1) as usize)
        }
    }
}

/// Per-export loading state. Re-entering an export that is `Loading` means a
/// dependency cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadState {
    #[default]
    Unloaded,
    Loading,
    Loaded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectEntry {
    pub name: NameId,
    pub class_name: NameId,
}

/// Export and import tables of one package.
#[derive(Debug, Clone, Default)]
pub struct ObjectTable {
    exports: Vec<ObjectEntry>,
    states: Vec<LoadState>,
    imports: Vec<ObjectEntry>,
}

impl ObjectTable {
    pub fn add_export(&mut self, entry: ObjectEntry) -> ObjectRef {
        self.exports.push(entry);
        self.states.push(LoadState::Unloaded);
        ObjectRef::export(self.exports.len() - 1)
    }

    pub fn add_import(&mut self, entry: ObjectEntry) -> ObjectRef {
        self.imports.push(entry);
        ObjectRef::import(self.imports.len() - 1)
    }

    pub fn export_count(&self) -> usize {
        self.exports.len()
    }

    pub fn import_count(&self) -> usize {
        self.imports.len()
    }

    pub fn entry(&self, reference: ObjectRef) -> Option<&ObjectEntry> {
        if let Some(index) = reference.export_index() {
            self.exports.get(index)
        } else if let Some(index) = reference.import_index() {
            self.imports.get(index)
        } else {
            None
        }
    }

    /// Validate `reference` against the tables and turn it into a handle.
    pub fn resolve(&self, reference: ObjectRef) -> Result<ObjectHandle, StreamError> {
        if reference.is_null() {
            return Ok(ObjectHandle::NULL);
        }
        if let Some(index) = reference.export_index() {
            if index < self.exports.len() {
                return Ok(ObjectHandle(index as u64 + 1));
            }
        } else if let Some(index) = reference.import_index() {
            if index < self.imports.len() {
                return Ok(ObjectHandle(IMPORT_BIT | (index as u64 + 1)));
            }
        }
        Err(StreamError::ObjectOutOfRange(reference.0))
    }

    pub fn state(&self, reference: ObjectRef) -> Option<LoadState> {
        reference
            .export_index()
            .and_then(|index| self.states.get(index).copied())
    }

    /// Mark an export as loading. Returns `false` when it is already loaded,
    /// and fails when the export is in the middle of its own load.
    pub fn begin_load(&mut self, reference: ObjectRef) -> Result<bool, StreamError> {
        let index = reference
            .export_index()
            .filter(|index| *index < self.states.len())
            .ok_or(StreamError::ObjectOutOfRange(reference.0))?;
        match self.states[index] {
            LoadState::Loaded => Ok(false),
            LoadState::Loading => Err(StreamError::ReentrantLoad(format!("export #{index}"))),
            LoadState::Unloaded => {
                self.states[index] = LoadState::Loading;
                Ok(true)
            }
        }
    }

    pub fn finish_load(&mut self, reference: ObjectRef) {
        if let Some(state) = reference
            .export_index()
            .and_then(|index| self.states.get_mut(index))
        {
            *state = LoadState::Loaded;
        }
    }

    /// Human-readable name for a handle, `None` for the null handle.
    pub fn describe(&self, handle: ObjectHandle, names: &NameTable) -> String {
        match self.entry(handle.to_ref()) {
            Some(entry) => {
                let name = names.get(entry.name).unwrap_or("?");
                match names.get(entry.class_name) {
                    Some(class) => format!("{class}'{name}'"),
                    None => name.to_string(),
                }
            }
            None => "None".to_string(),
        }
    }
}
