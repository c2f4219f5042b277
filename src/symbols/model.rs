use crate::utils::error::SymbolsError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// How many outgoing pointers an object is expected to report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerCapacity {
    /// Statically known; reports must fill exactly this many slots
    Exact(usize),

    /// Unknown by construction (weak references and similar); any count is final
    Open,

    /// The object could not be looked up; checked once the GC ends
    Deferred,
}

/// Element layout of an array type
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ArrayInfo {
    /// Bytes per element
    pub element_size: u32,

    /// Elements are object references
    #[serde(default)]
    pub references: bool,
}

/// One allocated type
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct TypeInfo {
    pub id: u32,

    pub name: String,

    /// Instance size in bytes (ignored for arrays)
    #[serde(default)]
    pub size: u32,

    #[serde(default)]
    pub array: Option<ArrayInfo>,

    /// Number of reference fields of an instance
    #[serde(default)]
    pub pointers: u32,

    #[serde(default)]
    pub unknown_pointer_count: bool,

    /// Class mirrors carry their real size on the wire
    #[serde(default)]
    pub mirror: bool,
}

impl TypeInfo {
    pub fn is_array(&self) -> bool {
        self.array.is_some()
    }

    /// Pointer capacity of an object of this type
    pub fn capacity(&self, array_length: Option<u32>) -> PointerCapacity {
        if self.unknown_pointer_count {
            return PointerCapacity::Open;
        }

        match &self.array {
            Some(array) if array.references => {
                PointerCapacity::Exact(array_length.unwrap_or(0) as usize)
            }
            Some(_) => PointerCapacity::Exact(0),
            None => PointerCapacity::Exact(self.pointers as usize),
        }
    }
}

/// One allocation site
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SiteInfo {
    pub id: u32,

    /// Allocated type; None when the type travels with each event
    #[serde(default)]
    pub type_id: Option<u32>,

    /// Human readable location, e.g. `Foo.bar():12`
    #[serde(default)]
    pub location: String,
}

/// GC cause name
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct CauseInfo {
    pub id: u32,
    pub name: String,
}

fn default_heap_word_size() -> u32 {
    8
}

fn default_array_header_size() -> u32 {
    16
}

/// The full symbols registry
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Symbols {
    /// Heap word size and object alignment in bytes
    #[serde(default = "default_heap_word_size")]
    pub heap_word_size: u32,

    /// Bytes in front of the first array element
    #[serde(default = "default_array_header_size")]
    pub array_header_size: u32,

    #[serde(default)]
    pub types: Vec<TypeInfo>,

    #[serde(default)]
    pub sites: Vec<SiteInfo>,

    #[serde(default)]
    pub causes: Vec<CauseInfo>,

    #[serde(skip)]
    type_index: HashMap<u32, usize>,

    #[serde(skip)]
    site_index: HashMap<u32, usize>,
}

impl Default for Symbols {
    fn default() -> Self {
        Self::new(default_heap_word_size())
    }
}

impl Symbols {
    /// Empty registry
    pub fn new(heap_word_size: u32) -> Self {
        Self {
            heap_word_size,
            array_header_size: default_array_header_size(),
            types: Vec::new(),
            sites: Vec::new(),
            causes: Vec::new(),
            type_index: HashMap::new(),
            site_index: HashMap::new(),
        }
    }

    pub fn with_type(mut self, info: TypeInfo) -> Self {
        self.type_index.insert(info.id, self.types.len());
        self.types.push(info);
        self
    }

    pub fn with_site(mut self, info: SiteInfo) -> Self {
        self.site_index.insert(info.id, self.sites.len());
        self.sites.push(info);
        self
    }

    pub fn with_cause(mut self, id: u32, name: &str) -> Self {
        self.causes.push(CauseInfo {
            id,
            name: name.to_string(),
        });
        self
    }

    /// Validate and build lookup tables after deserialization
    ///
    /// **Public** - called by the loaders
    pub fn finalize(mut self) -> Result<Self, SymbolsError> {
        if self.heap_word_size == 0 || !self.heap_word_size.is_power_of_two() {
            return Err(SymbolsError::Invalid(format!(
                "heap word size {} is not a power of two",
                self.heap_word_size
            )));
        }

        self.type_index.clear();
        for (i, info) in self.types.iter().enumerate() {
            if self.type_index.insert(info.id, i).is_some() {
                return Err(SymbolsError::Invalid(format!("duplicate type id {}", info.id)));
            }
        }

        self.site_index.clear();
        for (i, info) in self.sites.iter().enumerate() {
            if self.site_index.insert(info.id, i).is_some() {
                return Err(SymbolsError::Invalid(format!("duplicate site id {}", info.id)));
            }
            if let Some(type_id) = info.type_id {
                if !self.type_index.contains_key(&type_id) {
                    return Err(SymbolsError::Invalid(format!(
                        "site {} refers to unknown type {}",
                        info.id, type_id
                    )));
                }
            }
        }

        Ok(self)
    }

    pub fn type_by_id(&self, id: u32) -> Option<&TypeInfo> {
        self.type_index.get(&id).map(|&i| &self.types[i])
    }

    pub fn site_by_id(&self, id: u32) -> Option<&SiteInfo> {
        self.site_index.get(&id).map(|&i| &self.sites[i])
    }

    pub fn cause_name(&self, id: u32) -> &str {
        self.causes
            .iter()
            .find(|c| c.id == id)
            .map(|c| c.name.as_str())
            .unwrap_or("unknown")
    }

    /// Byte size of an object, aligned to the heap word size
    pub fn object_size(&self, info: &TypeInfo, array_length: Option<u32>) -> u64 {
        let raw = match &info.array {
            Some(array) => {
                self.array_header_size as u64
                    + array_length.unwrap_or(0) as u64 * array.element_size as u64
            }
            None => info.size as u64,
        };
        let word = self.heap_word_size as u64;
        raw.div_ceil(word) * word
    }
}
