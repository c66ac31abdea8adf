use serde::{Deserialize, Serialize};

/// Whether a tag is a bare marker or carries a selectable key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TagKind {
    Single,
    KeyValue,
}

impl TagKind {
    /// Resolve a declared kind name ("single" or "key-value").
    pub fn from_name(name: &str) -> Option<TagKind> {
        match name {
            "single" => Some(Self::Single),
            "key-value" => Some(Self::KeyValue),
            _ => None,
        }
    }
}

/// A tag definition. `keys` is empty exactly when `kind` is `Single`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagDefinition {
    pub name: String,
    pub kind: TagKind,
    pub color: String,
    pub keys: Vec<String>,
}

impl TagDefinition {
    /// Returns true if this tag declares the given key.
    pub fn has_key(&self, key: &str) -> bool {
        self.keys.iter().any(|k| k == key)
    }
}
