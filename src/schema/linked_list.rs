use serde::{Deserialize, Serialize};

use super::value::ValueType;

/// Which side of the story a linked list belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ListScope {
    Character,
    Both,
    Global,
}

impl ListScope {
    /// Resolve a declared scope name ("character", "both", "global").
    pub fn from_name(name: &str) -> Option<ListScope> {
        match name {
            "character" => Some(Self::Character),
            "both" => Some(Self::Both),
            "global" => Some(Self::Global),
            _ => None,
        }
    }
}

/// One declared field of a linked-list structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub value_type: ValueType,
}

/// A linked-list type declaration. `structure` is non-empty
/// (parse-enforced) and preserves author order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkedListType {
    pub name: String,
    pub scope: ListScope,
    pub structure: Vec<FieldSpec>,
}

impl LinkedListType {
    /// Returns the declared type of a structure field, if present.
    pub fn field_type(&self, field: &str) -> Option<ValueType> {
        self.structure
            .iter()
            .find(|f| f.name == field)
            .map(|f| f.value_type)
    }
}
