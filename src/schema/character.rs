use serde::{Deserialize, Serialize};

use super::value::Value;

/// One field of a linked-list record, in author order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordField {
    pub name: String,
    pub value: Value,
}

/// A single linked-list record: field name → literal value.
pub type Record = Vec<RecordField>;

/// The data a character holds for one linked list: either a single
/// record or an ordered, string-keyed collection of records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ListRecords {
    Single(Record),
    Collection(Vec<(String, Record)>),
}

/// A character's entry for one declared linked list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListData {
    pub list: String,
    pub records: ListRecords,
}

/// A story character. `list_data` maps linked-list names to the
/// character's records for that list, in author order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Character {
    pub name: String,
    pub biography: String,
    pub description: String,
    pub list_data: Vec<ListData>,
}

impl Character {
    /// Returns true if this character carries data for the named list.
    pub fn owns_list(&self, list: &str) -> bool {
        self.list_data.iter().any(|d| d.list == list)
    }

    /// The character's data for the named list, if any.
    pub fn list_data(&self, list: &str) -> Option<&ListRecords> {
        self.list_data
            .iter()
            .find(|d| d.list == list)
            .map(|d| &d.records)
    }
}
