use serde::{Deserialize, Serialize};

use super::value::{Value, ValueType};

/// A global variable declaration: name, declared type, and a default
/// literal whose type always matches the declaration (parse-enforced).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalVariable {
    pub name: String,
    pub value_type: ValueType,
    pub default: Value,
}
