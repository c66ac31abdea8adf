//! Nodes and their timelines: dialogues, actions, events, and choices.

use serde::{Deserialize, Serialize};

use super::value::Value;

/// A story node. Its timeline is visited in author order by the
/// execution cursor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub timeline: Vec<TimelineItem>,
}

/// One entry of a node's timeline. Numeric labels are NOT required to
/// be unique within a node; author order is what matters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TimelineItem {
    Dialogue(Dialogue),
    Action(Action),
}

impl TimelineItem {
    pub fn label(&self) -> i64 {
        match self {
            Self::Dialogue(d) => d.label,
            Self::Action(a) => a.label,
        }
    }
}

/// One speaker/text pair of a dialogue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpokenLine {
    pub speaker: String,
    pub text: String,
}

/// A dialogue block: one or more spoken lines, order preserved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dialogue {
    pub label: i64,
    pub lines: Vec<SpokenLine>,
}

/// A labeled action in a timeline or inside a choice option.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub label: i64,
    pub kind: ActionKind,
}

/// What an action does. Flat `goto`/`exit`/`enter` references inside an
/// action body set the kind directly, overriding the declared type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ActionKind {
    /// Opaque code carried verbatim; the host interprets it.
    Code(String),
    Goto {
        node: i64,
    },
    Exit(ExitScope),
    Enter {
        group: i64,
    },
    Choice(Vec<ChoiceOption>),
    Event(StoryEvent),
    /// An action body with no recognizable payload. Carries the declared
    /// type string, possibly empty. Executes as an invalid item.
    Unknown(String),
}

/// What an `exit` action leaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExitScope {
    Node,
    Group,
}

impl ExitScope {
    /// Resolve an exit target name ("node" or "group").
    pub fn from_name(name: &str) -> Option<ExitScope> {
        match name {
            "node" => Some(Self::Node),
            "group" => Some(Self::Group),
            _ => None,
        }
    }
}

/// One option of a choice action: the user-facing text plus the ordered
/// sub-actions executed when the option is selected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChoiceOption {
    pub text: String,
    pub actions: Vec<Action>,
}

/// An event payload, selected by the `data.type` string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StoryEvent {
    NextNode,
    ExitCurrentNode,
    ExitCurrentGroup,
    AdjustVariable {
        name: String,
        op: AdjustOp,
    },
    AddState {
        state: String,
        character: String,
    },
    RemoveState {
        state: String,
        character: String,
    },
    /// Navigate to any combination of targets; `None` leaves that part
    /// of the position unchanged.
    ProgressStory {
        chapter: Option<i64>,
        group: Option<i64>,
        node: Option<i64>,
    },
    LinkedList {
        list: String,
        values: Vec<FieldModification>,
    },
    /// An event whose `data.type` is not recognized. Carries the type
    /// string. Executes as an invalid item.
    Unknown(String),
}

/// How an `adjust-variable` event changes its variable. Exactly one
/// operation per event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AdjustOp {
    Increment(f64),
    Set(Value),
    Toggle,
}

/// One field modification inside a `linked-list` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldModification {
    pub field: String,
    pub op: ModOp,
}

/// The operation a field modification applies, with its operand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ModOp {
    Amount(Value),
    Set(Value),
    Append(Value),
    Replace(Value),
    Toggle(Value),
}

impl ModOp {
    /// The operand literal, whichever operation carries it.
    pub fn value(&self) -> &Value {
        match self {
            Self::Amount(v) | Self::Set(v) | Self::Append(v) | Self::Replace(v) | Self::Toggle(v) => v,
        }
    }
}
