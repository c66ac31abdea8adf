/// The execution cursor: a stateless-graph interpreter that advances
/// through a node's timeline one item at a time.
///
/// The cursor borrows the story graph read-only; its position, pending
/// choice, and transient parameter stack are the only mutable state in
/// the system. Every abnormal outcome is an `End` variant — the only
/// caller-visible failures are choice-selection misuse.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::schema::linked_list::ListScope;
use crate::schema::node::{
    Action, ActionKind, AdjustOp, ExitScope, FieldModification, ModOp, SpokenLine, StoryEvent,
    TimelineItem,
};
use crate::schema::story::StoryGraph;
use crate::schema::value::{Value, ValueType};

/// Caller-misuse conditions around choice selection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CursorError {
    #[error("no choice is pending")]
    NoChoicePending,
    #[error("choice index {index} is out of range ({available} options)")]
    ChoiceOutOfRange { index: usize, available: usize },
    #[error("a selection was already made for the pending choice")]
    ChoiceAlreadySelected,
}

/// What kind of position change a transition describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransitionKind {
    Node,
    Group,
}

/// Why a step ended the current run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EndReason {
    TimelineComplete,
    ExitNode,
    ExitGroup,
    NoNextNode,
    InvalidItem,
    NoContent,
}

/// The opaque payload of an `Action` result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ActionOutput {
    /// Code text carried verbatim; the host interprets it.
    Code(String),
}

/// One selectable entry of a `Choice` result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChoiceEntry {
    pub index: usize,
    pub text: String,
}

/// One normalized modification of a `linked-list` event, after
/// parameter-stack substitution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModificationOutput {
    pub field: String,
    pub op: ModOpKind,
    pub value: Value,
}

/// The operation of a normalized modification, without its operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModOpKind {
    Amount,
    Set,
    Append,
    Replace,
    Toggle,
}

/// A normalized event payload passed through to the host. The host
/// applies the described change; the cursor only describes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EventOutput {
    AdjustVariable {
        variable: String,
        /// The variable's declared type, when it is declared at all.
        declared: Option<ValueType>,
        operation: AdjustOp,
    },
    AddState {
        state: String,
        character: String,
    },
    RemoveState {
        state: String,
        character: String,
    },
    ProgressStory {
        chapter: Option<i64>,
        group: Option<i64>,
        node: Option<i64>,
    },
    LinkedList {
        list: String,
        scope: Option<ListScope>,
        modifications: Vec<ModificationOutput>,
        affected_characters: Vec<String>,
    },
}

/// One step's outcome. Self-contained: identifier copies and cloned
/// strings only, no references back into the graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExecutionResult {
    Dialogue {
        label: i64,
        lines: Vec<SpokenLine>,
    },
    Action {
        label: i64,
        payload: ActionOutput,
    },
    Event {
        label: i64,
        payload: EventOutput,
    },
    Choice {
        label: i64,
        options: Vec<ChoiceEntry>,
    },
    Transition {
        kind: TransitionKind,
        target: i64,
    },
    End {
        reason: EndReason,
    },
}

/// How an evaluated action affects the timeline position.
enum Flow {
    /// A completed in-place step: move to the next timeline item.
    Advance,
    /// Position untouched (pending choices, invalid items).
    Stay,
    /// The action repositioned the cursor itself.
    Repositioned,
}

/// A cursor over one story graph. Multiple cursors may share a graph;
/// each cursor belongs to exactly one caller.
pub struct ExecutionCursor<'a> {
    story: &'a StoryGraph,
    chapter: Option<i64>,
    group: Option<i64>,
    node: Option<i64>,
    timeline_index: usize,
    pending_choice: Option<&'a Action>,
    selected: Option<usize>,
    parameters: FxHashMap<(String, String), Value>,
}

impl<'a> ExecutionCursor<'a> {
    pub fn new(story: &'a StoryGraph) -> ExecutionCursor<'a> {
        ExecutionCursor {
            story,
            chapter: None,
            group: None,
            node: None,
            timeline_index: 0,
            pending_choice: None,
            selected: None,
            parameters: FxHashMap::default(),
        }
    }

    /// Position the cursor and clear all transient state. The ids are
    /// recorded unchecked; stepping from an unresolvable position
    /// reports `End(NoContent)`.
    pub fn start(&mut self, chapter: i64, group: i64, node: i64) {
        self.chapter = Some(chapter);
        self.group = Some(group);
        self.node = Some(node);
        self.timeline_index = 0;
        self.pending_choice = None;
        self.selected = None;
        self.parameters.clear();
        debug!(chapter, group, node, "cursor started");
    }

    /// Clear position and all transient state.
    pub fn reset(&mut self) {
        self.chapter = None;
        self.group = None;
        self.node = None;
        self.timeline_index = 0;
        self.pending_choice = None;
        self.selected = None;
        self.parameters.clear();
    }

    pub fn chapter(&self) -> Option<i64> {
        self.chapter
    }

    pub fn group(&self) -> Option<i64> {
        self.group
    }

    pub fn node(&self) -> Option<i64> {
        self.node
    }

    pub fn timeline_index(&self) -> usize {
        self.timeline_index
    }

    /// True when the previous step returned a choice that has not been
    /// executed yet.
    pub fn choice_pending(&self) -> bool {
        self.pending_choice.is_some()
    }

    /// Record which option of the pending choice to execute on the next
    /// step.
    pub fn select_choice(&mut self, index: usize) -> Result<(), CursorError> {
        let Some(action) = self.pending_choice else {
            return Err(CursorError::NoChoicePending);
        };
        if self.selected.is_some() {
            return Err(CursorError::ChoiceAlreadySelected);
        }
        let available = match &action.kind {
            ActionKind::Choice(options) => options.len(),
            _ => 0,
        };
        if index >= available {
            return Err(CursorError::ChoiceOutOfRange { index, available });
        }
        self.selected = Some(index);
        Ok(())
    }

    /// Push one transient override for the next `linked-list` event:
    /// the value substitutes the parsed operand of the modification
    /// whose list name matches `context` and field name matches `key`.
    pub fn add_parameter(&mut self, context: &str, key: &str, value: Value) {
        self.parameters
            .insert((context.to_string(), key.to_string()), value);
    }

    /// Advance one timeline item, or execute a previously selected
    /// choice option. The parameter stack is cleared after every step
    /// that does not return a `Choice`.
    pub fn step(&mut self) -> ExecutionResult {
        let result = self.step_inner();
        if !matches!(result, ExecutionResult::Choice { .. }) {
            self.parameters.clear();
        }
        result
    }

    fn step_inner(&mut self) -> ExecutionResult {
        if let Some(index) = self.selected.take() {
            return self.execute_selected(index);
        }

        // Borrow the node for 'a (not for the &mut self borrow) so its
        // actions can be stashed as the pending choice.
        let story = self.story;
        let Some(node_id) = self.node else {
            return ExecutionResult::End {
                reason: EndReason::NoContent,
            };
        };
        let Some(node) = story.get_node(node_id) else {
            return ExecutionResult::End {
                reason: EndReason::NoContent,
            };
        };
        let Some(item) = node.timeline.get(self.timeline_index) else {
            return ExecutionResult::End {
                reason: EndReason::TimelineComplete,
            };
        };

        match item {
            TimelineItem::Dialogue(dialogue) => {
                self.timeline_index += 1;
                ExecutionResult::Dialogue {
                    label: dialogue.label,
                    lines: dialogue.lines.clone(),
                }
            }
            TimelineItem::Action(action) => {
                let (result, flow) = self.eval_action(action);
                if let Flow::Advance = flow {
                    self.timeline_index += 1;
                }
                result
            }
        }
    }

    /// Execute the sub-actions of the selected option in order: the
    /// first transition or end wins, a nested choice suspends, and
    /// otherwise the last result is returned and the cursor moves past
    /// the choice item.
    fn execute_selected(&mut self, index: usize) -> ExecutionResult {
        let Some(action) = self.pending_choice.take() else {
            return ExecutionResult::End {
                reason: EndReason::NoContent,
            };
        };
        let ActionKind::Choice(options) = &action.kind else {
            return ExecutionResult::End {
                reason: EndReason::InvalidItem,
            };
        };
        let Some(option) = options.get(index) else {
            return ExecutionResult::End {
                reason: EndReason::InvalidItem,
            };
        };

        let mut last: Option<ExecutionResult> = None;
        let mut repositioned = false;
        for sub in &option.actions {
            let (result, flow) = self.eval_action(sub);
            match result {
                ExecutionResult::Transition { .. } | ExecutionResult::End { .. } => return result,
                ExecutionResult::Choice { .. } => return result,
                other => last = Some(other),
            }
            if let Flow::Repositioned = flow {
                repositioned = true;
            }
        }
        match last {
            Some(result) => {
                if !repositioned {
                    self.timeline_index += 1;
                }
                result
            }
            None => ExecutionResult::End {
                reason: EndReason::NoContent,
            },
        }
    }

    fn eval_action(&mut self, action: &'a Action) -> (ExecutionResult, Flow) {
        match &action.kind {
            ActionKind::Code(code) => (
                ExecutionResult::Action {
                    label: action.label,
                    payload: ActionOutput::Code(code.clone()),
                },
                Flow::Advance,
            ),
            ActionKind::Goto { node } => (self.goto_node(*node), Flow::Repositioned),
            ActionKind::Exit(ExitScope::Node) => {
                self.node = None;
                self.timeline_index = 0;
                (
                    ExecutionResult::End {
                        reason: EndReason::ExitNode,
                    },
                    Flow::Repositioned,
                )
            }
            ActionKind::Exit(ExitScope::Group) => {
                self.node = None;
                self.group = None;
                self.timeline_index = 0;
                (
                    ExecutionResult::End {
                        reason: EndReason::ExitGroup,
                    },
                    Flow::Repositioned,
                )
            }
            ActionKind::Enter { group } => (self.enter_group(*group), Flow::Repositioned),
            ActionKind::Choice(options) => {
                self.pending_choice = Some(action);
                let options = options
                    .iter()
                    .enumerate()
                    .map(|(index, option)| ChoiceEntry {
                        index,
                        text: option.text.clone(),
                    })
                    .collect();
                (
                    ExecutionResult::Choice {
                        label: action.label,
                        options,
                    },
                    Flow::Stay,
                )
            }
            ActionKind::Event(event) => self.eval_event(action.label, event),
            ActionKind::Unknown(_) => (
                ExecutionResult::End {
                    reason: EndReason::InvalidItem,
                },
                Flow::Stay,
            ),
        }
    }

    fn eval_event(&mut self, label: i64, event: &StoryEvent) -> (ExecutionResult, Flow) {
        match event {
            StoryEvent::NextNode => (self.next_node(), Flow::Repositioned),
            StoryEvent::ExitCurrentNode => {
                self.node = None;
                self.timeline_index = 0;
                (
                    ExecutionResult::End {
                        reason: EndReason::ExitNode,
                    },
                    Flow::Repositioned,
                )
            }
            StoryEvent::ExitCurrentGroup => {
                self.node = None;
                self.group = None;
                self.timeline_index = 0;
                (
                    ExecutionResult::End {
                        reason: EndReason::ExitGroup,
                    },
                    Flow::Repositioned,
                )
            }
            StoryEvent::AdjustVariable { name, op } => {
                let declared = self
                    .story
                    .get_global_variable(name)
                    .map(|v| v.value_type);
                (
                    ExecutionResult::Event {
                        label,
                        payload: EventOutput::AdjustVariable {
                            variable: name.clone(),
                            declared,
                            operation: op.clone(),
                        },
                    },
                    Flow::Advance,
                )
            }
            StoryEvent::AddState { state, character } => (
                ExecutionResult::Event {
                    label,
                    payload: EventOutput::AddState {
                        state: state.clone(),
                        character: character.clone(),
                    },
                },
                Flow::Advance,
            ),
            StoryEvent::RemoveState { state, character } => (
                ExecutionResult::Event {
                    label,
                    payload: EventOutput::RemoveState {
                        state: state.clone(),
                        character: character.clone(),
                    },
                },
                Flow::Advance,
            ),
            StoryEvent::ProgressStory {
                chapter,
                group,
                node,
            } => {
                if let Some(id) = chapter {
                    self.chapter = Some(*id);
                }
                if let Some(id) = group {
                    self.group = Some(*id);
                }
                let flow = if let Some(id) = node {
                    self.node = Some(*id);
                    self.timeline_index = 0;
                    Flow::Repositioned
                } else {
                    // With no node target the step still completes in
                    // place, even when nothing at all was supplied.
                    Flow::Advance
                };
                debug!(?chapter, ?group, ?node, "progress-story applied");
                (
                    ExecutionResult::Event {
                        label,
                        payload: EventOutput::ProgressStory {
                            chapter: *chapter,
                            group: *group,
                            node: *node,
                        },
                    },
                    flow,
                )
            }
            StoryEvent::LinkedList { list, values } => {
                (self.linked_list_event(label, list, values), Flow::Advance)
            }
            StoryEvent::Unknown(_) => (
                ExecutionResult::End {
                    reason: EndReason::InvalidItem,
                },
                Flow::Stay,
            ),
        }
    }

    fn goto_node(&mut self, target: i64) -> ExecutionResult {
        self.node = Some(target);
        self.timeline_index = 0;
        debug!(node = target, "goto node");
        ExecutionResult::Transition {
            kind: TransitionKind::Node,
            target,
        }
    }

    /// Enter a group: the position becomes the group, its chapter, and
    /// its start node. An unresolvable group cannot transition.
    fn enter_group(&mut self, target: i64) -> ExecutionResult {
        let Some(group) = self.story.get_group(target) else {
            return ExecutionResult::End {
                reason: EndReason::NoContent,
            };
        };
        self.group = Some(group.id);
        self.chapter = Some(group.chapter);
        self.node = Some(group.graph.start);
        self.timeline_index = 0;
        debug!(group = target, "entered group");
        ExecutionResult::Transition {
            kind: TransitionKind::Group,
            target,
        }
    }

    /// Follow the first successor of the current node in the current
    /// group's point-map.
    fn next_node(&mut self) -> ExecutionResult {
        let group = self.group.and_then(|id| self.story.get_group(id));
        let current = self.node;
        let next = match (group, current) {
            (Some(group), Some(node)) => group.graph.successors(node).first().copied(),
            _ => None,
        };
        match next {
            Some(target) => self.goto_node(target),
            None => ExecutionResult::End {
                reason: EndReason::NoNextNode,
            },
        }
    }

    /// Normalize a `linked-list` event: substitute parameter-stack
    /// overrides keyed by (list name, field name), and collect the
    /// characters that own the list where the current group declares it.
    fn linked_list_event(
        &self,
        label: i64,
        list: &str,
        values: &[FieldModification],
    ) -> ExecutionResult {
        let scope = self.story.get_linked_list(list).map(|l| l.scope);
        let modifications = values
            .iter()
            .map(|modification| {
                let (op, operand) = match &modification.op {
                    ModOp::Amount(v) => (ModOpKind::Amount, v),
                    ModOp::Set(v) => (ModOpKind::Set, v),
                    ModOp::Append(v) => (ModOpKind::Append, v),
                    ModOp::Replace(v) => (ModOpKind::Replace, v),
                    ModOp::Toggle(v) => (ModOpKind::Toggle, v),
                };
                let key = (list.to_string(), modification.field.clone());
                let value = self
                    .parameters
                    .get(&key)
                    .cloned()
                    .unwrap_or_else(|| operand.clone());
                ModificationOutput {
                    field: modification.field.clone(),
                    op,
                    value,
                }
            })
            .collect();

        let group_declares = self
            .group
            .and_then(|id| self.story.get_group(id))
            .map(|g| g.declares_list(list))
            .unwrap_or(false);
        let affected_characters = if group_declares {
            self.story
                .characters
                .iter()
                .filter(|c| c.owns_list(list))
                .map(|c| c.name.clone())
                .collect()
        } else {
            Vec::new()
        };

        ExecutionResult::Event {
            label,
            payload: EventOutput::LinkedList {
                list: list.to_string(),
                scope,
                modifications,
                affected_characters,
            },
        }
    }
}
