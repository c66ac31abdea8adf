/// Advisory reference validation: checks that every `@node`, `@group`,
/// and `@chapter` reference embedded in the story graph resolves.
///
/// Validation never mutates or invalidates the graph; an unresolved
/// reference is reported, not removed.

use rustc_hash::FxHashSet;
use std::fmt;
use thiserror::Error;
use tracing::debug;

use crate::schema::node::{Action, ActionKind, StoryEvent, TimelineItem};
use crate::schema::story::StoryGraph;

/// What an unresolved reference points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefKind {
    Node,
    Group,
    Chapter,
}

impl fmt::Display for RefKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Node => f.write_str("node"),
            Self::Group => f.write_str("group"),
            Self::Chapter => f.write_str("chapter"),
        }
    }
}

/// The first unresolved reference found during validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unresolved @{kind}({id}) reference in {context}")]
pub struct UnresolvedReference {
    pub kind: RefKind,
    pub id: i64,
    pub context: String,
}

struct Validator<'a> {
    nodes: FxHashSet<i64>,
    groups: FxHashSet<i64>,
    chapters: FxHashSet<i64>,
    story: &'a StoryGraph,
}

/// Walk every reference in group node-graphs, event payloads, and
/// choice sub-actions. Returns the first unresolved reference.
pub fn validate_references(story: &StoryGraph) -> Result<(), UnresolvedReference> {
    let validator = Validator {
        nodes: story.nodes.iter().map(|n| n.id).collect(),
        groups: story.groups.iter().map(|g| g.id).collect(),
        chapters: story.chapters.iter().map(|c| c.id).collect(),
        story,
    };
    let result = validator.run();
    if let Err(ref unresolved) = result {
        debug!(%unresolved, "reference validation failed");
    }
    result
}

impl Validator<'_> {
    fn run(&self) -> Result<(), UnresolvedReference> {
        for group in &self.story.groups {
            let context = format!("group {}", group.id);
            self.check(RefKind::Chapter, group.chapter, &context)?;
            if let Some(parent) = group.parent_group {
                self.check(RefKind::Group, parent, &context)?;
            }
            self.check(RefKind::Node, group.graph.start, &context)?;
            self.check(RefKind::Node, group.graph.end, &context)?;
            for (from, successors) in &group.graph.points {
                let context = format!("group {} point map", group.id);
                self.check(RefKind::Node, *from, &context)?;
                for next in successors {
                    self.check(RefKind::Node, *next, &context)?;
                }
            }
        }
        for node in &self.story.nodes {
            for item in &node.timeline {
                if let TimelineItem::Action(action) = item {
                    self.check_action(action, node.id)?;
                }
            }
        }
        Ok(())
    }

    fn check_action(&self, action: &Action, node_id: i64) -> Result<(), UnresolvedReference> {
        let context = format!("node {} action {}", node_id, action.label);
        match &action.kind {
            ActionKind::Goto { node } => self.check(RefKind::Node, *node, &context),
            ActionKind::Enter { group } => self.check(RefKind::Group, *group, &context),
            ActionKind::Choice(options) => {
                for option in options {
                    for sub in &option.actions {
                        self.check_action(sub, node_id)?;
                    }
                }
                Ok(())
            }
            ActionKind::Event(StoryEvent::ProgressStory {
                chapter,
                group,
                node,
            }) => {
                if let Some(id) = chapter {
                    self.check(RefKind::Chapter, *id, &context)?;
                }
                if let Some(id) = group {
                    self.check(RefKind::Group, *id, &context)?;
                }
                if let Some(id) = node {
                    self.check(RefKind::Node, *id, &context)?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn check(&self, kind: RefKind, id: i64, context: &str) -> Result<(), UnresolvedReference> {
        let known = match kind {
            RefKind::Node => &self.nodes,
            RefKind::Group => &self.groups,
            RefKind::Chapter => &self.chapters,
        };
        if known.contains(&id) {
            Ok(())
        } else {
            Err(UnresolvedReference {
                kind,
                id,
                context: context.to_string(),
            })
        }
    }
}
