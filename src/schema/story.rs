//! The story graph: the root value owning every parsed entity, plus the
//! lookup layer over its collections.

use serde::{Deserialize, Serialize};

use super::character::Character;
use super::group::Group;
use super::linked_list::LinkedListType;
use super::node::Node;
use super::tag::TagDefinition;
use super::variable::GlobalVariable;

/// A named character state ("injured", "trusted", ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct State {
    pub name: String,
}

/// A chapter: an integer id and a display name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chapter {
    pub id: i64,
    pub name: String,
}

/// The root in-memory value produced by the parser. Owns every parsed
/// entity for its entire lifetime; execution cursors borrow it
/// read-only. Ids are unique among chapters, groups, and nodes; names
/// are unique within each named collection (parse-enforced).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StoryGraph {
    pub states: Vec<State>,
    pub global_vars: Vec<GlobalVariable>,
    pub tags: Vec<TagDefinition>,
    pub linked_lists: Vec<LinkedListType>,
    pub characters: Vec<Character>,
    pub chapters: Vec<Chapter>,
    pub groups: Vec<Group>,
    pub nodes: Vec<Node>,
}

impl StoryGraph {
    pub fn get_chapter(&self, id: i64) -> Option<&Chapter> {
        self.chapters.iter().find(|c| c.id == id)
    }

    pub fn get_group(&self, id: i64) -> Option<&Group> {
        self.groups.iter().find(|g| g.id == id)
    }

    pub fn get_node(&self, id: i64) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn get_tag_definition(&self, name: &str) -> Option<&TagDefinition> {
        self.tags.iter().find(|t| t.name == name)
    }

    pub fn get_global_variable(&self, name: &str) -> Option<&GlobalVariable> {
        self.global_vars.iter().find(|v| v.name == name)
    }

    pub fn get_linked_list(&self, name: &str) -> Option<&LinkedListType> {
        self.linked_lists.iter().find(|l| l.name == name)
    }

    pub fn get_character(&self, name: &str) -> Option<&Character> {
        self.characters.iter().find(|c| c.name == name)
    }

    pub fn get_state(&self, name: &str) -> Option<&State> {
        self.states.iter().find(|s| s.name == name)
    }

    pub fn states(&self) -> &[State] {
        &self.states
    }

    pub fn global_variables(&self) -> &[GlobalVariable] {
        &self.global_vars
    }

    pub fn tag_definitions(&self) -> &[TagDefinition] {
        &self.tags
    }

    pub fn linked_lists(&self) -> &[LinkedListType] {
        &self.linked_lists
    }

    pub fn characters(&self) -> &[Character] {
        &self.characters
    }

    pub fn chapters(&self) -> &[Chapter] {
        &self.chapters
    }

    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::value::{Value, ValueType};

    fn make_story() -> StoryGraph {
        StoryGraph {
            states: vec![State {
                name: "injured".to_string(),
            }],
            global_vars: vec![GlobalVariable {
                name: "Money".to_string(),
                value_type: ValueType::Int,
                default: Value::Int(0),
            }],
            chapters: vec![Chapter {
                id: 1,
                name: "One".to_string(),
            }],
            nodes: vec![Node {
                id: 4,
                title: "Arrival".to_string(),
                content: String::new(),
                timeline: Vec::new(),
            }],
            ..StoryGraph::default()
        }
    }

    #[test]
    fn lookup_by_id() {
        let story = make_story();
        assert_eq!(story.get_chapter(1).map(|c| c.name.as_str()), Some("One"));
        assert!(story.get_chapter(2).is_none());
        assert_eq!(story.get_node(4).map(|n| n.title.as_str()), Some("Arrival"));
        assert!(story.get_group(1).is_none());
    }

    #[test]
    fn lookup_by_name() {
        let story = make_story();
        assert!(story.get_global_variable("Money").is_some());
        assert!(story.get_global_variable("Karma").is_none());
        assert!(story.get_state("injured").is_some());
        assert!(story.get_character("Saniyah").is_none());
    }

    #[test]
    fn bulk_accessors_expose_collections() {
        let story = make_story();
        assert_eq!(story.states().len(), 1);
        assert_eq!(story.global_variables().len(), 1);
        assert_eq!(story.chapters().len(), 1);
        assert_eq!(story.nodes().len(), 1);
        assert!(story.groups().is_empty());
    }
}
