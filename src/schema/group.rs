use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// A tag applied to a group, with the optional selected key and value
/// for key-value tags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupTag {
    pub tag: String,
    pub key: Option<String>,
    pub value: Option<String>,
}

/// The directed successor structure of a group: a start node, an end
/// node, and a point-map from node id to its next node ids in order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NodeGraph {
    pub start: i64,
    pub end: i64,
    pub points: FxHashMap<i64, Vec<i64>>,
}

impl NodeGraph {
    /// Ordered successors of a node, empty if the node has no entry.
    pub fn successors(&self, node: i64) -> &[i64] {
        self.points.get(&node).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// A group of nodes within a chapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub id: i64,
    pub chapter: i64,
    pub name: String,
    pub content: String,
    pub parent_group: Option<i64>,
    pub tags: Vec<GroupTag>,
    pub linked_lists: Vec<String>,
    pub graph: NodeGraph,
}

impl Group {
    /// Returns true if this group declares the named linked list.
    pub fn declares_list(&self, list: &str) -> bool {
        self.linked_lists.iter().any(|l| l == list)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn successors_ordered() {
        let mut points = FxHashMap::default();
        points.insert(1, vec![2, 3]);
        let graph = NodeGraph {
            start: 1,
            end: 3,
            points,
        };
        assert_eq!(graph.successors(1), &[2, 3]);
        assert!(graph.successors(2).is_empty());
    }

    #[test]
    fn declares_list() {
        let group = Group {
            id: 1,
            chapter: 1,
            name: "Docks".to_string(),
            content: String::new(),
            parent_group: None,
            tags: Vec::new(),
            linked_lists: vec!["Profession".to_string()],
            graph: NodeGraph::default(),
        };
        assert!(group.declares_list("Profession"));
        assert!(!group.declares_list("Inventory"));
    }
}
