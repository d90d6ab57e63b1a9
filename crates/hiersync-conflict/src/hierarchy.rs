//! Structural index of a tracking tree
//!
//! [`HierarchyIndex::build`] verifies that every entity's parent chain
//! reaches the project root and computes a breadth-first traversal order.
//! Node `0` is always the project; node `i + 1` is `tree.entities[i]`.
//!
//! In the traversal order a parent always precedes its children, and the
//! children of one parent are contiguous and kept in document order.

use std::collections::{HashMap, VecDeque};

use hiersync_core::domain::{TrackingEntity, TrackingTree};

use crate::error::ConflictError;

/// Parent/child structure of a validated tracking tree
#[derive(Debug, Clone)]
pub struct HierarchyIndex {
    parent: Vec<Option<usize>>,
    children: Vec<Vec<usize>>,
    order: Vec<usize>,
    link_paths: Vec<Vec<String>>,
}

impl HierarchyIndex {
    /// Validate the tree and build the index
    ///
    /// # Errors
    /// `HierarchyIntegrity` when an id appears twice, a parent is missing
    /// from the tree, or a parent chain loops without reaching the root.
    pub fn build(tree: &TrackingTree) -> Result<Self, ConflictError> {
        let nodes: Vec<&TrackingEntity> = tree.iter().collect();

        let mut position = HashMap::with_capacity(nodes.len());
        for (idx, node) in nodes.iter().enumerate() {
            if position.insert(&node.id, idx).is_some() {
                return Err(ConflictError::HierarchyIntegrity(format!(
                    "entity {} ({}) appears more than once in the project tree",
                    node.name, node.id
                )));
            }
        }

        let mut parent = vec![None; nodes.len()];
        let mut children = vec![Vec::new(); nodes.len()];
        for (idx, node) in nodes.iter().enumerate().skip(1) {
            let Some(parent_id) = &node.parent_id else {
                return Err(ConflictError::HierarchyIntegrity(format!(
                    "entity {} ({}) has no parent",
                    node.name, node.id
                )));
            };
            let Some(&parent_idx) = position.get(parent_id) else {
                return Err(ConflictError::HierarchyIntegrity(format!(
                    "parent {} of entity {} ({}) is not part of the project tree",
                    parent_id, node.name, node.id
                )));
            };
            parent[idx] = Some(parent_idx);
            children[parent_idx].push(idx);
        }

        let mut order = Vec::with_capacity(nodes.len());
        let mut link_paths = vec![Vec::new(); nodes.len()];
        let mut queue = VecDeque::from([0]);
        while let Some(idx) = queue.pop_front() {
            order.push(idx);
            for &child in &children[idx] {
                let mut path = link_paths[idx].clone();
                path.push(nodes[idx].name.clone());
                link_paths[child] = path;
                queue.push_back(child);
            }
        }

        if order.len() != nodes.len() {
            let mut reached = vec![false; nodes.len()];
            for &idx in &order {
                reached[idx] = true;
            }
            if let Some(idx) = reached.iter().position(|r| !r) {
                return Err(ConflictError::HierarchyIntegrity(format!(
                    "parent chain of entity {} ({}) does not reach the project root",
                    nodes[idx].name, nodes[idx].id
                )));
            }
        }

        Ok(Self {
            parent,
            children,
            order,
            link_paths,
        })
    }

    /// Breadth-first order starting at the project
    #[must_use]
    pub fn order(&self) -> &[usize] {
        &self.order
    }

    /// Children of a node in document order
    #[must_use]
    pub fn children(&self, idx: usize) -> &[usize] {
        &self.children[idx]
    }

    #[must_use]
    pub fn parent(&self, idx: usize) -> Option<usize> {
        self.parent[idx]
    }

    /// Ancestor names of a node, starting with the project name
    #[must_use]
    pub fn link_path(&self, idx: usize) -> &[String] {
        &self.link_paths[idx]
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.parent.len()
    }

    /// An index always contains the project
    #[must_use]
    pub fn is_empty(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hiersync_core::domain::{EntityType, TrackingId};

    fn tid(s: &str) -> TrackingId {
        TrackingId::new(s).unwrap()
    }

    fn node(id: &str, name: &str, t: EntityType, parent: &str) -> TrackingEntity {
        TrackingEntity::new(tid(id), name, t).with_parent(tid(parent))
    }

    fn project() -> TrackingEntity {
        TrackingEntity::new(tid("p"), "Demo", EntityType::Project)
    }

    #[test]
    fn test_children_listed_before_parents_are_reordered() {
        // SH010 comes before its parent SEQ01 in document order
        let tree = TrackingTree::new(
            project(),
            vec![
                node("sh010", "SH010", EntityType::Shot, "seq01"),
                node("seq01", "SEQ01", EntityType::Sequence, "p"),
                node("sh020", "SH020", EntityType::Shot, "seq01"),
            ],
        );
        let index = HierarchyIndex::build(&tree).unwrap();

        assert_eq!(index.order(), &[0, 2, 1, 3]);
        assert_eq!(index.children(2), &[1, 3]);
        assert_eq!(index.parent(1), Some(2));
        assert_eq!(index.link_path(1), &["Demo".to_string(), "SEQ01".to_string()]);
        assert!(index.link_path(0).is_empty());
    }

    #[test]
    fn test_dangling_parent_is_integrity_error() {
        let tree = TrackingTree::new(
            project(),
            vec![node("sh010", "SH010", EntityType::Shot, "missing")],
        );
        let err = HierarchyIndex::build(&tree).unwrap_err();
        assert!(err.to_string().contains("is not part of the project tree"));
    }

    #[test]
    fn test_missing_parent_id_is_integrity_error() {
        let orphan = TrackingEntity::new(tid("f"), "assets", EntityType::Folder);
        let tree = TrackingTree::new(project(), vec![orphan]);
        assert!(matches!(
            HierarchyIndex::build(&tree),
            Err(ConflictError::HierarchyIntegrity(_))
        ));
    }

    #[test]
    fn test_cycle_is_integrity_error() {
        let tree = TrackingTree::new(
            project(),
            vec![
                node("a", "A", EntityType::Folder, "b"),
                node("b", "B", EntityType::Folder, "a"),
            ],
        );
        let err = HierarchyIndex::build(&tree).unwrap_err();
        assert!(err.to_string().contains("does not reach the project root"));
    }

    #[test]
    fn test_duplicate_id_is_integrity_error() {
        let tree = TrackingTree::new(
            project(),
            vec![
                node("a", "A", EntityType::Folder, "p"),
                node("a", "A2", EntityType::Folder, "p"),
            ],
        );
        assert!(HierarchyIndex::build(&tree).is_err());
    }
}
