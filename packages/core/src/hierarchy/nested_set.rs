/// Arena of nested-set intervals for one tenant's page forest
use super::error::HierarchyError;
use crate::models::NodeId;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

type Result<T> = std::result::Result<T, HierarchyError>;

/// Position fields of one node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interval {
    pub left: i64,
    pub right: i64,
    pub depth: i64,
    pub parent_id: Option<NodeId>,
}

impl Interval {
    pub fn width(&self) -> i64 {
        self.right - self.left + 1
    }

    pub fn encloses(&self, other: &Interval) -> bool {
        self.left <= other.left && other.right <= self.right
    }
}

/// Where a node goes below its (new) parent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Position {
    First,
    Last,
    Before(NodeId),
    After(NodeId),
}

/// Rows to write after an operation, unchanged rows are left out
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Renumbering {
    pub inserted: Option<(NodeId, Interval)>,

    /// `(id, before, after)` sorted by id
    pub updated: Vec<(NodeId, Interval, Interval)>,

    pub removed: Vec<NodeId>,
}

impl Renumbering {
    pub fn is_empty(&self) -> bool {
        self.inserted.is_none() && self.updated.is_empty() && self.removed.is_empty()
    }

    /// Number of rows the change touches
    pub fn touched(&self) -> usize {
        usize::from(self.inserted.is_some()) + self.updated.len() + self.removed.len()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NestedSet {
    nodes: HashMap<NodeId, Interval>,
}

impl NestedSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arena from stored rows, rejected unless every invariant holds
    pub fn from_intervals<I>(items: I) -> Result<Self>
    where
        I: IntoIterator<Item = (NodeId, Interval)>,
    {
        let mut nodes = HashMap::new();
        for (id, interval) in items {
            if nodes.insert(id, interval).is_some() {
                return Err(HierarchyError::DuplicateNode(id));
            }
        }

        validate(&nodes)?;
        Ok(Self { nodes })
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: NodeId) -> Option<Interval> {
        self.nodes.get(&id).copied()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, Interval)> + '_ {
        self.nodes.iter().map(|(id, interval)| (*id, *interval))
    }

    fn require(&self, id: NodeId) -> Result<Interval> {
        self.get(id).ok_or(HierarchyError::NotFound(id))
    }

    fn max_right(&self) -> i64 {
        self.nodes.values().map(|i| i.right).max().unwrap_or(0)
    }

    /// Left bound the node will get and its depth, in current numbering
    fn slot(&self, parent: Option<NodeId>, position: Position) -> Result<(i64, i64)> {
        let parent_interval = parent.map(|id| self.require(id)).transpose()?;
        let child_depth = parent_interval.map_or(0, |p| p.depth + 1);

        match position {
            Position::First => Ok((parent_interval.map_or(1, |p| p.left + 1), child_depth)),
            Position::Last => Ok((
                parent_interval.map_or(self.max_right() + 1, |p| p.right),
                child_depth,
            )),
            Position::Before(sibling) | Position::After(sibling) => {
                let s = self.require(sibling)?;
                if s.parent_id != parent {
                    return Err(HierarchyError::invalid_position(format!(
                        "node {} is not a child of {:?}",
                        sibling, parent
                    )));
                }
                let left = if matches!(position, Position::Before(_)) {
                    s.left
                } else {
                    s.right + 1
                };
                Ok((left, s.depth))
            }
        }
    }

    /// Insert a leaf node
    pub fn insert(
        &mut self,
        id: NodeId,
        parent: Option<NodeId>,
        position: Position,
    ) -> Result<Renumbering> {
        if self.contains(id) {
            return Err(HierarchyError::DuplicateNode(id));
        }

        let (slot, depth) = self.slot(parent, position)?;
        let mut next = self.nodes.clone();

        for interval in next.values_mut() {
            if interval.left >= slot {
                interval.left += 2;
            }
            if interval.right >= slot {
                interval.right += 2;
            }
        }

        next.insert(
            id,
            Interval {
                left: slot,
                right: slot + 1,
                depth,
                parent_id: parent,
            },
        );

        self.commit(next, Some(id), Vec::new())
    }

    pub fn append_child(&mut self, id: NodeId, parent: NodeId) -> Result<Renumbering> {
        self.insert(id, Some(parent), Position::Last)
    }

    /// Insert `id` directly before `sibling`, under the sibling's parent
    pub fn insert_before(&mut self, id: NodeId, sibling: NodeId) -> Result<Renumbering> {
        let parent = self.require(sibling)?.parent_id;
        self.insert(id, parent, Position::Before(sibling))
    }

    /// Append a new root level node after all existing trees
    pub fn create_root(&mut self, id: NodeId) -> Result<Renumbering> {
        self.insert(id, None, Position::Last)
    }

    /// Move a node with all its descendants
    ///
    /// The gap at the old location is closed and the subtree reopened at the
    /// target in a single pass over the arena.
    pub fn move_subtree(
        &mut self,
        id: NodeId,
        new_parent: Option<NodeId>,
        position: Position,
    ) -> Result<Renumbering> {
        let node = self.require(id)?;

        if let Some(parent) = new_parent {
            if node.encloses(&self.require(parent)?) {
                return Err(HierarchyError::Cycle {
                    node: id,
                    target: parent,
                });
            }
        }

        if matches!(position, Position::Before(s) | Position::After(s) if s == id) {
            return Ok(Renumbering::default());
        }

        let (slot, depth) = self.slot(new_parent, position)?;
        let width = node.width();
        let depth_delta = depth - node.depth;

        let subtree: HashSet<NodeId> = self
            .nodes
            .iter()
            .filter(|(_, i)| node.encloses(i))
            .map(|(id, _)| *id)
            .collect();

        // Shift of the subtree, and of foreign bounds between old and new place
        let (subtree_shift, shift_other): (i64, Box<dyn Fn(i64) -> i64>) = if slot > node.right {
            let (from, to) = (node.right, slot);
            (
                slot - node.right - 1,
                Box::new(move |v| if v > from && v < to { v - width } else { v }),
            )
        } else if slot < node.left {
            let (from, to) = (slot, node.left);
            (
                slot - node.left,
                Box::new(move |v| if v >= from && v < to { v + width } else { v }),
            )
        } else {
            (0, Box::new(|v| v))
        };

        let mut next = self.nodes.clone();
        for (nid, interval) in next.iter_mut() {
            if subtree.contains(nid) {
                interval.left += subtree_shift;
                interval.right += subtree_shift;
                interval.depth += depth_delta;
            } else {
                interval.left = shift_other(interval.left);
                interval.right = shift_other(interval.right);
            }
        }

        if let Some(moved) = next.get_mut(&id) {
            moved.parent_id = new_parent;
        }

        self.commit(next, None, Vec::new())
    }

    /// Remove a node and its descendants, closing the gap
    pub fn remove_subtree(&mut self, id: NodeId) -> Result<Renumbering> {
        let node = self.require(id)?;
        let width = node.width();

        let mut removed = Vec::new();
        let mut next = HashMap::with_capacity(self.nodes.len());

        for (nid, interval) in &self.nodes {
            if node.encloses(interval) {
                removed.push(*nid);
                continue;
            }

            let mut interval = *interval;
            if interval.left > node.right {
                interval.left -= width;
            }
            if interval.right > node.right {
                interval.right -= width;
            }
            next.insert(*nid, interval);
        }

        removed.sort_unstable();
        self.commit(next, None, removed)
    }

    fn commit(
        &mut self,
        next: HashMap<NodeId, Interval>,
        inserted: Option<NodeId>,
        removed: Vec<NodeId>,
    ) -> Result<Renumbering> {
        validate(&next)?;

        let mut change = Renumbering {
            removed,
            ..Default::default()
        };

        for (id, after) in &next {
            if Some(*id) == inserted {
                change.inserted = Some((*id, *after));
            } else if let Some(before) = self.nodes.get(id) {
                if before != after {
                    change.updated.push((*id, *before, *after));
                }
            }
        }
        change.updated.sort_unstable_by_key(|(id, _, _)| *id);

        self.nodes = next;
        Ok(change)
    }

    //
    // Queries
    //

    fn sorted_by_left<F>(&self, filter: F) -> Vec<NodeId>
    where
        F: Fn(&Interval) -> bool,
    {
        let mut found: Vec<(i64, NodeId)> = self
            .nodes
            .iter()
            .filter(|(_, i)| filter(i))
            .map(|(id, i)| (i.left, *id))
            .collect();
        found.sort_unstable();
        found.into_iter().map(|(_, id)| id).collect()
    }

    /// Ancestors from the root down
    pub fn ancestors(&self, id: NodeId) -> Result<Vec<NodeId>> {
        let node = self.require(id)?;
        Ok(self.sorted_by_left(|i| i.left < node.left && i.right > node.right))
    }

    /// Descendants in document order
    pub fn descendants(&self, id: NodeId) -> Result<Vec<NodeId>> {
        let node = self.require(id)?;
        Ok(self.sorted_by_left(|i| i.left > node.left && i.right < node.right))
    }

    /// Direct children in order
    pub fn children(&self, id: NodeId) -> Result<Vec<NodeId>> {
        let node = self.require(id)?;
        Ok(self.sorted_by_left(|i| {
            i.left > node.left && i.right < node.right && i.depth == node.depth + 1
        }))
    }

    /// Other children of the node's parent, in order
    pub fn siblings(&self, id: NodeId) -> Result<Vec<NodeId>> {
        let node = self.require(id)?;
        let siblings = match node.parent_id {
            Some(parent) => self.children(parent)?,
            None => self.roots(),
        };
        Ok(siblings.into_iter().filter(|s| *s != id).collect())
    }

    pub fn roots(&self) -> Vec<NodeId> {
        self.sorted_by_left(|i| i.parent_id.is_none())
    }

    pub fn is_self_or_descendant_of(&self, a: NodeId, b: NodeId) -> Result<bool> {
        let a = self.require(a)?;
        let b = self.require(b)?;
        Ok(a.left >= b.left && a.right <= b.right)
    }

    /// Check every invariant of the arena
    pub fn validate(&self) -> Result<()> {
        validate(&self.nodes)
    }
}

/// Bounds must be exactly `1..=2n`, properly nested, with parent and depth
/// matching the tightest enclosing interval.
fn validate(nodes: &HashMap<NodeId, Interval>) -> Result<()> {
    let mut bounds = Vec::with_capacity(nodes.len() * 2);
    for (id, interval) in nodes {
        if interval.left >= interval.right {
            return Err(HierarchyError::integrity(format!(
                "node {} has inverted bounds [{}, {}]",
                id, interval.left, interval.right
            )));
        }
        bounds.push(interval.left);
        bounds.push(interval.right);
    }

    bounds.sort_unstable();
    for (expected, value) in (1..).zip(&bounds) {
        if *value != expected {
            return Err(HierarchyError::integrity(format!(
                "bounds are not contiguous, expected {} found {}",
                expected, value
            )));
        }
    }

    let mut ordered: Vec<(&NodeId, &Interval)> = nodes.iter().collect();
    ordered.sort_unstable_by_key(|(_, i)| i.left);

    let mut open: Vec<(NodeId, Interval)> = Vec::new();
    for (id, interval) in ordered {
        while open.last().is_some_and(|(_, top)| top.right < interval.left) {
            open.pop();
        }

        let enclosing = open.last().copied();
        if let Some((parent_id, parent)) = enclosing {
            if parent.right < interval.right {
                return Err(HierarchyError::integrity(format!(
                    "node {} overlaps node {}",
                    id, parent_id
                )));
            }
        }

        let expected_parent = enclosing.map(|(pid, _)| pid);
        if interval.parent_id != expected_parent {
            return Err(HierarchyError::integrity(format!(
                "node {} records parent {:?} but is nested in {:?}",
                id, interval.parent_id, expected_parent
            )));
        }

        if interval.depth != open.len() as i64 {
            return Err(HierarchyError::integrity(format!(
                "node {} has depth {} but {} ancestors",
                id,
                interval.depth,
                open.len()
            )));
        }

        open.push((*id, *interval));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 1 [1,8] > 2 [2,3], 3 [4,7] > 4 [5,6]; 5 [9,10]
    fn sample() -> NestedSet {
        let mut set = NestedSet::new();
        set.create_root(1).unwrap();
        set.append_child(2, 1).unwrap();
        set.append_child(3, 1).unwrap();
        set.append_child(4, 3).unwrap();
        set.create_root(5).unwrap();
        set
    }

    fn bounds(set: &NestedSet, id: NodeId) -> (i64, i64) {
        let i = set.get(id).unwrap();
        (i.left, i.right)
    }

    #[test]
    fn test_build_numbering() {
        let set = sample();
        assert_eq!(bounds(&set, 1), (1, 8));
        assert_eq!(bounds(&set, 2), (2, 3));
        assert_eq!(bounds(&set, 3), (4, 7));
        assert_eq!(bounds(&set, 4), (5, 6));
        assert_eq!(bounds(&set, 5), (9, 10));
        assert_eq!(set.get(4).unwrap().depth, 2);
    }

    #[test]
    fn test_insert_before_shifts_following_nodes() {
        let mut set = sample();
        let change = set.insert_before(6, 3).unwrap();

        assert_eq!(change.inserted, Some((6, set.get(6).unwrap())));
        assert_eq!(bounds(&set, 6), (4, 5));
        assert_eq!(bounds(&set, 3), (6, 9));
        assert_eq!(set.children(1).unwrap(), vec![2, 6, 3]);
        // node 2 lies before the slot and is untouched
        assert!(change.updated.iter().all(|(id, _, _)| *id != 2));
    }

    #[test]
    fn test_first_position() {
        let mut set = sample();
        set.insert(6, Some(1), Position::First).unwrap();
        assert_eq!(set.children(1).unwrap(), vec![6, 2, 3]);

        set.insert(7, None, Position::First).unwrap();
        assert_eq!(set.roots(), vec![7, 1, 5]);
    }

    #[test]
    fn test_queries() {
        let set = sample();
        assert_eq!(set.ancestors(4).unwrap(), vec![1, 3]);
        assert_eq!(set.descendants(1).unwrap(), vec![2, 3, 4]);
        assert_eq!(set.children(1).unwrap(), vec![2, 3]);
        assert_eq!(set.siblings(2).unwrap(), vec![3]);
        assert_eq!(set.siblings(5).unwrap(), vec![1]);
        assert!(set.is_self_or_descendant_of(4, 1).unwrap());
        assert!(set.is_self_or_descendant_of(3, 3).unwrap());
        assert!(!set.is_self_or_descendant_of(5, 1).unwrap());
    }

    #[test]
    fn test_move_subtree_forward() {
        let mut set = sample();
        // move 3 (with 4) below 5
        set.move_subtree(3, Some(5), Position::Last).unwrap();

        assert_eq!(bounds(&set, 1), (1, 4));
        assert_eq!(bounds(&set, 5), (5, 10));
        assert_eq!(bounds(&set, 3), (6, 9));
        assert_eq!(bounds(&set, 4), (7, 8));
        assert_eq!(set.get(3).unwrap().parent_id, Some(5));
        assert_eq!(set.get(4).unwrap().depth, 2);
    }

    #[test]
    fn test_move_subtree_backward() {
        let mut set = sample();
        set.move_subtree(5, Some(1), Position::First).unwrap();

        assert_eq!(set.children(1).unwrap(), vec![5, 2, 3]);
        assert_eq!(set.get(5).unwrap().depth, 1);
        assert_eq!(set.roots(), vec![1]);
    }

    #[test]
    fn test_move_to_root_level() {
        let mut set = sample();
        set.move_subtree(3, None, Position::Before(1)).unwrap();
        assert_eq!(set.roots(), vec![3, 1, 5]);
        assert_eq!(set.get(4).unwrap().depth, 1);
    }

    #[test]
    fn test_move_into_own_subtree_is_rejected() {
        let mut set = sample();
        let before = set.clone();

        let err = set.move_subtree(3, Some(4), Position::Last).unwrap_err();
        assert!(matches!(err, HierarchyError::Cycle { node: 3, target: 4 }));
        assert_eq!(set, before);
    }

    #[test]
    fn test_move_next_to_itself_is_noop() {
        let mut set = sample();
        let change = set.move_subtree(2, Some(1), Position::After(2)).unwrap();
        assert!(change.is_empty());
    }

    #[test]
    fn test_sibling_of_other_parent_is_rejected() {
        let mut set = sample();
        let err = set.insert(6, Some(5), Position::Before(2)).unwrap_err();
        assert!(matches!(err, HierarchyError::InvalidPosition(_)));
        assert!(!set.contains(6));
    }

    #[test]
    fn test_remove_subtree_closes_gap() {
        let mut set = sample();
        let change = set.remove_subtree(3).unwrap();

        assert_eq!(change.removed, vec![3, 4]);
        assert_eq!(bounds(&set, 1), (1, 4));
        assert_eq!(bounds(&set, 5), (5, 6));
        assert!(set.validate().is_ok());
    }

    #[test]
    fn test_renumbering_is_minimal() {
        let mut set = sample();
        // appending a root touches nothing else
        let change = set.create_root(6).unwrap();
        assert!(change.updated.is_empty());
        assert_eq!(change.touched(), 1);
    }

    #[test]
    fn test_from_intervals_rejects_overlap() {
        let overlapping = vec![
            (
                1,
                Interval {
                    left: 1,
                    right: 3,
                    depth: 0,
                    parent_id: None,
                },
            ),
            (
                2,
                Interval {
                    left: 2,
                    right: 4,
                    depth: 1,
                    parent_id: Some(1),
                },
            ),
        ];

        assert!(matches!(
            NestedSet::from_intervals(overlapping),
            Err(HierarchyError::Integrity(_))
        ));
    }

    #[test]
    fn test_from_intervals_rejects_wrong_parent() {
        let rows = vec![
            (
                1,
                Interval {
                    left: 1,
                    right: 4,
                    depth: 0,
                    parent_id: None,
                },
            ),
            (
                2,
                Interval {
                    left: 2,
                    right: 3,
                    depth: 1,
                    parent_id: None,
                },
            ),
        ];

        assert!(NestedSet::from_intervals(rows).is_err());
    }

    #[test]
    fn test_unknown_nodes() {
        let mut set = sample();
        assert_eq!(set.children(99), Err(HierarchyError::NotFound(99)));
        assert!(set.append_child(7, 99).is_err());
        assert_eq!(set.insert(2, None, Position::Last), Err(HierarchyError::DuplicateNode(2)));
    }
}
