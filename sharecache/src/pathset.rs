//! Path-keyed nested sets with automatic pruning.
//!
//! A [`PathSet`] is a depth-bounded trie: every interior level is a map from
//! a key to its child node, and every leaf is a set of members. A location is
//! addressed by an ordered path of fixed length, chosen when the container is
//! created. The coordinator uses a depth of two to group pending waiters by
//! `[cache key, writer id]`.
//!
//! After every mutation the container prunes itself: no interior map and no
//! leaf set that became empty stays reachable. Pruning walks the mutated path
//! inside out, so a parent that becomes empty only after its child was removed
//! is removed as well.
//!
//! # Example
//!
//! ```ignore
//! use sharecache::pathset::PathSet;
//!
//! let mut waiters: PathSet<String, u64> = PathSet::new(2);
//! waiters.insert(&["x".into(), "w1".into()], 7);
//! assert!(waiters.contains(&["x".into(), "w1".into()]));
//!
//! waiters.remove(&["x".into(), "w1".into()], &7);
//! // The leaf set emptied, so the whole "x" branch is gone.
//! assert!(!waiters.contains(&["x".into(), "w1".into()]));
//! assert!(waiters.is_empty());
//! ```

use std::collections::{HashMap, HashSet};
use std::hash::Hash;

// =============================================================================
// Node
// =============================================================================

/// A single level of the trie: either another map level or a leaf set.
#[derive(Debug)]
enum Node<K, V> {
    /// Interior level, keyed by the next path element.
    Branch(HashMap<K, Node<K, V>>),

    /// Deepest level, holding the members addressed by a full path.
    Leaf(HashSet<V>),
}

impl<K, V> Node<K, V> {
    fn is_empty(&self) -> bool {
        match self {
            Node::Branch(children) => children.is_empty(),
            Node::Leaf(members) => members.is_empty(),
        }
    }
}

// =============================================================================
// PathSet
// =============================================================================

/// A self-pruning trie of sets, addressed by fixed-length paths.
///
/// All paths passed to a `PathSet` must have exactly the length given to
/// [`PathSet::new`]. Reads on absent paths answer `false`/`None`/empty and
/// never create nodes; writes create missing interior nodes on demand.
#[derive(Debug)]
pub struct PathSet<K, V> {
    /// Required path length; interior levels are `depth - 1` maps deep.
    depth: usize,

    /// The root level.
    root: HashMap<K, Node<K, V>>,
}

impl<K, V> PathSet<K, V>
where
    K: Eq + Hash + Clone,
    V: Eq + Hash,
{
    /// Creates an empty container for paths of exactly `depth` elements.
    ///
    /// # Panics
    ///
    /// Panics if `depth` is zero.
    pub fn new(depth: usize) -> Self {
        assert!(depth >= 1, "PathSet depth must be at least 1");
        Self {
            depth,
            root: HashMap::new(),
        }
    }

    /// Returns true when a leaf set exists at `path`.
    ///
    /// Never mutates the container. Any absent step along the way answers
    /// `false` rather than panicking.
    pub fn contains(&self, path: &[K]) -> bool {
        debug_assert_eq!(path.len(), self.depth, "path length must match depth");
        let Some((last, interior)) = path.split_last() else {
            return false;
        };
        let mut level = &self.root;
        for step in interior {
            match level.get(step) {
                Some(Node::Branch(children)) => level = children,
                _ => return false,
            }
        }
        level.contains_key(last)
    }

    /// Returns the leaf set at `path` without creating it.
    pub fn leaf(&self, path: &[K]) -> Option<&HashSet<V>> {
        debug_assert_eq!(path.len(), self.depth, "path length must match depth");
        let (last, interior) = path.split_last()?;
        let mut level = &self.root;
        for step in interior {
            match level.get(step) {
                Some(Node::Branch(children)) => level = children,
                _ => return None,
            }
        }
        match level.get(last) {
            Some(Node::Leaf(members)) => Some(members),
            _ => None,
        }
    }

    /// Returns the leaf set at `path`, creating every missing node on the
    /// way (get-or-create). Repeated calls without intervening mutation hand
    /// back the same set.
    pub fn leaf_mut(&mut self, path: &[K]) -> &mut HashSet<V> {
        debug_assert_eq!(path.len(), self.depth, "path length must match depth");
        let (last, interior) = path
            .split_last()
            .expect("PathSet paths have at least one element");
        let mut level = &mut self.root;
        for step in interior {
            let node = level
                .entry(step.clone())
                .or_insert_with(|| Node::Branch(HashMap::new()));
            level = match node {
                Node::Branch(children) => children,
                // Interior steps only ever address branches; the depth is
                // fixed at construction.
                Node::Leaf(_) => unreachable!("leaf node at interior depth"),
            };
        }
        let node = level
            .entry(last.clone())
            .or_insert_with(|| Node::Leaf(HashSet::new()));
        match node {
            Node::Leaf(members) => members,
            Node::Branch(_) => unreachable!("branch node at leaf depth"),
        }
    }

    /// Adds `value` to the leaf set at `path`, creating intermediate nodes
    /// as needed. Returns false when the value was already present.
    pub fn insert(&mut self, path: &[K], value: V) -> bool {
        self.leaf_mut(path).insert(value)
    }

    /// Removes one `value` from the leaf set at `path`, then prunes any
    /// nodes the removal left empty.
    ///
    /// A `path` whose prefix does not exist is a no-op, not an error.
    /// Returns true when the value was present.
    pub fn remove(&mut self, path: &[K], value: &V) -> bool {
        let removed = match self.existing_leaf_mut(path) {
            Some(members) => members.remove(value),
            None => false,
        };
        prune(&mut self.root, path);
        removed
    }

    /// Empties the leaf set at `path` (if present) and prunes the branch.
    pub fn clear(&mut self, path: &[K]) {
        self.take(path);
    }

    /// Drains and returns the leaf set at `path`, pruning the branch.
    ///
    /// Returns an empty set when the path is absent. This is how settlement
    /// collects every waiter registered under one `[key, writer]` path.
    pub fn take(&mut self, path: &[K]) -> HashSet<V> {
        let drained = self
            .existing_leaf_mut(path)
            .map(std::mem::take)
            .unwrap_or_default();
        prune(&mut self.root, path);
        drained
    }

    /// Returns true when the container holds no paths at all.
    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }

    /// Non-creating mutable walk to the leaf set at `path`.
    fn existing_leaf_mut(&mut self, path: &[K]) -> Option<&mut HashSet<V>> {
        debug_assert_eq!(path.len(), self.depth, "path length must match depth");
        let (last, interior) = path.split_last()?;
        let mut level = &mut self.root;
        for step in interior {
            match level.get_mut(step) {
                Some(Node::Branch(children)) => level = children,
                _ => return None,
            }
        }
        match level.get_mut(last) {
            Some(Node::Leaf(members)) => Some(members),
            _ => None,
        }
    }
}

/// Removes every node along `path` that is empty, deepest first.
///
/// The walk is strictly inside-out: the recursive call runs before the
/// emptiness check, because removing a child can make its parent newly empty.
fn prune<K, V>(level: &mut HashMap<K, Node<K, V>>, path: &[K])
where
    K: Eq + Hash,
{
    let Some((head, rest)) = path.split_first() else {
        return;
    };
    let Some(node) = level.get_mut(head) else {
        return;
    };
    if let Node::Branch(children) = node {
        prune(children, rest);
    }
    if node.is_empty() {
        level.remove(head);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::{BTreeMap, BTreeSet};

    fn path(a: &str, b: &str) -> [String; 2] {
        [a.to_string(), b.to_string()]
    }

    #[test]
    fn contains_is_false_for_absent_prefix() {
        let set: PathSet<String, u64> = PathSet::new(2);
        assert!(!set.contains(&path("missing", "also-missing")));
    }

    #[test]
    fn contains_does_not_create_nodes() {
        let mut set: PathSet<String, u64> = PathSet::new(2);
        set.contains(&path("a", "b"));
        assert!(set.is_empty());
        set.insert(&path("a", "b"), 1);
        assert!(!set.contains(&path("a", "c")));
        assert!(!set.contains(&path("z", "b")));
    }

    #[test]
    fn insert_then_contains() {
        let mut set: PathSet<String, u64> = PathSet::new(2);
        set.insert(&path("key", "writer"), 1);
        assert!(set.contains(&path("key", "writer")));
        assert_eq!(set.leaf(&path("key", "writer")).unwrap().len(), 1);
    }

    #[test]
    fn leaf_mut_is_get_or_create_and_stable() {
        let mut set: PathSet<String, u64> = PathSet::new(2);
        set.leaf_mut(&path("k", "w")).insert(1);
        // The second call must hand back the same set, not a fresh one.
        assert!(set.leaf_mut(&path("k", "w")).contains(&1));
        set.leaf_mut(&path("k", "w")).insert(2);
        assert_eq!(set.leaf(&path("k", "w")).unwrap().len(), 2);
    }

    #[test]
    fn remove_last_member_prunes_whole_branch() {
        let mut set: PathSet<String, u64> = PathSet::new(2);
        set.insert(&path("k", "w"), 1);
        assert!(set.remove(&path("k", "w"), &1));
        assert!(!set.contains(&path("k", "w")));
        assert!(set.is_empty());
    }

    #[test]
    fn remove_keeps_siblings_intact() {
        let mut set: PathSet<String, u64> = PathSet::new(2);
        set.insert(&path("k", "w1"), 1);
        set.insert(&path("k", "w2"), 2);
        set.remove(&path("k", "w1"), &1);
        assert!(!set.contains(&path("k", "w1")));
        assert!(set.contains(&path("k", "w2")));
    }

    #[test]
    fn remove_of_absent_member_leaves_no_debris() {
        let mut set: PathSet<String, u64> = PathSet::new(2);
        assert!(!set.remove(&path("k", "w"), &1));
        assert!(set.is_empty());
    }

    #[test]
    fn clear_empties_and_prunes() {
        let mut set: PathSet<String, u64> = PathSet::new(2);
        set.insert(&path("k", "w"), 1);
        set.insert(&path("k", "w"), 2);
        set.clear(&path("k", "w"));
        assert!(!set.contains(&path("k", "w")));
        assert!(set.is_empty());
    }

    #[test]
    fn take_returns_members_and_prunes() {
        let mut set: PathSet<String, u64> = PathSet::new(2);
        set.insert(&path("k", "w"), 1);
        set.insert(&path("k", "w"), 2);
        let drained = set.take(&path("k", "w"));
        assert_eq!(drained, HashSet::from([1, 2]));
        assert!(set.is_empty());
        assert!(set.take(&path("k", "w")).is_empty());
    }

    #[test]
    fn depth_three_paths_prune_inside_out() {
        let mut set: PathSet<u32, u32> = PathSet::new(3);
        set.insert(&[1, 2, 3], 9);
        set.insert(&[1, 2, 4], 9);
        set.remove(&[1, 2, 3], &9);
        assert!(set.contains(&[1, 2, 4]));
        set.remove(&[1, 2, 4], &9);
        assert!(set.is_empty());
    }

    /// Walks the whole trie asserting that no reachable node is empty.
    fn assert_no_dead_branches(level: &HashMap<u8, Node<u8, u8>>) {
        for node in level.values() {
            assert!(!node.is_empty(), "pruning left an empty node behind");
            if let Node::Branch(children) = node {
                assert_no_dead_branches(children);
            }
        }
    }

    #[derive(Debug, Clone)]
    enum Op {
        Insert(u8, u8, u8),
        Remove(u8, u8, u8),
        Clear(u8, u8),
        Take(u8, u8),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        let k = 0u8..3;
        let v = 0u8..3;
        prop_oneof![
            (k.clone(), v.clone(), v.clone()).prop_map(|(a, b, x)| Op::Insert(a, b, x)),
            (k.clone(), v.clone(), v.clone()).prop_map(|(a, b, x)| Op::Remove(a, b, x)),
            (k.clone(), v.clone()).prop_map(|(a, b)| Op::Clear(a, b)),
            (k, v).prop_map(|(a, b)| Op::Take(a, b)),
        ]
    }

    proptest! {
        /// Any op sequence leaves the trie pruned and agreeing with a flat
        /// model that only keeps non-empty sets.
        #[test]
        fn pruning_matches_flat_model(ops in prop::collection::vec(op_strategy(), 0..40)) {
            let mut set: PathSet<u8, u8> = PathSet::new(2);
            let mut model: BTreeMap<(u8, u8), BTreeSet<u8>> = BTreeMap::new();

            for op in ops {
                match op {
                    Op::Insert(a, b, x) => {
                        set.insert(&[a, b], x);
                        model.entry((a, b)).or_default().insert(x);
                    }
                    Op::Remove(a, b, x) => {
                        set.remove(&[a, b], &x);
                        if let Some(members) = model.get_mut(&(a, b)) {
                            members.remove(&x);
                            if members.is_empty() {
                                model.remove(&(a, b));
                            }
                        }
                    }
                    Op::Clear(a, b) => {
                        set.clear(&[a, b]);
                        model.remove(&(a, b));
                    }
                    Op::Take(a, b) => {
                        let drained: BTreeSet<u8> = set.take(&[a, b]).into_iter().collect();
                        let expected = model.remove(&(a, b)).unwrap_or_default();
                        prop_assert_eq!(drained, expected);
                    }
                }
                assert_no_dead_branches(&set.root);
            }

            for a in 0..3 {
                for b in 0..3 {
                    prop_assert_eq!(set.contains(&[a, b]), model.contains_key(&(a, b)));
                }
            }
            prop_assert_eq!(set.is_empty(), model.is_empty());
        }
    }
}
