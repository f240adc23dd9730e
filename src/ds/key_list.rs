//! Arena-backed ordering list of cache keys.
//!
//! Each shard keeps its keys in recency (LRU) or insertion (FIFO) order.
//! `KeyList` is a doubly linked list specialized for that job: nodes live in
//! a slot arena (`Vec<Option<Node>>` plus a free list) and are linked by
//! stable [`NodeId`] handles, so items can carry a back-reference to their
//! own node and every reordering operation is O(1) without pointer chasing.
//!
//! ```text
//!   slots
//!   ┌────────┬─────────────────────────────────────────────────┐
//!   │ NodeId │ Node { key, prev, next }                        │
//!   ├────────┼─────────────────────────────────────────────────┤
//!   │ 0      │ { key: "a", prev: None,    next: Some(1) }      │
//!   │ 1      │ { key: "b", prev: Some(0), next: Some(2) }      │
//!   │ 2      │ { key: "c", prev: Some(1), next: None }         │
//!   └────────┴─────────────────────────────────────────────────┘
//!
//!   head ─► [0] ◄──► [1] ◄──► [2] ◄── tail
//!   (most recent)              (eviction victim)
//! ```
//!
//! ## Operations
//! - `push_front(key)`: new node at the head, returns its `NodeId`
//! - `move_to_front(id)`: detach + reattach at the head
//! - `remove(id)` / `pop_back()`: detach + free the slot
//!
//! A freed `NodeId` may be reused by a later `push_front`; the shard's item
//! map is the only holder of live ids, so stale handles never survive a
//! removal.
//!
//! `debug_validate_invariants()` is available in debug/test builds.

use std::sync::Arc;

/// Stable handle to a node in a [`KeyList`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

#[derive(Debug)]
struct Node {
    key: Arc<str>,
    prev: Option<NodeId>,
    next: Option<NodeId>,
}

/// Doubly linked list of keys with O(1) promotion and removal.
#[derive(Debug, Default)]
pub struct KeyList {
    slots: Vec<Option<Node>>,
    free: Vec<usize>,
    head: Option<NodeId>,
    tail: Option<NodeId>,
    len: usize,
}

impl KeyList {
    /// Creates an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty list with reserved node capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free: Vec::new(),
            head: None,
            tail: None,
            len: 0,
        }
    }

    /// Returns the number of nodes in the list.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the list is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the key at the front (most recent), if any.
    pub fn front(&self) -> Option<&Arc<str>> {
        self.head.and_then(|id| self.key_at(id))
    }

    /// Returns the key at the back (eviction victim), if any.
    pub fn back(&self) -> Option<&Arc<str>> {
        self.tail.and_then(|id| self.key_at(id))
    }

    /// Inserts a new node carrying `key` at the front and returns its id.
    pub fn push_front(&mut self, key: Arc<str>) -> NodeId {
        let node = Node {
            key,
            prev: None,
            next: self.head,
        };
        let id = match self.free.pop() {
            Some(index) => {
                self.slots[index] = Some(node);
                NodeId(index)
            }
            None => {
                self.slots.push(Some(node));
                NodeId(self.slots.len() - 1)
            }
        };
        match self.head {
            Some(old_head) => {
                if let Some(node) = self.node_mut(old_head) {
                    node.prev = Some(id);
                }
            }
            None => self.tail = Some(id),
        }
        self.head = Some(id);
        self.len += 1;
        id
    }

    /// Moves an existing node to the front; returns `false` if `id` is not a
    /// live node.
    pub fn move_to_front(&mut self, id: NodeId) -> bool {
        if self.key_at(id).is_none() {
            return false;
        }
        if self.head == Some(id) {
            return true;
        }
        self.detach(id);
        let old_head = self.head;
        if let Some(node) = self.node_mut(id) {
            node.prev = None;
            node.next = old_head;
        }
        if let Some(old_head) = old_head {
            if let Some(node) = self.node_mut(old_head) {
                node.prev = Some(id);
            }
        } else {
            self.tail = Some(id);
        }
        self.head = Some(id);
        true
    }

    /// Removes the node `id` from the list and returns its key.
    pub fn remove(&mut self, id: NodeId) -> Option<Arc<str>> {
        if self.key_at(id).is_none() {
            return None;
        }
        self.detach(id);
        self.release(id)
    }

    /// Removes and returns the back (oldest) key.
    pub fn pop_back(&mut self) -> Option<Arc<str>> {
        let id = self.tail?;
        self.detach(id);
        self.release(id)
    }

    /// Clears the list and frees all nodes.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
        self.head = None;
        self.tail = None;
        self.len = 0;
    }

    /// Returns an iterator over the keys from front to back.
    pub fn iter(&self) -> KeyListIter<'_> {
        KeyListIter {
            list: self,
            current: self.head,
        }
    }

    /// Returns the key carried by a live node, if any.
    pub fn get(&self, id: NodeId) -> Option<&Arc<str>> {
        self.key_at(id)
    }

    fn key_at(&self, id: NodeId) -> Option<&Arc<str>> {
        self.slots
            .get(id.0)
            .and_then(|slot| slot.as_ref())
            .map(|node| &node.key)
    }

    fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.slots.get_mut(id.0).and_then(|slot| slot.as_mut())
    }

    /// Unlinks `id` from its neighbors without freeing the slot.
    fn detach(&mut self, id: NodeId) {
        let (prev, next) = match self.slots.get(id.0).and_then(|slot| slot.as_ref()) {
            Some(node) => (node.prev, node.next),
            None => return,
        };

        match prev {
            Some(prev_id) => {
                if let Some(node) = self.node_mut(prev_id) {
                    node.next = next;
                }
            }
            None => self.head = next,
        }
        match next {
            Some(next_id) => {
                if let Some(node) = self.node_mut(next_id) {
                    node.prev = prev;
                }
            }
            None => self.tail = prev,
        }

        if let Some(node) = self.node_mut(id) {
            node.prev = None;
            node.next = None;
        }
    }

    /// Frees a detached node's slot and returns its key.
    fn release(&mut self, id: NodeId) -> Option<Arc<str>> {
        let node = self.slots.get_mut(id.0)?.take()?;
        self.free.push(id.0);
        self.len -= 1;
        Some(node.key)
    }

    #[cfg(any(test, debug_assertions))]
    pub fn debug_validate_invariants(&self) {
        if self.head.is_none() || self.tail.is_none() {
            assert!(self.head.is_none());
            assert!(self.tail.is_none());
            assert_eq!(self.len, 0);
            return;
        }

        let live = self.slots.iter().filter(|slot| slot.is_some()).count();
        assert_eq!(live, self.len);

        let mut seen = std::collections::HashSet::new();
        let mut count = 0usize;
        let mut prev = None;
        let mut current = self.head;
        while let Some(id) = current {
            assert!(seen.insert(id));
            let node = self.slots[id.0].as_ref().expect("linked node missing");
            assert_eq!(node.prev, prev);
            if node.next.is_none() {
                assert_eq!(self.tail, Some(id));
            }
            prev = Some(id);
            current = node.next;
            count += 1;
            assert!(count <= self.len);
        }
        assert_eq!(count, self.len);
    }
}

pub struct KeyListIter<'a> {
    list: &'a KeyList,
    current: Option<NodeId>,
}

impl<'a> Iterator for KeyListIter<'a> {
    type Item = &'a Arc<str>;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.current?;
        let node = self.list.slots.get(id.0)?.as_ref()?;
        self.current = node.next;
        Some(&node.key)
    }
}


#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    #[derive(Debug, Clone)]
    enum Op {
        PushFront(u8),
        MoveToFront(usize),
        Remove(usize),
        PopBack,
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0u8..32).prop_map(Op::PushFront),
            any::<usize>().prop_map(Op::MoveToFront),
            any::<usize>().prop_map(Op::Remove),
            Just(Op::PopBack),
        ]
    }

    proptest! {
        /// Property: the list agrees with a naive front-to-back model under
        /// arbitrary operation sequences.
        #[cfg_attr(miri, ignore)]
        #[test]
        fn prop_matches_model(ops in prop::collection::vec(op_strategy(), 0..200)) {
            let mut list = KeyList::new();
            // Model: (key, id) pairs, front first.
            let mut model: Vec<(String, NodeId)> = Vec::new();

            for op in ops {
                match op {
                    Op::PushFront(k) => {
                        let name = format!("key{k}");
                        if model.iter().any(|(key, _)| *key == name) {
                            continue;
                        }
                        let id = list.push_front(Arc::from(name.as_str()));
                        model.insert(0, (name, id));
                    }
                    Op::MoveToFront(raw) => {
                        if model.is_empty() {
                            continue;
                        }
                        let index = raw % model.len();
                        let entry = model.remove(index);
                        prop_assert!(list.move_to_front(entry.1));
                        model.insert(0, entry);
                    }
                    Op::Remove(raw) => {
                        if model.is_empty() {
                            continue;
                        }
                        let index = raw % model.len();
                        let (name, id) = model.remove(index);
                        let removed = list.remove(id);
                        prop_assert_eq!(removed.as_deref(), Some(name.as_str()));
                    }
                    Op::PopBack => {
                        let popped = list.pop_back();
                        match model.pop() {
                            Some((name, _)) => {
                                prop_assert_eq!(popped.as_deref(), Some(name.as_str()));
                            }
                            None => prop_assert_eq!(popped, None),
                        }
                    }
                }

                prop_assert_eq!(list.len(), model.len());
                let observed: Vec<String> = list.iter().map(|k| k.to_string()).collect();
                let expected: Vec<String> =
                    model.iter().map(|(name, _)| name.clone()).collect();
                prop_assert_eq!(observed, expected);
                list.debug_validate_invariants();
            }
        }
    }
}
