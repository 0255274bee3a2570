use super::*;

/// Index of a node slot in the [`Arena`].
pub type NodeId = usize;

/// Slab arena owning every node of one tree.
///
/// Nodes refer to each other exclusively through [`NodeId`], so the
/// parent/child structure and the leaf chain never form ownership
/// cycles: dropping the arena drops the whole tree, and a rebuild is a
/// single arena swap. Freed slots are recycled through a free list so
/// long insertion sessions with many splits do not grow the slab
/// unboundedly.
#[derive(Debug, Default)]
pub struct Arena {
    slots: Vec<Option<Node>>,
    free: Vec<NodeId>,
}

impl Arena {
    /// Places `node` into a fresh or recycled slot.
    pub fn alloc(&mut self, node: Node) -> NodeId {
        match self.free.pop() {
            Some(id) => {
                self.slots[id] = Some(node);
                id
            }
            None => {
                self.slots.push(Some(node));
                self.slots.len() - 1
            }
        }
    }

    /// Removes and returns the node at `id`, recycling its slot.
    pub fn free(&mut self, id: NodeId) -> Node {
        let node = self.slots[id].take().expect("double free of node slot");
        self.free.push(id);
        node
    }

    /// The live node at `id`.
    pub fn node(&self, id: NodeId) -> &Node {
        self.slots[id].as_ref().expect("stale node id")
    }

    /// The live node at `id`, mutably.
    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        self.slots[id].as_mut().expect("stale node id")
    }

    /// Number of live nodes, the sentinel included.
    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
