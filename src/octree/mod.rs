pub mod aabb;
pub mod node;
pub mod point_attributes;
pub mod snapshot;

use slab::Slab;

/// Index of a node in a [`FlatOctree`].
///
/// Ids stay valid as long as their node is in the tree. Nodes announced by a
/// truncated hierarchy range are removed again, and their ids may then be
/// handed to nodes inserted later, so an id kept from an earlier snapshot can
/// point to a different node once more of the hierarchy is read.
#[derive(Clone, Debug, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Slab-backed arena holding every node of one octree.
#[derive(Clone, Debug)]
pub struct FlatOctree<T> {
    storage: Slab<T>,
    root_id: NodeId,
}

impl<T> FlatOctree<T>
where
    T: Default,
{
    pub fn new() -> Self {
        Self::with_root(T::default())
    }

    pub fn with_root(root: T) -> Self {
        let mut storage = Slab::new();
        let root_id = NodeId(storage.insert(root));

        Self { storage, root_id }
    }

    pub fn root(&self) -> &T {
        &self.storage[self.root_id.0]
    }

    pub fn root_id(&self) -> NodeId {
        self.root_id
    }

    pub fn node(&self, node_id: NodeId) -> Option<&T> {
        self.storage.get(node_id.0)
    }

    pub(crate) fn node_mut(&mut self, node_id: NodeId) -> Option<&mut T> {
        self.storage.get_mut(node_id.0)
    }

    pub(crate) fn insert(&mut self, node: T) -> NodeId {
        NodeId(self.storage.insert(node))
    }

    pub(crate) fn remove(&mut self, node_id: NodeId) -> Option<T> {
        if node_id == self.root_id {
            return None;
        }
        self.storage.try_remove(node_id.0)
    }

    pub fn len(&self) -> usize {
        self.storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &T)> {
        self.storage.iter().map(|(index, node)| (NodeId(index), node))
    }
}

impl<T: Default> Default for FlatOctree<T> {
    fn default() -> Self {
        Self::new()
    }
}
