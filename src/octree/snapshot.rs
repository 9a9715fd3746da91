use crate::octree::aabb::Aabb;
use crate::octree::node::{NodeState, OctreeNode};
use crate::octree::{FlatOctree, NodeId};

/// Owned copy of a loaded (sub-)hierarchy, detached from the arena.
#[derive(Clone, Debug, Default)]
pub struct OctreeNodeSnapshot {
    pub id: NodeId,
    pub address: String,
    pub bounding_box: Aabb,
    pub spacing: f64,
    pub level: u32,
    pub num_points: u32,
    pub state: NodeState,
    pub children: Vec<OctreeNodeSnapshot>,
}

pub struct SnapshotIter<'a> {
    stack: Vec<&'a OctreeNodeSnapshot>,
}

impl<'a> Iterator for SnapshotIter<'a> {
    type Item = &'a OctreeNodeSnapshot;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        for child in node.children.iter().rev() {
            self.stack.push(child);
        }
        Some(node)
    }
}

impl OctreeNodeSnapshot {
    /// Depth-first, pre-order walk starting at this node.
    pub fn iter(&self) -> SnapshotIter<'_> {
        SnapshotIter { stack: vec![self] }
    }

    pub fn from_octree(octree: &FlatOctree<OctreeNode>, node_id: NodeId) -> Option<Self> {
        let node = octree.node(node_id)?;

        Some(Self {
            id: node_id,
            address: node.address.clone(),
            bounding_box: node.bounding_box,
            spacing: node.spacing,
            level: node.level,
            num_points: node.num_points,
            state: node.state,
            children: node
                .children()
                .filter_map(|child| Self::from_octree(octree, child))
                .collect(),
        })
    }
}
