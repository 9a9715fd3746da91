use crate::octree::aabb::{create_child_aabb, Aabb};
use crate::octree::NodeId;
use std::sync::Arc;

/// Hierarchy record type marking a proxy in `hierarchy.bin`.
pub const PROXY_NODE_TYPE: u8 = 2;

/// Where a node's points can be found.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeState {
    /// Points live in the node's own `.bin` chunk file (Potree 1.x).
    Chunk,
    /// Points live at a byte range of `octree.bin`.
    Resolved { byte_offset: u64, byte_size: u64 },
    /// Points are unknown until this byte range of `hierarchy.bin` is parsed.
    Proxy {
        hierarchy_byte_offset: u64,
        hierarchy_byte_size: u64,
    },
}

impl Default for NodeState {
    fn default() -> Self {
        NodeState::Resolved {
            byte_offset: 0,
            byte_size: 0,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct OctreeNode {
    /// Octant digits from the root, empty for the root itself.
    pub address: String,
    pub bounding_box: Aabb,
    pub spacing: f64,
    pub level: u32,
    pub num_points: u32,
    pub state: NodeState,
    /// Raw record type, kept for diagnostics.
    pub node_type: u8,
    pub parent: Option<NodeId>,
    children: [Option<NodeId>; 8],
    pub(crate) resolve_lock: Arc<tokio::sync::Mutex<()>>,
}

impl OctreeNode {
    pub fn root(bounding_box: Aabb, spacing: f64, state: NodeState) -> Self {
        Self {
            bounding_box,
            spacing,
            state,
            node_type: match state {
                NodeState::Proxy { .. } => PROXY_NODE_TYPE,
                _ => 0,
            },
            ..Default::default()
        }
    }

    /// A child of `parent` at `octant`, one level down with half the spacing.
    pub fn child_of(parent: &OctreeNode, parent_id: NodeId, octant: usize, state: NodeState) -> Self {
        Self {
            address: format!("{}{}", parent.address, octant),
            bounding_box: create_child_aabb(&parent.bounding_box, octant),
            spacing: parent.spacing / 2.0,
            level: parent.level + 1,
            state,
            parent: Some(parent_id),
            ..Default::default()
        }
    }

    /// Display name as used by Potree, `r` followed by the address.
    pub fn name(&self) -> String {
        format!("r{}", self.address)
    }

    pub fn child(&self, octant: usize) -> Option<NodeId> {
        self.children.get(octant).copied().flatten()
    }

    pub fn children(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.children.iter().filter_map(|child| *child)
    }

    pub fn child_mask(&self) -> u8 {
        self.children
            .iter()
            .enumerate()
            .filter(|(_, child)| child.is_some())
            .fold(0, |mask, (octant, _)| mask | (1 << octant))
    }

    pub fn has_children(&self) -> bool {
        self.children.iter().any(Option::is_some)
    }

    pub(crate) fn set_child(&mut self, octant: usize, child: Option<NodeId>) {
        self.children[octant] = child;
    }

    pub fn is_proxy(&self) -> bool {
        matches!(self.state, NodeState::Proxy { .. })
    }

    /// Size in bytes of the node's point block, when known without I/O.
    pub fn byte_size(&self) -> Option<u64> {
        match self.state {
            NodeState::Resolved { byte_size, .. } => Some(byte_size),
            _ => None,
        }
    }
}
