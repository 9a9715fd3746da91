use crate::octree::aabb::Aabb;
use crate::octree::NodeId;
use glam::{U8Vec4, Vec3};

/// Color given to points of clouds without a color attribute.
pub const DEFAULT_COLOR: U8Vec4 = U8Vec4::new(255, 255, 255, 255);

/// Decoded points of one node, as two parallel arrays.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PointBlock {
    /// Display order (y up), relative to the cloud's position origin.
    pub positions: Vec<Vec3>,
    pub colors: Vec<U8Vec4>,
}

impl PointBlock {
    pub fn with_len(len: usize) -> Self {
        Self {
            positions: vec![Vec3::ZERO; len],
            colors: vec![DEFAULT_COLOR; len],
        }
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

/// What a consumer gets for a node: where it is and what it holds.
#[derive(Clone, Debug)]
pub struct NodePoints {
    pub node: NodeId,
    pub address: String,
    pub bounding_box: Aabb,
    pub points: PointBlock,
}
