pub use crate::config::LoaderConfig;
pub use crate::decoder::PointBlockDecoder;
pub use crate::metadata::{CloudMetadata, Encoding, FormatVersion};
pub use crate::octree::aabb::Aabb;
pub use crate::octree::node::{NodeState, OctreeNode};
pub use crate::octree::snapshot::OctreeNodeSnapshot;
pub use crate::octree::NodeId;
pub use crate::point::{NodePoints, PointBlock};
pub use crate::point_cloud::PotreePointCloud;
pub use crate::resource::file::FileClient;
#[cfg(feature = "reqwest")]
pub use crate::resource::reqwest::ReqwestClient;
pub use crate::resource::{DataFetcher, ResourceClient, StorageContext};

// Error types
pub use crate::decoder::DecodeError;
pub use crate::hierarchy::ReadHierarchyError;
pub use crate::metadata::ReadMetadataError;
pub use crate::point_cloud::{LoadPointsError, LoadPotreePointCloudError};
pub use crate::resource::ResourceError;
