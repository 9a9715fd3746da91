//! Lazy reader for Potree 1.x and 2.x point cloud octrees.
//!
//! Open a cloud with [`PotreePointCloud::open`], walk its hierarchy and load
//! the points of the nodes you need. Remote clouds are mirrored on disk as
//! they are read.

pub mod config;
pub mod decoder;
pub mod hierarchy;
pub mod metadata;
pub mod octree;
pub mod point;
pub mod point_cloud;
pub mod prelude;
pub mod resource;

pub use config::LoaderConfig;
pub use point_cloud::PotreePointCloud;
