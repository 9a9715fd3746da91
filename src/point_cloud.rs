use crate::config::LoaderConfig;
use crate::decoder::{DecodeError, PointBlockDecoder};
use crate::hierarchy::{build_v1_hierarchy, check_length, parse_hierarchy_v2, ReadHierarchyError};
use crate::metadata::{load_metadata, CloudMetadata, FormatVersion, MetadataSource, ReadMetadataError};
use crate::octree::node::{NodeState, OctreeNode};
use crate::octree::snapshot::OctreeNodeSnapshot;
use crate::octree::{FlatOctree, NodeId};
use crate::point::NodePoints;
use crate::resource::file::FileClient;
use crate::resource::{DataFetcher, ResourceClient, ResourceError};
use futures::future::join_all;
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

pub const HIERARCHY_FILE: &str = "hierarchy.bin";
pub const OCTREE_FILE: &str = "octree.bin";
/// Extension of Potree 1.x point chunks.
pub const POINTS_EXTENSION: &str = ".bin";

#[derive(Error, Debug)]
pub enum LoadPotreePointCloudError {
    #[error("Error loading metadata: {0}")]
    Metadata(#[from] ReadMetadataError),

    #[error("Error loading hierarchy: {0}")]
    Hierarchy(#[from] ReadHierarchyError),

    #[error("Error creating client: {0}")]
    Resource(#[from] ResourceError),

    #[error("Root hierarchy range is empty")]
    EmptyHierarchy,
}

#[derive(Error, Debug)]
pub enum LoadPointsError {
    #[error("Node {0:?} does not exist")]
    NodeNotFound(NodeId),

    #[error("Node {0:?} is still a proxy after resolving its hierarchy")]
    UnresolvedProxy(NodeId),

    #[error("Node {node:?} has {expected} bytes of points but only {actual} were read")]
    ShortRead { node: NodeId, expected: u64, actual: u64 },

    #[error("Resource error: {0}")]
    Resource(#[from] ResourceError),

    #[error("Hierarchy error: {0}")]
    Hierarchy(#[from] ReadHierarchyError),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),
}

/// A Potree cloud opened for lazy reading.
///
/// The hierarchy grows as proxies are resolved; points are only read when
/// asked for. All methods take `&self` and may run concurrently.
pub struct PotreePointCloud<C: ResourceClient> {
    metadata: Arc<CloudMetadata>,
    fetcher: DataFetcher<C>,
    octree: RwLock<FlatOctree<OctreeNode>>,
}

impl PotreePointCloud<FileClient> {
    /// Opens a cloud stored on the local file system.
    pub async fn open_local(
        source: &str,
        config: &LoaderConfig,
    ) -> Result<Self, LoadPotreePointCloudError> {
        Self::open(source, config, FileClient).await
    }
}

#[cfg(feature = "reqwest")]
impl PotreePointCloud<crate::resource::reqwest::ReqwestClient> {
    /// Opens a local or remote cloud, downloading with `reqwest`.
    pub async fn open_with_reqwest(
        source: &str,
        config: &LoaderConfig,
    ) -> Result<Self, LoadPotreePointCloudError> {
        let client = crate::resource::reqwest::ReqwestClient::from_config(config)?;
        Self::open(source, config, client).await
    }
}

impl<C: ResourceClient> PotreePointCloud<C> {
    /// Opens the cloud whose descriptor (`cloud.js` or `metadata.json`) is at
    /// `source`, a path, `file://` or `http(s)://` url.
    ///
    /// Potree 1.x trees are read completely, Potree 2.x trees only as far as
    /// the first hierarchy chunk goes.
    #[instrument(skip(config, remote))]
    pub async fn open(
        source: &str,
        config: &LoaderConfig,
        remote: C,
    ) -> Result<Self, LoadPotreePointCloudError> {
        let source = MetadataSource::parse(source, config)?;
        let fetcher = DataFetcher::new(source.storage.clone(), remote);
        let metadata = load_metadata(&fetcher, &source, config.move_to_origin).await?;

        Self::from_metadata(metadata, fetcher).await
    }

    /// Creates the root from already loaded metadata and reads its hierarchy.
    pub async fn from_metadata(
        metadata: CloudMetadata,
        fetcher: DataFetcher<C>,
    ) -> Result<Self, LoadPotreePointCloudError> {
        let this = match metadata.version {
            FormatVersion::V1 => {
                let mut octree = FlatOctree::with_root(OctreeNode::root(
                    metadata.bounding_box,
                    metadata.spacing,
                    NodeState::Chunk,
                ));
                build_v1_hierarchy(&mut octree, &fetcher, &metadata).await?;
                Self {
                    metadata: Arc::new(metadata),
                    fetcher,
                    octree: RwLock::new(octree),
                }
            }
            FormatVersion::V2 => {
                if metadata.first_chunk_size == 0 {
                    return Err(LoadPotreePointCloudError::EmptyHierarchy);
                }
                let root = OctreeNode::root(
                    metadata.bounding_box,
                    metadata.spacing,
                    NodeState::Proxy {
                        hierarchy_byte_offset: 0,
                        hierarchy_byte_size: metadata.first_chunk_size,
                    },
                );
                let this = Self {
                    metadata: Arc::new(metadata),
                    fetcher,
                    octree: RwLock::new(FlatOctree::with_root(root)),
                };
                match this.resolve_proxy(this.root_id()).await {
                    Ok(_) => {}
                    Err(ReadHierarchyError::LengthMismatch { .. }) => {
                        return Err(LoadPotreePointCloudError::EmptyHierarchy)
                    }
                    Err(error) => return Err(error.into()),
                }
                this
            }
        };

        info!(
            cloud = %this.metadata.cloud_name,
            nodes = this.octree.read().len(),
            "opened point cloud"
        );
        Ok(this)
    }

    pub fn metadata(&self) -> &CloudMetadata {
        &self.metadata
    }

    pub fn shared_metadata(&self) -> Arc<CloudMetadata> {
        self.metadata.clone()
    }

    pub fn root_id(&self) -> NodeId {
        self.octree.read().root_id()
    }

    /// Number of nodes known so far.
    pub fn node_count(&self) -> usize {
        self.octree.read().len()
    }

    /// Copy of a node as currently known.
    pub fn node(&self, node_id: NodeId) -> Option<OctreeNode> {
        self.octree.read().node(node_id).cloned()
    }

    pub fn children(&self, node_id: NodeId) -> Vec<NodeId> {
        self.octree
            .read()
            .node(node_id)
            .map(|node| node.children().collect())
            .unwrap_or_default()
    }

    /// Finds a loaded node by its octant digits, `""` being the root. Proxies
    /// are not resolved along the way.
    pub fn node_by_address(&self, address: &str) -> Option<NodeId> {
        let octree = self.octree.read();
        let mut current = octree.root_id();
        for digit in address.chars() {
            let octant = digit.to_digit(8)? as usize;
            current = octree.node(current)?.child(octant)?;
        }
        Some(current)
    }

    pub fn hierarchy_snapshot(&self) -> Option<OctreeNodeSnapshot> {
        let octree = self.octree.read();
        OctreeNodeSnapshot::from_octree(&octree, octree.root_id())
    }

    pub fn snapshot_of(&self, node_id: NodeId) -> Option<OctreeNodeSnapshot> {
        OctreeNodeSnapshot::from_octree(&self.octree.read(), node_id)
    }

    /// Reads and attaches the hierarchy range of a proxy node.
    ///
    /// Returns `true` when this call did the work and `false` when the node
    /// was no proxy, including when a concurrent call resolved it first. A
    /// range too short to hold the node's own record leaves it a proxy and
    /// fails with `LengthMismatch`.
    #[instrument(skip(self))]
    pub async fn resolve_proxy(&self, node_id: NodeId) -> Result<bool, ReadHierarchyError> {
        let lock = {
            let octree = self.octree.read();
            let node = octree
                .node(node_id)
                .ok_or(ReadHierarchyError::NodeNotFound(node_id))?;
            if !node.is_proxy() {
                return Ok(false);
            }
            node.resolve_lock.clone()
        };

        let _guard = lock.lock().await;

        // another caller may have resolved it while we waited
        let state = self.octree.read().node(node_id).map(|node| node.state);
        let (offset, size) = match state {
            Some(NodeState::Proxy {
                hierarchy_byte_offset,
                hierarchy_byte_size,
            }) => (hierarchy_byte_offset, hierarchy_byte_size),
            Some(_) => return Ok(false),
            None => return Err(ReadHierarchyError::NodeNotFound(node_id)),
        };

        let data = self.fetcher.read_range(HIERARCHY_FILE, offset, size).await?;

        let summary = {
            let mut octree = self.octree.write();
            if let Some(node) = octree.node(node_id) {
                check_length(node, size, data.len() as u64);
            }
            let summary = parse_hierarchy_v2(&mut octree, node_id, &data)?;
            if octree.node(node_id).is_some_and(OctreeNode::is_proxy) {
                return Err(ReadHierarchyError::LengthMismatch {
                    expected: size,
                    actual: data.len() as u64,
                });
            }
            summary
        };
        debug!(
            records = summary.records,
            discovered = summary.discovered,
            "resolved proxy"
        );

        Ok(true)
    }

    /// Resolves proxies until the whole tree is known.
    ///
    /// A proxy that fails is logged, tried once and reported; the rest of the
    /// tree is still resolved.
    pub async fn load_entire_hierarchy(&self) -> Vec<(NodeId, ReadHierarchyError)> {
        let mut failures = Vec::new();
        let mut attempted = HashSet::new();
        loop {
            let proxies: Vec<NodeId> = self
                .octree
                .read()
                .iter()
                .filter(|(id, node)| node.is_proxy() && !attempted.contains(id))
                .map(|(id, _)| id)
                .collect();
            if proxies.is_empty() {
                return failures;
            }

            attempted.extend(proxies.iter().copied());
            let results = join_all(proxies.iter().map(|&id| self.resolve_proxy(id))).await;
            for (id, result) in proxies.into_iter().zip(results) {
                if let Err(error) = result {
                    warn!(node = ?id, %error, "could not resolve proxy");
                    failures.push((id, error));
                }
            }
        }
    }

    /// Reads and decodes the points of one node, resolving it first when it
    /// is a proxy.
    #[instrument(skip(self))]
    pub async fn load_points(&self, node_id: NodeId) -> Result<NodePoints, LoadPointsError> {
        self.resolve_proxy(node_id).await?;

        let node = self
            .node(node_id)
            .ok_or(LoadPointsError::NodeNotFound(node_id))?;

        let data = match node.state {
            NodeState::Proxy { .. } => return Err(LoadPointsError::UnresolvedProxy(node_id)),
            NodeState::Chunk => {
                self.fetcher
                    .find_and_load_chunk(
                        &self.metadata.octree_dir,
                        &node.address,
                        self.metadata.hierarchy_step_size,
                        POINTS_EXTENSION,
                    )
                    .await?
            }
            NodeState::Resolved {
                byte_offset,
                byte_size,
            } => {
                let data = self.fetcher.read_range(OCTREE_FILE, byte_offset, byte_size).await?;
                if data.len() as u64 != byte_size {
                    warn!(
                        node = %node.name(),
                        expected = byte_size,
                        actual = data.len(),
                        "short point block"
                    );
                    return Err(LoadPointsError::ShortRead {
                        node: node_id,
                        expected: byte_size,
                        actual: data.len() as u64,
                    });
                }
                data
            }
        };

        let points = PointBlockDecoder::new(&self.metadata).decode(&data, node.num_points)?;
        debug!(node = %node.name(), points = points.len(), "loaded points");

        Ok(NodePoints {
            node: node_id,
            address: node.address,
            bounding_box: node.bounding_box,
            points,
        })
    }

    /// Loads several nodes concurrently. Repeated ids are loaded once; the
    /// results follow the order of first appearance.
    pub async fn load_points_batch(
        &self,
        node_ids: &[NodeId],
    ) -> Vec<(NodeId, Result<NodePoints, LoadPointsError>)> {
        let mut seen = HashSet::new();
        let unique: Vec<NodeId> = node_ids.iter().copied().filter(|id| seen.insert(*id)).collect();

        let results = join_all(unique.iter().map(|&id| self.load_points(id))).await;
        unique.into_iter().zip(results).collect()
    }

    /// Loads every node of the subtree below `node_id`, level by level,
    /// resolving proxies as they are reached. A failed node is logged and
    /// reported in place; the walk continues with whatever children it has.
    pub async fn load_all_points(
        &self,
        node_id: NodeId,
    ) -> Vec<(NodeId, Result<NodePoints, LoadPointsError>)> {
        let mut loaded = Vec::new();
        let mut level = vec![node_id];

        while !level.is_empty() {
            let results = join_all(level.iter().map(|&id| self.load_points(id))).await;
            for (&id, result) in level.iter().zip(results) {
                if let Err(error) = &result {
                    warn!(node = ?id, %error, "could not load points");
                }
                loaded.push((id, result));
            }
            level = level.iter().flat_map(|&id| self.children(id)).collect();
        }

        loaded
    }
}
