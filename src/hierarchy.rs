use crate::metadata::CloudMetadata;
use crate::octree::node::{NodeState, OctreeNode, PROXY_NODE_TYPE};
use crate::octree::{FlatOctree, NodeId};
use crate::resource::{DataFetcher, ResourceClient, ResourceError};
use binrw::{binrw, BinReaderExt};
use std::collections::{HashSet, VecDeque};
use std::io::Cursor;
use thiserror::Error;
use tracing::{debug, instrument, warn};

/// Size of one `hierarchy.bin` record.
pub const BYTES_PER_NODE: usize = 22;
/// Size of one `.hrc` record: a child mask and four unused bytes.
pub const BYTES_PER_LEGACY_NODE: usize = 5;

pub const HIERARCHY_EXTENSION: &str = ".hrc";

#[derive(Error, Debug)]
pub enum ReadHierarchyError {
    #[error("Hierarchy data has {actual} bytes, expected {expected}")]
    LengthMismatch { expected: u64, actual: u64 },

    #[error("Node {0:?} does not exist")]
    NodeNotFound(NodeId),

    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Resource error: {0}")]
    Resource(#[from] ResourceError),

    #[error("Invalid binary data: {0}")]
    InvalidBinaryData(#[from] binrw::error::Error),
}

#[binrw]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[brw(little)]
pub struct HierarchyNodeEntry {
    pub r#type: u8,
    pub child_mask: u8,
    pub num_points: u32,
    pub byte_offset: u64,
    pub byte_size: u64,
}

/// Outcome of parsing one hierarchy buffer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HierarchyParse {
    /// Records applied to a node.
    pub records: usize,
    /// Nodes announced by a child mask.
    pub discovered: usize,
    /// Nodes announced but left without a record, v2 detaches them.
    pub leftovers: Vec<NodeId>,
}

/// Logs a hierarchy buffer whose length is not what was asked for. Parsing
/// goes on with the complete records.
pub(crate) fn check_length(node: &OctreeNode, expected: u64, actual: u64) {
    if expected != actual {
        let error = ReadHierarchyError::LengthMismatch { expected, actual };
        warn!(node = %node.name(), %error, "partial hierarchy");
    }
}

fn insert_child(
    octree: &mut FlatOctree<OctreeNode>,
    parent_id: NodeId,
    octant: usize,
    state: NodeState,
) -> Result<NodeId, ReadHierarchyError> {
    let parent = octree
        .node(parent_id)
        .ok_or(ReadHierarchyError::NodeNotFound(parent_id))?;
    if let Some(existing) = parent.child(octant) {
        return Ok(existing);
    }

    let child = OctreeNode::child_of(parent, parent_id, octant, state);
    let child_id = octree.insert(child);
    octree
        .node_mut(parent_id)
        .ok_or(ReadHierarchyError::NodeNotFound(parent_id))?
        .set_child(octant, Some(child_id));
    Ok(child_id)
}

/// Parses a `hierarchy.bin` range whose first record describes `node_id`.
///
/// Records follow the order in which nodes were announced: every non-proxy
/// record appends its children to the frontier and record `i` describes
/// frontier entry `i`. Proxy records carry the location of a further range
/// and announce no children. Announced nodes left without a record are
/// removed again.
pub fn parse_hierarchy_v2(
    octree: &mut FlatOctree<OctreeNode>,
    node_id: NodeId,
    buf: &[u8],
) -> Result<HierarchyParse, ReadHierarchyError> {
    let num_nodes = buf.len() / BYTES_PER_NODE;
    let mut cursor = Cursor::new(buf);

    let mut frontier = Vec::with_capacity(num_nodes.max(1));
    frontier.push(node_id);
    let mut summary = HierarchyParse::default();

    for i in 0..num_nodes {
        let Some(&current_id) = frontier.get(i) else {
            debug!(extra = num_nodes - i, "hierarchy records without a node");
            break;
        };
        let entry: HierarchyNodeEntry = cursor.read_le()?;

        let current = octree
            .node_mut(current_id)
            .ok_or(ReadHierarchyError::NodeNotFound(current_id))?;

        // the first record of a proxy's range is the proxy itself, as a real node
        current.state = if current.is_proxy() || entry.r#type != PROXY_NODE_TYPE {
            NodeState::Resolved {
                byte_offset: entry.byte_offset,
                byte_size: entry.byte_size,
            }
        } else {
            NodeState::Proxy {
                hierarchy_byte_offset: entry.byte_offset,
                hierarchy_byte_size: entry.byte_size,
            }
        };
        current.num_points = entry.num_points;
        if current.byte_size() == Some(0) {
            // potree issue 1125: inner nodes may claim points they do not have,
            // their byte size is still 0
            current.num_points = 0;
        }
        current.node_type = entry.r#type;
        summary.records += 1;

        if current.is_proxy() {
            continue;
        }

        for octant in 0..8 {
            if entry.child_mask & (1 << octant) == 0 {
                continue;
            }
            let child_id = insert_child(octree, current_id, octant, NodeState::default())?;
            frontier.push(child_id);
            summary.discovered += 1;
        }
    }

    // announced nodes that never got their record are not part of the tree;
    // the node being parsed stays, even without a record
    for &orphan in frontier.iter().skip(summary.records.max(1)) {
        if let Some(node) = octree.remove(orphan) {
            if let Some(parent) = node.parent.and_then(|p| octree.node_mut(p)) {
                if let Some(octant) = node.address.chars().last().and_then(|c| c.to_digit(8)) {
                    parent.set_child(octant as usize, None);
                }
            }
        }
        summary.leftovers.push(orphan);
    }
    if !summary.leftovers.is_empty() {
        debug!(
            detached = summary.leftovers.len(),
            "hierarchy range ended before all announced nodes"
        );
    }

    Ok(summary)
}

/// Parses one `.hrc` chunk whose first record describes `owner`.
///
/// Records are consumed breadth first. Children already present are reused
/// so a chunk may describe nodes created by the chunk above it. The
/// returned leftovers were announced by the deepest level of the chunk and
/// are described by the chunks of their parents.
pub fn parse_hrc_chunk(
    octree: &mut FlatOctree<OctreeNode>,
    owner: NodeId,
    data: &[u8],
) -> Result<HierarchyParse, ReadHierarchyError> {
    let num_nodes = data.len() / BYTES_PER_LEGACY_NODE;
    let mut queue = VecDeque::from([owner]);
    let mut summary = HierarchyParse::default();

    for record in data.chunks_exact(BYTES_PER_LEGACY_NODE).take(num_nodes) {
        let Some(current_id) = queue.pop_front() else {
            debug!("chunk records without a node");
            break;
        };
        let configuration = record[0];
        summary.records += 1;

        for octant in 0..8 {
            if configuration & (1 << octant) != 0 {
                let child_id = insert_child(octree, current_id, octant, NodeState::Chunk)?;
                queue.push_back(child_id);
                summary.discovered += 1;
            }
        }
    }

    summary.leftovers = queue.into_iter().collect();
    Ok(summary)
}

/// Builds the whole Potree 1.x tree below the root of `octree`.
///
/// Chunk owners are processed from a FIFO worklist and each one is fetched
/// at most once. A missing chunk below the root is logged and skipped.
#[instrument(skip_all, fields(cloud = %metadata.cloud_name))]
pub async fn build_v1_hierarchy<C: ResourceClient>(
    octree: &mut FlatOctree<OctreeNode>,
    fetcher: &DataFetcher<C>,
    metadata: &CloudMetadata,
) -> Result<(), ReadHierarchyError> {
    let root_id = octree.root_id();
    let mut worklist = VecDeque::from([root_id]);
    let mut visited = HashSet::new();

    while let Some(owner) = worklist.pop_front() {
        if !visited.insert(owner) {
            continue;
        }

        let address = octree
            .node(owner)
            .ok_or(ReadHierarchyError::NodeNotFound(owner))?
            .address
            .clone();

        let data = match fetcher
            .find_and_load_chunk(
                &metadata.octree_dir,
                &address,
                metadata.hierarchy_step_size,
                HIERARCHY_EXTENSION,
            )
            .await
        {
            Ok(data) => data,
            Err(error) if owner == root_id => return Err(error.into()),
            Err(error) => {
                warn!(node = %format!("r{}", address), %error, "skipping hierarchy chunk");
                continue;
            }
        };

        if data.len() % BYTES_PER_LEGACY_NODE != 0 {
            warn!(
                node = %format!("r{}", address),
                len = data.len(),
                "hierarchy chunk is not a whole number of records"
            );
        }

        let chunk = parse_hrc_chunk(octree, owner, &data)?;
        debug!(
            node = %format!("r{}", address),
            records = chunk.records,
            discovered = chunk.discovered,
            "parsed hierarchy chunk"
        );

        for leftover in chunk.leftovers {
            if let Some(parent) = octree.node(leftover).and_then(|node| node.parent) {
                if !visited.contains(&parent) {
                    worklist.push_back(parent);
                }
            }
        }
    }

    Ok(())
}
