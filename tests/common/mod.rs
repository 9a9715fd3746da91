#![allow(dead_code)]

use async_trait::async_trait;
use glam::Vec3;
use potree::resource::{ResourceClient, ResourceError};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Fresh, empty directory for one test.
pub fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("potree-loader-{}-{}", name, std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

pub fn write_file(root: &Path, relative: &str, bytes: &[u8]) {
    let path = root.join(relative);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, bytes).unwrap();
}

pub fn assert_close(actual: Vec3, expected: Vec3) {
    assert!(
        (actual - expected).abs().max_element() < 1e-4,
        "{:?} != {:?}",
        actual,
        expected
    );
}

/// Serves files from memory and records every request.
#[derive(Default)]
pub struct MockClient {
    files: HashMap<String, Vec<u8>>,
    failing: HashSet<String>,
    requests: Mutex<Vec<String>>,
}

impl MockClient {
    /// Serves every file below `root` at `base_url/<relative path>`.
    pub fn serving(base_url: &str, root: &Path) -> Self {
        let mut files = HashMap::new();
        collect(root, root, base_url, &mut files);
        Self {
            files,
            ..Self::default()
        }
    }

    /// Answers requests for `url` with a network error.
    pub fn with_failure(mut self, url: impl Into<String>) -> Self {
        self.failing.insert(url.into());
        self
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

fn collect(root: &Path, dir: &Path, base_url: &str, files: &mut HashMap<String, Vec<u8>>) {
    for entry in std::fs::read_dir(dir).unwrap() {
        let path = entry.unwrap().path();
        if path.is_dir() {
            collect(root, &path, base_url, files);
        } else {
            let relative = path.strip_prefix(root).unwrap().to_string_lossy().replace('\\', "/");
            files.insert(format!("{}/{}", base_url, relative), std::fs::read(&path).unwrap());
        }
    }
}

fn parse_range(value: &str) -> Option<(usize, usize)> {
    let (start, end) = value.strip_prefix("bytes=")?.split_once('-')?;
    Some((start.parse().ok()?, end.parse().ok()?))
}

#[async_trait]
impl ResourceClient for MockClient {
    async fn get(
        &self,
        url: &str,
        headers: Option<BTreeMap<String, String>>,
    ) -> Result<Vec<u8>, ResourceError> {
        let range = headers
            .as_ref()
            .and_then(|headers| headers.get("Range"))
            .and_then(|value| parse_range(value));
        self.requests.lock().unwrap().push(match range {
            Some((start, end)) => format!("{} {}-{}", url, start, end),
            None => url.to_string(),
        });

        if self.failing.contains(url) {
            return Err(ResourceError::Network(format!("connection reset: {}", url)));
        }
        let bytes = self
            .files
            .get(url)
            .ok_or_else(|| ResourceError::NotFound(url.to_string()))?;
        Ok(match range {
            Some((start, end)) => {
                let end = (end + 1).min(bytes.len());
                bytes.get(start.min(end)..end).unwrap_or_default().to_vec()
            }
            None => bytes.clone(),
        })
    }
}

/// One point as stored: integer coordinates in storage order and 16-bit color.
#[derive(Clone, Copy, Debug)]
pub struct RawPoint {
    pub position: [u32; 3],
    pub color: [u16; 3],
}

pub const fn point(position: [u32; 3], color: [u16; 3]) -> RawPoint {
    RawPoint { position, color }
}

/// Potree 1.x record: `POSITION_CARTESIAN` then `RGB`, colors cut to 8 bits.
pub fn v1_records(points: &[RawPoint]) -> Vec<u8> {
    let mut bytes = Vec::new();
    for p in points {
        for v in p.position {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        bytes.extend(p.color.iter().map(|&c| c as u8));
    }
    bytes
}

/// Potree 2.x uncompressed records: `position` (3 x int32), `intensity`
/// (uint16), `rgb` (3 x uint16).
pub fn v2_records(points: &[RawPoint]) -> Vec<u8> {
    let mut bytes = Vec::new();
    for p in points {
        for v in p.position {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        bytes.extend_from_slice(&[0, 0]);
        for c in p.color {
            bytes.extend_from_slice(&c.to_le_bytes());
        }
    }
    bytes
}

fn spread(v: u32) -> u64 {
    (0..16).fold(0u64, |acc, bit| acc | ((((v >> bit) & 1) as u64) << (3 * bit)))
}

fn interleave(a: u32, b: u32, c: u32) -> u64 {
    spread(a & 0xffff) | (spread(b & 0xffff) << 1) | (spread(c & 0xffff) << 2)
}

/// Potree 2.x Brotli block with the same schema as [`v2_records`].
pub fn v2_brotli_block(points: &[RawPoint]) -> Vec<u8> {
    let mut raw = Vec::new();
    for p in points {
        let [x, y, z] = p.position;
        raw.extend_from_slice(&interleave(x >> 16, y >> 16, z >> 16).to_le_bytes());
        raw.extend_from_slice(&interleave(x, y, z).to_le_bytes());
    }
    raw.extend(std::iter::repeat(0).take(2 * points.len()));
    for p in points {
        let [r, g, b] = p.color;
        raw.extend_from_slice(&interleave(r as u32, g as u32, b as u32).to_le_bytes());
    }

    let mut compressed = Vec::new();
    {
        let mut writer = brotli::CompressorWriter::new(&mut compressed, 4096, 5, 22);
        writer.write_all(&raw).unwrap();
    }
    compressed
}

/// One 22-byte `hierarchy.bin` record.
pub fn hierarchy_record(r#type: u8, child_mask: u8, num_points: u32, byte_offset: u64, byte_size: u64) -> Vec<u8> {
    let mut bytes = vec![r#type, child_mask];
    bytes.extend_from_slice(&num_points.to_le_bytes());
    bytes.extend_from_slice(&byte_offset.to_le_bytes());
    bytes.extend_from_slice(&byte_size.to_le_bytes());
    bytes
}

pub const V1_ROOT_POINTS: [RawPoint; 2] = [point([100, 200, 300], [10, 20, 30]), point([0, 0, 0], [255, 0, 0])];
pub const V1_CHILD_POINTS: [RawPoint; 1] = [point([50, 60, 70], [1, 2, 3])];

/// Potree 1.x cloud with a hierarchy step of 1, so that every inner node
/// below the root owns a chunk:
///
/// ```text
/// r ── r0 ── r01 ── r010
///  └── r2
/// ```
pub fn write_v1_cloud(root: &Path) {
    write_file(
        root,
        "cloud.js",
        br#"{
            "version": "1.7",
            "octreeDir": "data",
            "points": 5,
            "boundingBox": { "lx": 0.0, "ly": 0.0, "lz": 0.0, "ux": 16.0, "uy": 16.0, "uz": 16.0 },
            "tightBoundingBox": { "lx": 0.0, "ly": 0.0, "lz": 0.0, "ux": 15.0, "uy": 15.0, "uz": 15.0 },
            "pointAttributes": ["POSITION_CARTESIAN", "RGB"],
            "spacing": 2.0,
            "scale": 0.01,
            "hierarchyStepSize": 1
        }"#,
    );

    // root, then its children 0 and 2
    write_file(root, "data/r/r.hrc", &[0b101, 0, 0, 0, 0, 0b10, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
    // r0 again, then r01
    write_file(root, "data/r/0/r0.hrc", &[0b10, 0, 0, 0, 0, 0b1, 0, 0, 0, 0]);
    // r01 again, then r010
    write_file(root, "data/r/0/1/r01.hrc", &[0b1, 0, 0, 0, 0, 0, 0, 0, 0, 0]);

    write_file(root, "data/r/r.bin", &v1_records(&V1_ROOT_POINTS));
    write_file(root, "data/r/0/r0.bin", &v1_records(&V1_CHILD_POINTS));
    write_file(root, "data/r/0/1/r01.bin", &v1_records(&V1_CHILD_POINTS));
    write_file(root, "data/r/0/1/0/r010.bin", &v1_records(&V1_CHILD_POINTS));
    write_file(root, "data/r/2/r2.bin", &v1_records(&V1_CHILD_POINTS));
}

pub const V2_ROOT_POINTS: [RawPoint; 2] = [
    point([1000, 2000, 3000], [0x1000, 0x2000, 0x3000]),
    point([70000, 5, 9], [0xff00, 0x00ff, 0x0100]),
];
pub const V2_LEAF_POINTS: [RawPoint; 1] = [point([4, 5, 6], [0x0400, 0x0500, 0x0600])];
pub const V2_PROXY_POINTS: [RawPoint; 3] = [
    point([7, 8, 9], [0x0700, 0x0800, 0x0900]),
    point([10, 11, 12], [0x0a00, 0x0b00, 0x0c00]),
    point([13, 14, 15], [0x0d00, 0x0e00, 0x0f00]),
];
pub const V2_DEEP_POINTS: [RawPoint; 1] = [point([16, 17, 18], [0x1000, 0x1100, 0x1200])];

/// Size of the root hierarchy chunk written by [`write_v2_cloud`].
pub const V2_FIRST_CHUNK_SIZE: u64 = 3 * 22;

/// Potree 2.x cloud whose first hierarchy chunk holds the root, leaf `r0`
/// and proxy `r1`; the proxy's own range adds `r17`.
pub fn write_v2_cloud(root: &Path, brotli: bool) {
    let encode = |points: &[RawPoint]| {
        if brotli {
            v2_brotli_block(points)
        } else {
            v2_records(points)
        }
    };

    let blocks = [
        encode(&V2_ROOT_POINTS),
        encode(&V2_LEAF_POINTS),
        encode(&V2_PROXY_POINTS),
        encode(&V2_DEEP_POINTS),
    ];
    let mut offsets = Vec::new();
    let mut octree = Vec::new();
    for block in &blocks {
        offsets.push((octree.len() as u64, block.len() as u64));
        octree.extend_from_slice(block);
    }
    write_file(root, "octree.bin", &octree);

    let mut hierarchy = Vec::new();
    hierarchy.extend(hierarchy_record(0, 0b0000_0011, 2, offsets[0].0, offsets[0].1));
    hierarchy.extend(hierarchy_record(1, 0, 1, offsets[1].0, offsets[1].1));
    hierarchy.extend(hierarchy_record(2, 0, 3, V2_FIRST_CHUNK_SIZE, 2 * 22));
    // proxy range: r1 itself, then its child 7
    hierarchy.extend(hierarchy_record(0, 0b1000_0000, 3, offsets[2].0, offsets[2].1));
    hierarchy.extend(hierarchy_record(1, 0, 1, offsets[3].0, offsets[3].1));
    write_file(root, "hierarchy.bin", &hierarchy);

    let metadata = format!(
        r#"{{
            "version": "2.0",
            "name": "ignored",
            "points": 7,
            "hierarchy": {{ "firstChunkSize": {}, "stepSize": 4, "depth": 2 }},
            "offset": [0.0, 0.0, 0.0],
            "scale": [0.001, 0.001, 0.001],
            "spacing": 1.0,
            "boundingBox": {{ "min": [0.0, 0.0, 0.0], "max": [128.0, 128.0, 128.0] }},
            "encoding": "{}",
            "attributes": [
                {{ "name": "position", "size": 12, "numElements": 3, "elementSize": 4, "type": "int32" }},
                {{ "name": "intensity", "size": 2, "numElements": 1, "elementSize": 2, "type": "uint16" }},
                {{ "name": "rgb", "size": 6, "numElements": 3, "elementSize": 2, "type": "uint16" }}
            ]
        }}"#,
        V2_FIRST_CHUNK_SIZE,
        if brotli { "BROTLI" } else { "DEFAULT" }
    );
    write_file(root, "metadata.json", metadata.as_bytes());
}

/// Display-order position of a stored point for a uniform `scale`.
pub fn display_position(p: &RawPoint, scale: f64) -> Vec3 {
    let [x, y, z] = p.position;
    Vec3::new(
        (x as f64 * scale) as f32,
        (z as f64 * scale) as f32,
        (y as f64 * scale) as f32,
    )
}
