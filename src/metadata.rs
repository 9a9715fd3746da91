use crate::config::LoaderConfig;
use crate::octree::aabb::Aabb;
use crate::octree::point_attributes::{legacy_attribute, point_byte_size, PointAttribute};
use crate::resource::{DataFetcher, ResourceClient, ResourceError, StorageContext};
use glam::DVec3;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, instrument};

#[derive(Error, Debug)]
pub enum ReadMetadataError {
    #[error("Invalid json: {0}")]
    Json(#[from] serde_json::error::Error),

    #[error("Resource error: {0}")]
    Resource(#[from] ResourceError),

    #[error("Missing field: {0}")]
    MissingField(&'static str),

    #[error("Unsupported point attribute: {0}")]
    UnsupportedAttribute(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FormatVersion {
    /// Potree 1.x: `cloud.js` plus one chunk file per node.
    V1,
    /// Potree 2.x: `metadata.json`, `hierarchy.bin` and `octree.bin`.
    V2,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Encoding {
    Raw,
    Brotli,
}

/// Everything needed to address and decode a cloud. Immutable once read.
#[derive(Clone, Debug)]
pub struct CloudMetadata {
    pub version: FormatVersion,
    pub version_string: String,
    pub cloud_name: String,
    pub points: Option<u64>,
    /// Per axis, in storage order.
    pub scale: DVec3,
    pub attributes: Vec<PointAttribute>,
    pub storage: StorageContext,
    pub octree_dir: String,
    pub hierarchy_step_size: usize,
    pub first_chunk_size: u64,
    pub encoding: Encoding,
    pub point_byte_size: usize,
    /// In display order, shifted when the cloud was moved to the origin.
    pub bounding_box: Aabb,
    pub spacing: f64,
    /// Where decoded positions are relative to, in display order.
    pub position_origin: DVec3,
}

/// Potree 2.x `metadata.json`.
#[derive(Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
struct Metadata {
    version: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    points: Option<u64>,
    hierarchy: HierarchyMetadata,
    #[serde(default)]
    offset: Option<[f64; 3]>,
    scale: [f64; 3],
    spacing: f64,
    bounding_box: BoundingBox,
    #[serde(default = "default_encoding")]
    encoding: String,
    attributes: Vec<AttributeMetadata>,
}

fn default_encoding() -> String {
    "DEFAULT".to_string()
}

#[derive(Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
struct HierarchyMetadata {
    first_chunk_size: u64,
    #[serde(default)]
    step_size: u16,
}

#[derive(Deserialize, Clone, Debug)]
struct BoundingBox {
    min: [f64; 3],
    max: [f64; 3],
}

#[derive(Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
struct AttributeMetadata {
    name: String,
    size: u16,
    #[serde(default = "one")]
    num_elements: u16,
    #[serde(default)]
    min: Vec<f64>,
    #[serde(default)]
    max: Vec<f64>,
}

fn one() -> u16 {
    1
}

impl AttributeMetadata {
    fn into_attribute(self) -> PointAttribute {
        // wide types are later packed using the widest range over all elements
        let range = match (
            self.min.iter().copied().reduce(f64::min),
            self.max.iter().copied().reduce(f64::max),
        ) {
            (Some(min), Some(max)) => Some((min, max)),
            _ => None,
        };
        PointAttribute::new(self.name, self.size, self.num_elements).with_range(range)
    }
}

/// Potree 1.x `cloud.js`.
#[derive(Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
struct CloudJs {
    #[serde(default = "default_octree_dir")]
    octree_dir: String,
    #[serde(default)]
    points: Option<u64>,
    bounding_box: LegacyBoundingBox,
    point_attributes: serde_json::Value,
    spacing: f64,
    scale: f64,
    hierarchy_step_size: usize,
}

fn default_octree_dir() -> String {
    "data".to_string()
}

#[derive(Deserialize, Clone, Debug)]
struct LegacyBoundingBox {
    lx: f64,
    ly: f64,
    lz: f64,
    ux: f64,
    uy: f64,
    uz: f64,
}

/// Storage order `[x, y, z]` to display order, y and z swapped.
fn to_display(v: [f64; 3]) -> DVec3 {
    DVec3::new(v[0], v[2], v[1])
}

/// A descriptor location split into storage context, file name and cloud name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MetadataSource {
    pub storage: StorageContext,
    pub descriptor: String,
    pub cloud_name: String,
}

impl MetadataSource {
    /// Accepts a local path, a `file://` url or an `http(s)://` url to the
    /// cloud's descriptor. The cloud is named after the descriptor's directory.
    pub fn parse(source: &str, config: &LoaderConfig) -> Result<Self, ReadMetadataError> {
        let is_remote = source.starts_with("http://") || source.starts_with("https://");
        let source = source.strip_prefix("file://").unwrap_or(source);

        let (base, descriptor) = match source.rfind('/') {
            Some(index) => (&source[..index], &source[index + 1..]),
            None => ("", source),
        };
        if descriptor.is_empty() {
            return Err(ReadMetadataError::UnsupportedFormat(format!(
                "{} does not name a descriptor file",
                source
            )));
        }

        let cloud_name = base
            .rsplit('/')
            .next()
            .filter(|segment| !segment.is_empty())
            .unwrap_or("pointcloud")
            .to_string();

        let storage = if is_remote {
            StorageContext::Remote {
                base_url: base.to_string(),
                mirror_path: config.mirror_path(&cloud_name),
            }
        } else {
            StorageContext::Local {
                base_path: if base.is_empty() && !source.starts_with('/') {
                    PathBuf::from(".")
                } else {
                    Path::new(source)
                        .parent()
                        .map(Path::to_path_buf)
                        .unwrap_or_else(|| PathBuf::from("/"))
                },
            }
        };

        Ok(Self {
            storage,
            descriptor: descriptor.to_string(),
            cloud_name,
        })
    }
}

/// Reads and parses the descriptor named by `source`.
#[instrument(skip(fetcher))]
pub async fn load_metadata<C: ResourceClient>(
    fetcher: &DataFetcher<C>,
    source: &MetadataSource,
    move_to_origin: bool,
) -> Result<CloudMetadata, ReadMetadataError> {
    let bytes = fetcher.fetch(&source.descriptor).await?;
    let text = String::from_utf8_lossy(&bytes);

    let metadata = parse_metadata(
        &text,
        move_to_origin,
        &source.cloud_name,
        source.storage.clone(),
    )?;
    info!(
        cloud = %metadata.cloud_name,
        version = %metadata.version_string,
        attributes = metadata.attributes.len(),
        "loaded metadata"
    );
    Ok(metadata)
}

/// Parses a `cloud.js` (v1) or `metadata.json` (v2) descriptor.
pub fn parse_metadata(
    text: &str,
    move_to_origin: bool,
    cloud_name: &str,
    storage: StorageContext,
) -> Result<CloudMetadata, ReadMetadataError> {
    let value: serde_json::Value = serde_json::from_str(text)?;
    let version = value
        .get("version")
        .and_then(serde_json::Value::as_str)
        .ok_or(ReadMetadataError::MissingField("version"))?
        .to_string();

    let mut metadata = if version.starts_with('2') {
        from_v2(serde_json::from_value(value)?, cloud_name, storage)?
    } else {
        from_v1(serde_json::from_value(value)?, version, cloud_name, storage)?
    };

    if move_to_origin {
        let shift = -metadata.bounding_box.center();
        metadata.bounding_box = metadata.bounding_box.translated(shift);
        metadata.position_origin += shift;
    }

    Ok(metadata)
}

fn from_v2(
    raw: Metadata,
    cloud_name: &str,
    storage: StorageContext,
) -> Result<CloudMetadata, ReadMetadataError> {
    let encoding = match raw.encoding.to_ascii_uppercase().as_str() {
        "BROTLI" => Encoding::Brotli,
        "DEFAULT" | "" => Encoding::Raw,
        other => return Err(ReadMetadataError::UnsupportedFormat(format!("encoding {}", other))),
    };

    let attributes: Vec<PointAttribute> = raw
        .attributes
        .into_iter()
        .map(AttributeMetadata::into_attribute)
        .collect();
    let bounding_box = Aabb::new(to_display(raw.bounding_box.min), to_display(raw.bounding_box.max));

    Ok(CloudMetadata {
        version: FormatVersion::V2,
        version_string: raw.version,
        cloud_name: if cloud_name.is_empty() { raw.name } else { cloud_name.to_string() },
        points: raw.points,
        scale: DVec3::from_array(raw.scale),
        point_byte_size: point_byte_size(&attributes),
        attributes,
        storage,
        octree_dir: String::new(),
        hierarchy_step_size: raw.hierarchy.step_size as usize,
        first_chunk_size: raw.hierarchy.first_chunk_size,
        encoding,
        position_origin: raw.offset.map(to_display).unwrap_or(bounding_box.min),
        bounding_box,
        spacing: raw.spacing,
    })
}

fn from_v1(
    raw: CloudJs,
    version: String,
    cloud_name: &str,
    storage: StorageContext,
) -> Result<CloudMetadata, ReadMetadataError> {
    let names = match raw.point_attributes {
        serde_json::Value::Array(names) => names,
        serde_json::Value::String(format) => {
            return Err(ReadMetadataError::UnsupportedFormat(format!(
                "point attributes stored as {}",
                format
            )))
        }
        _ => return Err(ReadMetadataError::MissingField("pointAttributes")),
    };

    let attributes = names
        .iter()
        .map(|name| {
            let name = name
                .as_str()
                .ok_or(ReadMetadataError::MissingField("pointAttributes"))?;
            legacy_attribute(name).ok_or_else(|| ReadMetadataError::UnsupportedAttribute(name.to_string()))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let bb = raw.bounding_box;
    let bounding_box = Aabb::new(to_display([bb.lx, bb.ly, bb.lz]), to_display([bb.ux, bb.uy, bb.uz]));

    Ok(CloudMetadata {
        version: FormatVersion::V1,
        version_string: version,
        cloud_name: cloud_name.to_string(),
        points: raw.points,
        scale: DVec3::splat(raw.scale),
        point_byte_size: point_byte_size(&attributes),
        attributes,
        storage,
        octree_dir: raw.octree_dir,
        hierarchy_step_size: raw.hierarchy_step_size,
        first_chunk_size: 0,
        encoding: Encoding::Raw,
        position_origin: bounding_box.min,
        bounding_box,
        spacing: raw.spacing,
    })
}
