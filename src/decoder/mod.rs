pub mod morton;

use crate::metadata::{CloudMetadata, Encoding, FormatVersion};
use crate::octree::point_attributes::{AttributeKind, PointAttribute};
use crate::point::PointBlock;
use byteorder::{ByteOrder, LittleEndian};
use glam::{DVec3, U8Vec4, Vec3};
use std::io::{Cursor, Read};
use thiserror::Error;
use tracing::{trace, warn};

/// Bytes per point of a Morton coded position.
const MORTON_POSITION_SIZE: usize = 16;
/// Bytes per point of a Morton coded color.
const MORTON_COLOR_SIZE: usize = 8;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Attribute {attribute} needs bytes {start}..{end} but the block has {len}")]
    MalformedPayload {
        attribute: String,
        start: usize,
        end: usize,
        len: usize,
    },

    #[error("Attribute {attribute} has an unsupported layout: {reason}")]
    UnsupportedLayout { attribute: String, reason: String },

    #[error("Brotli decompression failed: {0}")]
    Decompress(#[from] std::io::Error),
}

/// Turns the bytes of one node into positions and colors, following the
/// cloud's attribute schema.
#[derive(Clone, Copy, Debug)]
pub struct PointBlockDecoder<'a> {
    metadata: &'a CloudMetadata,
}

impl<'a> PointBlockDecoder<'a> {
    pub fn new(metadata: &'a CloudMetadata) -> Self {
        Self { metadata }
    }

    /// Decodes a node payload.
    ///
    /// Uncompressed payloads hold as many points as there are whole records,
    /// Brotli payloads hold `num_points`. Positions come out in display
    /// order (storage x, z, y) scaled per axis.
    pub fn decode(&self, data: &[u8], num_points: u32) -> Result<PointBlock, DecodeError> {
        if data.is_empty() {
            return Ok(PointBlock::default());
        }

        match (self.metadata.version, self.metadata.encoding) {
            (FormatVersion::V1, _) => self.decode_records(data, true),
            (FormatVersion::V2, Encoding::Raw) => self.decode_records(data, false),
            (FormatVersion::V2, Encoding::Brotli) => {
                let decompressed = decompress(data)?;
                self.decode_columns(&decompressed, num_points as usize)
            }
        }
    }

    fn scaled(&self, x: u64, y: u64, z: u64) -> Vec3 {
        let scale = self.metadata.scale;
        let storage = DVec3::new(x as f64 * scale.x, y as f64 * scale.y, z as f64 * scale.z);
        Vec3::new(storage.x as f32, storage.z as f32, storage.y as f32)
    }

    /// Interleaved fixed-size records, attributes in schema order.
    fn decode_records(&self, data: &[u8], legacy: bool) -> Result<PointBlock, DecodeError> {
        let record = self.metadata.point_byte_size;
        if record == 0 {
            return Err(DecodeError::UnsupportedLayout {
                attribute: "*".to_string(),
                reason: "schema has no attributes".to_string(),
            });
        }

        let count = data.len() / record;
        if data.len() % record != 0 {
            warn!(
                len = data.len(),
                record,
                "payload is not a whole number of records, ignoring the tail"
            );
        }

        let mut block = PointBlock::with_len(count);
        let mut offset = 0;

        for attribute in &self.metadata.attributes {
            match attribute.kind {
                AttributeKind::Position => {
                    let size = triplet_element_size(attribute)?;
                    for i in 0..count {
                        let bytes = field(data, i * record + offset, size * 3, attribute)?;
                        block.positions[i] = self.scaled(
                            LittleEndian::read_uint(&bytes[..size], size),
                            LittleEndian::read_uint(&bytes[size..2 * size], size),
                            LittleEndian::read_uint(&bytes[2 * size..], size),
                        );
                    }
                }
                AttributeKind::PackedColor | AttributeKind::Rgb | AttributeKind::Rgba if legacy => {
                    // bytes are the channels; only RGBA carries a meaningful alpha
                    let has_alpha = attribute.kind == AttributeKind::Rgba;
                    let channels = if has_alpha { 4 } else { 3 };
                    for i in 0..count {
                        let bytes = field(data, i * record + offset, channels, attribute)?;
                        let alpha = if has_alpha { bytes[3] } else { 255 };
                        block.colors[i] = U8Vec4::new(bytes[0], bytes[1], bytes[2], alpha);
                    }
                }
                AttributeKind::PackedColor | AttributeKind::Rgb | AttributeKind::Rgba => {
                    let size = triplet_element_size(attribute)?;
                    let shift = (size * 8 - 8) as u32;
                    for i in 0..count {
                        let bytes = field(data, i * record + offset, size * 3, attribute)?;
                        let channel = |c: usize| {
                            (LittleEndian::read_uint(&bytes[c * size..(c + 1) * size], size) >> shift) as u8
                        };
                        block.colors[i] = U8Vec4::new(channel(0), channel(1), channel(2), 255);
                    }
                }
                AttributeKind::Other => {
                    trace!(attribute = %attribute.name, "skipping attribute");
                }
            }
            offset += attribute.byte_size as usize;
        }

        Ok(block)
    }

    /// Column layout of the Brotli encoding: every attribute stores all of
    /// its values before the next attribute begins.
    fn decode_columns(&self, data: &[u8], count: usize) -> Result<PointBlock, DecodeError> {
        self.check_column_sizes(data, count)?;

        let mut block = PointBlock::with_len(count);
        let mut offset = 0;

        for attribute in &self.metadata.attributes {
            match attribute.kind {
                AttributeKind::Position => {
                    for i in 0..count {
                        let bytes = field(data, offset + i * MORTON_POSITION_SIZE, MORTON_POSITION_SIZE, attribute)?;
                        let (x, y, z) = morton::decode_position(bytes);
                        block.positions[i] = self.scaled(x as u64, y as u64, z as u64);
                    }
                    offset += count * MORTON_POSITION_SIZE;
                }
                AttributeKind::PackedColor | AttributeKind::Rgb | AttributeKind::Rgba => {
                    for i in 0..count {
                        let bytes = field(data, offset + i * MORTON_COLOR_SIZE, MORTON_COLOR_SIZE, attribute)?;
                        let (r, g, b) = morton::decode_color(bytes);
                        block.colors[i] = U8Vec4::new((r >> 8) as u8, (g >> 8) as u8, (b >> 8) as u8, 255);
                    }
                    offset += count * MORTON_COLOR_SIZE;
                }
                AttributeKind::Other => {
                    offset += count * attribute.byte_size as usize;
                }
            }
        }

        if offset < data.len() {
            trace!(unused = data.len() - offset, "payload longer than the schema");
        }

        Ok(block)
    }
}

impl PointBlockDecoder<'_> {
    /// Fails when `count` values of every attribute do not fit in `data`,
    /// before anything is allocated for them.
    fn check_column_sizes(&self, data: &[u8], count: usize) -> Result<(), DecodeError> {
        let mut start = 0usize;
        for attribute in &self.metadata.attributes {
            let stride = match attribute.kind {
                AttributeKind::Position => MORTON_POSITION_SIZE,
                AttributeKind::PackedColor | AttributeKind::Rgb | AttributeKind::Rgba => MORTON_COLOR_SIZE,
                AttributeKind::Other => attribute.byte_size as usize,
            };
            let end = count
                .checked_mul(stride)
                .and_then(|len| start.checked_add(len))
                .unwrap_or(usize::MAX);
            if end > data.len() {
                return Err(DecodeError::MalformedPayload {
                    attribute: attribute.name.clone(),
                    start,
                    end,
                    len: data.len(),
                });
            }
            start = end;
        }
        Ok(())
    }
}

fn decompress(data: &[u8]) -> Result<Vec<u8>, std::io::Error> {
    let mut cursor = Cursor::new(data);
    let mut input = brotli_decompressor::Decompressor::new(&mut cursor, 4096);
    let mut decompressed = Vec::new();
    input.read_to_end(&mut decompressed)?;
    Ok(decompressed)
}

fn field<'b>(
    data: &'b [u8],
    start: usize,
    len: usize,
    attribute: &PointAttribute,
) -> Result<&'b [u8], DecodeError> {
    data.get(start..start + len)
        .ok_or_else(|| DecodeError::MalformedPayload {
            attribute: attribute.name.clone(),
            start,
            end: start + len,
            len: data.len(),
        })
}

/// Element size of a three-component attribute read as unsigned integers.
fn triplet_element_size(attribute: &PointAttribute) -> Result<usize, DecodeError> {
    let size = attribute.element_size();
    if attribute.num_elements < 3 || !(1..=8).contains(&size) {
        return Err(DecodeError::UnsupportedLayout {
            attribute: attribute.name.clone(),
            reason: format!("{} elements of {} bytes", attribute.num_elements, size),
        });
    }
    Ok(size)
}
