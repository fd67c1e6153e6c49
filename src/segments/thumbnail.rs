//! JFIF thumbnails: uncompressed RGB, palette-indexed and JPEG-compressed.
//!
//! Parsed thumbnails remember where their pixel data sits in the source
//! stream so `materialize` can read it back from there.

use super::{PayloadReader, SegmentOrigin};
use crate::codec::{PixelBuffer, PixelCodec};
use crate::constants::{
    JFIF_FIXED_PAYLOAD_SIZE, JFXX_THUMB_JPEG, JFXX_THUMB_PALETTE, JFXX_THUMB_RGB,
    MAX_THUMBNAIL_DIMENSION, SEGMENT_MAX_DATA_SIZE, THUMBNAIL_PALETTE_SIZE,
};
use crate::document::MetadataDocument;
use crate::error::{MetadataError, Result};
use crate::jpeg_stream_reader::parse_thumbnail_metadata;
use crate::jpeg_stream_writer::JpegStreamWriter;
use crate::tree::{TreeNode, UserObject};
use crate::tree_codec;
use crate::warning::{LogWarnings, MetadataWarning, WarningSink};
use std::io::{Read, Seek, SeekFrom, Write};

/// Largest width and height that fit both the one-byte size fields and a
/// single segment holding `bytes_per_pixel` bytes per pixel.
fn clip_dimensions(
    width: u32,
    height: u32,
    bytes_per_pixel: usize,
    sink: &mut dyn WarningSink,
) -> (u8, u8) {
    let clipped_width = width.min(MAX_THUMBNAIL_DIMENSION).max(1);
    let rows_that_fit = (SEGMENT_MAX_DATA_SIZE - JFIF_FIXED_PAYLOAD_SIZE)
        / (clipped_width as usize * bytes_per_pixel);
    let clipped_height = height.min(MAX_THUMBNAIL_DIMENSION).min(rows_that_fit as u32).max(1);
    if clipped_width != width || clipped_height != height {
        sink.warning(MetadataWarning::ThumbnailClipped {
            width: clipped_width,
            height: clipped_height,
        });
    }
    (clipped_width as u8, clipped_height as u8)
}

fn read_at_origin<R: Read + Seek>(source: &mut R, origin: &SegmentOrigin) -> Result<Option<Vec<u8>>> {
    let (Some(offset), Some(length)) = (origin.stream_offset(), origin.raw_length()) else {
        return Ok(None);
    };
    source.seek(SeekFrom::Start(offset))?;
    let mut data = vec![0u8; length];
    source.read_exact(&mut data).map_err(|e| match e.kind() {
        std::io::ErrorKind::UnexpectedEof => MetadataError::truncated(),
        _ => e.into(),
    })?;
    Ok(Some(data))
}

fn dimension_attributes(node: &TreeNode) -> Result<(u8, u8)> {
    let width = node.required_int("thumbWidth", 0..=MAX_THUMBNAIL_DIMENSION)? as u8;
    let height = node.required_int("thumbHeight", 0..=MAX_THUMBNAIL_DIMENSION)? as u8;
    Ok((width, height))
}

fn node_bytes<'a>(node: &'a TreeNode) -> Result<&'a [u8]> {
    match &node.user_object {
        Some(UserObject::Bytes(bytes)) => Ok(bytes),
        _ => Err(node.invalid("thumbnail node requires its data as a byte user object")),
    }
}

/// Uncompressed 24-bit RGB thumbnail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RgbThumbnail {
    pub width: u8,
    pub height: u8,
    pub pixels: Vec<u8>,
    pub origin: SegmentOrigin,
}

impl RgbThumbnail {
    pub const NODE_NAME: &'static str = "JFIFthumbRGB";

    pub fn new(width: u8, height: u8, pixels: Vec<u8>) -> Result<Self> {
        if pixels.len() != width as usize * height as usize * 3 {
            return Err(MetadataError::invalid_tree(
                Self::NODE_NAME,
                format!("{} bytes do not make a {}x{} RGB thumbnail", pixels.len(), width, height),
            ));
        }
        Ok(Self {
            width,
            height,
            pixels,
            origin: SegmentOrigin::default(),
        })
    }

    /// Builds a thumbnail from an RGB buffer, clipping it when it is too
    /// large for a JFIF segment.
    pub fn from_pixels(buffer: &PixelBuffer, sink: &mut dyn WarningSink) -> Result<Self> {
        if buffer.components != 3 {
            return Err(MetadataError::invalid_tree(
                Self::NODE_NAME,
                format!("RGB thumbnail needs 3 components, got {}", buffer.components),
            ));
        }
        let (width, height) = clip_dimensions(buffer.width, buffer.height, 3, sink);
        let clipped = buffer.cropped(width as u32, height as u32);
        Self::new(width, height, clipped.data)
    }

    pub(crate) fn parse(
        reader: &mut PayloadReader<'_>,
        payload_offset: u64,
        width: u8,
        height: u8,
    ) -> Result<Self> {
        let data_offset = payload_offset + reader.position() as u64;
        let length = width as usize * height as usize * 3;
        let pixels = reader.take(length)?.to_vec();
        Ok(Self {
            width,
            height,
            pixels,
            origin: SegmentOrigin::read_at(data_offset, length),
        })
    }

    pub fn to_pixels(&self) -> PixelBuffer {
        PixelBuffer {
            width: self.width as u32,
            height: self.height as u32,
            components: 3,
            data: self.pixels.clone(),
        }
    }

    /// Reads the pixels back from the stream the thumbnail was parsed from.
    /// Thumbnails built in memory use their own bytes.
    pub fn materialize<R: Read + Seek>(&self, source: &mut R) -> Result<PixelBuffer> {
        let mut buffer = self.to_pixels();
        if let Some(data) = read_at_origin(source, &self.origin)? {
            buffer.data = data;
        }
        Ok(buffer)
    }

    pub fn to_native_node(&self) -> TreeNode {
        TreeNode::new(Self::NODE_NAME)
            .with_attribute("thumbWidth", self.width)
            .with_attribute("thumbHeight", self.height)
            .with_user_object(UserObject::Bytes(self.pixels.clone()))
    }

    pub fn from_native_node(node: &TreeNode) -> Result<Self> {
        node.expect_name(Self::NODE_NAME)?;
        let (width, height) = dimension_attributes(node)?;
        Self::new(width, height, node_bytes(node)?.to_vec())
    }
}

/// Palette-indexed thumbnail: 256 RGB palette entries, one index per pixel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaletteThumbnail {
    pub width: u8,
    pub height: u8,
    pub palette: Vec<u8>,
    pub indices: Vec<u8>,
    pub origin: SegmentOrigin,
}

impl PaletteThumbnail {
    pub const NODE_NAME: &'static str = "JFIFthumbPalette";

    pub fn new(width: u8, height: u8, palette: Vec<u8>, indices: Vec<u8>) -> Result<Self> {
        if palette.len() != THUMBNAIL_PALETTE_SIZE
            || indices.len() != width as usize * height as usize
        {
            return Err(MetadataError::invalid_tree(
                Self::NODE_NAME,
                "palette thumbnail needs a 768-byte palette and one index per pixel",
            ));
        }
        Ok(Self {
            width,
            height,
            palette,
            indices,
            origin: SegmentOrigin::default(),
        })
    }

    /// Builds a thumbnail from single-component palette indices, clipping
    /// when too large.
    pub fn from_indexed(
        indices: &PixelBuffer,
        palette: Vec<u8>,
        sink: &mut dyn WarningSink,
    ) -> Result<Self> {
        if indices.components != 1 {
            return Err(MetadataError::invalid_tree(
                Self::NODE_NAME,
                "palette thumbnail needs one index per pixel",
            ));
        }
        let (width, height) = clip_dimensions(indices.width, indices.height, 1, sink);
        let clipped = indices.cropped(width as u32, height as u32);
        Self::new(width, height, palette, clipped.data)
    }

    fn data_len(&self) -> usize {
        THUMBNAIL_PALETTE_SIZE + self.indices.len()
    }

    pub(crate) fn parse(
        reader: &mut PayloadReader<'_>,
        payload_offset: u64,
        width: u8,
        height: u8,
    ) -> Result<Self> {
        let data_offset = payload_offset + reader.position() as u64;
        let palette = reader.take(THUMBNAIL_PALETTE_SIZE)?.to_vec();
        let indices = reader.take(width as usize * height as usize)?.to_vec();
        let origin = SegmentOrigin::read_at(data_offset, palette.len() + indices.len());
        Ok(Self {
            width,
            height,
            palette,
            indices,
            origin,
        })
    }

    fn expand(&self, palette: &[u8], indices: &[u8]) -> PixelBuffer {
        let data = indices
            .iter()
            .flat_map(|&index| {
                let entry = index as usize * 3;
                palette[entry..entry + 3].iter().copied()
            })
            .collect();
        PixelBuffer {
            width: self.width as u32,
            height: self.height as u32,
            components: 3,
            data,
        }
    }

    pub fn to_pixels(&self) -> PixelBuffer {
        self.expand(&self.palette, &self.indices)
    }

    pub fn materialize<R: Read + Seek>(&self, source: &mut R) -> Result<PixelBuffer> {
        match read_at_origin(source, &self.origin)? {
            Some(data) => {
                let (palette, indices) = data.split_at(THUMBNAIL_PALETTE_SIZE);
                Ok(self.expand(palette, indices))
            }
            None => Ok(self.to_pixels()),
        }
    }

    pub fn to_native_node(&self) -> TreeNode {
        let mut data = Vec::with_capacity(self.data_len());
        data.extend_from_slice(&self.palette);
        data.extend_from_slice(&self.indices);
        TreeNode::new(Self::NODE_NAME)
            .with_attribute("thumbWidth", self.width)
            .with_attribute("thumbHeight", self.height)
            .with_user_object(UserObject::Bytes(data))
    }

    pub fn from_native_node(node: &TreeNode) -> Result<Self> {
        node.expect_name(Self::NODE_NAME)?;
        let (width, height) = dimension_attributes(node)?;
        let data = node_bytes(node)?;
        if data.len() < THUMBNAIL_PALETTE_SIZE {
            return Err(node.invalid("palette thumbnail data is shorter than the palette"));
        }
        let (palette, indices) = data.split_at(THUMBNAIL_PALETTE_SIZE);
        Self::new(width, height, palette.to_vec(), indices.to_vec())
    }
}

/// JPEG-compressed thumbnail. The embedded stream keeps its own marker
/// sequence, parsed as a thumbnail document.
#[derive(Debug, Clone, PartialEq)]
pub struct JpegThumbnail {
    pub data: Vec<u8>,
    pub metadata: MetadataDocument,
    pub origin: SegmentOrigin,
}

impl JpegThumbnail {
    pub const NODE_NAME: &'static str = "JFIFthumbJPEG";

    /// Wraps an encoded JPEG stream, parsing its markers.
    pub fn from_jpeg_bytes(data: Vec<u8>, sink: &mut dyn WarningSink) -> Result<Self> {
        let metadata = parse_thumbnail_metadata(&data, sink)?;
        Ok(Self {
            data,
            metadata,
            origin: SegmentOrigin::default(),
        })
    }

    /// Encodes `pixels` with `codec` using the tables of `metadata`, clipping
    /// the image first when it exceeds 255x255.
    pub fn encode(
        pixels: &PixelBuffer,
        metadata: &MetadataDocument,
        codec: &mut dyn PixelCodec,
        sink: &mut dyn WarningSink,
    ) -> Result<Self> {
        let width = pixels.width.min(MAX_THUMBNAIL_DIMENSION);
        let height = pixels.height.min(MAX_THUMBNAIL_DIMENSION);
        let clipped = if (width, height) != (pixels.width, pixels.height) {
            sink.warning(MetadataWarning::ThumbnailClipped { width, height });
            pixels.cropped(width, height)
        } else {
            pixels.clone()
        };
        let tables = crate::codec::EncodeTables::from_document(metadata);
        let mut data = Vec::new();
        codec.encode_scanlines(&clipped, tables.request(), &mut data)?;
        Self::from_jpeg_bytes(data, sink)
    }

    pub(crate) fn parse(
        reader: &mut PayloadReader<'_>,
        payload_offset: u64,
        sink: &mut dyn WarningSink,
    ) -> Result<Self> {
        let data_offset = payload_offset + reader.position() as u64;
        let data = reader.rest().to_vec();
        let metadata = parse_thumbnail_metadata(&data, sink)?;
        let origin = SegmentOrigin::read_at(data_offset, data.len());
        Ok(Self {
            data,
            metadata,
            origin,
        })
    }

    pub fn width(&self) -> u32 {
        self.metadata.sof().map_or(0, |sof| sof.samples_per_line as u32)
    }

    pub fn height(&self) -> u32 {
        self.metadata.sof().map_or(0, |sof| sof.num_lines as u32)
    }

    /// Decodes the thumbnail, reading the compressed bytes back from the
    /// stream it was parsed from.
    pub fn materialize<R: Read + Seek>(
        &self,
        source: &mut R,
        codec: &mut dyn PixelCodec,
    ) -> Result<PixelBuffer> {
        match read_at_origin(source, &self.origin)? {
            Some(data) => codec.decode_scanlines(&mut data.as_slice()),
            None => codec.decode_scanlines(&mut self.data.as_slice()),
        }
    }

    pub fn to_native_node(&self) -> TreeNode {
        TreeNode::new(Self::NODE_NAME)
            .with_child(tree_codec::to_native_tree(&self.metadata))
            .with_user_object(UserObject::Bytes(self.data.clone()))
    }

    /// The compressed bytes are authoritative; the nested marker sequence
    /// is re-derived from them.
    pub fn from_native_node(node: &TreeNode) -> Result<Self> {
        node.expect_name(Self::NODE_NAME)?;
        let data = node_bytes(node)?.to_vec();
        Self::from_jpeg_bytes(data, &mut LogWarnings)
            .map_err(|e| node.invalid(format!("embedded JPEG thumbnail is unreadable: {}", e)))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Thumbnail {
    Jpeg(JpegThumbnail),
    Palette(PaletteThumbnail),
    Rgb(RgbThumbnail),
}

impl Thumbnail {
    pub fn extension_code(&self) -> u8 {
        match self {
            Self::Jpeg(_) => JFXX_THUMB_JPEG,
            Self::Palette(_) => JFXX_THUMB_PALETTE,
            Self::Rgb(_) => JFXX_THUMB_RGB,
        }
    }

    pub fn width(&self) -> u32 {
        match self {
            Self::Jpeg(t) => t.width(),
            Self::Palette(t) => t.width as u32,
            Self::Rgb(t) => t.width as u32,
        }
    }

    pub fn height(&self) -> u32 {
        match self {
            Self::Jpeg(t) => t.height(),
            Self::Palette(t) => t.height as u32,
            Self::Rgb(t) => t.height as u32,
        }
    }

    /// Payload bytes after the JFXX extension code.
    pub(crate) fn payload_len(&self) -> usize {
        match self {
            Self::Jpeg(t) => t.data.len(),
            Self::Palette(t) => 2 + t.data_len(),
            Self::Rgb(t) => 2 + t.pixels.len(),
        }
    }

    pub(crate) fn write_payload<W: Write>(&self, writer: &mut JpegStreamWriter<W>) -> Result<()> {
        match self {
            Self::Jpeg(t) => writer.write_bytes(&t.data),
            Self::Palette(t) => {
                writer.write_byte(t.width)?;
                writer.write_byte(t.height)?;
                writer.write_bytes(&t.palette)?;
                writer.write_bytes(&t.indices)
            }
            Self::Rgb(t) => {
                writer.write_byte(t.width)?;
                writer.write_byte(t.height)?;
                writer.write_bytes(&t.pixels)
            }
        }
    }

    pub(crate) fn parse(
        code: u8,
        reader: &mut PayloadReader<'_>,
        payload_offset: u64,
        sink: &mut dyn WarningSink,
    ) -> Result<Self> {
        match code {
            JFXX_THUMB_JPEG => Ok(Self::Jpeg(JpegThumbnail::parse(reader, payload_offset, sink)?)),
            JFXX_THUMB_PALETTE => {
                let width = reader.read_u8()?;
                let height = reader.read_u8()?;
                Ok(Self::Palette(PaletteThumbnail::parse(reader, payload_offset, width, height)?))
            }
            JFXX_THUMB_RGB => {
                let width = reader.read_u8()?;
                let height = reader.read_u8()?;
                Ok(Self::Rgb(RgbThumbnail::parse(reader, payload_offset, width, height)?))
            }
            other => Err(MetadataError::format(format!(
                "unsupported JFXX extension code 0x{:02X}",
                other
            ))),
        }
    }

    pub fn to_native_node(&self) -> TreeNode {
        match self {
            Self::Jpeg(t) => t.to_native_node(),
            Self::Palette(t) => t.to_native_node(),
            Self::Rgb(t) => t.to_native_node(),
        }
    }

    pub fn from_native_node(node: &TreeNode) -> Result<Self> {
        match node.name.as_str() {
            JpegThumbnail::NODE_NAME => Ok(Self::Jpeg(JpegThumbnail::from_native_node(node)?)),
            PaletteThumbnail::NODE_NAME => Ok(Self::Palette(PaletteThumbnail::from_native_node(node)?)),
            RgbThumbnail::NODE_NAME => Ok(Self::Rgb(RgbThumbnail::from_native_node(node)?)),
            other => Err(node.invalid(format!("unknown thumbnail node {}", other))),
        }
    }
}
