//! Marker-segment records.
//!
//! Each record parses itself from its payload bytes, writes itself back out
//! and converts to and from its node in the native attribute tree. The
//! closed [`MarkerSegment`] enum is what a [`MetadataDocument`] stores.
//!
//! [`MetadataDocument`]: crate::document::MetadataDocument

pub mod adobe;
pub mod com;
pub mod dht;
pub mod dqt;
pub mod dri;
pub mod icc;
pub mod jfif;
pub mod sof;
pub mod sos;
pub mod thumbnail;
pub mod unknown;

pub use adobe::{AdobeSegment, AdobeTransform};
pub use com::ComSegment;
pub use dht::{DhtSegment, HuffmanClass, HuffmanTable};
pub use dqt::{DqtSegment, QuantizationTable};
pub use dri::DriSegment;
pub use icc::{IccChunk, IccChunkAssembler, IccSegment};
pub use jfif::{DensityUnits, JfifSegment, JfxxSegment};
pub use sof::{FrameComponentSpec, FrameProcess, SofSegment};
pub use sos::{ScanComponentSpec, SosSegment};
pub use thumbnail::{JpegThumbnail, PaletteThumbnail, RgbThumbnail, Thumbnail};
pub use unknown::UnknownSegment;

use crate::byte_cursor::ByteCursor;
use crate::error::{MetadataError, Result};
use crate::jpeg_stream_writer::JpegStreamWriter;
use crate::tree::TreeNode;
use std::io::{Read, Seek, Write};

/// Where a segment came from when it was parsed from a stream. Segments built
/// from trees or defaults carry no origin. Origins never take part in
/// equality: two segments with the same fields are the same segment.
#[derive(Debug, Clone, Copy, Default)]
pub struct SegmentOrigin {
    read: Option<(u64, usize)>,
}

impl SegmentOrigin {
    pub fn read_at(payload_offset: u64, payload_length: usize) -> Self {
        Self {
            read: Some((payload_offset, payload_length)),
        }
    }

    /// Stream offset of the first payload byte (just past the length field).
    pub fn stream_offset(&self) -> Option<u64> {
        self.read.map(|(offset, _)| offset)
    }

    /// Payload length as read, excluding the two length bytes.
    pub fn raw_length(&self) -> Option<usize> {
        self.read.map(|(_, length)| length)
    }
}

impl PartialEq for SegmentOrigin {
    fn eq(&self, _other: &Self) -> bool {
        true
    }
}

impl Eq for SegmentOrigin {}

/// Tag and payload extent of a segment about to be parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentHeader {
    pub tag: u8,
    pub length: usize,
    pub payload_offset: u64,
}

impl SegmentHeader {
    pub fn origin(&self) -> SegmentOrigin {
        SegmentOrigin::read_at(self.payload_offset, self.length)
    }
}

/// Big-endian reader over one segment's payload.
pub struct PayloadReader<'a> {
    payload: &'a [u8],
    position: usize,
    what: &'static str,
}

impl<'a> PayloadReader<'a> {
    pub fn new(payload: &'a [u8], what: &'static str) -> Self {
        Self {
            payload,
            position: 0,
            what,
        }
    }

    fn short(&self) -> MetadataError {
        MetadataError::format(format!("{} segment is too short", self.what))
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        let value = *self.payload.get(self.position).ok_or_else(|| self.short())?;
        self.position += 1;
        Ok(value)
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        let b1 = self.read_u8()? as u16;
        let b2 = self.read_u8()? as u16;
        Ok((b1 << 8) | b2)
    }

    pub fn take(&mut self, count: usize) -> Result<&'a [u8]> {
        if self.remaining() < count {
            return Err(self.short());
        }
        let slice = &self.payload[self.position..self.position + count];
        self.position += count;
        Ok(slice)
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn remaining(&self) -> usize {
        self.payload.len() - self.position
    }

    pub fn rest(&mut self) -> &'a [u8] {
        let slice = &self.payload[self.position..];
        self.position = self.payload.len();
        slice
    }
}

/// Byte codec and native-tree codec shared by the self-contained segment
/// types.
pub trait SegmentCodec: Sized {
    /// Name of this segment's node in the native tree.
    const NODE_NAME: &'static str;

    fn parse(header: &SegmentHeader, payload: &[u8]) -> Result<Self>;

    fn write_to<W: Write>(&self, writer: &mut JpegStreamWriter<W>) -> Result<()>;

    fn to_native_node(&self) -> TreeNode;

    /// Builds a segment from scratch; required attributes must be present.
    fn from_native_node(node: &TreeNode) -> Result<Self>;

    /// Applies a partial edit. Attributes missing from `node` keep their
    /// current values.
    fn update_from_native_node(&mut self, node: &TreeNode) -> Result<()> {
        *self = Self::from_native_node(node)?;
        Ok(())
    }

    fn read<R: Read + Seek>(cursor: &mut ByteCursor<R>, header: &SegmentHeader) -> Result<Self> {
        let payload = cursor.read_exact(header.length)?;
        Self::parse(header, &payload)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SegmentKind {
    Jfif,
    Adobe,
    Dqt,
    Dht,
    Dri,
    Com,
    Sof,
    Sos,
    Unknown,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MarkerSegment {
    Jfif(JfifSegment),
    Adobe(AdobeSegment),
    Dqt(DqtSegment),
    Dht(DhtSegment),
    Dri(DriSegment),
    Com(ComSegment),
    Sof(SofSegment),
    Sos(SosSegment),
    Unknown(UnknownSegment),
}

impl MarkerSegment {
    pub fn kind(&self) -> SegmentKind {
        match self {
            Self::Jfif(_) => SegmentKind::Jfif,
            Self::Adobe(_) => SegmentKind::Adobe,
            Self::Dqt(_) => SegmentKind::Dqt,
            Self::Dht(_) => SegmentKind::Dht,
            Self::Dri(_) => SegmentKind::Dri,
            Self::Com(_) => SegmentKind::Com,
            Self::Sof(_) => SegmentKind::Sof,
            Self::Sos(_) => SegmentKind::Sos,
            Self::Unknown(_) => SegmentKind::Unknown,
        }
    }

    /// The marker tag byte this segment is written with.
    pub fn tag(&self) -> u8 {
        use crate::jpeg_marker_code::JpegMarkerCode as Code;
        match self {
            Self::Jfif(_) => Code::ApplicationData0.into(),
            Self::Adobe(_) => Code::ApplicationData14.into(),
            Self::Dqt(_) => Code::DefineQuantizationTable.into(),
            Self::Dht(_) => Code::DefineHuffmanTable.into(),
            Self::Dri(_) => Code::DefineRestartInterval.into(),
            Self::Com(_) => Code::Comment.into(),
            Self::Sof(sof) => sof.process.marker().into(),
            Self::Sos(_) => Code::StartOfScan.into(),
            Self::Unknown(unknown) => unknown.tag,
        }
    }

    pub fn origin(&self) -> SegmentOrigin {
        match self {
            Self::Jfif(s) => s.origin,
            Self::Adobe(s) => s.origin,
            Self::Dqt(s) => s.origin,
            Self::Dht(s) => s.origin,
            Self::Dri(s) => s.origin,
            Self::Com(s) => s.origin,
            Self::Sof(s) => s.origin,
            Self::Sos(s) => s.origin,
            Self::Unknown(s) => s.origin,
        }
    }

    /// Segments the pixel codec emits itself when it encodes a full image.
    /// The header writer leaves these out; only complete serialization of a
    /// marker sequence (tables-only streams, round trips) writes them.
    pub fn is_codec_owned(&self) -> bool {
        matches!(
            self,
            Self::Dqt(_) | Self::Dht(_) | Self::Dri(_) | Self::Sof(_) | Self::Sos(_)
        )
    }

    pub fn write_to<W: Write>(&self, writer: &mut JpegStreamWriter<W>) -> Result<()> {
        match self {
            Self::Jfif(s) => s.write_to(writer),
            Self::Adobe(s) => s.write_to(writer),
            Self::Dqt(s) => s.write_to(writer),
            Self::Dht(s) => s.write_to(writer),
            Self::Dri(s) => s.write_to(writer),
            Self::Com(s) => s.write_to(writer),
            Self::Sof(s) => s.write_to(writer),
            Self::Sos(s) => s.write_to(writer),
            Self::Unknown(s) => s.write_to(writer),
        }
    }

    pub fn to_native_node(&self) -> TreeNode {
        match self {
            Self::Jfif(s) => s.to_native_node(),
            Self::Adobe(s) => s.to_native_node(),
            Self::Dqt(s) => s.to_native_node(),
            Self::Dht(s) => s.to_native_node(),
            Self::Dri(s) => s.to_native_node(),
            Self::Com(s) => s.to_native_node(),
            Self::Sof(s) => s.to_native_node(),
            Self::Sos(s) => s.to_native_node(),
            Self::Unknown(s) => s.to_native_node(),
        }
    }

    /// Builds a marker-sequence entry from its native node. JFIF is not a
    /// sequence entry; it lives under the variety node.
    pub fn from_sequence_node(node: &TreeNode) -> Result<Self> {
        Ok(match node.name.as_str() {
            DqtSegment::NODE_NAME => Self::Dqt(DqtSegment::from_native_node(node)?),
            DhtSegment::NODE_NAME => Self::Dht(DhtSegment::from_native_node(node)?),
            DriSegment::NODE_NAME => Self::Dri(DriSegment::from_native_node(node)?),
            ComSegment::NODE_NAME => Self::Com(ComSegment::from_native_node(node)?),
            AdobeSegment::NODE_NAME => Self::Adobe(AdobeSegment::from_native_node(node)?),
            SofSegment::NODE_NAME => Self::Sof(SofSegment::from_native_node(node)?),
            SosSegment::NODE_NAME => Self::Sos(SosSegment::from_native_node(node)?),
            UnknownSegment::NODE_NAME => Self::Unknown(UnknownSegment::from_native_node(node)?),
            other => {
                return Err(node.invalid(format!("invalid marker sequence child: {}", other)));
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_origin_ignored_by_equality() {
        let parsed = DriSegment {
            interval: 8,
            origin: SegmentOrigin::read_at(100, 2),
        };
        let built = DriSegment {
            interval: 8,
            origin: SegmentOrigin::default(),
        };
        assert_eq!(parsed, built);
        assert_eq!(parsed.origin.raw_length(), Some(2));
        assert_eq!(built.origin.stream_offset(), None);
    }

    #[test]
    fn test_payload_reader_reports_short_segment() {
        let mut reader = PayloadReader::new(&[1, 2, 3], "DRI");
        assert_eq!(reader.read_u16().unwrap(), 0x0102);
        let err = reader.read_u16().unwrap_err();
        assert!(err.to_string().contains("DRI"));
    }

    #[test]
    fn test_unknown_sequence_child_rejected() {
        let err = MarkerSegment::from_sequence_node(&TreeNode::new("bogus")).unwrap_err();
        assert!(err.is_invalid_tree());
    }

    #[test]
    fn test_codec_owned_segments() {
        let dri = MarkerSegment::Dri(DriSegment::new(4));
        let com = MarkerSegment::Com(ComSegment::from_text("x"));
        assert!(dri.is_codec_owned());
        assert!(!com.is_codec_owned());
        assert_eq!(com.tag(), 0xFE);
    }
}
