use super::{PayloadReader, SegmentCodec, SegmentHeader, SegmentOrigin, SofSegment};
use crate::constants::{ADOBE_DEFAULT_VERSION, ADOBE_IDENTIFIER, ADOBE_PAYLOAD_SIZE};
use crate::error::{MetadataError, Result};
use crate::jpeg_marker_code::JpegMarkerCode;
use crate::jpeg_stream_writer::JpegStreamWriter;
use crate::tree::TreeNode;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use std::io::Write;

/// Color transform the encoder applied before compression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum AdobeTransform {
    /// RGB or CMYK, no transform.
    Unknown = 0,
    YCbCr = 1,
    Ycck = 2,
}

/// APP14 "Adobe" segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdobeSegment {
    pub version: u16,
    pub flags0: u16,
    pub flags1: u16,
    pub transform: AdobeTransform,
    pub origin: SegmentOrigin,
}

impl AdobeSegment {
    pub fn new(transform: AdobeTransform) -> Self {
        Self {
            version: ADOBE_DEFAULT_VERSION,
            flags0: 0,
            flags1: 0,
            transform,
            origin: SegmentOrigin::default(),
        }
    }

    /// Whether this marker can sit next to a JFIF header: JFIF allows only
    /// grayscale (no transform) and YCbCr.
    pub fn is_compatible_with_jfif(&self, sof: Option<&SofSegment>) -> bool {
        match sof.map(|sof| sof.components.len()) {
            Some(1) => self.transform == AdobeTransform::Unknown,
            Some(3) => self.transform == AdobeTransform::YCbCr,
            Some(_) => false,
            None => self.transform != AdobeTransform::Ycck,
        }
    }
}

impl SegmentCodec for AdobeSegment {
    const NODE_NAME: &'static str = "app14Adobe";

    fn parse(header: &SegmentHeader, payload: &[u8]) -> Result<Self> {
        let mut reader = PayloadReader::new(payload, "Adobe");
        if reader.take(ADOBE_IDENTIFIER.len())? != ADOBE_IDENTIFIER {
            return Err(MetadataError::format("APP14 segment is not an Adobe segment"));
        }
        let version = reader.read_u16()?;
        let flags0 = reader.read_u16()?;
        let flags1 = reader.read_u16()?;
        let code = reader.read_u8()?;
        let transform = AdobeTransform::try_from(code).map_err(|_| {
            MetadataError::format(format!("invalid Adobe color transform {}", code))
        })?;
        // Some writers pad the segment; the padding is not kept.
        if reader.remaining() > 0 {
            tracing::debug!(extra = reader.remaining(), "ignoring Adobe segment padding");
        }
        Ok(Self {
            version,
            flags0,
            flags1,
            transform,
            origin: header.origin(),
        })
    }

    fn write_to<W: Write>(&self, writer: &mut JpegStreamWriter<W>) -> Result<()> {
        writer.write_segment_header(JpegMarkerCode::ApplicationData14.into(), ADOBE_PAYLOAD_SIZE)?;
        writer.write_bytes(ADOBE_IDENTIFIER)?;
        writer.write_u16(self.version)?;
        writer.write_u16(self.flags0)?;
        writer.write_u16(self.flags1)?;
        writer.write_byte(self.transform.into())
    }

    fn to_native_node(&self) -> TreeNode {
        TreeNode::new(Self::NODE_NAME)
            .with_attribute("version", self.version)
            .with_attribute("flags0", self.flags0)
            .with_attribute("flags1", self.flags1)
            .with_attribute("transform", u8::from(self.transform))
    }

    fn from_native_node(node: &TreeNode) -> Result<Self> {
        node.expect_name(Self::NODE_NAME)?;
        let mut adobe = Self::new(AdobeTransform::Unknown);
        adobe.version = node.required_int("version", 100..=255)? as u16;
        adobe.flags0 = node.required_int("flags0", 0..=u16::MAX as u32)? as u16;
        adobe.flags1 = node.required_int("flags1", 0..=u16::MAX as u32)? as u16;
        adobe.transform = transform_attribute(node)?;
        Ok(adobe)
    }

    fn update_from_native_node(&mut self, node: &TreeNode) -> Result<()> {
        node.expect_name(Self::NODE_NAME)?;
        let version = node.optional_int("version", 100..=255, self.version as u32)? as u16;
        let flags0 = node.optional_int("flags0", 0..=u16::MAX as u32, self.flags0 as u32)? as u16;
        let flags1 = node.optional_int("flags1", 0..=u16::MAX as u32, self.flags1 as u32)? as u16;
        let transform = match node.attribute("transform") {
            Some(_) => transform_attribute(node)?,
            None => self.transform,
        };
        self.version = version;
        self.flags0 = flags0;
        self.flags1 = flags1;
        self.transform = transform;
        Ok(())
    }
}

fn transform_attribute(node: &TreeNode) -> Result<AdobeTransform> {
    let code = node.required_int("transform", 0..=2)? as u8;
    AdobeTransform::try_from(code).map_err(|_| node.invalid("invalid transform"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fields() {
        let payload = [b'A', b'd', b'o', b'b', b'e', 0, 100, 0x40, 0, 0, 0, 2];
        let header = SegmentHeader {
            tag: 0xEE,
            length: payload.len(),
            payload_offset: 0,
        };
        let adobe = AdobeSegment::parse(&header, &payload).unwrap();
        assert_eq!(adobe.version, 100);
        assert_eq!(adobe.flags0, 0x4000);
        assert_eq!(adobe.transform, AdobeTransform::Ycck);
    }

    #[test]
    fn test_partial_update_keeps_other_fields() {
        let mut adobe = AdobeSegment::new(AdobeTransform::YCbCr);
        adobe.flags0 = 7;
        let node = TreeNode::new("app14Adobe").with_attribute("transform", 0);
        adobe.update_from_native_node(&node).unwrap();
        assert_eq!(adobe.transform, AdobeTransform::Unknown);
        assert_eq!(adobe.flags0, 7);
        assert_eq!(adobe.version, ADOBE_DEFAULT_VERSION);
    }

    #[test]
    fn test_failed_update_changes_nothing() {
        let mut adobe = AdobeSegment::new(AdobeTransform::YCbCr);
        let node = TreeNode::new("app14Adobe")
            .with_attribute("flags0", 3)
            .with_attribute("transform", 9);
        assert!(adobe.update_from_native_node(&node).is_err());
        assert_eq!(adobe, AdobeSegment::new(AdobeTransform::YCbCr));
    }
}
