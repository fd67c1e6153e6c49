use super::{PayloadReader, SegmentCodec, SegmentHeader, SegmentOrigin};
use crate::error::{MetadataError, Result};
use crate::jpeg_marker_code::JpegMarkerCode;
use crate::jpeg_stream_writer::JpegStreamWriter;
use crate::tree::TreeNode;
use std::io::Write;

/// DRI: restart interval in MCUs, 0 disables restart markers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriSegment {
    pub interval: u16,
    pub origin: SegmentOrigin,
}

impl DriSegment {
    pub fn new(interval: u16) -> Self {
        Self {
            interval,
            origin: SegmentOrigin::default(),
        }
    }
}

impl SegmentCodec for DriSegment {
    const NODE_NAME: &'static str = "dri";

    fn parse(header: &SegmentHeader, payload: &[u8]) -> Result<Self> {
        if payload.len() != 2 {
            return Err(MetadataError::format(format!(
                "DRI segment length {} is not 4",
                payload.len() + 2
            )));
        }
        let interval = PayloadReader::new(payload, "DRI").read_u16()?;
        Ok(Self {
            interval,
            origin: header.origin(),
        })
    }

    fn write_to<W: Write>(&self, writer: &mut JpegStreamWriter<W>) -> Result<()> {
        writer.write_segment_header(JpegMarkerCode::DefineRestartInterval.into(), 2)?;
        writer.write_u16(self.interval)
    }

    fn to_native_node(&self) -> TreeNode {
        TreeNode::new(Self::NODE_NAME).with_attribute("interval", self.interval)
    }

    fn from_native_node(node: &TreeNode) -> Result<Self> {
        node.expect_name(Self::NODE_NAME)?;
        let interval = node.required_int("interval", 0..=u16::MAX as u32)? as u16;
        Ok(Self::new(interval))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrong_length_rejected() {
        let header = SegmentHeader {
            tag: 0xDD,
            length: 3,
            payload_offset: 0,
        };
        assert!(DriSegment::parse(&header, &[0, 1, 2]).unwrap_err().is_format_error());
    }

    #[test]
    fn test_update_replaces_interval() {
        let mut dri = DriSegment::new(4);
        dri.update_from_native_node(&TreeNode::new("dri").with_attribute("interval", 9))
            .unwrap();
        assert_eq!(dri.interval, 9);
    }
}
