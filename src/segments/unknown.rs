use super::{SegmentCodec, SegmentHeader, SegmentOrigin};
use crate::error::Result;
use crate::jpeg_stream_writer::JpegStreamWriter;
use crate::tree::{TreeNode, UserObject};
use std::io::Write;

/// A segment this layer does not interpret. Tag and payload are carried
/// through byte for byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownSegment {
    pub tag: u8,
    pub data: Vec<u8>,
    pub origin: SegmentOrigin,
}

impl UnknownSegment {
    pub fn new(tag: u8, data: Vec<u8>) -> Self {
        Self {
            tag,
            data,
            origin: SegmentOrigin::default(),
        }
    }
}

impl SegmentCodec for UnknownSegment {
    const NODE_NAME: &'static str = "unknown";

    fn parse(header: &SegmentHeader, payload: &[u8]) -> Result<Self> {
        Ok(Self {
            tag: header.tag,
            data: payload.to_vec(),
            origin: header.origin(),
        })
    }

    fn write_to<W: Write>(&self, writer: &mut JpegStreamWriter<W>) -> Result<()> {
        writer.write_segment(self.tag, &self.data)
    }

    fn to_native_node(&self) -> TreeNode {
        TreeNode::new(Self::NODE_NAME)
            .with_attribute("MarkerTag", self.tag)
            .with_user_object(UserObject::Bytes(self.data.clone()))
    }

    fn from_native_node(node: &TreeNode) -> Result<Self> {
        node.expect_name(Self::NODE_NAME)?;
        let tag = node.required_int("MarkerTag", 0..=255)? as u8;
        match &node.user_object {
            Some(UserObject::Bytes(bytes)) => Ok(Self::new(tag, bytes.clone())),
            _ => Err(node.invalid("unknown requires a byte user object")),
        }
    }
}
