use super::{SegmentCodec, SegmentHeader, SegmentOrigin};
use crate::error::Result;
use crate::jpeg_marker_code::JpegMarkerCode;
use crate::jpeg_stream_writer::JpegStreamWriter;
use crate::tree::{TreeNode, UserObject};
use std::io::Write;

/// COM: comment bytes, kept exactly as read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComSegment {
    pub data: Vec<u8>,
    pub origin: SegmentOrigin,
}

/// Decodes ISO-8859-1: every byte is the code point of the same value.
pub fn latin1_to_string(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

/// Encodes ISO-8859-1; characters outside the range become '?'.
pub fn string_to_latin1(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
        .collect()
}

impl ComSegment {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data,
            origin: SegmentOrigin::default(),
        }
    }

    pub fn from_text(text: &str) -> Self {
        Self::new(string_to_latin1(text))
    }

    /// The comment decoded as ISO-8859-1.
    pub fn text(&self) -> String {
        latin1_to_string(&self.data)
    }
}

impl SegmentCodec for ComSegment {
    const NODE_NAME: &'static str = "com";

    fn parse(header: &SegmentHeader, payload: &[u8]) -> Result<Self> {
        Ok(Self {
            data: payload.to_vec(),
            origin: header.origin(),
        })
    }

    fn write_to<W: Write>(&self, writer: &mut JpegStreamWriter<W>) -> Result<()> {
        writer.write_segment(JpegMarkerCode::Comment.into(), &self.data)
    }

    fn to_native_node(&self) -> TreeNode {
        TreeNode::new(Self::NODE_NAME)
            .with_attribute("comment", self.text())
            .with_user_object(UserObject::Bytes(self.data.clone()))
    }

    /// The byte payload wins over the `comment` attribute when both are
    /// present.
    fn from_native_node(node: &TreeNode) -> Result<Self> {
        node.expect_name(Self::NODE_NAME)?;
        match &node.user_object {
            Some(UserObject::Bytes(bytes)) => Ok(Self::new(bytes.clone())),
            Some(_) => Err(node.invalid("com user object must be bytes")),
            None => Ok(Self::from_text(node.required_attribute("comment")?)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latin1_text_view() {
        let com = ComSegment::new(vec![b'c', 0xE9, b'!']);
        assert_eq!(com.text(), "c\u{e9}!");
        assert_eq!(ComSegment::from_text(&com.text()), com);
    }

    #[test]
    fn test_attribute_only_node() {
        let node = TreeNode::new("com").with_attribute("comment", "hello");
        assert_eq!(ComSegment::from_native_node(&node).unwrap().data, b"hello");
        assert!(ComSegment::from_native_node(&TreeNode::new("com")).is_err());
    }
}
