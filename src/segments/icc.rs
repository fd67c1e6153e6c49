use super::{PayloadReader, SegmentOrigin};
use crate::constants::{
    ICC_CHUNK_HEADER_SIZE, ICC_HEADER_SIZE, ICC_IDENTIFIER, ICC_MAX_CHUNK_COUNT,
    ICC_MAX_CHUNK_DATA_SIZE, ICC_SIGNATURE, ICC_SIGNATURE_OFFSET,
};
use crate::error::{MetadataError, Result};
use crate::jpeg_marker_code::JpegMarkerCode;
use crate::jpeg_stream_writer::JpegStreamWriter;
use crate::tree::{TreeNode, UserObject};
use crate::warning::{MetadataWarning, WarningSink};
use std::collections::BTreeMap;
use std::io::Write;

/// An ICC profile carried in one or more APP2 chunks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IccSegment {
    pub profile: Vec<u8>,
    pub origin: SegmentOrigin,
}

impl IccSegment {
    pub const NODE_NAME: &'static str = "app2ICC";

    pub fn new(profile: Vec<u8>) -> Self {
        Self {
            profile,
            origin: SegmentOrigin::default(),
        }
    }

    pub fn chunk_count(&self) -> usize {
        self.profile.len().div_ceil(ICC_MAX_CHUNK_DATA_SIZE).max(1)
    }

    /// Writes the profile as consecutive APP2 chunks numbered from 1.
    pub fn write_to<W: Write>(&self, writer: &mut JpegStreamWriter<W>) -> Result<()> {
        let count = self.chunk_count();
        if count > ICC_MAX_CHUNK_COUNT {
            return Err(MetadataError::format(format!(
                "ICC profile of {} bytes needs more than {} chunks",
                self.profile.len(),
                ICC_MAX_CHUNK_COUNT
            )));
        }
        let mut chunks: Vec<&[u8]> = self.profile.chunks(ICC_MAX_CHUNK_DATA_SIZE).collect();
        if chunks.is_empty() {
            chunks.push(&[]);
        }
        for (index, chunk) in chunks.iter().enumerate() {
            writer.write_segment_header(
                JpegMarkerCode::ApplicationData2.into(),
                ICC_CHUNK_HEADER_SIZE + chunk.len(),
            )?;
            writer.write_bytes(ICC_IDENTIFIER)?;
            writer.write_byte((index + 1) as u8)?;
            writer.write_byte(count as u8)?;
            writer.write_bytes(chunk)?;
        }
        Ok(())
    }

    /// Returns the profile if its header is usable by a color system.
    /// Otherwise warns and returns `None`; the image itself stays readable.
    pub fn color_profile(&self, sink: &mut dyn WarningSink) -> Option<&[u8]> {
        match self.header_problem() {
            None => Some(&self.profile),
            Some(reason) => {
                sink.warning(MetadataWarning::IccProfileDropped { reason });
                None
            }
        }
    }

    fn header_problem(&self) -> Option<String> {
        if self.profile.len() < ICC_HEADER_SIZE {
            return Some(format!("profile of {} bytes has no full header", self.profile.len()));
        }
        let declared = u32::from_be_bytes([
            self.profile[0],
            self.profile[1],
            self.profile[2],
            self.profile[3],
        ]) as usize;
        if declared != self.profile.len() {
            return Some(format!(
                "header declares {} bytes but profile holds {}",
                declared,
                self.profile.len()
            ));
        }
        let signature = &self.profile[ICC_SIGNATURE_OFFSET..ICC_SIGNATURE_OFFSET + ICC_SIGNATURE.len()];
        if signature != ICC_SIGNATURE {
            return Some("missing acsp signature".to_string());
        }
        None
    }

    pub fn to_native_node(&self) -> TreeNode {
        TreeNode::new(Self::NODE_NAME).with_user_object(UserObject::Bytes(self.profile.clone()))
    }

    pub fn from_native_node(node: &TreeNode) -> Result<Self> {
        node.expect_name(Self::NODE_NAME)?;
        match &node.user_object {
            Some(UserObject::Bytes(profile)) => Ok(Self::new(profile.clone())),
            _ => Err(node.invalid("app2ICC requires the profile bytes as user object")),
        }
    }
}

/// One APP2 ICC chunk as found in the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IccChunk {
    pub index: u8,
    pub count: u8,
    pub data: Vec<u8>,
}

impl IccChunk {
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let mut reader = PayloadReader::new(payload, "ICC");
        if reader.take(ICC_IDENTIFIER.len())? != ICC_IDENTIFIER {
            return Err(MetadataError::format("APP2 segment is not an ICC chunk"));
        }
        let index = reader.read_u8()?;
        let count = reader.read_u8()?;
        if count == 0 || index == 0 || index > count {
            return Err(MetadataError::format(format!(
                "invalid ICC chunk {} of {}",
                index, count
            )));
        }
        Ok(Self {
            index,
            count,
            data: reader.rest().to_vec(),
        })
    }
}

/// Collects ICC chunks in any arrival order and concatenates them by chunk
/// index once all are present.
#[derive(Debug, Clone)]
pub struct IccChunkAssembler {
    count: u8,
    chunks: BTreeMap<u8, Vec<u8>>,
    origin: SegmentOrigin,
}

impl IccChunkAssembler {
    pub fn new(first: IccChunk, origin: SegmentOrigin) -> Self {
        let mut chunks = BTreeMap::new();
        let count = first.count;
        chunks.insert(first.index, first.data);
        Self {
            count,
            chunks,
            origin,
        }
    }

    pub fn add(&mut self, chunk: IccChunk) -> Result<()> {
        if chunk.count != self.count {
            return Err(MetadataError::format(format!(
                "ICC chunk declares {} chunks, expected {}",
                chunk.count, self.count
            )));
        }
        if self.chunks.contains_key(&chunk.index) {
            return Err(MetadataError::format(format!(
                "duplicate ICC chunk {}",
                chunk.index
            )));
        }
        self.chunks.insert(chunk.index, chunk.data);
        Ok(())
    }

    pub fn is_complete(&self) -> bool {
        self.chunks.len() == self.count as usize
    }

    pub fn assemble(self) -> Result<IccSegment> {
        let mut profile = Vec::new();
        for index in 1..=self.count {
            let chunk = self.chunks.get(&index).ok_or_else(|| {
                MetadataError::format(format!("ICC chunk {} of {} missing", index, self.count))
            })?;
            profile.extend_from_slice(chunk);
        }
        Ok(IccSegment {
            profile,
            origin: self.origin,
        })
    }
}
