use super::{PayloadReader, SegmentCodec, SegmentHeader, SegmentOrigin};
use crate::constants::{MAXIMUM_SAMPLING_FACTOR, MAXIMUM_TABLE_ID, SUPPORTED_SAMPLE_PRECISION};
use crate::error::{MetadataError, Result};
use crate::jpeg_marker_code::JpegMarkerCode;
use crate::jpeg_stream_writer::JpegStreamWriter;
use crate::tree::TreeNode;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use std::io::Write;

/// DCT process encoded in the SOF marker tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum FrameProcess {
    Baseline = 0,
    Extended = 1,
    Progressive = 2,
}

impl FrameProcess {
    pub fn marker(self) -> JpegMarkerCode {
        match self {
            Self::Baseline => JpegMarkerCode::StartOfFrameBaseline,
            Self::Extended => JpegMarkerCode::StartOfFrameExtended,
            Self::Progressive => JpegMarkerCode::StartOfFrameProgressive,
        }
    }

    pub fn from_marker(marker: JpegMarkerCode) -> Option<Self> {
        match marker {
            JpegMarkerCode::StartOfFrameBaseline => Some(Self::Baseline),
            JpegMarkerCode::StartOfFrameExtended => Some(Self::Extended),
            JpegMarkerCode::StartOfFrameProgressive => Some(Self::Progressive),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameComponentSpec {
    pub component_id: u8,
    pub h_sampling: u8,
    pub v_sampling: u8,
    pub qtable_selector: u8,
}

impl FrameComponentSpec {
    pub fn new(component_id: u8, h_sampling: u8, v_sampling: u8, qtable_selector: u8) -> Self {
        Self {
            component_id,
            h_sampling,
            v_sampling,
            qtable_selector,
        }
    }

    fn to_node(self) -> TreeNode {
        TreeNode::new("componentSpec")
            .with_attribute("componentId", self.component_id)
            .with_attribute("HsamplingFactor", self.h_sampling)
            .with_attribute("VsamplingFactor", self.v_sampling)
            .with_attribute("QtableSelector", self.qtable_selector)
    }

    fn from_node(node: &TreeNode) -> Result<Self> {
        node.expect_name("componentSpec")?;
        let factors = 1..=MAXIMUM_SAMPLING_FACTOR as u32;
        Ok(Self {
            component_id: node.required_int("componentId", 0..=255)? as u8,
            h_sampling: node.required_int("HsamplingFactor", factors.clone())? as u8,
            v_sampling: node.required_int("VsamplingFactor", factors)? as u8,
            qtable_selector: node.required_int("QtableSelector", 0..=MAXIMUM_TABLE_ID as u32)? as u8,
        })
    }
}

/// SOF0/SOF1/SOF2 frame header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SofSegment {
    pub process: FrameProcess,
    pub sample_precision: u8,
    pub num_lines: u16,
    pub samples_per_line: u16,
    pub components: Vec<FrameComponentSpec>,
    pub origin: SegmentOrigin,
}

impl SofSegment {
    pub fn new(process: FrameProcess, components: Vec<FrameComponentSpec>) -> Self {
        Self {
            process,
            sample_precision: SUPPORTED_SAMPLE_PRECISION,
            num_lines: 0,
            samples_per_line: 0,
            components,
            origin: SegmentOrigin::default(),
        }
    }

    /// Frame header for freshly chosen component ids. Subsampling gives the
    /// first and fourth components 2x2 factors and points the second and
    /// third at quantization table 1.
    pub fn for_components(process: FrameProcess, subsample: bool, ids: &[u8]) -> Self {
        let components = ids
            .iter()
            .enumerate()
            .map(|(i, &id)| match (subsample, i) {
                (true, 1 | 2) => FrameComponentSpec::new(id, 1, 1, 1),
                (true, _) => FrameComponentSpec::new(id, 2, 2, 0),
                (false, _) => FrameComponentSpec::new(id, 1, 1, 0),
            })
            .collect();
        Self::new(process, components)
    }

    pub fn is_progressive(&self) -> bool {
        self.process == FrameProcess::Progressive
    }

    pub fn component_ids(&self) -> Vec<u8> {
        self.components.iter().map(|spec| spec.component_id).collect()
    }

    /// True when any component has sampling factors different from the first.
    pub fn is_subsampled(&self) -> bool {
        self.components.split_first().is_some_and(|(first, rest)| {
            rest.iter().any(|spec| {
                spec.h_sampling != first.h_sampling || spec.v_sampling != first.v_sampling
            })
        })
    }

    fn components_from_node(node: &TreeNode) -> Result<Vec<FrameComponentSpec>> {
        node.children
            .iter()
            .map(FrameComponentSpec::from_node)
            .collect()
    }
}

impl SegmentCodec for SofSegment {
    const NODE_NAME: &'static str = "sof";

    fn parse(header: &SegmentHeader, payload: &[u8]) -> Result<Self> {
        let process = JpegMarkerCode::try_from(header.tag)
            .ok()
            .and_then(FrameProcess::from_marker)
            .ok_or_else(|| MetadataError::format(format!("0x{:02X} is not a SOF marker", header.tag)))?;

        let mut reader = PayloadReader::new(payload, "SOF");
        let sample_precision = reader.read_u8()?;
        let num_lines = reader.read_u16()?;
        let samples_per_line = reader.read_u16()?;
        let count = reader.read_u8()? as usize;
        if count == 0 || reader.remaining() != count * 3 {
            return Err(MetadataError::format(format!(
                "SOF segment length does not match its {} components",
                count
            )));
        }

        let mut components = Vec::with_capacity(count);
        for _ in 0..count {
            let component_id = reader.read_u8()?;
            let factors = reader.read_u8()?;
            let qtable_selector = reader.read_u8()?;
            let (h_sampling, v_sampling) = (factors >> 4, factors & 0x0F);
            let valid = 1..=MAXIMUM_SAMPLING_FACTOR;
            if !valid.contains(&h_sampling) || !valid.contains(&v_sampling) {
                return Err(MetadataError::format(format!(
                    "invalid sampling factors 0x{:02X} for component {}",
                    factors, component_id
                )));
            }
            if qtable_selector > MAXIMUM_TABLE_ID {
                return Err(MetadataError::format(format!(
                    "invalid quantization table selector {}",
                    qtable_selector
                )));
            }
            components.push(FrameComponentSpec::new(
                component_id,
                h_sampling,
                v_sampling,
                qtable_selector,
            ));
        }

        Ok(Self {
            process,
            sample_precision,
            num_lines,
            samples_per_line,
            components,
            origin: header.origin(),
        })
    }

    fn write_to<W: Write>(&self, writer: &mut JpegStreamWriter<W>) -> Result<()> {
        let length = 6 + self.components.len() * 3;
        writer.write_segment_header(self.process.marker().into(), length)?;
        writer.write_byte(self.sample_precision)?;
        writer.write_u16(self.num_lines)?;
        writer.write_u16(self.samples_per_line)?;
        writer.write_byte(self.components.len() as u8)?;
        for spec in &self.components {
            writer.write_byte(spec.component_id)?;
            writer.write_byte((spec.h_sampling << 4) | spec.v_sampling)?;
            writer.write_byte(spec.qtable_selector)?;
        }
        Ok(())
    }

    fn to_native_node(&self) -> TreeNode {
        let mut node = TreeNode::new(Self::NODE_NAME)
            .with_attribute("process", u8::from(self.process))
            .with_attribute("samplePrecision", self.sample_precision)
            .with_attribute("numLines", self.num_lines)
            .with_attribute("samplesPerLine", self.samples_per_line)
            .with_attribute("numFrameComponents", self.components.len());
        for spec in &self.components {
            node.append_child(spec.to_node());
        }
        node
    }

    fn from_native_node(node: &TreeNode) -> Result<Self> {
        node.expect_name(Self::NODE_NAME)?;
        let process = FrameProcess::try_from(node.required_int("process", 0..=2)? as u8)
            .map_err(|_| node.invalid("invalid process"))?;
        let precision = SUPPORTED_SAMPLE_PRECISION as u32;
        let sample_precision = node.required_int("samplePrecision", precision..=precision)? as u8;
        let num_lines = node.required_int("numLines", 0..=u16::MAX as u32)? as u16;
        let samples_per_line = node.required_int("samplesPerLine", 0..=u16::MAX as u32)? as u16;
        let count = node.required_int("numFrameComponents", 1..=255)? as usize;
        let components = Self::components_from_node(node)?;
        if components.len() != count {
            return Err(node.invalid(format!(
                "numFrameComponents is {} but {} componentSpec nodes given",
                count,
                components.len()
            )));
        }
        Ok(Self {
            process,
            sample_precision,
            num_lines,
            samples_per_line,
            components,
            origin: SegmentOrigin::default(),
        })
    }

    fn update_from_native_node(&mut self, node: &TreeNode) -> Result<()> {
        node.expect_name(Self::NODE_NAME)?;
        let process = match node.attribute("process") {
            Some(_) => FrameProcess::try_from(node.required_int("process", 0..=2)? as u8)
                .map_err(|_| node.invalid("invalid process"))?,
            None => self.process,
        };
        let precision = SUPPORTED_SAMPLE_PRECISION as u32;
        let sample_precision = node.optional_int(
            "samplePrecision",
            precision..=precision,
            self.sample_precision as u32,
        )? as u8;
        let num_lines = node.optional_int("numLines", 0..=u16::MAX as u32, self.num_lines as u32)? as u16;
        let samples_per_line =
            node.optional_int("samplesPerLine", 0..=u16::MAX as u32, self.samples_per_line as u32)?
                as u16;
        let components = if node.children.is_empty() {
            self.components.clone()
        } else {
            Self::components_from_node(node)?
        };
        let count = node.optional_int("numFrameComponents", 1..=255, components.len() as u32)?;
        if count as usize != components.len() {
            return Err(node.invalid("numFrameComponents does not match the component specs"));
        }
        self.process = process;
        self.sample_precision = sample_precision;
        self.num_lines = num_lines;
        self.samples_per_line = samples_per_line;
        self.components = components;
        Ok(())
    }
}
