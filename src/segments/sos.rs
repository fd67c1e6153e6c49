use super::{PayloadReader, SegmentCodec, SegmentHeader, SegmentOrigin};
use crate::constants::{
    MAXIMUM_COMPONENT_COUNT_IN_SCAN, MAXIMUM_SPECTRAL_SELECTION, MAXIMUM_SUCCESSIVE_APPROXIMATION,
    MAXIMUM_TABLE_ID,
};
use crate::error::{MetadataError, Result};
use crate::jpeg_marker_code::JpegMarkerCode;
use crate::jpeg_stream_writer::JpegStreamWriter;
use crate::tree::TreeNode;
use std::io::Write;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanComponentSpec {
    pub component_selector: u8,
    pub dc_table: u8,
    pub ac_table: u8,
}

impl ScanComponentSpec {
    pub fn new(component_selector: u8, dc_table: u8, ac_table: u8) -> Self {
        Self {
            component_selector,
            dc_table,
            ac_table,
        }
    }

    fn to_node(self) -> TreeNode {
        TreeNode::new("scanComponentSpec")
            .with_attribute("componentSelector", self.component_selector)
            .with_attribute("dcHuffTable", self.dc_table)
            .with_attribute("acHuffTable", self.ac_table)
    }

    fn from_node(node: &TreeNode) -> Result<Self> {
        node.expect_name("scanComponentSpec")?;
        let table = 0..=MAXIMUM_TABLE_ID as u32;
        Ok(Self {
            component_selector: node.required_int("componentSelector", 0..=255)? as u8,
            dc_table: node.required_int("dcHuffTable", table.clone())? as u8,
            ac_table: node.required_int("acHuffTable", table)? as u8,
        })
    }
}

/// SOS scan header. The entropy-coded data that follows it is not kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SosSegment {
    pub components: Vec<ScanComponentSpec>,
    pub start_spectral: u8,
    pub end_spectral: u8,
    pub approx_high: u8,
    pub approx_low: u8,
    pub origin: SegmentOrigin,
}

impl SosSegment {
    /// A full sequential scan over `components`.
    pub fn new(components: Vec<ScanComponentSpec>) -> Self {
        Self {
            components,
            start_spectral: 0,
            end_spectral: MAXIMUM_SPECTRAL_SELECTION,
            approx_high: 0,
            approx_low: 0,
            origin: SegmentOrigin::default(),
        }
    }

    /// Interleaved scan over `ids`; with subsampling the second and third
    /// components use Huffman tables 1.
    pub fn for_components(subsample: bool, ids: &[u8]) -> Self {
        Self::new(
            ids.iter()
                .enumerate()
                .map(|(i, &id)| {
                    let table = u8::from(subsample && (i == 1 || i == 2));
                    ScanComponentSpec::new(id, table, table)
                })
                .collect(),
        )
    }

    pub fn selectors(&self) -> impl Iterator<Item = u8> + '_ {
        self.components.iter().map(|spec| spec.component_selector)
    }
}

struct ScanParameters {
    start_spectral: u8,
    end_spectral: u8,
    approx_high: u8,
    approx_low: u8,
}

fn scan_parameters(node: &TreeNode, current: Option<&SosSegment>) -> Result<ScanParameters> {
    let spectral = 0..=MAXIMUM_SPECTRAL_SELECTION as u32;
    let approx = 0..=MAXIMUM_SUCCESSIVE_APPROXIMATION as u32;
    let value = |name: &str, range: std::ops::RangeInclusive<u32>, existing: Option<u8>| match existing {
        Some(existing) => node.optional_int(name, range, existing as u32).map(|v| v as u8),
        None => node.required_int(name, range).map(|v| v as u8),
    };
    Ok(ScanParameters {
        start_spectral: value("startSpectralSelection", spectral.clone(), current.map(|s| s.start_spectral))?,
        end_spectral: value("endSpectralSelection", spectral, current.map(|s| s.end_spectral))?,
        approx_high: value("approxHigh", approx.clone(), current.map(|s| s.approx_high))?,
        approx_low: value("approxLow", approx, current.map(|s| s.approx_low))?,
    })
}

impl SegmentCodec for SosSegment {
    const NODE_NAME: &'static str = "sos";

    fn parse(header: &SegmentHeader, payload: &[u8]) -> Result<Self> {
        let mut reader = PayloadReader::new(payload, "SOS");
        let count = reader.read_u8()? as usize;
        if count == 0 || count > MAXIMUM_COMPONENT_COUNT_IN_SCAN || reader.remaining() != count * 2 + 3
        {
            return Err(MetadataError::format(format!(
                "SOS segment length does not match its {} components",
                count
            )));
        }
        let mut components = Vec::with_capacity(count);
        for _ in 0..count {
            let component_selector = reader.read_u8()?;
            let tables = reader.read_u8()?;
            let (dc_table, ac_table) = (tables >> 4, tables & 0x0F);
            if dc_table > MAXIMUM_TABLE_ID || ac_table > MAXIMUM_TABLE_ID {
                return Err(MetadataError::format(format!(
                    "invalid Huffman table selectors 0x{:02X}",
                    tables
                )));
            }
            components.push(ScanComponentSpec::new(component_selector, dc_table, ac_table));
        }
        let start_spectral = reader.read_u8()?;
        let end_spectral = reader.read_u8()?;
        let approx = reader.read_u8()?;
        if start_spectral > MAXIMUM_SPECTRAL_SELECTION || end_spectral > MAXIMUM_SPECTRAL_SELECTION {
            return Err(MetadataError::format("invalid SOS spectral selection"));
        }
        Ok(Self {
            components,
            start_spectral,
            end_spectral,
            approx_high: approx >> 4,
            approx_low: approx & 0x0F,
            origin: header.origin(),
        })
    }

    fn write_to<W: Write>(&self, writer: &mut JpegStreamWriter<W>) -> Result<()> {
        let length = 1 + self.components.len() * 2 + 3;
        writer.write_segment_header(JpegMarkerCode::StartOfScan.into(), length)?;
        writer.write_byte(self.components.len() as u8)?;
        for spec in &self.components {
            writer.write_byte(spec.component_selector)?;
            writer.write_byte((spec.dc_table << 4) | spec.ac_table)?;
        }
        writer.write_byte(self.start_spectral)?;
        writer.write_byte(self.end_spectral)?;
        writer.write_byte((self.approx_high << 4) | self.approx_low)
    }

    fn to_native_node(&self) -> TreeNode {
        let mut node = TreeNode::new(Self::NODE_NAME)
            .with_attribute("numScanComponents", self.components.len())
            .with_attribute("startSpectralSelection", self.start_spectral)
            .with_attribute("endSpectralSelection", self.end_spectral)
            .with_attribute("approxHigh", self.approx_high)
            .with_attribute("approxLow", self.approx_low);
        for spec in &self.components {
            node.append_child(spec.to_node());
        }
        node
    }

    fn from_native_node(node: &TreeNode) -> Result<Self> {
        node.expect_name(Self::NODE_NAME)?;
        let count = node.required_int("numScanComponents", 1..=MAXIMUM_COMPONENT_COUNT_IN_SCAN as u32)?;
        let parameters = scan_parameters(node, None)?;
        let components = node
            .children
            .iter()
            .map(ScanComponentSpec::from_node)
            .collect::<Result<Vec<_>>>()?;
        if components.len() != count as usize {
            return Err(node.invalid("numScanComponents does not match the scan component specs"));
        }
        Ok(Self {
            components,
            start_spectral: parameters.start_spectral,
            end_spectral: parameters.end_spectral,
            approx_high: parameters.approx_high,
            approx_low: parameters.approx_low,
            origin: SegmentOrigin::default(),
        })
    }

    fn update_from_native_node(&mut self, node: &TreeNode) -> Result<()> {
        node.expect_name(Self::NODE_NAME)?;
        let parameters = scan_parameters(node, Some(self))?;
        let components = if node.children.is_empty() {
            self.components.clone()
        } else {
            node.children
                .iter()
                .map(ScanComponentSpec::from_node)
                .collect::<Result<Vec<_>>>()?
        };
        let count = node.optional_int(
            "numScanComponents",
            1..=MAXIMUM_COMPONENT_COUNT_IN_SCAN as u32,
            components.len() as u32,
        )?;
        if count as usize != components.len() {
            return Err(node.invalid("numScanComponents does not match the scan component specs"));
        }
        self.components = components;
        self.start_spectral = parameters.start_spectral;
        self.end_spectral = parameters.end_spectral;
        self.approx_high = parameters.approx_high;
        self.approx_low = parameters.approx_low;
        Ok(())
    }
}
