use super::{PayloadReader, SegmentCodec, SegmentHeader, SegmentOrigin};
use crate::constants::{MAXIMUM_TABLE_ID, QTABLE_SIZE};
use crate::error::{MetadataError, Result};
use crate::jpeg_marker_code::JpegMarkerCode;
use crate::jpeg_stream_writer::JpegStreamWriter;
use crate::tables::ZIGZAG_ORDER;
use crate::tree::{TreeNode, UserObject};
use std::io::Write;

/// One quantization table. Values are kept in natural (row-major) order;
/// the stream stores them in zigzag order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuantizationTable {
    pub id: u8,
    /// 0 for 8-bit entries, 1 for 16-bit entries.
    pub precision: u8,
    pub values: [u16; QTABLE_SIZE],
}

impl QuantizationTable {
    pub fn new(id: u8, values: [u16; QTABLE_SIZE]) -> Self {
        let precision = u8::from(values.iter().any(|&v| v > 255));
        Self {
            id,
            precision,
            values,
        }
    }

    fn payload_len(&self) -> usize {
        1 + QTABLE_SIZE * (self.precision as usize + 1)
    }

    fn to_node(&self) -> TreeNode {
        TreeNode::new("dqtable")
            .with_attribute("elementPrecision", self.precision)
            .with_attribute("qtableId", self.id)
            .with_user_object(UserObject::QuantizationTable(self.values.to_vec()))
    }

    fn from_node(node: &TreeNode) -> Result<Self> {
        node.expect_name("dqtable")?;
        let precision = node.optional_int("elementPrecision", 0..=1, 0)? as u8;
        let id = node.required_int("qtableId", 0..=MAXIMUM_TABLE_ID as u32)? as u8;
        let Some(UserObject::QuantizationTable(entries)) = &node.user_object else {
            return Err(node.invalid("dqtable requires a quantization table user object"));
        };
        let values: [u16; QTABLE_SIZE] = entries.as_slice().try_into().map_err(|_| {
            node.invalid(format!("quantization table has {} entries, expected 64", entries.len()))
        })?;
        let limit = if precision == 0 { 255 } else { u16::MAX };
        if values.iter().any(|&v| v == 0 || v > limit) {
            return Err(node.invalid("quantization table entry out of range"));
        }
        Ok(Self {
            id,
            precision,
            values,
        })
    }
}

/// DQT: one or more quantization tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DqtSegment {
    pub tables: Vec<QuantizationTable>,
    pub origin: SegmentOrigin,
}

impl DqtSegment {
    pub fn new(tables: Vec<QuantizationTable>) -> Self {
        Self {
            tables,
            origin: SegmentOrigin::default(),
        }
    }

    pub fn table(&self, id: u8) -> Option<&QuantizationTable> {
        self.tables.iter().find(|table| table.id == id)
    }

    pub fn table_mut(&mut self, id: u8) -> Option<&mut QuantizationTable> {
        self.tables.iter_mut().find(|table| table.id == id)
    }
}

impl SegmentCodec for DqtSegment {
    const NODE_NAME: &'static str = "dqt";

    fn parse(header: &SegmentHeader, payload: &[u8]) -> Result<Self> {
        let mut reader = PayloadReader::new(payload, "DQT");
        let mut tables = Vec::new();
        while reader.remaining() > 0 {
            let pq_tq = reader.read_u8()?;
            let precision = pq_tq >> 4;
            let id = pq_tq & 0x0F;
            if precision > 1 || id > MAXIMUM_TABLE_ID {
                return Err(MetadataError::format(format!(
                    "invalid DQT table header 0x{:02X}",
                    pq_tq
                )));
            }
            let mut values = [0u16; QTABLE_SIZE];
            for &natural in ZIGZAG_ORDER.iter() {
                values[natural] = if precision == 0 {
                    reader.read_u8()? as u16
                } else {
                    reader.read_u16()?
                };
            }
            tables.push(QuantizationTable {
                id,
                precision,
                values,
            });
        }
        if tables.is_empty() {
            return Err(MetadataError::format("DQT segment holds no tables"));
        }
        Ok(Self {
            tables,
            origin: header.origin(),
        })
    }

    fn write_to<W: Write>(&self, writer: &mut JpegStreamWriter<W>) -> Result<()> {
        let length = self.tables.iter().map(QuantizationTable::payload_len).sum();
        writer.write_segment_header(JpegMarkerCode::DefineQuantizationTable.into(), length)?;
        for table in &self.tables {
            writer.write_byte((table.precision << 4) | table.id)?;
            for &natural in ZIGZAG_ORDER.iter() {
                let value = table.values[natural];
                if table.precision == 0 {
                    writer.write_byte(value as u8)?;
                } else {
                    writer.write_u16(value)?;
                }
            }
        }
        Ok(())
    }

    fn to_native_node(&self) -> TreeNode {
        let mut node = TreeNode::new(Self::NODE_NAME);
        for table in &self.tables {
            node.append_child(table.to_node());
        }
        node
    }

    fn from_native_node(node: &TreeNode) -> Result<Self> {
        node.expect_name(Self::NODE_NAME)?;
        if node.children.is_empty() || node.children.len() > 4 {
            return Err(node.invalid("dqt must hold 1 to 4 tables"));
        }
        let tables = node
            .children
            .iter()
            .map(QuantizationTable::from_node)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(tables))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tables::STD_LUMINANCE_QUANT_TABLE;

    fn header(length: usize) -> SegmentHeader {
        SegmentHeader {
            tag: 0xDB,
            length,
            payload_offset: 4,
        }
    }

    #[test]
    fn test_zigzag_mapping_on_parse() {
        let mut payload = vec![0x01];
        payload.extend((1..=64).map(|k| k as u8));
        let dqt = DqtSegment::parse(&header(payload.len()), &payload).unwrap();
        let table = &dqt.tables[0];
        assert_eq!(table.id, 1);
        assert_eq!(table.values[0], 1);
        // Third zigzag coefficient sits at row 1, column 0.
        assert_eq!(table.values[8], 3);
        assert_eq!(table.values[63], 64);
    }

    #[test]
    fn test_sixteen_bit_tables_round_trip() {
        let mut values = STD_LUMINANCE_QUANT_TABLE;
        values[5] = 1000;
        let dqt = DqtSegment::new(vec![QuantizationTable::new(2, values)]);
        assert_eq!(dqt.tables[0].precision, 1);

        let mut writer = JpegStreamWriter::new(Vec::new());
        dqt.write_to(&mut writer).unwrap();
        let bytes = writer.into_inner();
        assert_eq!(bytes.len(), 4 + 1 + 128);
        let parsed = DqtSegment::parse(&header(bytes.len() - 4), &bytes[4..]).unwrap();
        assert_eq!(parsed, dqt);
    }

    #[test]
    fn test_truncated_table_is_format_error() {
        let payload = [0x00, 1, 2, 3];
        assert!(DqtSegment::parse(&header(4), &payload).unwrap_err().is_format_error());
    }

    #[test]
    fn test_tree_rejects_bad_table_id() {
        let node = TreeNode::new("dqt").with_child(
            TreeNode::new("dqtable")
                .with_attribute("qtableId", 4)
                .with_user_object(UserObject::QuantizationTable(vec![1; 64])),
        );
        assert!(DqtSegment::from_native_node(&node).unwrap_err().is_invalid_tree());
    }

    #[test]
    fn test_tree_round_trip() {
        let dqt = DqtSegment::new(vec![QuantizationTable::new(0, STD_LUMINANCE_QUANT_TABLE)]);
        assert_eq!(DqtSegment::from_native_node(&dqt.to_native_node()).unwrap(), dqt);
    }
}
