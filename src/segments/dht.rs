use super::{PayloadReader, SegmentCodec, SegmentHeader, SegmentOrigin};
use crate::constants::{HUFFMAN_LENGTH_COUNT, MAXIMUM_TABLE_ID};
use crate::error::{MetadataError, Result};
use crate::jpeg_marker_code::JpegMarkerCode;
use crate::jpeg_stream_writer::JpegStreamWriter;
use crate::tree::{TreeNode, UserObject};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use std::io::Write;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum HuffmanClass {
    Dc = 0,
    Ac = 1,
}

/// One Huffman table: code-length histogram plus symbol values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HuffmanTable {
    pub class: HuffmanClass,
    pub id: u8,
    pub lengths: [u8; HUFFMAN_LENGTH_COUNT],
    pub values: Vec<u8>,
}

impl HuffmanTable {
    pub fn new(
        class: HuffmanClass,
        id: u8,
        lengths: [u8; HUFFMAN_LENGTH_COUNT],
        values: Vec<u8>,
    ) -> Self {
        Self {
            class,
            id,
            lengths,
            values,
        }
    }

    pub fn key(&self) -> (HuffmanClass, u8) {
        (self.class, self.id)
    }

    fn symbol_count(lengths: &[u8]) -> usize {
        lengths.iter().map(|&l| l as usize).sum()
    }

    fn to_node(&self) -> TreeNode {
        TreeNode::new("dhtable")
            .with_attribute("class", u8::from(self.class))
            .with_attribute("htableId", self.id)
            .with_user_object(UserObject::HuffmanTable {
                lengths: self.lengths.to_vec(),
                values: self.values.clone(),
            })
    }

    fn from_node(node: &TreeNode) -> Result<Self> {
        node.expect_name("dhtable")?;
        let class = node.required_int("class", 0..=1)? as u8;
        let id = node.required_int("htableId", 0..=MAXIMUM_TABLE_ID as u32)? as u8;
        let Some(UserObject::HuffmanTable { lengths, values }) = &node.user_object else {
            return Err(node.invalid("dhtable requires a Huffman table user object"));
        };
        let lengths: [u8; HUFFMAN_LENGTH_COUNT] = lengths
            .as_slice()
            .try_into()
            .map_err(|_| node.invalid("Huffman table needs 16 code lengths"))?;
        let count = Self::symbol_count(&lengths);
        if count != values.len() || count > 256 {
            return Err(node.invalid(format!(
                "Huffman table declares {} symbols but holds {}",
                count,
                values.len()
            )));
        }
        let class = HuffmanClass::try_from(class)
            .map_err(|_| node.invalid("invalid Huffman table class"))?;
        Ok(Self::new(class, id, lengths, values.clone()))
    }
}

/// DHT: one or more Huffman tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DhtSegment {
    pub tables: Vec<HuffmanTable>,
    pub origin: SegmentOrigin,
}

impl DhtSegment {
    pub fn new(tables: Vec<HuffmanTable>) -> Self {
        Self {
            tables,
            origin: SegmentOrigin::default(),
        }
    }

    pub fn table(&self, class: HuffmanClass, id: u8) -> Option<&HuffmanTable> {
        self.tables.iter().find(|table| table.key() == (class, id))
    }

    pub fn table_mut(&mut self, class: HuffmanClass, id: u8) -> Option<&mut HuffmanTable> {
        self.tables.iter_mut().find(|table| table.key() == (class, id))
    }
}

impl SegmentCodec for DhtSegment {
    const NODE_NAME: &'static str = "dht";

    fn parse(header: &SegmentHeader, payload: &[u8]) -> Result<Self> {
        let mut reader = PayloadReader::new(payload, "DHT");
        let mut tables = Vec::new();
        while reader.remaining() > 0 {
            let tc_th = reader.read_u8()?;
            let class = HuffmanClass::try_from(tc_th >> 4).map_err(|_| {
                MetadataError::format(format!("invalid DHT table class in 0x{:02X}", tc_th))
            })?;
            let id = tc_th & 0x0F;
            if id > MAXIMUM_TABLE_ID {
                return Err(MetadataError::format(format!("invalid DHT table id {}", id)));
            }
            let lengths: [u8; HUFFMAN_LENGTH_COUNT] = reader
                .take(HUFFMAN_LENGTH_COUNT)?
                .try_into()
                .map_err(|_| MetadataError::truncated())?;
            let count = HuffmanTable::symbol_count(&lengths);
            if count > 256 {
                return Err(MetadataError::format("DHT table declares more than 256 symbols"));
            }
            let values = reader.take(count)?.to_vec();
            tables.push(HuffmanTable::new(class, id, lengths, values));
        }
        if tables.is_empty() {
            return Err(MetadataError::format("DHT segment holds no tables"));
        }
        Ok(Self {
            tables,
            origin: header.origin(),
        })
    }

    fn write_to<W: Write>(&self, writer: &mut JpegStreamWriter<W>) -> Result<()> {
        let length = self
            .tables
            .iter()
            .map(|table| 1 + HUFFMAN_LENGTH_COUNT + table.values.len())
            .sum();
        writer.write_segment_header(JpegMarkerCode::DefineHuffmanTable.into(), length)?;
        for table in &self.tables {
            writer.write_byte((u8::from(table.class) << 4) | table.id)?;
            writer.write_bytes(&table.lengths)?;
            writer.write_bytes(&table.values)?;
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
        // Four DC plus four AC slots.
        if node.children.is_empty() || node.children.len() > 8 {
            return Err(node.invalid("dht must hold 1 to 8 tables"));
        }
        let tables = node
            .children
            .iter()
            .map(HuffmanTable::from_node)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(tables))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tables;

    #[test]
    fn test_multiple_tables_round_trip() {
        let dht = DhtSegment::new(vec![
            tables::luminance_dc_table(),
            tables::luminance_ac_table(),
            tables::chrominance_dc_table(),
        ]);
        let mut writer = JpegStreamWriter::new(Vec::new());
        dht.write_to(&mut writer).unwrap();
        let bytes = writer.into_inner();
        assert_eq!(bytes.len(), 4 + 3 * 17 + 12 + 162 + 12);
        let header = SegmentHeader {
            tag: 0xC4,
            length: bytes.len() - 4,
            payload_offset: 0,
        };
        assert_eq!(DhtSegment::parse(&header, &bytes[4..]).unwrap(), dht);
    }

    #[test]
    fn test_symbol_count_mismatch_in_tree() {
        let node = TreeNode::new("dht").with_child(
            TreeNode::new("dhtable")
                .with_attribute("class", 0)
                .with_attribute("htableId", 0)
                .with_user_object(UserObject::HuffmanTable {
                    lengths: vec![0, 2, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0],
                    values: vec![1],
                }),
        );
        assert!(DhtSegment::from_native_node(&node).unwrap_err().is_invalid_tree());
    }

    #[test]
    fn test_bad_class_is_format_error() {
        let mut payload = vec![0x20];
        payload.extend([0u8; 16]);
        let header = SegmentHeader {
            tag: 0xC4,
            length: payload.len(),
            payload_offset: 0,
        };
        assert!(DhtSegment::parse(&header, &payload).unwrap_err().is_format_error());
    }

    #[test]
    fn test_lookup_by_class_and_id() {
        let dht = DhtSegment::new(vec![tables::luminance_dc_table(), tables::chrominance_ac_table()]);
        assert!(dht.table(HuffmanClass::Ac, 1).is_some());
        assert!(dht.table(HuffmanClass::Ac, 0).is_none());
    }
}
