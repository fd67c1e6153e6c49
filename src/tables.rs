//! Standard quantization and Huffman tables (ITU T.81 Annex K) and the
//! quality scaling used when default metadata is synthesized.

use crate::constants::QTABLE_SIZE;
use crate::segments::{HuffmanClass, HuffmanTable, QuantizationTable};

/// Zigzag scan pattern for 8x8 blocks: entry k is the natural (row-major)
/// index of the k-th coefficient in stream order.
pub const ZIGZAG_ORDER: [usize; QTABLE_SIZE] = [
    0,  1,  8, 16,  9,  2,  3, 10,
    17, 24, 32, 25, 18, 11,  4,  5,
    12, 19, 26, 33, 40, 48, 41, 34,
    27, 20, 13,  6,  7, 14, 21, 28,
    35, 42, 49, 56, 57, 50, 43, 36,
    29, 22, 15, 23, 30, 37, 44, 51,
    58, 59, 52, 45, 38, 31, 39, 46,
    53, 60, 61, 54, 47, 55, 62, 63,
];

/// Standard JPEG luminance quantization table (Quality 50), natural order.
pub const STD_LUMINANCE_QUANT_TABLE: [u16; QTABLE_SIZE] = [
    16, 11, 10, 16, 24, 40, 51, 61,
    12, 12, 14, 19, 26, 58, 60, 55,
    14, 13, 16, 24, 40, 57, 69, 56,
    14, 17, 22, 29, 51, 87, 80, 62,
    18, 22, 37, 56, 68, 109, 103, 77,
    24, 35, 55, 64, 81, 104, 113, 92,
    49, 64, 78, 87, 103, 121, 120, 101,
    72, 92, 95, 98, 112, 100, 103, 99,
];

/// Standard JPEG chrominance quantization table (Quality 50), natural order.
pub const STD_CHROMINANCE_QUANT_TABLE: [u16; QTABLE_SIZE] = [
    17, 18, 24, 47, 99, 99, 99, 99,
    18, 21, 26, 66, 99, 99, 99, 99,
    24, 26, 56, 99, 99, 99, 99, 99,
    47, 66, 99, 99, 99, 99, 99, 99,
    99, 99, 99, 99, 99, 99, 99, 99,
    99, 99, 99, 99, 99, 99, 99, 99,
    99, 99, 99, 99, 99, 99, 99, 99,
    99, 99, 99, 99, 99, 99, 99, 99,
];

pub const STD_LUMINANCE_DC_LENGTHS: [u8; 16] = [
    0, 1, 5, 1, 1, 1, 1, 1, 1, 0, 0, 0, 0, 0, 0, 0
];

pub const STD_LUMINANCE_DC_VALUES: [u8; 12] = [
    0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11
];

pub const STD_CHROMINANCE_DC_LENGTHS: [u8; 16] = [
    0, 3, 1, 1, 1, 1, 1, 1, 1, 1, 1, 0, 0, 0, 0, 0
];

pub const STD_CHROMINANCE_DC_VALUES: [u8; 12] = [
    0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11
];

pub const STD_LUMINANCE_AC_LENGTHS: [u8; 16] = [
    0, 2, 1, 3, 3, 2, 4, 3, 5, 5, 4, 4, 0, 0, 1, 125
];

pub const STD_LUMINANCE_AC_VALUES: [u8; 162] = [
    0x01, 0x02, 0x03, 0x00, 0x04, 0x11, 0x05, 0x12,
    0x21, 0x31, 0x41, 0x06, 0x13, 0x51, 0x61, 0x07,
    0x22, 0x71, 0x14, 0x32, 0x81, 0x91, 0xa1, 0x08,
    0x23, 0x42, 0xb1, 0xc1, 0x15, 0x52, 0xd1, 0xf0,
    0x24, 0x33, 0x62, 0x72, 0x82, 0x09, 0x0a, 0x16,
    0x17, 0x18, 0x19, 0x1a, 0x25, 0x26, 0x27, 0x28,
    0x29, 0x2a, 0x34, 0x35, 0x36, 0x37, 0x38, 0x39,
    0x3a, 0x43, 0x44, 0x45, 0x46, 0x47, 0x48, 0x49,
    0x4a, 0x53, 0x54, 0x55, 0x56, 0x57, 0x58, 0x59,
    0x5a, 0x63, 0x64, 0x65, 0x66, 0x67, 0x68, 0x69,
    0x6a, 0x73, 0x74, 0x75, 0x76, 0x77, 0x78, 0x79,
    0x7a, 0x83, 0x84, 0x85, 0x86, 0x87, 0x88, 0x89,
    0x8a, 0x92, 0x93, 0x94, 0x95, 0x96, 0x97, 0x98,
    0x99, 0x9a, 0xa2, 0xa3, 0xa4, 0xa5, 0xa6, 0xa7,
    0xa8, 0xa9, 0xaa, 0xb2, 0xb3, 0xb4, 0xb5, 0xb6,
    0xb7, 0xb8, 0xb9, 0xba, 0xc2, 0xc3, 0xc4, 0xc5,
    0xc6, 0xc7, 0xc8, 0xc9, 0xca, 0xd2, 0xd3, 0xd4,
    0xd5, 0xd6, 0xd7, 0xd8, 0xd9, 0xda, 0xe1, 0xe2,
    0xe3, 0xe4, 0xe5, 0xe6, 0xe7, 0xe8, 0xe9, 0xea,
    0xf1, 0xf2, 0xf3, 0xf4, 0xf5, 0xf6, 0xf7, 0xf8,
    0xf9, 0xfa,
];

pub const STD_CHROMINANCE_AC_LENGTHS: [u8; 16] = [
    0, 2, 1, 2, 4, 4, 3, 4, 7, 5, 4, 4, 0, 1, 2, 119
];

pub const STD_CHROMINANCE_AC_VALUES: [u8; 162] = [
    0x00, 0x01, 0x02, 0x03, 0x11, 0x04, 0x05, 0x21,
    0x31, 0x06, 0x12, 0x41, 0x51, 0x07, 0x61, 0x71,
    0x13, 0x22, 0x32, 0x81, 0x08, 0x14, 0x42, 0x91,
    0xa1, 0xb1, 0xc1, 0x09, 0x23, 0x33, 0x52, 0xf0,
    0x15, 0x62, 0x72, 0xd1, 0x0a, 0x16, 0x24, 0x34,
    0xe1, 0x25, 0xf1, 0x17, 0x18, 0x19, 0x1a, 0x26,
    0x27, 0x28, 0x29, 0x2a, 0x35, 0x36, 0x37, 0x38,
    0x39, 0x3a, 0x43, 0x44, 0x45, 0x46, 0x47, 0x48,
    0x49, 0x4a, 0x53, 0x54, 0x55, 0x56, 0x57, 0x58,
    0x59, 0x5a, 0x63, 0x64, 0x65, 0x66, 0x67, 0x68,
    0x69, 0x6a, 0x73, 0x74, 0x75, 0x76, 0x77, 0x78,
    0x79, 0x7a, 0x82, 0x83, 0x84, 0x85, 0x86, 0x87,
    0x88, 0x89, 0x8a, 0x92, 0x93, 0x94, 0x95, 0x96,
    0x97, 0x98, 0x99, 0x9a, 0xa2, 0xa3, 0xa4, 0xa5,
    0xa6, 0xa7, 0xa8, 0xa9, 0xaa, 0xb2, 0xb3, 0xb4,
    0xb5, 0xb6, 0xb7, 0xb8, 0xb9, 0xba, 0xc2, 0xc3,
    0xc4, 0xc5, 0xc6, 0xc7, 0xc8, 0xc9, 0xca, 0xd2,
    0xd3, 0xd4, 0xd5, 0xd6, 0xd7, 0xd8, 0xd9, 0xda,
    0xe2, 0xe3, 0xe4, 0xe5, 0xe6, 0xe7, 0xe8, 0xe9,
    0xea, 0xf2, 0xf3, 0xf4, 0xf5, 0xf6, 0xf7, 0xf8,
    0xf9, 0xfa,
];

/// Caller-supplied tables that replace the standard ones.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableSet {
    pub quantization: Vec<QuantizationTable>,
    pub huffman: Vec<HuffmanTable>,
}

impl TableSet {
    pub fn is_empty(&self) -> bool {
        self.quantization.is_empty() && self.huffman.is_empty()
    }
}

/// Scales a quantization table by a quality factor (1-100) with the IJG
/// formula. Quality 50 leaves the table unchanged.
pub fn get_scaled_quant_table(base_table: &[u16; QTABLE_SIZE], quality: u8) -> [u16; QTABLE_SIZE] {
    let quality = quality.clamp(1, 100) as u32;
    let s = if quality < 50 { 5000 / quality } else { 200 - 2 * quality };

    let mut scaled_table = [0u16; QTABLE_SIZE];
    for (scaled, &base) in scaled_table.iter_mut().zip(base_table) {
        *scaled = ((base as u32 * s + 50) / 100).clamp(1, 255) as u16;
    }
    scaled_table
}

pub fn luminance_quant_table(quality: u8) -> QuantizationTable {
    QuantizationTable::new(0, get_scaled_quant_table(&STD_LUMINANCE_QUANT_TABLE, quality))
}

pub fn chrominance_quant_table(quality: u8) -> QuantizationTable {
    QuantizationTable::new(1, get_scaled_quant_table(&STD_CHROMINANCE_QUANT_TABLE, quality))
}

/// Derives a chrominance table (id 1) from a luminance table. A flat
/// luminance table is copied; otherwise the standard chrominance table is
/// scaled by the ratio of the largest luminance entry to the half-scale
/// standard luminance entry at the same position.
pub fn chroma_for_luma(luma: &QuantizationTable) -> QuantizationTable {
    let first = luma.values[0];
    if luma.values.iter().all(|&value| value == first) {
        return QuantizationTable {
            id: 1,
            ..luma.clone()
        };
    }

    let largest = luma
        .values
        .iter()
        .enumerate()
        .fold(0, |best, (i, &value)| if value > luma.values[best] { i } else { best });
    let half_luma = STD_LUMINANCE_QUANT_TABLE[largest].div_ceil(2).max(1);
    let scale = luma.values[largest] as f32 / half_luma as f32;

    let mut values = [0u16; QTABLE_SIZE];
    for (value, &chroma) in values.iter_mut().zip(&STD_CHROMINANCE_QUANT_TABLE) {
        let half_chroma = chroma.div_ceil(2).max(1);
        *value = ((scale * half_chroma as f32) as u32).clamp(1, 255) as u16;
    }
    QuantizationTable::new(1, values)
}

pub fn luminance_dc_table() -> HuffmanTable {
    HuffmanTable::new(HuffmanClass::Dc, 0, STD_LUMINANCE_DC_LENGTHS, STD_LUMINANCE_DC_VALUES.to_vec())
}

pub fn chrominance_dc_table() -> HuffmanTable {
    HuffmanTable::new(
        HuffmanClass::Dc,
        1,
        STD_CHROMINANCE_DC_LENGTHS,
        STD_CHROMINANCE_DC_VALUES.to_vec(),
    )
}

pub fn luminance_ac_table() -> HuffmanTable {
    HuffmanTable::new(HuffmanClass::Ac, 0, STD_LUMINANCE_AC_LENGTHS, STD_LUMINANCE_AC_VALUES.to_vec())
}

pub fn chrominance_ac_table() -> HuffmanTable {
    HuffmanTable::new(
        HuffmanClass::Ac,
        1,
        STD_CHROMINANCE_AC_LENGTHS,
        STD_CHROMINANCE_AC_VALUES.to_vec(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quality_50_is_identity() {
        assert_eq!(get_scaled_quant_table(&STD_LUMINANCE_QUANT_TABLE, 50), STD_LUMINANCE_QUANT_TABLE);
    }

    #[test]
    fn test_quality_scaling_clamps() {
        let best = get_scaled_quant_table(&STD_LUMINANCE_QUANT_TABLE, 100);
        assert!(best.iter().all(|&v| v == 1));
        let worst = get_scaled_quant_table(&STD_LUMINANCE_QUANT_TABLE, 1);
        assert!(worst.iter().all(|&v| v == 255));
        let q75 = get_scaled_quant_table(&STD_LUMINANCE_QUANT_TABLE, 75);
        assert_eq!(q75[0], 8);
    }

    #[test]
    fn test_zigzag_is_permutation() {
        let mut seen = [false; QTABLE_SIZE];
        for &index in &ZIGZAG_ORDER {
            seen[index] = true;
        }
        assert!(seen.iter().all(|&s| s));
    }

    #[test]
    fn test_standard_huffman_tables_are_well_formed() {
        for table in [
            luminance_dc_table(),
            chrominance_dc_table(),
            luminance_ac_table(),
            chrominance_ac_table(),
        ] {
            let total: usize = table.lengths.iter().map(|&l| l as usize).sum();
            assert_eq!(total, table.values.len());
        }
    }

    #[test]
    fn test_chroma_for_flat_luma_copies() {
        let flat = QuantizationTable::new(0, [7; QTABLE_SIZE]);
        let chroma = chroma_for_luma(&flat);
        assert_eq!(chroma.id, 1);
        assert_eq!(chroma.values, [7; QTABLE_SIZE]);
    }

    #[test]
    fn test_chroma_for_standard_half_luma() {
        let half = QuantizationTable::new(0, STD_LUMINANCE_QUANT_TABLE.map(|v| v.div_ceil(2)));
        let chroma = chroma_for_luma(&half);
        assert_eq!(chroma.values[0], 9);
        assert_eq!(chroma.values[63], 50);
    }
}
