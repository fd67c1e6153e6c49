use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Marker codes the metadata layer dispatches on. Every other tag byte is
/// carried through as an opaque segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum JpegMarkerCode {
    /// Byte-stuffing zero that follows a 0xFF inside entropy-coded data.
    StuffedZero = 0x00,

    /// SOF0: Baseline DCT frame.
    StartOfFrameBaseline = 0xC0,
    /// SOF1: Extended sequential DCT frame.
    StartOfFrameExtended = 0xC1,
    /// SOF2: Progressive DCT frame.
    StartOfFrameProgressive = 0xC2,

    /// DHT: Defines one or more Huffman tables.
    DefineHuffmanTable = 0xC4,

    /// RST0..RST7: Restart markers, no payload.
    Restart0 = 0xD0,
    Restart1 = 0xD1,
    Restart2 = 0xD2,
    Restart3 = 0xD3,
    Restart4 = 0xD4,
    Restart5 = 0xD5,
    Restart6 = 0xD6,
    Restart7 = 0xD7,

    /// SOI: Marks the start of an image.
    StartOfImage = 0xD8,
    /// EOI: Marks the end of an image.
    EndOfImage = 0xD9,
    /// SOS: Marks the start of scan.
    StartOfScan = 0xDA,
    /// DQT: Defines one or more quantization tables.
    DefineQuantizationTable = 0xDB,
    /// DRI: Defines the restart interval used in succeeding scans.
    DefineRestartInterval = 0xDD,

    /// APP0: used for the JFIF header and JFXX extensions.
    ApplicationData0 = 0xE0,
    /// APP2: used for ICC profiles.
    ApplicationData2 = 0xE2,
    /// APP14: used by Adobe.
    ApplicationData14 = 0xEE,

    /// COM: Comment block.
    Comment = 0xFE,
}

impl JpegMarkerCode {
    pub fn is_restart(self) -> bool {
        let code = u8::from(self);
        (JPEG_RESTART_MARKER_BASE..JPEG_RESTART_MARKER_BASE + JPEG_RESTART_MARKER_RANGE)
            .contains(&code)
    }

    /// True for the frame headers this layer models (SOF0, SOF1, SOF2).
    pub fn is_start_of_frame(self) -> bool {
        matches!(
            self,
            Self::StartOfFrameBaseline | Self::StartOfFrameExtended | Self::StartOfFrameProgressive
        )
    }
}

pub const JPEG_MARKER_START_BYTE: u8 = 0xFF;
pub const JPEG_RESTART_MARKER_BASE: u8 = 0xD0;
pub const JPEG_RESTART_MARKER_RANGE: u8 = 8;
