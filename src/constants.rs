// Application-segment identifiers, matched byte-for-byte at payload offset 0.
pub const JFIF_IDENTIFIER: &[u8; 5] = b"JFIF\0";
pub const JFXX_IDENTIFIER: &[u8; 5] = b"JFXX\0";
pub const ICC_IDENTIFIER: &[u8; 12] = b"ICC_PROFILE\0";
pub const ADOBE_IDENTIFIER: &[u8; 5] = b"Adobe";

// The size in bytes of the segment length field.
pub const SEGMENT_LENGTH_SIZE: usize = 2;

// The maximum size of the data bytes that fit in a segment.
pub const SEGMENT_MAX_DATA_SIZE: usize = u16::MAX as usize - SEGMENT_LENGTH_SIZE;

// ICC chunk header: identifier plus chunk index and chunk count.
pub const ICC_CHUNK_HEADER_SIZE: usize = ICC_IDENTIFIER.len() + 2;
pub const ICC_MAX_CHUNK_DATA_SIZE: usize = SEGMENT_MAX_DATA_SIZE - ICC_CHUNK_HEADER_SIZE;
pub const ICC_MAX_CHUNK_COUNT: usize = 255;

// JFIF fixed payload: identifier, version, units, densities, thumbnail size.
pub const JFIF_FIXED_PAYLOAD_SIZE: usize = 14;
pub const JFIF_DEFAULT_MAJOR_VERSION: u8 = 1;
pub const JFIF_DEFAULT_MINOR_VERSION: u8 = 2;

// JFXX extension codes.
pub const JFXX_THUMB_JPEG: u8 = 0x10;
pub const JFXX_THUMB_PALETTE: u8 = 0x11;
pub const JFXX_THUMB_RGB: u8 = 0x13;

// Thumbnail dimensions are stored in one byte each.
pub const MAX_THUMBNAIL_DIMENSION: u32 = 255;
pub const THUMBNAIL_PALETTE_SIZE: usize = 768;

// Adobe APP14 payload size including the identifier.
pub const ADOBE_PAYLOAD_SIZE: usize = 12;
pub const ADOBE_DEFAULT_VERSION: u16 = 101;

pub const QTABLE_SIZE: usize = 64;
pub const HUFFMAN_LENGTH_COUNT: usize = 16;
pub const MAXIMUM_TABLE_ID: u8 = 3;
pub const MAXIMUM_SPECTRAL_SELECTION: u8 = 63;
pub const MAXIMUM_SUCCESSIVE_APPROXIMATION: u8 = 15;
pub const MAXIMUM_SAMPLING_FACTOR: u8 = 4;
pub const MAXIMUM_COMPONENT_COUNT_IN_SCAN: usize = 4;
pub const SUPPORTED_SAMPLE_PRECISION: u8 = 8;

// ICC header fields checked before a profile is offered to a color system.
pub const ICC_HEADER_SIZE: usize = 128;
pub const ICC_SIGNATURE_OFFSET: usize = 36;
pub const ICC_SIGNATURE: &[u8; 4] = b"acsp";

pub const DEFAULT_QUALITY: u8 = 75;

// Read-ahead buffer size of the byte cursor.
pub const CURSOR_BUFFER_SIZE: usize = 5000;
