//! Boundary to the pixel codec.
//!
//! Entropy coding, DCT and color conversion live outside this crate. The
//! metadata layer talks to them through [`PixelCodec`], handing over the
//! tables and component layout a document describes.

use crate::document::MetadataDocument;
use crate::error::Result;
use crate::segments::{DhtSegment, DqtSegment, HuffmanTable, MarkerSegment, QuantizationTable, SofSegment};
use std::io::{Read, Write};

/// Interleaved 8-bit samples, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    pub width: u32,
    pub height: u32,
    pub components: u8,
    pub data: Vec<u8>,
}

impl PixelBuffer {
    pub fn new(width: u32, height: u32, components: u8) -> Self {
        let size = width as usize * height as usize * components as usize;
        Self {
            width,
            height,
            components,
            data: vec![0; size],
        }
    }

    pub fn row_stride(&self) -> usize {
        self.width as usize * self.components as usize
    }

    /// Top-left `width` x `height` region.
    pub fn cropped(&self, width: u32, height: u32) -> PixelBuffer {
        let width = width.min(self.width);
        let height = height.min(self.height);
        let stride = self.row_stride();
        let row_bytes = width as usize * self.components as usize;
        let mut data = Vec::with_capacity(row_bytes * height as usize);
        for row in self.data.chunks(stride).take(height as usize) {
            data.extend_from_slice(&row[..row_bytes.min(row.len())]);
        }
        PixelBuffer {
            width,
            height,
            components: self.components,
            data,
        }
    }
}

/// What the codec reports from a stream's frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderInfo {
    pub width: u32,
    pub height: u32,
    pub component_count: u8,
    /// Codec-specific code for the color space it detected.
    pub color_code: u8,
}

/// Tables and frame layout handed to the encoder.
#[derive(Debug, Clone, Copy)]
pub struct EncodeRequest<'a> {
    pub quantization: &'a [QuantizationTable],
    pub huffman: &'a [HuffmanTable],
    pub frame: Option<&'a SofSegment>,
    pub restart_interval: u16,
}

/// Collects the tables and frame header of a document as owned vectors an
/// [`EncodeRequest`] can borrow from.
#[derive(Debug, Clone, Default)]
pub struct EncodeTables {
    pub quantization: Vec<QuantizationTable>,
    pub huffman: Vec<HuffmanTable>,
    pub frame: Option<SofSegment>,
    pub restart_interval: u16,
}

impl EncodeTables {
    pub fn from_document(document: &MetadataDocument) -> Self {
        let mut tables = Self::default();
        for segment in document.segments() {
            match segment {
                MarkerSegment::Dqt(DqtSegment { tables: q, .. }) => {
                    tables.quantization.extend(q.iter().cloned())
                }
                MarkerSegment::Dht(DhtSegment { tables: h, .. }) => {
                    tables.huffman.extend(h.iter().cloned())
                }
                MarkerSegment::Dri(dri) => tables.restart_interval = dri.interval,
                MarkerSegment::Sof(sof) => tables.frame = Some(sof.clone()),
                _ => {}
            }
        }
        tables
    }

    pub fn request(&self) -> EncodeRequest<'_> {
        EncodeRequest {
            quantization: &self.quantization,
            huffman: &self.huffman,
            frame: self.frame.as_ref(),
            restart_interval: self.restart_interval,
        }
    }
}

/// The opaque pixel transform.
pub trait PixelCodec {
    fn read_header(&mut self, source: &mut dyn Read) -> Result<HeaderInfo>;

    fn decode_scanlines(&mut self, source: &mut dyn Read) -> Result<PixelBuffer>;

    /// Encodes `pixels` and writes the codec-owned segments (DQT, DHT, DRI,
    /// SOF, SOS) together with the entropy-coded data.
    fn encode_scanlines(
        &mut self,
        pixels: &PixelBuffer,
        request: EncodeRequest<'_>,
        destination: &mut dyn Write,
    ) -> Result<()>;
}
