//! JPEG marker-stream writer.
//!
//! `JpegStreamWriter` emits markers and length-prefixed segments to any
//! `io::Write` sink. The two document-level entry points sit on top of it:
//! [`serialize_metadata`] writes a complete marker sequence between SOI and
//! EOI, [`write_image_header`] writes only the segments the pixel codec does
//! not produce itself.

use crate::constants::SEGMENT_MAX_DATA_SIZE;
use crate::document::MetadataDocument;
use crate::error::{MetadataError, Result};
use crate::jpeg_marker_code::{JPEG_MARKER_START_BYTE, JpegMarkerCode};
use crate::segments::{AdobeTransform, IccSegment, JfifSegment, MarkerSegment, SegmentCodec};
use crate::warning::{MetadataWarning, WarningSink};
use std::io::Write;

/// A writer for JPEG codestreams that manages marker emission and segment
/// length fields.
pub struct JpegStreamWriter<W> {
    destination: W,
    position: usize,
}

impl<W: Write> JpegStreamWriter<W> {
    pub fn new(destination: W) -> Self {
        Self {
            destination,
            position: 0,
        }
    }

    /// Number of bytes written so far.
    pub fn len(&self) -> usize {
        self.position
    }

    pub fn is_empty(&self) -> bool {
        self.position == 0
    }

    pub fn write_byte(&mut self, value: u8) -> Result<()> {
        self.write_bytes(&[value])
    }

    pub fn write_u16(&mut self, value: u16) -> Result<()> {
        self.write_bytes(&value.to_be_bytes())
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.destination.write_all(bytes)?;
        self.position += bytes.len();
        Ok(())
    }

    pub fn write_marker(&mut self, marker: JpegMarkerCode) -> Result<()> {
        self.write_marker_tag(marker.into())
    }

    pub fn write_marker_tag(&mut self, tag: u8) -> Result<()> {
        self.write_byte(JPEG_MARKER_START_BYTE)?;
        self.write_byte(tag)
    }

    /// Writes the marker and the length field for a segment whose payload is
    /// `payload_length` bytes. The stored length includes the two length
    /// bytes themselves.
    pub fn write_segment_header(&mut self, tag: u8, payload_length: usize) -> Result<()> {
        if payload_length > SEGMENT_MAX_DATA_SIZE {
            return Err(MetadataError::format(format!(
                "segment payload of {} bytes exceeds {}",
                payload_length, SEGMENT_MAX_DATA_SIZE
            )));
        }
        self.write_marker_tag(tag)?;
        self.write_u16((payload_length + 2) as u16)
    }

    /// Writes a whole segment whose payload is already assembled.
    pub fn write_segment(&mut self, tag: u8, payload: &[u8]) -> Result<()> {
        self.write_segment_header(tag, payload.len())?;
        self.write_bytes(payload)
    }

    pub fn write_start_of_image(&mut self) -> Result<()> {
        self.write_marker(JpegMarkerCode::StartOfImage)
    }

    pub fn write_end_of_image(&mut self) -> Result<()> {
        self.write_marker(JpegMarkerCode::EndOfImage)
    }

    pub fn flush(&mut self) -> Result<()> {
        self.destination.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.destination
    }
}

/// Writes every segment of `document`, table and frame segments included,
/// between SOI and EOI. This is the path for tables-only streams, nested
/// thumbnails and round trips of parsed metadata.
pub fn serialize_metadata<W: Write>(document: &MetadataDocument, destination: W) -> Result<W> {
    let mut writer = JpegStreamWriter::new(destination);
    writer.write_start_of_image()?;
    write_segments(document, &mut writer)?;
    writer.write_end_of_image()?;
    writer.flush()?;
    tracing::debug!(bytes = writer.len(), "metadata serialized");
    Ok(writer.into_inner())
}

/// Writes every segment of `document` without SOI/EOI framing.
pub fn write_segments<W: Write>(
    document: &MetadataDocument,
    writer: &mut JpegStreamWriter<W>,
) -> Result<()> {
    for segment in document.segments() {
        segment.write_to(writer)?;
    }
    Ok(())
}

/// Adjustments applied by [`write_image_header`].
#[derive(Debug, Clone, Default)]
pub struct HeaderWriteOptions {
    /// Leave out the JFIF segment (and with it any JFXX and ICC segments).
    pub ignore_jfif: bool,
    /// Write a default JFIF segment when the document has none.
    pub force_jfif: bool,
    /// Leave out the Adobe segment.
    pub ignore_adobe: bool,
    /// Write the Adobe segment with this transform instead of its own.
    pub adobe_transform: Option<AdobeTransform>,
    /// Profile written in place of the JFIF segment's own ICC profile.
    pub icc_profile: Option<Vec<u8>>,
}

/// Writes the header part of an image: SOI, then the JFIF group, Adobe, COM
/// and unknown segments in document order.
///
/// DQT, DHT, DRI, SOF and SOS are never written here. The pixel codec emits
/// them while it encodes, from the tables and component specs it is handed,
/// so writing them here would duplicate them in the output.
pub fn write_image_header<W: Write>(
    document: &MetadataDocument,
    options: &HeaderWriteOptions,
    writer: &mut JpegStreamWriter<W>,
    sink: &mut dyn WarningSink,
) -> Result<()> {
    writer.write_start_of_image()?;

    let override_icc = options.icc_profile.as_ref().map(|profile| IccSegment::new(profile.clone()));
    let mut wrote_jfif = false;
    if !options.ignore_jfif {
        let jfif = match document.jfif() {
            Some(existing) => Some(existing.clone()),
            None if options.force_jfif => Some(JfifSegment::default()),
            None => None,
        };
        if let Some(mut jfif) = jfif {
            if override_icc.is_some() {
                jfif.icc = override_icc;
            }
            jfif.write_to(writer)?;
            wrote_jfif = true;
        }
    }

    for segment in document.segments() {
        match segment {
            MarkerSegment::Jfif(_) => {}
            MarkerSegment::Adobe(adobe) => {
                if options.ignore_adobe {
                    continue;
                }
                let mut adobe = adobe.clone();
                if let Some(transform) = options.adobe_transform {
                    adobe.transform = transform;
                }
                if wrote_jfif && !adobe.is_compatible_with_jfif(document.sof()) {
                    sink.warning(MetadataWarning::MetadataAdjustedForThumbnail);
                    continue;
                }
                adobe.write_to(writer)?;
            }
            MarkerSegment::Com(_) | MarkerSegment::Unknown(_) => segment.write_to(writer)?,
            _ => {}
        }
    }
    Ok(())
}
