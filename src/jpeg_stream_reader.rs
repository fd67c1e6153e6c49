//! Marker-sequence parser.
//!
//! Drives a [`ByteCursor`] from SOI to EOI, dispatching each marker to its
//! segment type. APP0, APP2 and APP14 payloads are sniffed by identifier;
//! unrecognised application data is kept as opaque segments. ICC chunks are
//! collected until the profile is complete and then attached to the JFIF
//! segment, as are JFXX extensions.

use crate::byte_cursor::{ByteCursor, ScanOutcome};
use crate::constants::{ADOBE_IDENTIFIER, ICC_IDENTIFIER, JFIF_IDENTIFIER, JFXX_IDENTIFIER};
use crate::document::{DocumentKind, MetadataDocument};
use crate::error::{MetadataError, Result};
use crate::jpeg_marker_code::{JPEG_MARKER_START_BYTE, JpegMarkerCode};
use crate::segments::{
    IccChunk, IccChunkAssembler, JfxxSegment, MarkerSegment, SegmentCodec, SegmentHeader,
};
use crate::warning::{MetadataWarning, WarningSink};
use std::io::{Cursor, Read, Seek};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JpegStreamReaderState {
    BeforeStartOfImage,
    MarkerSection,
    EndOfImage,
}

/// What an application segment turned out to be after sniffing its
/// identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ApplicationKind {
    Jfif,
    Jfxx,
    Icc,
    Adobe,
    Other,
}

pub struct JpegStreamReader<'s, R> {
    cursor: ByteCursor<R>,
    kind: DocumentKind,
    sink: &'s mut dyn WarningSink,
    state: JpegStreamReaderState,
    segments: Vec<MarkerSegment>,
    pending_icc: Option<IccChunkAssembler>,
}

impl<'s, R: Read + Seek> JpegStreamReader<'s, R> {
    pub fn new(source: R, kind: DocumentKind, sink: &'s mut dyn WarningSink) -> Result<Self> {
        Ok(Self {
            cursor: ByteCursor::new(source)?,
            kind,
            sink,
            state: JpegStreamReaderState::BeforeStartOfImage,
            segments: Vec::new(),
            pending_icc: None,
        })
    }

    pub fn state(&self) -> JpegStreamReaderState {
        self.state
    }

    /// Parses through EOI and returns the checked document together with
    /// the source, positioned just past the EOI marker.
    pub fn read_metadata(mut self) -> Result<(MetadataDocument, R)> {
        self.read_start_of_image()?;
        while self.state == JpegStreamReaderState::MarkerSection {
            let tag = self.read_next_marker_tag()?;
            self.read_marker_segment(tag)?;
        }

        if let Some(assembler) = self.pending_icc.take() {
            // Surfaces the first missing chunk index.
            assembler.assemble()?;
        }
        self.cursor.push_back_unconsumed()?;

        let document = MetadataDocument::from_segments(self.kind, self.segments).map_err(|e| {
            tracing::debug!(error = %e, "parsed sequence failed consistency check");
            MetadataError::format("Inconsistent metadata read from stream")
        })?;
        Ok((document, self.cursor.into_inner()))
    }

    fn read_start_of_image(&mut self) -> Result<()> {
        let start = self.cursor.peek_up_to(3)?;
        let soi: u8 = JpegMarkerCode::StartOfImage.into();
        if start != [JPEG_MARKER_START_BYTE, soi, JPEG_MARKER_START_BYTE] {
            return Err(MetadataError::format("not a JPEG stream: missing SOI marker"));
        }
        self.cursor.skip(2)?;
        self.state = JpegStreamReaderState::MarkerSection;
        Ok(())
    }

    fn read_next_marker_tag(&mut self) -> Result<u8> {
        if self.cursor.scan_to_marker_prefix()? == ScanOutcome::ImplicitEndOfImage {
            self.sink.warning(MetadataWarning::ImplicitEndOfImage);
        }
        self.cursor.read_u8()
    }

    fn read_segment_header(&mut self, tag: u8) -> Result<SegmentHeader> {
        let length = self.cursor.read_u16()? as usize;
        if length < 2 {
            return Err(MetadataError::format(format!(
                "invalid segment length {} for marker 0x{:02X}",
                length, tag
            )));
        }
        Ok(SegmentHeader {
            tag,
            length: length - 2,
            payload_offset: self.cursor.stream_position(),
        })
    }

    fn reject_in_stream(&self, what: &str) -> Result<()> {
        if self.kind == DocumentKind::Stream {
            return Err(MetadataError::format(format!(
                "{} not permitted in stream metadata",
                what
            )));
        }
        Ok(())
    }

    fn read_marker_segment(&mut self, tag: u8) -> Result<()> {
        let Ok(marker) = JpegMarkerCode::try_from(tag) else {
            let header = self.read_segment_header(tag)?;
            return self.read_segment(&header, MarkerSegment::Unknown);
        };

        match marker {
            JpegMarkerCode::StuffedZero => Ok(()),
            marker if marker.is_restart() => Ok(()),
            JpegMarkerCode::StartOfImage => {
                Err(MetadataError::format("unexpected SOI marker inside the stream"))
            }
            JpegMarkerCode::EndOfImage => {
                self.state = JpegStreamReaderState::EndOfImage;
                Ok(())
            }
            JpegMarkerCode::StartOfFrameBaseline
            | JpegMarkerCode::StartOfFrameExtended
            | JpegMarkerCode::StartOfFrameProgressive => {
                self.reject_in_stream("SOF")?;
                let header = self.read_segment_header(tag)?;
                self.read_segment(&header, MarkerSegment::Sof)
            }
            JpegMarkerCode::StartOfScan => {
                self.reject_in_stream("SOS")?;
                let header = self.read_segment_header(tag)?;
                // Entropy-coded data follows; the next marker scan skips it.
                self.read_segment(&header, MarkerSegment::Sos)
            }
            JpegMarkerCode::DefineQuantizationTable => {
                let header = self.read_segment_header(tag)?;
                self.read_segment(&header, MarkerSegment::Dqt)
            }
            JpegMarkerCode::DefineHuffmanTable => {
                let header = self.read_segment_header(tag)?;
                self.read_segment(&header, MarkerSegment::Dht)
            }
            JpegMarkerCode::DefineRestartInterval => {
                let header = self.read_segment_header(tag)?;
                self.read_segment(&header, MarkerSegment::Dri)
            }
            JpegMarkerCode::Comment => {
                let header = self.read_segment_header(tag)?;
                self.read_segment(&header, MarkerSegment::Com)
            }
            JpegMarkerCode::ApplicationData0
            | JpegMarkerCode::ApplicationData2
            | JpegMarkerCode::ApplicationData14 => {
                let header = self.read_segment_header(tag)?;
                self.read_application_segment(marker, header)
            }
            _ => {
                let header = self.read_segment_header(tag)?;
                self.read_segment(&header, MarkerSegment::Unknown)
            }
        }
    }

    fn sniff(&mut self, marker: JpegMarkerCode, header: &SegmentHeader) -> Result<ApplicationKind> {
        let identifier = self.cursor.peek_up_to(ICC_IDENTIFIER.len().min(header.length))?;
        let starts = |id: &[u8]| identifier.starts_with(id);
        Ok(match marker {
            JpegMarkerCode::ApplicationData0 if starts(&JFIF_IDENTIFIER[..]) => ApplicationKind::Jfif,
            JpegMarkerCode::ApplicationData0 if starts(&JFXX_IDENTIFIER[..]) => ApplicationKind::Jfxx,
            JpegMarkerCode::ApplicationData2 if starts(&ICC_IDENTIFIER[..]) => ApplicationKind::Icc,
            JpegMarkerCode::ApplicationData14 if starts(&ADOBE_IDENTIFIER[..]) => ApplicationKind::Adobe,
            _ => ApplicationKind::Other,
        })
    }

    fn read_application_segment(&mut self, marker: JpegMarkerCode, header: SegmentHeader) -> Result<()> {
        match self.sniff(marker, &header)? {
            ApplicationKind::Jfif => self.read_jfif(&header),
            ApplicationKind::Jfxx => self.read_jfxx(&header),
            ApplicationKind::Icc => self.read_icc_chunk(&header),
            ApplicationKind::Adobe => {
                self.reject_in_stream("Adobe APP14")?;
                self.read_segment(&header, MarkerSegment::Adobe)
            }
            ApplicationKind::Other => {
                self.read_segment(&header, MarkerSegment::Unknown)
            }
        }
    }

    fn read_jfif(&mut self, header: &SegmentHeader) -> Result<()> {
        if self.kind == DocumentKind::Thumbnail {
            self.sink.warning(MetadataWarning::JfifInThumbnailIgnored);
            return self.cursor.skip(header.length);
        }
        self.reject_in_stream("JFIF APP0")?;
        if !self.segments.is_empty() {
            return Err(MetadataError::format("JFIF APP0 must be first marker after SOI"));
        }
        self.read_segment(header, MarkerSegment::Jfif)
    }

    fn read_jfxx(&mut self, header: &SegmentHeader) -> Result<()> {
        self.reject_in_stream("JFXX APP0")?;
        if self.kind == DocumentKind::Thumbnail {
            return Err(MetadataError::format(
                "JFXX markers not allowed in JFIF JPEG thumbnail",
            ));
        }
        if !matches!(self.segments.first(), Some(MarkerSegment::Jfif(_))) {
            return Err(MetadataError::format("JFXX encountered without prior JFIF"));
        }
        let payload = self.cursor.read_exact(header.length)?;
        let extension = JfxxSegment::parse(header, &payload, &mut *self.sink)?;
        tracing::debug!(code = extension.extension_code(), "parsed JFXX extension");
        if let Some(MarkerSegment::Jfif(jfif)) = self.segments.first_mut() {
            jfif.extensions.push(extension);
        }
        Ok(())
    }

    fn read_icc_chunk(&mut self, header: &SegmentHeader) -> Result<()> {
        self.reject_in_stream("ICC APP2")?;
        let has_jfif = matches!(self.segments.first(), Some(MarkerSegment::Jfif(_)));
        if !has_jfif {
            return self.read_segment(header, MarkerSegment::Unknown);
        }

        let payload = self.cursor.read_exact(header.length)?;
        let chunk = IccChunk::parse(&payload)?;
        tracing::debug!(index = chunk.index, count = chunk.count, "parsed ICC chunk");
        let Some(MarkerSegment::Jfif(jfif)) = self.segments.first_mut() else {
            return Ok(());
        };
        if jfif.icc.is_some() {
            return Err(MetadataError::format("> 1 ICC APP2 Marker Segment not supported"));
        }

        let assembler = match self.pending_icc.take() {
            Some(mut assembler) => {
                assembler.add(chunk)?;
                assembler
            }
            None => IccChunkAssembler::new(chunk, header.origin()),
        };
        if assembler.is_complete() {
            jfif.icc = Some(assembler.assemble()?);
        } else {
            self.pending_icc = Some(assembler);
        }
        Ok(())
    }

    fn read_segment<S: SegmentCodec>(
        &mut self,
        header: &SegmentHeader,
        wrap: fn(S) -> MarkerSegment,
    ) -> Result<()> {
        let segment = S::read(&mut self.cursor, header)?;
        self.push(wrap(segment))
    }

    fn push(&mut self, segment: MarkerSegment) -> Result<()> {
        tracing::debug!(
            kind = ?segment.kind(),
            tag = segment.tag(),
            offset = segment.origin().stream_offset(),
            "parsed marker segment"
        );
        self.segments.push(segment);
        Ok(())
    }
}

/// Parses a marker sequence from `source` and leaves the source positioned
/// just past EOI, where the pixel codec takes over.
pub fn parse_metadata<R: Read + Seek>(
    source: &mut R,
    is_stream: bool,
    sink: &mut dyn WarningSink,
) -> Result<MetadataDocument> {
    let kind = if is_stream {
        DocumentKind::Stream
    } else {
        DocumentKind::Image
    };
    let reader = JpegStreamReader::new(source, kind, sink)?;
    let (document, _) = reader.read_metadata()?;
    Ok(document)
}

/// Parses the marker sequence of a JPEG-compressed thumbnail held in memory.
pub fn parse_thumbnail_metadata(data: &[u8], sink: &mut dyn WarningSink) -> Result<MetadataDocument> {
    let reader = JpegStreamReader::new(Cursor::new(data), DocumentKind::Thumbnail, sink)?;
    let (document, _) = reader.read_metadata()?;
    Ok(document)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::warning::CollectWarnings;

    fn parse(bytes: &[u8]) -> Result<(MetadataDocument, Vec<MetadataWarning>)> {
        let mut sink = CollectWarnings::default();
        let document = parse_metadata(&mut Cursor::new(bytes.to_vec()), false, &mut sink)?;
        Ok((document, sink.warnings))
    }

    #[test]
    fn test_missing_soi_rejected() {
        assert!(parse(&[0xFF, 0xD9]).unwrap_err().is_format_error());
        assert!(parse(&[0xFF, 0xD8, 0x00]).unwrap_err().is_format_error());
    }

    #[test]
    fn test_comment_and_unknown_kept_in_order() {
        let bytes = [
            0xFF, 0xD8, 0xFF, 0xE1, 0x00, 0x04, 0xAB, 0xCD, 0xFF, 0xFE, 0x00, 0x03, b'x', 0xFF,
            0xD9,
        ];
        let (document, warnings) = parse(&bytes).unwrap();
        assert!(warnings.is_empty());
        assert!(matches!(
            document.segments(),
            [MarkerSegment::Unknown(u), MarkerSegment::Com(c)]
                if u.tag == 0xE1 && u.data == [0xAB, 0xCD] && c.data == b"x"
        ));
    }

    #[test]
    fn test_jfif_not_first_rejected() {
        let mut bytes = vec![0xFF, 0xD8, 0xFF, 0xFE, 0x00, 0x03, b'x', 0xFF, 0xE0, 0x00, 0x10];
        bytes.extend(b"JFIF\0\x01\x02\x00\x00\x01\x00\x01\x00\x00");
        bytes.extend([0xFF, 0xD9]);
        let err = parse(&bytes).unwrap_err();
        assert!(err.to_string().contains("must be first"));
    }

    #[test]
    fn test_stream_rejects_frame_header() {
        let bytes = [
            0xFF, 0xD8, 0xFF, 0xC0, 0x00, 0x0B, 8, 0, 1, 0, 1, 1, 1, 0x11, 0, 0xFF, 0xD9,
        ];
        let mut sink = CollectWarnings::default();
        let err = parse_metadata(&mut Cursor::new(bytes.to_vec()), true, &mut sink).unwrap_err();
        assert!(err.is_format_error());
        assert!(parse(&bytes).is_ok());
    }

    #[test]
    fn test_jfxx_without_jfif_rejected() {
        let mut bytes = vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x0A];
        bytes.extend(b"JFXX\0\x13\x00\x00");
        bytes.extend([0xFF, 0xD9]);
        assert!(parse(&bytes).unwrap_err().to_string().contains("without prior JFIF"));
    }

    #[test]
    fn test_source_left_after_eoi() {
        let bytes = vec![0xFF, 0xD8, 0xFF, 0xD9, 0x42];
        let mut source = Cursor::new(bytes);
        let mut sink = CollectWarnings::default();
        parse_metadata(&mut source, false, &mut sink).unwrap();
        assert_eq!(source.position(), 4);
    }

    #[test]
    fn test_inconsistent_sequence_is_format_error() {
        let bytes = [
            0xFF, 0xD8, 0xFF, 0xC0, 0x00, 0x0B, 8, 0, 1, 0, 1, 1, 1, 0x11, 0, 0xFF, 0xDA, 0x00,
            0x0A, 2, 1, 0x00, 2, 0x11, 0, 63, 0, 0xFF, 0xD9,
        ];
        let err = parse(&bytes).unwrap_err();
        assert!(err.is_format_error());
        assert!(err.to_string().contains("Inconsistent metadata"));
    }

    #[test]
    fn test_entropy_data_and_restarts_skipped() {
        let bytes = [
            0xFF, 0xD8, 0xFF, 0xC0, 0x00, 0x0B, 8, 0, 1, 0, 1, 1, 1, 0x11, 0, 0xFF, 0xDA, 0x00,
            0x08, 1, 1, 0x00, 0, 63, 0, 0x12, 0xFF, 0x00, 0x34, 0xFF, 0xD0, 0x56, 0xFF, 0xD9,
        ];
        let (document, _) = parse(&bytes).unwrap();
        assert_eq!(document.len(), 2);
    }
}
