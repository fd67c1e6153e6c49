//! The metadata document: an ordered marker sequence plus the rules that
//! keep it consistent.

use crate::error::{MetadataError, Result};
use crate::segments::{
    AdobeSegment, AdobeTransform, ComSegment, DhtSegment, DqtSegment, IccSegment, JfifSegment,
    MarkerSegment, SegmentKind, SofSegment, SosSegment, Thumbnail,
};
use std::collections::BTreeSet;

/// Which marker set a document may hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    /// Full image metadata.
    Image,
    /// Tables-only metadata shared across images: no JFIF, Adobe, SOF or SOS.
    Stream,
    /// The marker sequence inside a JPEG-compressed JFIF thumbnail. Like an
    /// image, but never with a JFIF header of its own.
    Thumbnail,
}

impl DocumentKind {
    /// Root node name in the native tree.
    pub fn native_root_name(self) -> &'static str {
        match self {
            Self::Image => "jpeg_image_metadata",
            Self::Stream => "jpeg_stream_metadata",
            Self::Thumbnail => "markerSequence",
        }
    }
}

#[derive(Debug, Clone)]
pub struct MetadataDocument {
    kind: DocumentKind,
    segments: Vec<MarkerSegment>,
    // Sequence as it was before the first tree edit, restored by `reset`.
    original: Option<Vec<MarkerSegment>>,
}

impl PartialEq for MetadataDocument {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.segments == other.segments
    }
}

impl MetadataDocument {
    pub fn new(kind: DocumentKind) -> Self {
        Self {
            kind,
            segments: Vec::new(),
            original: None,
        }
    }

    /// Builds a document from a ready-made sequence, rejecting it when the
    /// sequence breaks a consistency rule.
    pub fn from_segments(kind: DocumentKind, segments: Vec<MarkerSegment>) -> Result<Self> {
        let document = Self {
            kind,
            segments,
            original: None,
        };
        document.check_consistency()?;
        Ok(document)
    }

    pub fn kind(&self) -> DocumentKind {
        self.kind
    }

    pub fn is_stream(&self) -> bool {
        self.kind == DocumentKind::Stream
    }

    pub fn is_thumbnail(&self) -> bool {
        self.kind == DocumentKind::Thumbnail
    }

    pub fn segments(&self) -> &[MarkerSegment] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub(crate) fn segments_mut(&mut self) -> &mut Vec<MarkerSegment> {
        &mut self.segments
    }

    pub fn first_position(&self, kind: SegmentKind) -> Option<usize> {
        self.segments.iter().position(|segment| segment.kind() == kind)
    }

    pub fn last_position(&self, kind: SegmentKind) -> Option<usize> {
        self.segments.iter().rposition(|segment| segment.kind() == kind)
    }

    pub fn count(&self, kind: SegmentKind) -> usize {
        self.segments.iter().filter(|segment| segment.kind() == kind).count()
    }

    pub fn jfif(&self) -> Option<&JfifSegment> {
        self.segments.iter().find_map(|segment| match segment {
            MarkerSegment::Jfif(jfif) => Some(jfif),
            _ => None,
        })
    }

    pub fn jfif_mut(&mut self) -> Option<&mut JfifSegment> {
        self.segments.iter_mut().find_map(|segment| match segment {
            MarkerSegment::Jfif(jfif) => Some(jfif),
            _ => None,
        })
    }

    pub fn adobe(&self) -> Option<&AdobeSegment> {
        self.segments.iter().find_map(|segment| match segment {
            MarkerSegment::Adobe(adobe) => Some(adobe),
            _ => None,
        })
    }

    pub fn adobe_mut(&mut self) -> Option<&mut AdobeSegment> {
        self.segments.iter_mut().find_map(|segment| match segment {
            MarkerSegment::Adobe(adobe) => Some(adobe),
            _ => None,
        })
    }

    pub fn sof(&self) -> Option<&SofSegment> {
        self.segments.iter().find_map(|segment| match segment {
            MarkerSegment::Sof(sof) => Some(sof),
            _ => None,
        })
    }

    pub fn sof_mut(&mut self) -> Option<&mut SofSegment> {
        self.segments.iter_mut().find_map(|segment| match segment {
            MarkerSegment::Sof(sof) => Some(sof),
            _ => None,
        })
    }

    pub fn scans(&self) -> impl Iterator<Item = &SosSegment> {
        self.segments.iter().filter_map(|segment| match segment {
            MarkerSegment::Sos(sos) => Some(sos),
            _ => None,
        })
    }

    pub fn comments(&self) -> impl Iterator<Item = &ComSegment> {
        self.segments.iter().filter_map(|segment| match segment {
            MarkerSegment::Com(com) => Some(com),
            _ => None,
        })
    }

    pub fn quantization_segments(&self) -> impl Iterator<Item = &DqtSegment> {
        self.segments.iter().filter_map(|segment| match segment {
            MarkerSegment::Dqt(dqt) => Some(dqt),
            _ => None,
        })
    }

    pub fn huffman_segments(&self) -> impl Iterator<Item = &DhtSegment> {
        self.segments.iter().filter_map(|segment| match segment {
            MarkerSegment::Dht(dht) => Some(dht),
            _ => None,
        })
    }

    pub fn icc_profile(&self) -> Option<&IccSegment> {
        self.jfif().and_then(|jfif| jfif.icc.as_ref())
    }

    /// JFXX thumbnails in stream order. The RGB thumbnail embedded in the
    /// JFIF header itself comes first when present.
    pub fn thumbnails(&self) -> Vec<Thumbnail> {
        let Some(jfif) = self.jfif() else {
            return Vec::new();
        };
        jfif.thumbnail
            .iter()
            .cloned()
            .map(Thumbnail::Rgb)
            .chain(jfif.extensions.iter().map(|extension| extension.thumbnail.clone()))
            .collect()
    }

    /// Number of distinct component selectors referenced by all scans.
    pub fn scan_band_count(&self) -> usize {
        self.scans()
            .flat_map(|sos| sos.selectors())
            .collect::<BTreeSet<_>>()
            .len()
    }

    /// Describes the first consistency rule the sequence breaks.
    pub fn consistency_violation(&self) -> Option<String> {
        let jfif_count = self.count(SegmentKind::Jfif);
        if jfif_count > 1 {
            return Some("more than one JFIF segment".to_string());
        }
        if jfif_count == 1 && self.first_position(SegmentKind::Jfif) != Some(0) {
            return Some("JFIF segment is not the first segment".to_string());
        }

        match self.kind {
            DocumentKind::Stream => {
                for kind in [SegmentKind::Jfif, SegmentKind::Adobe, SegmentKind::Sof, SegmentKind::Sos] {
                    if self.count(kind) > 0 {
                        return Some(format!("{:?} segment in stream metadata", kind));
                    }
                }
                None
            }
            DocumentKind::Thumbnail if jfif_count > 0 => {
                Some("JFIF segment inside a thumbnail".to_string())
            }
            DocumentKind::Image | DocumentKind::Thumbnail => self.image_violation(),
        }
    }

    fn image_violation(&self) -> Option<String> {
        if self.count(SegmentKind::Sof) > 1 {
            return Some("more than one SOF segment".to_string());
        }
        let sof = self.sof()?;
        let frame_bands = sof.components.len();
        let scan_bands = self.scan_band_count();
        if scan_bands != 0 && scan_bands != frame_bands {
            return Some(format!(
                "scans reference {} components but the frame has {}",
                scan_bands, frame_bands
            ));
        }
        if self.jfif().is_some() {
            if frame_bands != 1 && frame_bands != 3 {
                return Some(format!("JFIF does not allow {} components", frame_bands));
            }
            let sequential = sof
                .components
                .iter()
                .enumerate()
                .all(|(i, spec)| spec.component_id as usize == i + 1);
            if !sequential {
                return Some("JFIF requires component ids 1..N".to_string());
            }
            if let Some(adobe) = self.adobe() {
                let expected = if frame_bands == 1 {
                    AdobeTransform::Unknown
                } else {
                    AdobeTransform::YCbCr
                };
                if adobe.transform != expected {
                    return Some(format!(
                        "Adobe transform {:?} conflicts with JFIF for {} components",
                        adobe.transform, frame_bands
                    ));
                }
            }
        }
        None
    }

    pub fn is_consistent(&self) -> bool {
        self.consistency_violation().is_none()
    }

    /// Fails with an invalid-tree error naming the broken rule.
    pub fn check_consistency(&self) -> Result<()> {
        match self.consistency_violation() {
            Some(message) => Err(MetadataError::invalid_tree(
                self.kind.native_root_name(),
                message,
            )),
            None => Ok(()),
        }
    }

    /// Replaces the whole sequence after a successful edit, remembering the
    /// pre-edit sequence the first time.
    pub(crate) fn commit(&mut self, segments: Vec<MarkerSegment>) {
        if self.original.is_none() {
            self.original = Some(std::mem::take(&mut self.segments));
        }
        self.segments = segments;
    }

    /// True once a tree edit has been committed since construction or the
    /// last reset.
    pub fn is_modified(&self) -> bool {
        self.original.is_some()
    }

    /// Restores the sequence the document had before its first tree edit.
    pub fn reset(&mut self) {
        if let Some(original) = self.original.take() {
            self.segments = original;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segments::{FrameComponentSpec, FrameProcess, ScanComponentSpec};

    fn frame(ids: &[u8]) -> MarkerSegment {
        MarkerSegment::Sof(SofSegment::new(
            FrameProcess::Baseline,
            ids.iter().map(|&id| FrameComponentSpec::new(id, 1, 1, 0)).collect(),
        ))
    }

    fn scan(ids: &[u8]) -> MarkerSegment {
        MarkerSegment::Sos(SosSegment::new(
            ids.iter().map(|&id| ScanComponentSpec::new(id, 0, 0)).collect(),
        ))
    }

    #[test]
    fn test_jfif_must_be_first() {
        let segments = vec![
            MarkerSegment::Com(ComSegment::from_text("x")),
            MarkerSegment::Jfif(JfifSegment::default()),
        ];
        let err = MetadataDocument::from_segments(DocumentKind::Image, segments).unwrap_err();
        assert!(err.is_invalid_tree());
    }

    #[test]
    fn test_scan_bands_must_match_frame() {
        let ok = vec![frame(&[1, 2, 3]), scan(&[1]), scan(&[2, 3])];
        assert!(MetadataDocument::from_segments(DocumentKind::Image, ok).is_ok());
        let bad = vec![frame(&[1, 2, 3]), scan(&[1, 2])];
        assert!(MetadataDocument::from_segments(DocumentKind::Image, bad).is_err());
    }

    #[test]
    fn test_jfif_component_rules() {
        let two = vec![MarkerSegment::Jfif(JfifSegment::default()), frame(&[1, 2])];
        assert!(MetadataDocument::from_segments(DocumentKind::Image, two).is_err());
        let rgb = vec![MarkerSegment::Jfif(JfifSegment::default()), frame(&[b'R', b'G', b'B'])];
        assert!(MetadataDocument::from_segments(DocumentKind::Image, rgb).is_err());
        let adobe = vec![
            MarkerSegment::Jfif(JfifSegment::default()),
            MarkerSegment::Adobe(AdobeSegment::new(AdobeTransform::Unknown)),
            frame(&[1, 2, 3]),
        ];
        assert!(MetadataDocument::from_segments(DocumentKind::Image, adobe).is_err());
    }

    #[test]
    fn test_stream_forbids_frame_segments() {
        let segments = vec![frame(&[1])];
        assert!(MetadataDocument::from_segments(DocumentKind::Stream, segments).is_err());
        let comment = vec![MarkerSegment::Com(ComSegment::from_text("ok"))];
        assert!(MetadataDocument::from_segments(DocumentKind::Stream, comment).is_ok());
    }

    #[test]
    fn test_reset_restores_first_state() {
        let mut document = MetadataDocument::new(DocumentKind::Image);
        document.commit(vec![MarkerSegment::Com(ComSegment::from_text("a"))]);
        document.commit(vec![MarkerSegment::Com(ComSegment::from_text("b"))]);
        assert!(document.is_modified());
        document.reset();
        assert!(document.is_empty());
        assert!(!document.is_modified());
    }
}
