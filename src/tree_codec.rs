//! Conversion between a [`MetadataDocument`] and its native tree.
//!
//! Image documents render as `jpeg_image_metadata` with two children: a
//! `JPEGvariety` node holding the JFIF sub-tree (if any) and a
//! `markerSequence` node holding every other segment in order. Stream
//! documents put the marker nodes directly under `jpeg_stream_metadata`,
//! and thumbnail documents are a bare `markerSequence`.

use crate::document::{DocumentKind, MetadataDocument};
use crate::error::{MetadataError, Result};
use crate::segments::{JfifSegment, MarkerSegment, SegmentCodec};
use crate::tree::TreeNode;
use std::fmt;
use std::str::FromStr;

pub const VARIETY_NODE_NAME: &str = "JPEGvariety";
pub const SEQUENCE_NODE_NAME: &str = "markerSequence";
pub const STANDARD_ROOT_NAME: &str = "standard_metadata";

/// The two tree projections of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeFormat {
    Native,
    Standard,
}

impl TreeFormat {
    /// Root node name of this format for a document of `kind`.
    pub fn root_name(self, kind: DocumentKind) -> &'static str {
        match self {
            Self::Native => kind.native_root_name(),
            Self::Standard => STANDARD_ROOT_NAME,
        }
    }

    /// Fails when the format has no projection for `kind`.
    pub fn check_supported(self, kind: DocumentKind) -> Result<()> {
        if self == Self::Standard && kind != DocumentKind::Image {
            return Err(MetadataError::UnsupportedFormatName(format!(
                "{} is not available for {:?} metadata",
                STANDARD_ROOT_NAME, kind
            )));
        }
        Ok(())
    }
}

impl fmt::Display for TreeFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Native => write!(f, "native"),
            Self::Standard => write!(f, "standard"),
        }
    }
}

impl FromStr for TreeFormat {
    type Err = MetadataError;

    fn from_str(name: &str) -> Result<Self> {
        match name {
            "native" | "jpeg_image_metadata" | "jpeg_stream_metadata" => Ok(Self::Native),
            "standard" | STANDARD_ROOT_NAME => Ok(Self::Standard),
            other => Err(MetadataError::UnsupportedFormatName(other.to_string())),
        }
    }
}

pub fn to_native_tree(document: &MetadataDocument) -> TreeNode {
    let mut segments = document.segments().iter().peekable();
    match document.kind() {
        DocumentKind::Stream => {
            let mut root = TreeNode::new(document.kind().native_root_name());
            for segment in segments {
                root.append_child(segment.to_native_node());
            }
            root
        }
        DocumentKind::Thumbnail => {
            let mut sequence = TreeNode::new(SEQUENCE_NODE_NAME);
            for segment in segments {
                sequence.append_child(segment.to_native_node());
            }
            sequence
        }
        DocumentKind::Image => {
            let mut variety = TreeNode::new(VARIETY_NODE_NAME);
            if let Some(MarkerSegment::Jfif(jfif)) = segments.peek() {
                variety.append_child(jfif.to_native_node());
                segments.next();
            }
            let mut sequence = TreeNode::new(SEQUENCE_NODE_NAME);
            for segment in segments {
                sequence.append_child(segment.to_native_node());
            }
            TreeNode::new(document.kind().native_root_name())
                .with_child(variety)
                .with_child(sequence)
        }
    }
}

/// Splits an image root into its variety and sequence nodes.
pub(crate) fn image_root_parts(root: &TreeNode) -> Result<(&TreeNode, &TreeNode)> {
    let [variety, sequence] = root.children.as_slice() else {
        return Err(root.invalid("JPEGvariety and markerSequence nodes must be present"));
    };
    variety.expect_name(VARIETY_NODE_NAME)?;
    sequence.expect_name(SEQUENCE_NODE_NAME)?;
    if variety.children.len() > 1 {
        return Err(variety.invalid("JPEGvariety holds at most one app0JFIF node"));
    }
    Ok((variety, sequence))
}

/// The node whose children are the marker entries of a document of `kind`.
pub(crate) fn sequence_node(kind: DocumentKind, root: &TreeNode) -> Result<&TreeNode> {
    root.expect_name(kind.native_root_name())?;
    match kind {
        DocumentKind::Image => Ok(image_root_parts(root)?.1),
        DocumentKind::Stream | DocumentKind::Thumbnail => Ok(root),
    }
}

/// Builds a whole new document from a native tree.
pub fn from_native_tree(kind: DocumentKind, root: &TreeNode) -> Result<MetadataDocument> {
    root.expect_name(kind.native_root_name())?;
    let mut segments = Vec::new();
    if kind == DocumentKind::Image {
        let (variety, _) = image_root_parts(root)?;
        if let Some(jfif_node) = variety.first_child() {
            segments.push(MarkerSegment::Jfif(JfifSegment::from_native_node(jfif_node)?));
        }
    }
    for child in &sequence_node(kind, root)?.children {
        segments.push(MarkerSegment::from_sequence_node(child)?);
    }
    MetadataDocument::from_segments(kind, segments)
}

/// Replaces the contents of `document` with the sequence described by
/// `root`. The document is left untouched when the tree is rejected.
pub fn replace_from_tree(document: &mut MetadataDocument, root: &TreeNode) -> Result<()> {
    let rebuilt = from_native_tree(document.kind(), root)?;
    tracing::debug!(segments = rebuilt.len(), "replaced document from native tree");
    document.commit(rebuilt.segments().to_vec());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segments::{
        AdobeSegment, AdobeTransform, ComSegment, DqtSegment, DriSegment, UnknownSegment,
    };
    use crate::tables::luminance_quant_table;

    fn image_document() -> MetadataDocument {
        MetadataDocument::from_segments(
            DocumentKind::Image,
            vec![
                MarkerSegment::Jfif(JfifSegment::default()),
                MarkerSegment::Com(ComSegment::from_text("hello")),
                MarkerSegment::Dqt(DqtSegment::new(vec![luminance_quant_table(75)])),
                MarkerSegment::Unknown(UnknownSegment::new(0xE1, vec![1, 2, 3])),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_image_tree_shape() {
        let tree = to_native_tree(&image_document());
        assert_eq!(tree.name, "jpeg_image_metadata");
        assert_eq!(tree.children.len(), 2);
        assert_eq!(tree.children[0].children[0].name, "app0JFIF");
        let names: Vec<_> = tree.children[1].children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["com", "dqt", "unknown"]);
    }

    #[test]
    fn test_native_round_trip() {
        let document = image_document();
        let rebuilt = from_native_tree(DocumentKind::Image, &to_native_tree(&document)).unwrap();
        assert_eq!(rebuilt, document);
    }

    #[test]
    fn test_stream_tree_is_flat() {
        let document = MetadataDocument::from_segments(
            DocumentKind::Stream,
            vec![MarkerSegment::Dri(DriSegment::new(4))],
        )
        .unwrap();
        let tree = to_native_tree(&document);
        assert_eq!(tree.name, "jpeg_stream_metadata");
        assert_eq!(tree.children[0].name, "dri");
        assert_eq!(from_native_tree(DocumentKind::Stream, &tree).unwrap(), document);
    }

    #[test]
    fn test_schema_violations_rejected() {
        let missing_sequence = TreeNode::new("jpeg_image_metadata").with_child(TreeNode::new(VARIETY_NODE_NAME));
        assert!(from_native_tree(DocumentKind::Image, &missing_sequence).unwrap_err().is_invalid_tree());

        let wrong_root = TreeNode::new("jpeg_stream_metadata");
        assert!(from_native_tree(DocumentKind::Image, &wrong_root).unwrap_err().is_invalid_tree());

        let bad_child = TreeNode::new("jpeg_image_metadata")
            .with_child(TreeNode::new(VARIETY_NODE_NAME))
            .with_child(TreeNode::new(SEQUENCE_NODE_NAME).with_child(TreeNode::new("app0JFIF")));
        assert!(from_native_tree(DocumentKind::Image, &bad_child).unwrap_err().is_invalid_tree());
    }

    #[test]
    fn test_replace_keeps_document_on_failure() {
        let mut document = image_document();
        let before = document.clone();
        let stream_only = TreeNode::new("jpeg_stream_metadata");
        assert!(replace_from_tree(&mut document, &stream_only).is_err());
        assert_eq!(document, before);
        assert!(!document.is_modified());

        let adobe_only = TreeNode::new("jpeg_image_metadata")
            .with_child(TreeNode::new(VARIETY_NODE_NAME))
            .with_child(
                TreeNode::new(SEQUENCE_NODE_NAME)
                    .with_child(AdobeSegment::new(AdobeTransform::Unknown).to_native_node()),
            );
        replace_from_tree(&mut document, &adobe_only).unwrap();
        assert_eq!(document.len(), 1);
        document.reset();
        assert_eq!(document, before);
    }

    #[test]
    fn test_format_names() {
        assert_eq!("native".parse::<TreeFormat>().unwrap(), TreeFormat::Native);
        assert!("javax".parse::<TreeFormat>().is_err());
        assert!(TreeFormat::Standard.check_supported(DocumentKind::Stream).is_err());
    }
}
