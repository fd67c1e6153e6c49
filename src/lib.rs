//! JPEG marker-segment metadata.
//!
//! Parses the markers around JPEG compressed data (JFIF, JFXX thumbnails,
//! ICC profiles, Adobe, tables, frame and scan headers, comments) into a
//! [`MetadataDocument`], exposes it as a native or standard attribute tree,
//! merges edited trees back with rollback on failure, and writes the
//! sequence out again. Pixel coding stays behind [`codec::PixelCodec`].

pub mod byte_cursor;
pub mod codec;
pub mod constants;
pub mod defaults;
pub mod document;
pub mod error;
pub mod jpeg_marker_code;
pub mod jpeg_stream_reader;
pub mod jpeg_stream_writer;
pub mod merge;
pub mod segments;
pub mod session;
pub mod standard_merge;
pub mod standard_tree;
pub mod tables;
pub mod tree;
pub mod tree_codec;
pub mod warning;

pub use defaults::{
    EncodeParams, LayoutColorSpace, PixelLayout, default_destination_metadata,
    default_image_metadata, default_image_metadata_with, default_stream_metadata,
};
pub use document::{DocumentKind, MetadataDocument};
pub use error::{ErrorKind, MetadataError, Result};
pub use jpeg_stream_reader::{parse_metadata, parse_thumbnail_metadata};
pub use jpeg_stream_writer::{HeaderWriteOptions, serialize_metadata, write_image_header};
pub use segments::{MarkerSegment, SegmentKind};
pub use session::MetadataSession;
pub use tables::TableSet;
pub use tree::{TreeNode, UserObject};
pub use tree_codec::{TreeFormat, from_native_tree, replace_from_tree};
pub use warning::{CollectWarnings, LogWarnings, MetadataWarning, WarningSink};

/// Projects `document` into a tree of the given format.
pub fn to_tree(document: &MetadataDocument, format: TreeFormat) -> Result<TreeNode> {
    match format {
        TreeFormat::Native => Ok(tree_codec::to_native_tree(document)),
        TreeFormat::Standard => standard_tree::to_standard_tree(document),
    }
}

/// Merges `root` into `document`. On any error the document keeps the
/// sequence it had before the call.
pub fn merge_tree(document: &mut MetadataDocument, root: &TreeNode, format: TreeFormat) -> Result<()> {
    format.check_supported(document.kind())?;
    let expected = format.root_name(document.kind());
    if root.name != expected {
        return Err(MetadataError::invalid_tree(
            root.name.clone(),
            format!("Root must be {}", expected),
        ));
    }
    match format {
        TreeFormat::Native => merge::merge_native_tree(document, root),
        TreeFormat::Standard => standard_merge::merge_standard_tree(document, root),
    }
}
