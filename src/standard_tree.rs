//! The format-neutral view of image metadata.

use crate::document::MetadataDocument;
use crate::error::Result;
use crate::segments::{AdobeTransform, DensityUnits};
use crate::tree::TreeNode;
use crate::tree_codec::{STANDARD_ROOT_NAME, TreeFormat};

/// Color space labels used by the `ColorSpaceType` node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorSpaceName {
    Gray,
    YCbCr,
    Rgb,
    Ycck,
    Cmyk,
    PhotoYcc,
}

impl ColorSpaceName {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Gray => "GRAY",
            Self::YCbCr => "YCbCr",
            Self::Rgb => "RGB",
            Self::Ycck => "YCCK",
            Self::Cmyk => "CMYK",
            Self::PhotoYcc => "PhotoYCC",
        }
    }
}

/// Result of classifying the frame components.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChromaInfo {
    /// `None` when an Adobe marker with transform 0 has neither 3 nor 4
    /// components; the node then carries no name.
    pub color_space: Option<ColorSpaceName>,
    pub channels: usize,
    pub has_alpha: bool,
}

/// Classifies the color space of `document`. Returns `None` without a
/// frame header.
pub fn chroma_info(document: &MetadataDocument) -> Option<ChromaInfo> {
    let sof = document.sof()?;
    let channels = sof.components.len();
    let info = |color_space, has_alpha| {
        Some(ChromaInfo {
            color_space,
            channels,
            has_alpha,
        })
    };

    if document.jfif().is_some() {
        let name = if channels == 1 {
            ColorSpaceName::Gray
        } else {
            ColorSpaceName::YCbCr
        };
        return info(Some(name), false);
    }

    if let Some(adobe) = document.adobe() {
        let name = match adobe.transform {
            AdobeTransform::Ycck => Some(ColorSpaceName::Ycck),
            AdobeTransform::YCbCr => Some(ColorSpaceName::YCbCr),
            AdobeTransform::Unknown => match channels {
                3 => Some(ColorSpaceName::Rgb),
                4 => Some(ColorSpaceName::Cmyk),
                _ => None,
            },
        };
        return info(name, false);
    }

    if channels < 3 {
        return info(Some(ColorSpaceName::Gray), channels == 2);
    }

    let ids = sof.component_ids();
    let fourth_is_alpha = ids.get(3) == Some(&b'A');
    if ids[..3] == [1, 2, 3] {
        return info(Some(ColorSpaceName::YCbCr), channels == 4);
    }
    if ids[..3] == *b"RGB" {
        return info(Some(ColorSpaceName::Rgb), fourth_is_alpha);
    }
    if ids[..3] == *b"YCc" {
        return info(Some(ColorSpaceName::PhotoYcc), fourth_is_alpha);
    }

    // 3 channels subsampled are YCbCr, unsubsampled RGB; 4 channels
    // subsampled are YCbCrA, unsubsampled CMYK.
    if sof.is_subsampled() {
        return info(Some(ColorSpaceName::YCbCr), channels == 4);
    }
    let name = if channels == 3 {
        ColorSpaceName::Rgb
    } else {
        ColorSpaceName::Cmyk
    };
    info(Some(name), false)
}

fn value_node(name: &str, value: impl ToString) -> TreeNode {
    TreeNode::new(name).with_attribute("value", value)
}

/// Formats a float the way the standard tree expects: always with a
/// fractional part.
pub(crate) fn format_float(value: f32) -> String {
    format!("{:?}", value)
}

fn chroma_node(info: &ChromaInfo) -> TreeNode {
    let mut color_space = TreeNode::new("ColorSpaceType");
    if let Some(name) = info.color_space {
        color_space.set_attribute("name", name.as_str());
    }
    TreeNode::new("Chroma")
        .with_child(color_space)
        .with_child(value_node("NumChannels", info.channels))
}

fn compression_node(document: &MetadataDocument) -> TreeNode {
    let mut node = TreeNode::new("Compression")
        .with_child(value_node("CompressionTypeName", "JPEG"))
        .with_child(value_node("Lossless", "FALSE"));
    let scans = document.scans().count();
    if scans > 0 {
        node.append_child(value_node("NumProgressiveScans", scans));
    }
    node
}

fn dimension_node(document: &MetadataDocument) -> TreeNode {
    let orientation = value_node("ImageOrientation", "normal");
    // A zero density has no ratio or pixel size.
    let Some(jfif) = document.jfif().filter(|j| j.x_density > 0 && j.y_density > 0) else {
        return TreeNode::new("Dimension").with_child(orientation);
    };

    let (x, y) = (jfif.x_density as f32, jfif.y_density as f32);
    // Aspect-ratio units store the ratio directly; real densities invert it.
    let aspect = match jfif.units {
        DensityUnits::None => x / y,
        _ => y / x,
    };
    let mut node = TreeNode::new("Dimension")
        .with_child(value_node("PixelAspectRatio", format_float(aspect)))
        .with_child(orientation);

    let millimetres_per_unit = match jfif.units {
        DensityUnits::None => None,
        DensityUnits::DotsPerInch => Some(25.4f32),
        DensityUnits::DotsPerCentimeter => Some(10.0f32),
    };
    if let Some(scale) = millimetres_per_unit {
        node.append_child(value_node("HorizontalPixelSize", format_float(scale / x)));
        node.append_child(value_node("VerticalPixelSize", format_float(scale / y)));
    }
    node
}

fn text_node(document: &MetadataDocument) -> Option<TreeNode> {
    let mut comments = document.comments().peekable();
    comments.peek()?;
    let mut node = TreeNode::new("Text");
    for com in comments {
        node.append_child(
            TreeNode::new("TextEntry")
                .with_attribute("keyword", "comment")
                .with_attribute("value", com.text()),
        );
    }
    Some(node)
}

fn transparency_node(info: Option<&ChromaInfo>) -> Option<TreeNode> {
    info.filter(|info| info.has_alpha)
        .map(|_| TreeNode::new("Transparency").with_child(value_node("Alpha", "nonpremultiplied")))
}

/// Builds the standard tree. Only image documents have one.
pub fn to_standard_tree(document: &MetadataDocument) -> Result<TreeNode> {
    TreeFormat::Standard.check_supported(document.kind())?;
    let chroma = chroma_info(document);
    let mut root = TreeNode::new(STANDARD_ROOT_NAME);
    if let Some(info) = &chroma {
        root.append_child(chroma_node(info));
    }
    root.append_child(compression_node(document));
    root.append_child(dimension_node(document));
    if let Some(text) = text_node(document) {
        root.append_child(text);
    }
    if let Some(transparency) = transparency_node(chroma.as_ref()) {
        root.append_child(transparency);
    }
    Ok(root)
}
