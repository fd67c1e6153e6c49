//! Default metadata for the write path.
//!
//! An image document is synthesized from the pixel layout and the encoder
//! parameters: JFIF or Adobe header, quality-scaled quantization tables,
//! the standard Huffman tables, then the frame and scan headers.

use crate::constants::DEFAULT_QUALITY;
use crate::document::{DocumentKind, MetadataDocument};
use crate::error::{MetadataError, Result};
use crate::segments::{
    AdobeSegment, AdobeTransform, DhtSegment, DqtSegment, FrameProcess, HuffmanClass, IccSegment,
    JfifSegment, MarkerSegment, SofSegment, SosSegment,
};
use crate::tables::{self, TableSet};
use crate::warning::{MetadataWarning, WarningSink};

/// A frame header counts its components in one byte.
const MAX_COMPONENTS: usize = 255;

/// Color space family of the pixels handed to the writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutColorSpace {
    Gray,
    Rgb,
    YCbCr,
    /// Kodak Photo YCC.
    PhotoYcc,
    Cmyk,
    Other,
}

impl LayoutColorSpace {
    /// Number of color (non-extra) components.
    fn color_components(self) -> Option<usize> {
        match self {
            Self::Gray => Some(1),
            Self::Rgb | Self::YCbCr | Self::PhotoYcc => Some(3),
            Self::Cmyk => Some(4),
            Self::Other => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelLayout {
    pub color_space: LayoutColorSpace,
    pub num_components: usize,
    pub has_alpha: bool,
    /// A non-standard ICC profile describing the color space.
    pub icc_profile: Option<Vec<u8>>,
}

impl PixelLayout {
    pub fn new(color_space: LayoutColorSpace, num_components: usize) -> Self {
        Self {
            color_space,
            num_components,
            has_alpha: false,
            icc_profile: None,
        }
    }

    /// Adds an alpha channel as the last component.
    pub fn with_alpha(mut self) -> Self {
        self.has_alpha = true;
        self.num_components += 1;
        self
    }

    pub fn with_icc_profile(mut self, profile: Vec<u8>) -> Self {
        self.icc_profile = Some(profile);
        self
    }

    fn has_extra_components(&self) -> bool {
        self.color_space
            .color_components()
            .is_some_and(|color| self.num_components > color)
    }
}

/// Encoder settings that shape the default metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodeParams {
    pub progressive: bool,
    pub optimize_huffman: bool,
    /// 1..=100, scales the standard quantization tables.
    pub quality: u8,
    /// Tables supplied by the caller. When set, image metadata carries no
    /// tables of its own.
    pub tables: Option<TableSet>,
}

impl Default for EncodeParams {
    fn default() -> Self {
        Self {
            progressive: false,
            optimize_huffman: false,
            quality: DEFAULT_QUALITY,
            tables: None,
        }
    }
}

/// The decisions the layout and parameters lead to.
#[derive(Debug, Clone)]
struct ImagePlan {
    want_jfif: bool,
    want_adobe: bool,
    transform: AdobeTransform,
    subsample: bool,
    want_icc: bool,
    process: FrameProcess,
    want_qtables: bool,
    want_htables: bool,
    quality: u8,
    ids: [u8; 4],
}

impl ImagePlan {
    fn from_params(params: &EncodeParams) -> Self {
        let mut plan = Self {
            want_jfif: true,
            want_adobe: false,
            transform: AdobeTransform::Unknown,
            subsample: true,
            want_icc: false,
            process: FrameProcess::Baseline,
            want_qtables: true,
            want_htables: true,
            quality: params.quality.clamp(1, 100),
            ids: [1, 2, 3, 4],
        };
        if params.progressive {
            plan.process = FrameProcess::Progressive;
            plan.want_htables = false;
        }
        if let Some(tables) = &params.tables {
            plan.want_qtables = false;
            plan.want_htables = false;
            let count = |class| tables.huffman.iter().filter(|t| t.class == class).count();
            if count(HuffmanClass::Dc) > 2 || count(HuffmanClass::Ac) > 2 {
                plan.process = FrameProcess::Extended;
            }
        }
        if !params.progressive && params.optimize_huffman {
            plan.want_htables = false;
        }
        plan
    }

    /// Rules for the layout of the image itself.
    fn apply_image_layout(&mut self, layout: &PixelLayout) {
        let extra = layout.has_extra_components();
        match layout.color_space {
            LayoutColorSpace::Gray => {
                self.subsample = false;
                self.want_jfif &= !extra;
            }
            LayoutColorSpace::Rgb => {
                self.want_jfif &= !layout.has_alpha;
            }
            LayoutColorSpace::PhotoYcc => {
                self.want_jfif = false;
                self.want_adobe = true;
                self.ids[..3].copy_from_slice(b"YCc");
                if layout.has_alpha {
                    self.ids[3] = b'A';
                }
            }
            LayoutColorSpace::YCbCr => self.apply_ycbcr(layout, extra),
            LayoutColorSpace::Cmyk => {
                self.want_jfif = false;
                self.want_adobe = true;
                self.transform = AdobeTransform::Ycck;
            }
            LayoutColorSpace::Other => {
                self.want_jfif = false;
                self.subsample = false;
            }
        }
        self.want_icc = self.want_jfif && layout.icc_profile.is_some();
    }

    /// Rules for an explicit destination layout.
    fn apply_destination_layout(&mut self, layout: &PixelLayout) {
        let extra = layout.has_extra_components();
        match layout.color_space {
            LayoutColorSpace::Gray => {
                self.subsample = false;
                self.want_jfif &= !extra;
            }
            LayoutColorSpace::YCbCr => self.apply_ycbcr(layout, extra),
            LayoutColorSpace::Rgb => {
                self.want_jfif = false;
                self.want_adobe = true;
                self.subsample = false;
                self.ids[..3].copy_from_slice(b"RGB");
                if layout.has_alpha {
                    self.ids[3] = b'A';
                }
            }
            LayoutColorSpace::PhotoYcc | LayoutColorSpace::Cmyk | LayoutColorSpace::Other => {
                self.want_jfif = false;
                self.subsample = false;
            }
        }
        self.want_icc = self.want_jfif && layout.icc_profile.is_some();
    }

    fn apply_ycbcr(&mut self, layout: &PixelLayout, extra: bool) {
        if extra {
            self.want_jfif = false;
            // Without alpha the extra channel is K.
            if !layout.has_alpha {
                self.want_adobe = true;
                self.transform = AdobeTransform::Ycck;
            }
        }
    }

    fn component_ids(&self, count: usize) -> Vec<u8> {
        (0..count)
            .map(|i| self.ids.get(i).copied().unwrap_or((i + 1) as u8))
            .collect()
    }

    fn build(&self, layout: &PixelLayout) -> Result<MetadataDocument> {
        if !(1..=MAX_COMPONENTS).contains(&layout.num_components) {
            return Err(MetadataError::InvalidArgument(format!(
                "component count {} outside 1..={}",
                layout.num_components, MAX_COMPONENTS
            )));
        }
        let mut segments = Vec::new();
        if self.want_jfif {
            let mut jfif = JfifSegment::default();
            if self.want_icc {
                jfif.icc = layout.icc_profile.clone().map(IccSegment::new);
            }
            segments.push(MarkerSegment::Jfif(jfif));
        }
        if self.want_adobe {
            segments.push(MarkerSegment::Adobe(AdobeSegment::new(self.transform)));
        }
        if self.want_qtables {
            segments.push(MarkerSegment::Dqt(quality_tables(self.quality, self.subsample)));
        }
        if self.want_htables {
            segments.push(MarkerSegment::Dht(standard_huffman_tables(self.subsample)));
        }
        let ids = self.component_ids(layout.num_components);
        segments.push(MarkerSegment::Sof(SofSegment::for_components(
            self.process,
            self.subsample,
            &ids,
        )));
        // Progressive scans are chosen by the encoder.
        if self.process != FrameProcess::Progressive {
            segments.push(MarkerSegment::Sos(SosSegment::for_components(self.subsample, &ids)));
        }
        tracing::debug!(
            jfif = self.want_jfif,
            adobe = self.want_adobe,
            subsample = self.subsample,
            components = ids.len(),
            "default image metadata"
        );
        MetadataDocument::from_segments(DocumentKind::Image, segments).map_err(|e| {
            MetadataError::format(format!("Default image metadata is inconsistent: {}", e))
        })
    }
}

fn quality_tables(quality: u8, subsample: bool) -> DqtSegment {
    let mut qtables = vec![tables::luminance_quant_table(quality)];
    if subsample {
        qtables.push(tables::chrominance_quant_table(quality));
    }
    DqtSegment::new(qtables)
}

fn standard_huffman_tables(chroma: bool) -> DhtSegment {
    let mut htables = vec![tables::luminance_dc_table()];
    if chroma {
        htables.push(tables::chrominance_dc_table());
    }
    htables.push(tables::luminance_ac_table());
    if chroma {
        htables.push(tables::chrominance_ac_table());
    }
    DhtSegment::new(htables)
}

/// Default metadata for an image with the given pixel layout.
pub fn default_image_metadata(layout: &PixelLayout, params: &EncodeParams) -> Result<MetadataDocument> {
    let mut plan = ImagePlan::from_params(params);
    plan.apply_image_layout(layout);
    plan.build(layout)
}

/// Default metadata when only the destination layout is known.
pub fn default_destination_metadata(
    destination: &PixelLayout,
    params: &EncodeParams,
) -> Result<MetadataDocument> {
    let mut plan = ImagePlan::from_params(params);
    plan.apply_destination_layout(destination);
    plan.build(destination)
}

/// Default metadata when the caller names both the image layout and a
/// destination layout. The image layout wins and the destination is
/// reported as ignored.
pub fn default_image_metadata_with(
    layout: &PixelLayout,
    destination: Option<&PixelLayout>,
    params: &EncodeParams,
    sink: &mut dyn WarningSink,
) -> Result<MetadataDocument> {
    if destination.is_some() {
        sink.warning(MetadataWarning::DestinationTypeIgnored);
    }
    default_image_metadata(layout, params)
}

/// Tables-only metadata: the caller's tables if supplied, else the
/// standard luminance and chrominance tables.
pub fn default_stream_metadata(params: &EncodeParams) -> Result<MetadataDocument> {
    let segments = match params.tables.as_ref().filter(|t| !t.is_empty()) {
        Some(supplied) => {
            let mut segments = Vec::new();
            if !supplied.quantization.is_empty() {
                segments.push(MarkerSegment::Dqt(DqtSegment::new(supplied.quantization.clone())));
            }
            if !supplied.huffman.is_empty() {
                segments.push(MarkerSegment::Dht(DhtSegment::new(supplied.huffman.clone())));
            }
            segments
        }
        None => vec![
            MarkerSegment::Dqt(quality_tables(DEFAULT_QUALITY, true)),
            MarkerSegment::Dht(standard_huffman_tables(true)),
        ],
    };
    MetadataDocument::from_segments(DocumentKind::Stream, segments)
        .map_err(|e| MetadataError::format(format!("Default stream metadata is inconsistent: {}", e)))
}
