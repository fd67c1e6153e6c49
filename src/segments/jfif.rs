use super::{
    IccSegment, PayloadReader, RgbThumbnail, SegmentCodec, SegmentHeader, SegmentOrigin, Thumbnail,
};
use crate::constants::{
    JFIF_DEFAULT_MAJOR_VERSION, JFIF_DEFAULT_MINOR_VERSION, JFIF_FIXED_PAYLOAD_SIZE,
    JFIF_IDENTIFIER, JFXX_IDENTIFIER, MAX_THUMBNAIL_DIMENSION,
};
use crate::error::{MetadataError, Result};
use crate::jpeg_marker_code::JpegMarkerCode;
use crate::jpeg_stream_writer::JpegStreamWriter;
use crate::tree::{TreeNode, UserObject};
use crate::warning::WarningSink;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use std::io::Write;

#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum DensityUnits {
    /// Densities only give the pixel aspect ratio.
    None = 0,
    DotsPerInch = 1,
    DotsPerCentimeter = 2,
}

/// APP0 "JFIF" header together with the JFXX extensions and ICC profile
/// that belong to it.
#[derive(Debug, Clone, PartialEq)]
pub struct JfifSegment {
    pub major_version: u8,
    pub minor_version: u8,
    pub units: DensityUnits,
    pub x_density: u16,
    pub y_density: u16,
    pub thumbnail: Option<RgbThumbnail>,
    pub extensions: Vec<JfxxSegment>,
    pub icc: Option<IccSegment>,
    pub origin: SegmentOrigin,
}

impl Default for JfifSegment {
    fn default() -> Self {
        Self {
            major_version: JFIF_DEFAULT_MAJOR_VERSION,
            minor_version: JFIF_DEFAULT_MINOR_VERSION,
            units: DensityUnits::None,
            x_density: 1,
            y_density: 1,
            thumbnail: None,
            extensions: Vec::new(),
            icc: None,
            origin: SegmentOrigin::default(),
        }
    }
}

impl JfifSegment {
    pub fn thumb_width(&self) -> u8 {
        self.thumbnail.as_ref().map_or(0, |t| t.width)
    }

    pub fn thumb_height(&self) -> u8 {
        self.thumbnail.as_ref().map_or(0, |t| t.height)
    }

    /// Total number of thumbnails: the embedded one plus one per extension.
    pub fn thumbnail_count(&self) -> usize {
        usize::from(self.thumbnail.is_some()) + self.extensions.len()
    }

    fn thumbnail_from_node(
        node: &TreeNode,
        width: u32,
        height: u32,
    ) -> Result<Option<RgbThumbnail>> {
        if width == 0 || height == 0 {
            return Ok(None);
        }
        match &node.user_object {
            Some(UserObject::Bytes(pixels)) => Ok(Some(
                RgbThumbnail::new(width as u8, height as u8, pixels.clone())
                    .map_err(|_| node.invalid("thumbnail pixels do not match thumbWidth/thumbHeight"))?,
            )),
            _ => Err(node.invalid("a JFIF thumbnail requires its RGB pixels as user object")),
        }
    }

    /// Applies the `JFXX` and `app2ICC` children of `node`.
    fn apply_children(&mut self, node: &TreeNode) -> Result<()> {
        for child in &node.children {
            match child.name.as_str() {
                "JFXX" => {
                    self.extensions = child
                        .children
                        .iter()
                        .map(JfxxSegment::from_native_node)
                        .collect::<Result<Vec<_>>>()?;
                }
                IccSegment::NODE_NAME => self.icc = Some(IccSegment::from_native_node(child)?),
                other => {
                    return Err(node.invalid(format!("unexpected app0JFIF child {}", other)));
                }
            }
        }
        Ok(())
    }
}

impl SegmentCodec for JfifSegment {
    const NODE_NAME: &'static str = "app0JFIF";

    fn parse(header: &SegmentHeader, payload: &[u8]) -> Result<Self> {
        let mut reader = PayloadReader::new(payload, "JFIF");
        if reader.take(JFIF_IDENTIFIER.len())? != JFIF_IDENTIFIER {
            return Err(MetadataError::format("APP0 segment is not a JFIF header"));
        }
        let major_version = reader.read_u8()?;
        let minor_version = reader.read_u8()?;
        let unit_code = reader.read_u8()?;
        let units = DensityUnits::try_from(unit_code)
            .map_err(|_| MetadataError::format(format!("invalid JFIF density units {}", unit_code)))?;
        let x_density = reader.read_u16()?;
        let y_density = reader.read_u16()?;
        let width = reader.read_u8()?;
        let height = reader.read_u8()?;
        let thumbnail = if width > 0 && height > 0 {
            Some(RgbThumbnail::parse(&mut reader, header.payload_offset, width, height)?)
        } else {
            None
        };
        if reader.remaining() > 0 {
            tracing::debug!(extra = reader.remaining(), "ignoring bytes after JFIF header");
        }
        Ok(Self {
            major_version,
            minor_version,
            units,
            x_density,
            y_density,
            thumbnail,
            extensions: Vec::new(),
            icc: None,
            origin: header.origin(),
        })
    }

    /// Writes the JFIF header, then each JFXX extension, then the ICC
    /// profile chunks.
    fn write_to<W: Write>(&self, writer: &mut JpegStreamWriter<W>) -> Result<()> {
        let pixels = self.thumbnail.as_ref().map_or(&[][..], |t| t.pixels.as_slice());
        writer.write_segment_header(
            JpegMarkerCode::ApplicationData0.into(),
            JFIF_FIXED_PAYLOAD_SIZE + pixels.len(),
        )?;
        writer.write_bytes(JFIF_IDENTIFIER)?;
        writer.write_byte(self.major_version)?;
        writer.write_byte(self.minor_version)?;
        writer.write_byte(self.units.into())?;
        writer.write_u16(self.x_density)?;
        writer.write_u16(self.y_density)?;
        writer.write_byte(self.thumb_width())?;
        writer.write_byte(self.thumb_height())?;
        writer.write_bytes(pixels)?;

        for extension in &self.extensions {
            extension.write_to(writer)?;
        }
        if let Some(icc) = &self.icc {
            icc.write_to(writer)?;
        }
        Ok(())
    }

    fn to_native_node(&self) -> TreeNode {
        let mut node = TreeNode::new(Self::NODE_NAME)
            .with_attribute("majorVersion", self.major_version)
            .with_attribute("minorVersion", self.minor_version)
            .with_attribute("resUnits", u8::from(self.units))
            .with_attribute("Xdensity", self.x_density)
            .with_attribute("Ydensity", self.y_density)
            .with_attribute("thumbWidth", self.thumb_width())
            .with_attribute("thumbHeight", self.thumb_height());
        if let Some(thumbnail) = &self.thumbnail {
            node.user_object = Some(UserObject::Bytes(thumbnail.pixels.clone()));
        }
        if !self.extensions.is_empty() {
            let mut jfxx = TreeNode::new("JFXX");
            for extension in &self.extensions {
                jfxx.append_child(extension.to_native_node());
            }
            node.append_child(jfxx);
        }
        if let Some(icc) = &self.icc {
            node.append_child(icc.to_native_node());
        }
        node
    }

    /// Missing attributes take their JFIF defaults.
    fn from_native_node(node: &TreeNode) -> Result<Self> {
        node.expect_name(Self::NODE_NAME)?;
        let mut jfif = Self::default();
        jfif.update_from_native_node(node)?;
        Ok(jfif)
    }

    fn update_from_native_node(&mut self, node: &TreeNode) -> Result<()> {
        node.expect_name(Self::NODE_NAME)?;
        let mut updated = self.clone();
        updated.major_version =
            node.optional_int("majorVersion", 0..=255, self.major_version as u32)? as u8;
        updated.minor_version =
            node.optional_int("minorVersion", 0..=255, self.minor_version as u32)? as u8;
        let unit_code = node.optional_int("resUnits", 0..=2, u8::from(self.units) as u32)? as u8;
        updated.units =
            DensityUnits::try_from(unit_code).map_err(|_| node.invalid("invalid resUnits"))?;
        updated.x_density = node.optional_int("Xdensity", 1..=65535, self.x_density as u32)? as u16;
        updated.y_density = node.optional_int("Ydensity", 1..=65535, self.y_density as u32)? as u16;

        let width = node.optional_int(
            "thumbWidth",
            0..=MAX_THUMBNAIL_DIMENSION,
            self.thumb_width() as u32,
        )?;
        let height = node.optional_int(
            "thumbHeight",
            0..=MAX_THUMBNAIL_DIMENSION,
            self.thumb_height() as u32,
        )?;
        let dimensions_changed =
            (width, height) != (self.thumb_width() as u32, self.thumb_height() as u32);
        if node.user_object.is_some() || dimensions_changed {
            updated.thumbnail = Self::thumbnail_from_node(node, width, height)?;
        }

        updated.apply_children(node)?;
        *self = updated;
        Ok(())
    }
}

/// APP0 "JFXX" extension holding one thumbnail.
#[derive(Debug, Clone, PartialEq)]
pub struct JfxxSegment {
    pub thumbnail: Thumbnail,
    pub origin: SegmentOrigin,
}

impl JfxxSegment {
    pub const NODE_NAME: &'static str = "app0JFXX";

    pub fn new(thumbnail: Thumbnail) -> Self {
        Self {
            thumbnail,
            origin: SegmentOrigin::default(),
        }
    }

    pub fn extension_code(&self) -> u8 {
        self.thumbnail.extension_code()
    }

    /// Parses a JFXX payload. JPEG thumbnails parse their own marker
    /// sequence, which may raise warnings.
    pub fn parse(header: &SegmentHeader, payload: &[u8], sink: &mut dyn WarningSink) -> Result<Self> {
        let mut reader = PayloadReader::new(payload, "JFXX");
        if reader.take(JFXX_IDENTIFIER.len())? != JFXX_IDENTIFIER {
            return Err(MetadataError::format("APP0 segment is not a JFXX extension"));
        }
        let code = reader.read_u8()?;
        let thumbnail = Thumbnail::parse(code, &mut reader, header.payload_offset, sink)?;
        Ok(Self {
            thumbnail,
            origin: header.origin(),
        })
    }

    pub fn write_to<W: Write>(&self, writer: &mut JpegStreamWriter<W>) -> Result<()> {
        writer.write_segment_header(
            JpegMarkerCode::ApplicationData0.into(),
            JFXX_IDENTIFIER.len() + 1 + self.thumbnail.payload_len(),
        )?;
        writer.write_bytes(JFXX_IDENTIFIER)?;
        writer.write_byte(self.extension_code())?;
        self.thumbnail.write_payload(writer)
    }

    pub fn to_native_node(&self) -> TreeNode {
        TreeNode::new(Self::NODE_NAME)
            .with_attribute("extensionCode", self.extension_code())
            .with_child(self.thumbnail.to_native_node())
    }

    pub fn from_native_node(node: &TreeNode) -> Result<Self> {
        node.expect_name(Self::NODE_NAME)?;
        let code = node.required_int("extensionCode", 0..=255)? as u8;
        let [child] = node.children.as_slice() else {
            return Err(node.invalid("app0JFXX must hold exactly one thumbnail node"));
        };
        let thumbnail = Thumbnail::from_native_node(child)?;
        if thumbnail.extension_code() != code {
            return Err(node.invalid(format!(
                "extensionCode {} does not match thumbnail node {}",
                code, child.name
            )));
        }
        Ok(Self::new(thumbnail))
    }
}
