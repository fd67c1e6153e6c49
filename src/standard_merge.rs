//! Merging a standard tree into image metadata.
//!
//! Chroma edits restructure the sequence: they choose between a JFIF and an
//! Adobe header, rebuild the frame and scan headers for the new component
//! set and add chrominance tables when subsampling is switched on.
//! Dimension edits land in the JFIF densities, text entries become
//! comments, and transparency edits add or drop an alpha component.

use crate::document::MetadataDocument;
use crate::error::Result;
use crate::merge::SequenceEditor;
use crate::segments::{
    AdobeSegment, AdobeTransform, ComSegment, DensityUnits, FrameComponentSpec, FrameProcess,
    JfifSegment, ScanComponentSpec, SegmentKind, SofSegment, SosSegment,
};
use crate::tables::{chroma_for_luma, chrominance_ac_table, chrominance_dc_table};
use crate::tree::TreeNode;
use crate::tree_codec::{STANDARD_ROOT_NAME, TreeFormat};

const RATIO_EPSILON: f32 = 0.005;

/// Component ids a chroma merge can assign, alpha included.
const MAX_CHROMA_CHANNELS: usize = 4;

/// What a `ColorSpaceType` name asks of the marker sequence.
#[derive(Debug, Clone, Copy)]
struct ChromaTarget {
    channels: usize,
    want_jfif: bool,
    want_adobe: bool,
    transform: AdobeTransform,
    subsample: bool,
    ids: [u8; MAX_CHROMA_CHANNELS],
}

impl ChromaTarget {
    /// `None` for color spaces the metadata cannot express.
    fn for_name(name: &str) -> Option<Self> {
        let base = Self {
            channels: 3,
            want_jfif: false,
            want_adobe: false,
            transform: AdobeTransform::Unknown,
            subsample: false,
            ids: [1, 2, 3, 4],
        };
        Some(match name {
            "GRAY" => Self {
                channels: 1,
                want_jfif: true,
                ..base
            },
            "YCbCr" => Self {
                want_jfif: true,
                subsample: true,
                ..base
            },
            "PhotoYCC" => Self {
                want_adobe: true,
                transform: AdobeTransform::YCbCr,
                ids: [b'Y', b'C', b'c', 4],
                ..base
            },
            "RGB" => Self {
                want_adobe: true,
                ids: [b'R', b'G', b'B', 4],
                ..base
            },
            "XYZ" | "Lab" | "Luv" | "YxY" | "HSV" | "HLS" | "CMY" | "3CLR" => base,
            "YCCK" => Self {
                channels: 4,
                want_adobe: true,
                transform: AdobeTransform::Ycck,
                subsample: true,
                ..base
            },
            "CMYK" => Self {
                channels: 4,
                want_adobe: true,
                ..base
            },
            "4CLR" => Self {
                channels: 4,
                ..base
            },
            _ => return None,
        })
    }

    fn add_alpha(&mut self) {
        self.channels += 1;
        self.want_jfif = false;
        if self.ids[0] == b'R' {
            self.ids[3] = b'A';
            self.want_adobe = false;
        }
    }

    fn ids(&self) -> &[u8] {
        &self.ids[..self.channels]
    }

    fn table_selector(&self, index: usize) -> u8 {
        u8::from(self.subsample && (index == 1 || index == 2))
    }
}

struct StandardMerge {
    editor: SequenceEditor,
    transparency_done: bool,
}

impl StandardMerge {
    /// Reads the `Alpha` child of a transparency node. Marks transparency as
    /// handled so a later `Transparency` sibling is not applied twice.
    fn want_alpha(&mut self, transparency: &TreeNode) -> bool {
        self.transparency_done = true;
        transparency
            .first_child()
            .filter(|alpha| alpha.name == "Alpha")
            .and_then(|alpha| alpha.attribute("value"))
            .is_some_and(|value| value != "none")
    }

    fn merge_chroma(&mut self, node: &TreeNode, siblings: &[TreeNode]) -> Result<()> {
        if self.transparency_done {
            return Err(node.invalid("Transparency node must follow Chroma node"));
        }
        let Some(color_space) = node.first_child().filter(|c| c.name == "ColorSpaceType") else {
            return Ok(());
        };
        let name = color_space.required_attribute("name")?;
        let Some(mut target) = ChromaTarget::for_name(name) else {
            tracing::debug!(name, "color space not expressible in JPEG metadata");
            return Ok(());
        };
        if let Some(transparency) = siblings.iter().find(|s| s.name == "Transparency") {
            if self.want_alpha(transparency) {
                if target.channels >= MAX_CHROMA_CHANNELS {
                    return Err(transparency.invalid(format!(
                        "alpha cannot be added to {} color space",
                        name
                    )));
                }
                target.add_alpha();
            }
        }

        let editor = &mut self.editor;
        if let Some(sof) = editor.sof() {
            if sof.is_progressive()
                && sof.components.len() != target.channels
                && editor.count(SegmentKind::Sos) > 0
            {
                return Err(node.invalid(
                    "cannot change the component count of progressive metadata",
                ));
            }
        }

        if !target.want_jfif {
            editor.remove_all(SegmentKind::Jfif);
        } else if !editor.has_jfif() {
            editor.insert_jfif(JfifSegment::default());
        }

        if target.want_adobe {
            match editor.adobe_mut() {
                Some(adobe) => adobe.transform = target.transform,
                None => editor.insert_adobe(AdobeSegment::new(target.transform)),
            }
        } else {
            editor.remove_all(SegmentKind::Adobe);
        }

        let Some(old_sof) = editor.sof().cloned() else {
            return Ok(());
        };
        let old_specs = &old_sof.components;
        let mut update_qtables = old_specs
            .iter()
            .enumerate()
            .any(|(i, spec)| spec.qtable_selector != target.table_selector(i));
        let mut update_htables = false;

        let process = if old_sof.is_progressive() {
            FrameProcess::Progressive
        } else {
            FrameProcess::Baseline
        };
        let mut new_sof = SofSegment::for_components(process, target.subsample, target.ids());
        new_sof.num_lines = old_sof.num_lines;
        new_sof.samples_per_line = old_sof.samples_per_line;
        if let Some(sof) = editor.sof_mut() {
            *sof = new_sof;
        }

        if old_sof.is_progressive() {
            // Rename the selectors of every scan to the new component ids.
            for sos in editor.scans_mut() {
                for spec in &mut sos.components {
                    if let Some(j) = old_specs.iter().position(|o| o.component_id == spec.component_selector) {
                        spec.component_selector = target.ids[j];
                    }
                }
            }
        } else if let Some(sos) = editor.scans_mut().next() {
            update_htables = sos.components.iter().enumerate().any(|(i, spec)| {
                let selector = target.table_selector(i);
                spec.dc_table != selector || spec.ac_table != selector
            });
            *sos = SosSegment::for_components(target.subsample, target.ids());
        }

        // Only subsampled output needs a second set of tables.
        update_qtables &= target.subsample;
        update_htables &= target.subsample;
        if update_qtables {
            self.add_chroma_quantization_table();
        }
        if update_htables {
            self.add_chroma_huffman_tables();
        }
        Ok(())
    }

    /// Derives table 1 from table 0 when only a luminance table exists.
    fn add_chroma_quantization_table(&mut self) {
        let has_chroma = self.editor.dqts_mut().any(|dqt| dqt.table(1).is_some());
        if has_chroma {
            return;
        }
        let luma = self.editor.dqts_mut().find_map(|dqt| dqt.table(0).cloned());
        if let (Some(luma), Some(last)) = (luma, self.editor.dqts_mut().last()) {
            tracing::debug!("adding chrominance quantization table derived from luminance");
            last.tables.push(chroma_for_luma(&luma));
        }
    }

    fn add_chroma_huffman_tables(&mut self) {
        let has_chroma = self
            .editor
            .dhts_mut()
            .any(|dht| dht.tables.iter().any(|table| table.id == 1));
        if has_chroma {
            return;
        }
        if let Some(last) = self.editor.dhts_mut().last() {
            last.tables.push(chrominance_dc_table());
            last.tables.push(chrominance_ac_table());
        }
    }

    /// A JFIF header can be added when the frame has 1 or 3 components
    /// numbered from 1 and any Adobe transform matches.
    fn can_have_jfif(&self) -> bool {
        let Some(sof) = self.editor.sof() else {
            return false;
        };
        let channels = sof.components.len();
        if channels != 1 && channels != 3 {
            return false;
        }
        let sequential = sof
            .components
            .iter()
            .enumerate()
            .all(|(i, spec)| spec.component_id as usize == i + 1);
        let adobe_ok = self.editor.adobe().is_none_or(|adobe| {
            let expected = if channels == 1 {
                AdobeTransform::Unknown
            } else {
                AdobeTransform::YCbCr
            };
            adobe.transform == expected
        });
        sequential && adobe_ok
    }

    fn merge_dimension(&mut self, node: &TreeNode) -> Result<()> {
        if !self.editor.has_jfif() {
            if !self.can_have_jfif() {
                return Ok(());
            }
            self.editor.insert_jfif(JfifSegment::default());
        }
        let Some(jfif) = self.editor.jfif_mut() else {
            return Ok(());
        };
        for child in &node.children {
            match child.name.as_str() {
                "PixelAspectRatio" => {
                    let ratio = child.required_f32("value")?;
                    if !ratio.is_finite() || ratio <= 0.0 {
                        return Err(child.invalid("pixel aspect ratio must be a positive number"));
                    }
                    let (x, y) = find_integer_ratio(ratio);
                    jfif.units = DensityUnits::None;
                    jfif.x_density = x;
                    jfif.y_density = y;
                }
                "HorizontalPixelSize" => {
                    jfif.units = DensityUnits::DotsPerCentimeter;
                    jfif.x_density = dots_per_centimetre(child)?;
                }
                "VerticalPixelSize" => {
                    jfif.units = DensityUnits::DotsPerCentimeter;
                    jfif.y_density = dots_per_centimetre(child)?;
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn merge_text(&mut self, node: &TreeNode) -> Result<()> {
        for entry in &node.children {
            let copy = entry.attribute("compression").is_none_or(|c| c == "none");
            if copy {
                let value = entry.required_attribute("value")?;
                self.editor.insert_com(ComSegment::from_text(value));
            }
        }
        Ok(())
    }

    fn merge_transparency(&mut self, node: &TreeNode) -> Result<()> {
        if self.transparency_done {
            return Ok(());
        }
        let want_alpha = self.want_alpha(node);
        let editor = &mut self.editor;
        let Some(sof) = editor.sof().cloned() else {
            return Ok(());
        };
        let channels = sof.components.len();
        let had_alpha = channels == 2 || channels == 4;
        if had_alpha == want_alpha {
            return Ok(());
        }
        if sof.is_progressive() {
            return Err(node.invalid(
                "cannot change the component count of progressive metadata",
            ));
        }

        if want_alpha {
            editor.remove_all(SegmentKind::Jfif);
            if let Some(adobe) = editor.adobe_mut() {
                adobe.transform = AdobeTransform::Unknown;
            }
            let first = sof.components[0];
            let alpha_id = if first.component_id > 1 { b'A' } else { 4 };
            if let Some(sof) = editor.sof_mut() {
                sof.components.push(FrameComponentSpec::new(
                    alpha_id,
                    first.h_sampling,
                    first.v_sampling,
                    first.qtable_selector,
                ));
            }
            if let Some(sos) = editor.scans_mut().next() {
                sos.components.push(ScanComponentSpec::new(alpha_id, 0, 0));
            }
        } else {
            let keep = channels - 1;
            if let Some(sof) = editor.sof_mut() {
                sof.components.truncate(keep);
            }
            if let Some(sos) = editor.scans_mut().next() {
                sos.components.truncate(keep);
            }
        }
        Ok(())
    }
}

fn dots_per_centimetre(node: &TreeNode) -> Result<u16> {
    let millimetres = node.required_f32("value")?;
    if !millimetres.is_finite() || millimetres <= 0.0 {
        return Err(node.invalid("pixel size must be a positive number of millimetres"));
    }
    let dots = (1.0 / (millimetres as f64 * 10.0)).round();
    Ok(dots.clamp(1.0, u16::MAX as f64) as u16)
}

/// Finds a pair of integers whose ratio x/y is within 0.005 of `value`.
/// Both are at least 1; ratios outside 1/255..=255 saturate, and a
/// non-finite `value` gives 1:1.
pub fn find_integer_ratio(value: f32) -> (u16, u16) {
    let value = value.abs();
    if !value.is_finite() {
        return (1, 1);
    }
    if value <= RATIO_EPSILON {
        return (1, 255);
    }
    if value >= 255.0 {
        return (255, 1);
    }
    let inverted = value < 1.0;
    let value = if inverted { 1.0 / value } else { value };

    let mut y: u16 = 1;
    let mut x = value.round() as u16;
    while (value - x as f32 / y as f32).abs() > RATIO_EPSILON {
        y += 1;
        x = (y as f32 * value).round() as u16;
    }
    if inverted { (y, x) } else { (x, y) }
}

/// Merges a standard tree into image metadata. The document is unchanged
/// if any node is rejected or the result is inconsistent.
pub fn merge_standard_tree(document: &mut MetadataDocument, root: &TreeNode) -> Result<()> {
    TreeFormat::Standard.check_supported(document.kind())?;
    root.expect_name(STANDARD_ROOT_NAME)?;
    let mut merge = StandardMerge {
        editor: SequenceEditor::new(document),
        transparency_done: false,
    };
    for node in &root.children {
        match node.name.as_str() {
            "Chroma" => merge.merge_chroma(node, &root.children)?,
            "Compression" | "Data" | "Document" => {}
            "Dimension" => merge.merge_dimension(node)?,
            "Text" => merge.merge_text(node)?,
            "Transparency" => merge.merge_transparency(node)?,
            other => return Err(node.invalid(format!("Invalid node: {}", other))),
        }
    }
    merge.editor.commit_to(document, root)
}
