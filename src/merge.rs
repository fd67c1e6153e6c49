//! Merging an edited native tree into a document.
//!
//! Every merge runs against a working copy of the marker sequence. The copy
//! is committed only when all nodes merged and the result passes the
//! consistency check, so a rejected tree never leaves a half-edited document
//! behind.

use crate::document::{DocumentKind, MetadataDocument};
use crate::error::Result;
use crate::segments::{
    AdobeSegment, ComSegment, DhtSegment, DqtSegment, DriSegment, JfifSegment, MarkerSegment,
    SegmentCodec, SegmentKind, SofSegment, SosSegment, UnknownSegment,
};
use crate::tree::TreeNode;
use crate::tree_codec::{image_root_parts, sequence_node};

/// Working copy of a marker sequence with the insertion rules that keep
/// new segments in their conventional place.
#[derive(Debug, Clone)]
pub(crate) struct SequenceEditor {
    pub kind: DocumentKind,
    pub segments: Vec<MarkerSegment>,
}

impl SequenceEditor {
    pub fn new(document: &MetadataDocument) -> Self {
        Self {
            kind: document.kind(),
            segments: document.segments().to_vec(),
        }
    }

    pub fn first(&self, kind: SegmentKind) -> Option<usize> {
        self.segments.iter().position(|s| s.kind() == kind)
    }

    pub fn last(&self, kind: SegmentKind) -> Option<usize> {
        self.segments.iter().rposition(|s| s.kind() == kind)
    }

    pub fn count(&self, kind: SegmentKind) -> usize {
        self.segments.iter().filter(|s| s.kind() == kind).count()
    }

    pub fn has_jfif(&self) -> bool {
        self.first(SegmentKind::Jfif).is_some()
    }

    pub fn remove_all(&mut self, kind: SegmentKind) {
        self.segments.retain(|s| s.kind() != kind);
    }

    pub fn jfif_mut(&mut self) -> Option<&mut JfifSegment> {
        self.segments.iter_mut().find_map(|s| match s {
            MarkerSegment::Jfif(jfif) => Some(jfif),
            _ => None,
        })
    }

    pub fn adobe_mut(&mut self) -> Option<&mut AdobeSegment> {
        self.segments.iter_mut().find_map(|s| match s {
            MarkerSegment::Adobe(adobe) => Some(adobe),
            _ => None,
        })
    }

    pub fn sof(&self) -> Option<&SofSegment> {
        self.segments.iter().find_map(|s| match s {
            MarkerSegment::Sof(sof) => Some(sof),
            _ => None,
        })
    }

    pub fn sof_mut(&mut self) -> Option<&mut SofSegment> {
        self.segments.iter_mut().find_map(|s| match s {
            MarkerSegment::Sof(sof) => Some(sof),
            _ => None,
        })
    }

    pub fn adobe(&self) -> Option<&AdobeSegment> {
        self.segments.iter().find_map(|s| match s {
            MarkerSegment::Adobe(adobe) => Some(adobe),
            _ => None,
        })
    }

    pub fn scans_mut(&mut self) -> impl Iterator<Item = &mut SosSegment> {
        self.segments.iter_mut().filter_map(|s| match s {
            MarkerSegment::Sos(sos) => Some(sos),
            _ => None,
        })
    }

    pub fn dqts_mut(&mut self) -> impl Iterator<Item = &mut DqtSegment> {
        self.segments.iter_mut().filter_map(|s| match s {
            MarkerSegment::Dqt(dqt) => Some(dqt),
            _ => None,
        })
    }

    pub fn dhts_mut(&mut self) -> impl Iterator<Item = &mut DhtSegment> {
        self.segments.iter_mut().filter_map(|s| match s {
            MarkerSegment::Dht(dht) => Some(dht),
            _ => None,
        })
    }

    /// Before the first of `anchors` that exists, else at the end.
    fn before_first_of(&self, anchors: &[SegmentKind]) -> usize {
        anchors
            .iter()
            .find_map(|&kind| self.first(kind))
            .unwrap_or(self.segments.len())
    }

    pub fn insert_dqt(&mut self, dqt: DqtSegment) {
        let at = self.before_first_of(&[SegmentKind::Dht, SegmentKind::Sof, SegmentKind::Sos]);
        self.segments.insert(at, MarkerSegment::Dqt(dqt));
    }

    pub fn insert_dht(&mut self, dht: DhtSegment) {
        let at = match self.last(SegmentKind::Dqt) {
            Some(last) => last + 1,
            None => self.before_first_of(&[SegmentKind::Sof, SegmentKind::Sos]),
        };
        self.segments.insert(at, MarkerSegment::Dht(dht));
    }

    pub fn insert_com(&mut self, com: ComSegment) {
        let at = if let Some(last) = self.last(SegmentKind::Com) {
            last + 1
        } else if self.has_jfif() {
            1
        } else if let Some(adobe) = self.first(SegmentKind::Adobe) {
            adobe + 1
        } else {
            0
        };
        self.segments.insert(at, MarkerSegment::Com(com));
    }

    pub fn insert_adobe(&mut self, adobe: AdobeSegment) {
        let at = if self.has_jfif() {
            1
        } else if let Some(last) = self.last(SegmentKind::Unknown) {
            last + 1
        } else {
            0
        };
        self.segments.insert(at, MarkerSegment::Adobe(adobe));
    }

    pub fn insert_unknown(&mut self, unknown: UnknownSegment) {
        let at = if let Some(last) = self.last(SegmentKind::Unknown) {
            last + 1
        } else if self.has_jfif() {
            1
        } else if let Some(adobe) = self.first(SegmentKind::Adobe) {
            adobe
        } else {
            0
        };
        self.segments.insert(at, MarkerSegment::Unknown(unknown));
    }

    pub fn insert_jfif(&mut self, jfif: JfifSegment) {
        self.segments.insert(0, MarkerSegment::Jfif(jfif));
    }

    /// Checks the edited sequence and hands it to `document`.
    pub fn commit_to(self, document: &mut MetadataDocument, root: &TreeNode) -> Result<()> {
        let merged = MetadataDocument::from_segments(self.kind, self.segments).map_err(|e| {
            tracing::debug!(error = %e, "merged sequence rejected");
            root.invalid("Merged tree is invalid; original restored")
        })?;
        document.commit(merged.segments().to_vec());
        Ok(())
    }

    fn merge_jfif(&mut self, node: &TreeNode) -> Result<()> {
        match self.jfif_mut() {
            Some(jfif) => jfif.update_from_native_node(node),
            None => {
                let jfif = JfifSegment::from_native_node(node)?;
                self.insert_jfif(jfif);
                Ok(())
            }
        }
    }

    fn merge_sequence_child(&mut self, node: &TreeNode) -> Result<()> {
        match node.name.as_str() {
            DqtSegment::NODE_NAME => self.merge_dqt(node),
            DhtSegment::NODE_NAME => self.merge_dht(node),
            DriSegment::NODE_NAME => self.merge_dri(node),
            ComSegment::NODE_NAME => {
                self.insert_com(ComSegment::from_native_node(node)?);
                Ok(())
            }
            AdobeSegment::NODE_NAME => self.merge_adobe(node),
            UnknownSegment::NODE_NAME => {
                self.insert_unknown(UnknownSegment::from_native_node(node)?);
                Ok(())
            }
            SofSegment::NODE_NAME => self.merge_sof(node),
            SosSegment::NODE_NAME => self.merge_sos(node),
            other => Err(node.invalid(format!("Invalid node: {}", other))),
        }
    }

    /// Each table replaces the first table with the same id in any DQT
    /// segment, or joins the last DQT segment.
    fn merge_dqt(&mut self, node: &TreeNode) -> Result<()> {
        let incoming = DqtSegment::from_native_node(node)?;
        if self.count(SegmentKind::Dqt) == 0 {
            self.insert_dqt(incoming);
            return Ok(());
        }
        for table in incoming.tables {
            let existing = self.dqts_mut().find_map(|dqt| dqt.table_mut(table.id));
            match existing {
                Some(slot) => *slot = table,
                None => {
                    if let Some(last) = self.dqts_mut().last() {
                        last.tables.push(table);
                    }
                }
            }
        }
        Ok(())
    }

    /// Same as [`Self::merge_dqt`], keyed by table class and id.
    fn merge_dht(&mut self, node: &TreeNode) -> Result<()> {
        let incoming = DhtSegment::from_native_node(node)?;
        if self.count(SegmentKind::Dht) == 0 {
            self.insert_dht(incoming);
            return Ok(());
        }
        for table in incoming.tables {
            let (class, id) = table.key();
            let existing = self.dhts_mut().find_map(|dht| dht.table_mut(class, id));
            match existing {
                Some(slot) => *slot = table,
                None => {
                    if let Some(last) = self.dhts_mut().last() {
                        last.tables.push(table);
                    }
                }
            }
        }
        Ok(())
    }

    fn merge_dri(&mut self, node: &TreeNode) -> Result<()> {
        if let Some(MarkerSegment::Dri(dri)) =
            self.segments.iter_mut().find(|s| s.kind() == SegmentKind::Dri)
        {
            return dri.update_from_native_node(node);
        }
        let dri = DriSegment::from_native_node(node)?;
        let at = self.before_first_of(&[SegmentKind::Sof, SegmentKind::Sos]);
        self.segments.insert(at, MarkerSegment::Dri(dri));
        Ok(())
    }

    fn merge_adobe(&mut self, node: &TreeNode) -> Result<()> {
        match self.adobe_mut() {
            Some(adobe) => adobe.update_from_native_node(node),
            None => {
                let adobe = AdobeSegment::from_native_node(node)?;
                self.insert_adobe(adobe);
                Ok(())
            }
        }
    }

    fn merge_sof(&mut self, node: &TreeNode) -> Result<()> {
        match self.sof_mut() {
            Some(sof) => sof.update_from_native_node(node),
            None => {
                let sof = SofSegment::from_native_node(node)?;
                let at = self.before_first_of(&[SegmentKind::Sos]);
                self.segments.insert(at, MarkerSegment::Sof(sof));
                Ok(())
            }
        }
    }

    fn merge_sos(&mut self, node: &TreeNode) -> Result<()> {
        match self.count(SegmentKind::Sos) {
            0 => {
                self.segments.push(MarkerSegment::Sos(SosSegment::from_native_node(node)?));
                Ok(())
            }
            1 => match self.scans_mut().next() {
                Some(sos) => sos.update_from_native_node(node),
                None => Ok(()),
            },
            _ => Err(node.invalid("Can't merge SOS node into a tree with > 1 SOS node")),
        }
    }
}

/// Merges a native tree into `document`. Image trees must carry both the
/// `JPEGvariety` and `markerSequence` nodes; stream trees list their marker
/// nodes directly under the root.
pub fn merge_native_tree(document: &mut MetadataDocument, root: &TreeNode) -> Result<()> {
    let kind = document.kind();
    let sequence = sequence_node(kind, root)?;
    let mut editor = SequenceEditor::new(document);
    if kind == DocumentKind::Image {
        let (variety, _) = image_root_parts(root)?;
        if let Some(jfif_node) = variety.first_child() {
            editor.merge_jfif(jfif_node)?;
        }
    }
    for child in &sequence.children {
        editor.merge_sequence_child(child)?;
    }
    tracing::debug!(nodes = sequence.children.len(), "merged native tree");
    editor.commit_to(document, root)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segments::{
        AdobeTransform, FrameComponentSpec, FrameProcess, HuffmanClass, QuantizationTable,
        ScanComponentSpec,
    };
    use crate::tables;
    use crate::tree_codec::{SEQUENCE_NODE_NAME, VARIETY_NODE_NAME, to_native_tree};

    fn image_tree(children: Vec<TreeNode>) -> TreeNode {
        let mut sequence = TreeNode::new(SEQUENCE_NODE_NAME);
        for child in children {
            sequence.append_child(child);
        }
        TreeNode::new("jpeg_image_metadata")
            .with_child(TreeNode::new(VARIETY_NODE_NAME))
            .with_child(sequence)
    }

    fn frame() -> MarkerSegment {
        MarkerSegment::Sof(SofSegment::new(
            FrameProcess::Baseline,
            vec![FrameComponentSpec::new(1, 1, 1, 0)],
        ))
    }

    fn scan() -> MarkerSegment {
        MarkerSegment::Sos(SosSegment::new(vec![ScanComponentSpec::new(1, 0, 0)]))
    }

    fn document(segments: Vec<MarkerSegment>) -> MetadataDocument {
        MetadataDocument::from_segments(DocumentKind::Image, segments).unwrap()
    }

    fn kinds(document: &MetadataDocument) -> Vec<SegmentKind> {
        document.segments().iter().map(MarkerSegment::kind).collect()
    }

    #[test]
    fn test_new_dqt_goes_before_frame() {
        let mut doc = document(vec![
            MarkerSegment::Com(ComSegment::from_text("c")),
            frame(),
            scan(),
        ]);
        let dqt = DqtSegment::new(vec![tables::luminance_quant_table(50)]);
        merge_native_tree(&mut doc, &image_tree(vec![dqt.to_native_node()])).unwrap();
        assert_eq!(
            kinds(&doc),
            [SegmentKind::Com, SegmentKind::Dqt, SegmentKind::Sof, SegmentKind::Sos]
        );
    }

    #[test]
    fn test_table_replaced_by_id_or_appended() {
        let mut doc = document(vec![MarkerSegment::Dqt(DqtSegment::new(vec![
            tables::luminance_quant_table(50),
        ]))]);
        let replacement = QuantizationTable::new(0, [3; 64]);
        let chroma = tables::chrominance_quant_table(50);
        let node = DqtSegment::new(vec![replacement.clone(), chroma.clone()]).to_native_node();
        merge_native_tree(&mut doc, &image_tree(vec![node])).unwrap();
        let dqt = doc.quantization_segments().next().unwrap();
        assert_eq!(dqt.tables, [replacement, chroma]);
    }

    #[test]
    fn test_new_dht_follows_last_dqt() {
        let mut doc = document(vec![
            MarkerSegment::Dqt(DqtSegment::new(vec![tables::luminance_quant_table(50)])),
            MarkerSegment::Com(ComSegment::from_text("c")),
            frame(),
        ]);
        let dht = DhtSegment::new(vec![tables::luminance_dc_table()]);
        merge_native_tree(&mut doc, &image_tree(vec![dht.to_native_node()])).unwrap();
        assert_eq!(doc.segments()[1].kind(), SegmentKind::Dht);

        let ac = DhtSegment::new(vec![tables::luminance_ac_table()]);
        merge_native_tree(&mut doc, &image_tree(vec![ac.to_native_node()])).unwrap();
        let merged = doc.huffman_segments().next().unwrap();
        assert!(merged.table(HuffmanClass::Ac, 0).is_some());
        assert_eq!(doc.count(SegmentKind::Dht), 1);
    }

    #[test]
    fn test_comment_and_unknown_positions() {
        let mut doc = document(vec![
            MarkerSegment::Adobe(AdobeSegment::new(AdobeTransform::Unknown)),
            frame(),
        ]);
        let tree = image_tree(vec![
            ComSegment::from_text("one").to_native_node(),
            UnknownSegment::new(0xE5, vec![9]).to_native_node(),
            ComSegment::from_text("two").to_native_node(),
        ]);
        merge_native_tree(&mut doc, &tree).unwrap();
        assert_eq!(
            kinds(&doc),
            [
                SegmentKind::Unknown,
                SegmentKind::Adobe,
                SegmentKind::Com,
                SegmentKind::Com,
                SegmentKind::Sof
            ]
        );
    }

    #[test]
    fn test_adobe_inserted_after_jfif() {
        let mut doc = document(vec![MarkerSegment::Jfif(JfifSegment::default()), frame()]);
        let adobe = AdobeSegment::new(AdobeTransform::Unknown);
        merge_native_tree(&mut doc, &image_tree(vec![adobe.to_native_node()])).unwrap();
        assert_eq!(doc.segments()[1].kind(), SegmentKind::Adobe);
    }

    #[test]
    fn test_jfif_variety_inserts_or_updates() {
        let mut doc = document(vec![frame()]);
        let mut tree = to_native_tree(&doc);
        tree.children[0].append_child(TreeNode::new("app0JFIF").with_attribute("Xdensity", 72));
        merge_native_tree(&mut doc, &tree).unwrap();
        assert_eq!(doc.jfif().unwrap().x_density, 72);
        assert_eq!(doc.jfif().unwrap().y_density, 1);
    }

    #[test]
    fn test_ambiguous_scan_rejected_and_rolled_back() {
        let mut doc = document(vec![frame(), scan(), scan()]);
        let before = doc.clone();
        let sos = SosSegment::new(vec![ScanComponentSpec::new(1, 1, 1)]);
        let err = merge_native_tree(&mut doc, &image_tree(vec![sos.to_native_node()])).unwrap_err();
        assert!(err.is_invalid_tree());
        assert_eq!(doc, before);
        assert!(!doc.is_modified());
    }

    #[test]
    fn test_inconsistent_result_restores_original() {
        let mut doc = document(vec![MarkerSegment::Jfif(JfifSegment::default()), frame()]);
        let before = doc.clone();
        let adobe = AdobeSegment::new(AdobeTransform::Ycck);
        let err = merge_native_tree(&mut doc, &image_tree(vec![adobe.to_native_node()])).unwrap_err();
        assert!(err.to_string().contains("original restored"));
        assert_eq!(doc, before);
    }

    #[test]
    fn test_stream_tree_merges_flat_children() {
        let mut doc = MetadataDocument::new(DocumentKind::Stream);
        let root = TreeNode::new("jpeg_stream_metadata")
            .with_child(DriSegment::new(8).to_native_node())
            .with_child(DriSegment::new(16).to_native_node());
        merge_native_tree(&mut doc, &root).unwrap();
        assert_eq!(doc.len(), 1);
        assert!(matches!(&doc.segments()[0], MarkerSegment::Dri(d) if d.interval == 16));
    }

    #[test]
    fn test_unknown_node_name_rejected() {
        let mut doc = document(vec![]);
        let tree = image_tree(vec![TreeNode::new("exif")]);
        assert!(merge_native_tree(&mut doc, &tree).unwrap_err().is_invalid_tree());
    }
}
