// Native and standard tree merges, including rollback on rejection.

use jpegmeta_rs::segments::{
    AdobeSegment, AdobeTransform, ComSegment, DqtSegment, FrameComponentSpec, FrameProcess,
    JfifSegment, MarkerSegment, ScanComponentSpec, SegmentCodec, SofSegment, SosSegment,
};
use jpegmeta_rs::tables::luminance_quant_table;
use jpegmeta_rs::{
    DocumentKind, EncodeParams, LayoutColorSpace, MetadataDocument, PixelLayout, SegmentKind,
    TreeFormat, TreeNode, default_image_metadata, from_native_tree, merge_tree, to_tree,
};

const CHROMA_NAMES: [&str; 15] = [
    "GRAY", "YCbCr", "PhotoYCC", "RGB", "XYZ", "Lab", "Luv", "YxY", "HSV", "HLS", "CMY", "3CLR",
    "YCCK", "CMYK", "4CLR",
];

fn native_root(sequence: Vec<TreeNode>) -> TreeNode {
    let mut markers = TreeNode::new("markerSequence");
    for node in sequence {
        markers.append_child(node);
    }
    TreeNode::new("jpeg_image_metadata")
        .with_child(TreeNode::new("JPEGvariety"))
        .with_child(markers)
}

fn standard_root(children: Vec<TreeNode>) -> TreeNode {
    let mut root = TreeNode::new("standard_metadata");
    for child in children {
        root.append_child(child);
    }
    root
}

fn chroma_node(name: &str) -> TreeNode {
    TreeNode::new("Chroma").with_child(TreeNode::new("ColorSpaceType").with_attribute("name", name))
}

fn alpha_node(value: &str) -> TreeNode {
    TreeNode::new("Transparency").with_child(TreeNode::new("Alpha").with_attribute("value", value))
}

fn defaults(color_space: LayoutColorSpace, components: usize) -> MetadataDocument {
    let layout = PixelLayout::new(color_space, components);
    default_image_metadata(&layout, &EncodeParams::default()).unwrap()
}

fn kinds(document: &MetadataDocument) -> Vec<SegmentKind> {
    document.segments().iter().map(|s| s.kind()).collect()
}

fn progressive_document() -> MetadataDocument {
    let frame = SofSegment::new(
        FrameProcess::Progressive,
        vec![
            FrameComponentSpec::new(1, 2, 2, 0),
            FrameComponentSpec::new(2, 1, 1, 1),
            FrameComponentSpec::new(3, 1, 1, 1),
        ],
    );
    let dc_scan = SosSegment::new(vec![
        ScanComponentSpec::new(1, 0, 0),
        ScanComponentSpec::new(2, 1, 0),
        ScanComponentSpec::new(3, 1, 0),
    ]);
    let mut ac_scan = SosSegment::new(vec![ScanComponentSpec::new(1, 0, 0)]);
    ac_scan.start_spectral = 1;
    ac_scan.end_spectral = 63;
    MetadataDocument::from_segments(
        DocumentKind::Image,
        vec![
            MarkerSegment::Jfif(JfifSegment::default()),
            MarkerSegment::Sof(frame),
            MarkerSegment::Sos(dc_scan),
            MarkerSegment::Sos(ac_scan),
        ],
    )
    .unwrap()
}

#[test]
fn test_new_dqt_goes_before_frame() {
    let mut document = MetadataDocument::from_segments(
        DocumentKind::Image,
        vec![
            MarkerSegment::Com(ComSegment::from_text("x")),
            MarkerSegment::Sof(SofSegment::for_components(FrameProcess::Baseline, false, &[1])),
        ],
    )
    .unwrap();
    let dqt = DqtSegment::new(vec![luminance_quant_table(50)]).to_native_node();
    merge_tree(&mut document, &native_root(vec![dqt.clone()]), TreeFormat::Native).unwrap();
    assert_eq!(kinds(&document), [SegmentKind::Com, SegmentKind::Dqt, SegmentKind::Sof]);

    let mut no_frame = MetadataDocument::from_segments(
        DocumentKind::Image,
        vec![MarkerSegment::Com(ComSegment::from_text("x"))],
    )
    .unwrap();
    merge_tree(&mut no_frame, &native_root(vec![dqt]), TreeFormat::Native).unwrap();
    assert_eq!(kinds(&no_frame), [SegmentKind::Com, SegmentKind::Dqt]);
}

#[test]
fn test_ycbcr_to_rgb_chroma_edit() {
    let layout = PixelLayout::new(LayoutColorSpace::YCbCr, 3);
    let mut document = default_image_metadata(&layout, &EncodeParams::default()).unwrap();
    let mut tree = to_tree(&document, TreeFormat::Standard).unwrap();
    let chroma = tree.children.iter_mut().find(|c| c.name == "Chroma").unwrap();
    assert_eq!(chroma.children[0].attribute("name"), Some("YCbCr"));
    chroma.children[0].set_attribute("name", "RGB");

    merge_tree(&mut document, &tree, TreeFormat::Standard).unwrap();
    assert!(document.jfif().is_none());
    assert_eq!(document.adobe().unwrap().transform, AdobeTransform::Unknown);
    assert_eq!(document.sof().unwrap().component_ids(), b"RGB");
    assert!(!document.sof().unwrap().is_subsampled());
    let selectors: Vec<_> = document.scans().next().unwrap().selectors().collect();
    assert_eq!(selectors, b"RGB");
    assert!(document.is_consistent());

    let round = to_tree(&document, TreeFormat::Standard).unwrap();
    let name = round.find_child("Chroma").unwrap().children[0].attribute("name");
    assert_eq!(name, Some("RGB"));
}

#[test]
fn test_sos_merge_into_progressive_rejected() {
    let mut document = progressive_document();
    let before = document.clone();
    let scan = SosSegment::new(vec![ScanComponentSpec::new(1, 0, 0)]).to_native_node();
    let err = merge_tree(&mut document, &native_root(vec![scan]), TreeFormat::Native).unwrap_err();
    assert!(err.is_invalid_tree());
    assert_eq!(document, before);
    assert!(!document.is_modified());
}

#[test]
fn test_progressive_component_change_rejected() {
    let mut document = progressive_document();
    let before = document.clone();
    let chroma = TreeNode::new("Chroma")
        .with_child(TreeNode::new("ColorSpaceType").with_attribute("name", "GRAY"));
    let root = TreeNode::new("standard_metadata").with_child(chroma);
    assert!(merge_tree(&mut document, &root, TreeFormat::Standard).unwrap_err().is_invalid_tree());
    assert_eq!(document, before);
}

#[test]
fn test_inconsistent_result_rolls_back() {
    let mut document = MetadataDocument::from_segments(
        DocumentKind::Image,
        vec![
            MarkerSegment::Adobe(AdobeSegment::new(AdobeTransform::Ycck)),
            MarkerSegment::Sof(SofSegment::for_components(FrameProcess::Baseline, true, &[1, 2, 3, 4])),
        ],
    )
    .unwrap();
    let before = document.clone();
    let mut tree = native_root(vec![]);
    tree.children[0].append_child(JfifSegment::default().to_native_node());
    let err = merge_tree(&mut document, &tree, TreeFormat::Native).unwrap_err();
    assert!(err.is_invalid_tree());
    assert_eq!(document, before);
}

#[test]
fn test_wrong_root_rejected() {
    let mut document = progressive_document();
    let tree = TreeNode::new("jpeg_stream_metadata");
    assert!(merge_tree(&mut document, &tree, TreeFormat::Native).unwrap_err().is_invalid_tree());

    let mut stream = MetadataDocument::new(DocumentKind::Stream);
    let standard = TreeNode::new("standard_metadata");
    let err = merge_tree(&mut stream, &standard, TreeFormat::Standard).unwrap_err();
    assert_eq!(err.kind(), jpegmeta_rs::ErrorKind::Usage);
}

#[test]
fn test_reset_restores_parsed_sequence() {
    let mut document = progressive_document();
    let before = document.clone();
    let comment = ComSegment::from_text("edited").to_native_node();
    merge_tree(&mut document, &native_root(vec![comment.clone()]), TreeFormat::Native).unwrap();
    merge_tree(&mut document, &native_root(vec![comment]), TreeFormat::Native).unwrap();
    assert_eq!(document.comments().count(), 2);
    assert_eq!(document.segments()[1].kind(), SegmentKind::Com);
    assert!(document.is_modified());

    document.reset();
    assert_eq!(document, before);
    assert!(!document.is_modified());
}

#[test]
fn test_stream_merge_accepts_flat_root() {
    let mut stream = MetadataDocument::new(DocumentKind::Stream);
    let root = TreeNode::new("jpeg_stream_metadata")
        .with_child(DqtSegment::new(vec![luminance_quant_table(90)]).to_native_node());
    merge_tree(&mut stream, &root, TreeFormat::Native).unwrap();
    assert_eq!(kinds(&stream), [SegmentKind::Dqt]);
}

#[test]
fn test_alpha_on_four_channel_color_space_rejected() {
    for name in ["CMYK", "YCCK", "4CLR"] {
        let mut document = MetadataDocument::from_segments(
            DocumentKind::Image,
            vec![
                MarkerSegment::Adobe(AdobeSegment::new(AdobeTransform::Unknown)),
                MarkerSegment::Sof(SofSegment::for_components(FrameProcess::Baseline, false, &[1, 2, 3, 4])),
            ],
        )
        .unwrap();
        let before = document.clone();
        let tree = standard_root(vec![chroma_node(name), alpha_node("nonpremultiplied")]);
        let err = merge_tree(&mut document, &tree, TreeFormat::Standard).unwrap_err();
        assert!(err.is_invalid_tree(), "{}: {}", name, err);
        assert_eq!(document, before);
    }
}

#[test]
fn test_ycbcr_with_alpha_drops_jfif() {
    let mut document = defaults(LayoutColorSpace::YCbCr, 3);
    let tree = standard_root(vec![chroma_node("YCbCr"), alpha_node("premultiplied")]);
    merge_tree(&mut document, &tree, TreeFormat::Standard).unwrap();
    assert!(document.jfif().is_none());
    assert!(document.adobe().is_none());
    assert_eq!(document.sof().unwrap().component_ids(), [1, 2, 3, 4]);
    let selectors: Vec<_> = document.scans().next().unwrap().selectors().collect();
    assert_eq!(selectors, [1, 2, 3, 4]);
}

#[test]
fn test_rgb_with_alpha_uses_letter_ids() {
    let mut document = defaults(LayoutColorSpace::YCbCr, 3);
    let tree = standard_root(vec![chroma_node("RGB"), alpha_node("nonpremultiplied")]);
    merge_tree(&mut document, &tree, TreeFormat::Standard).unwrap();
    assert!(document.jfif().is_none());
    assert!(document.adobe().is_none());
    assert_eq!(document.sof().unwrap().component_ids(), b"RGBA");
    assert!(!document.sof().unwrap().is_subsampled());
}

#[test]
fn test_transparency_before_chroma_rejected() {
    let mut document = defaults(LayoutColorSpace::YCbCr, 3);
    let before = document.clone();
    let tree = standard_root(vec![alpha_node("none"), chroma_node("RGB")]);
    let err = merge_tree(&mut document, &tree, TreeFormat::Standard).unwrap_err();
    assert!(err.is_invalid_tree());
    assert_eq!(document, before);
}

#[test]
fn test_every_chroma_name_merges_or_rejects() {
    let documents = [
        defaults(LayoutColorSpace::YCbCr, 3),
        defaults(LayoutColorSpace::Gray, 1),
        defaults(LayoutColorSpace::Cmyk, 4),
        progressive_document(),
    ];
    for base in &documents {
        for name in CHROMA_NAMES {
            for alpha in [None, Some("none"), Some("nonpremultiplied")] {
                let mut children = vec![chroma_node(name)];
                children.extend(alpha.map(alpha_node));
                let mut document = base.clone();
                match merge_tree(&mut document, &standard_root(children), TreeFormat::Standard) {
                    Ok(()) => {
                        assert!(document.is_consistent(), "{} {:?}", name, alpha);
                        let native = to_tree(&document, TreeFormat::Native).unwrap();
                        assert_eq!(from_native_tree(DocumentKind::Image, &native).unwrap(), document);
                    }
                    Err(err) => {
                        assert!(err.is_invalid_tree(), "{} {:?}: {}", name, alpha, err);
                        assert_eq!(&document, base);
                    }
                }
            }
        }
    }
}

#[test]
fn test_non_finite_aspect_ratio_rejected() {
    for value in ["NaN", "inf", "0", "-2"] {
        let mut document = defaults(LayoutColorSpace::YCbCr, 3);
        let before = document.clone();
        let dimension = TreeNode::new("Dimension")
            .with_child(TreeNode::new("PixelAspectRatio").with_attribute("value", value));
        let err = merge_tree(&mut document, &standard_root(vec![dimension]), TreeFormat::Standard)
            .unwrap_err();
        assert!(err.is_invalid_tree(), "{}", value);
        assert_eq!(document, before);
    }
}

#[test]
fn test_wide_aspect_ratio_keeps_tree_round_trip() {
    let mut document = defaults(LayoutColorSpace::YCbCr, 3);
    let dimension = TreeNode::new("Dimension")
        .with_child(TreeNode::new("PixelAspectRatio").with_attribute("value", "254.7"));
    merge_tree(&mut document, &standard_root(vec![dimension]), TreeFormat::Standard).unwrap();
    let jfif = document.jfif().unwrap();
    assert!(jfif.x_density >= 1 && jfif.y_density >= 1);
    assert!((jfif.x_density as f32 / jfif.y_density as f32 - 254.7).abs() <= 0.005);
    let native = to_tree(&document, TreeFormat::Native).unwrap();
    assert_eq!(from_native_tree(DocumentKind::Image, &native).unwrap(), document);
}
