// Default metadata for the write path.

use jpegmeta_rs::segments::{AdobeTransform, FrameProcess};
use jpegmeta_rs::standard_tree::{ColorSpaceName, chroma_info};
use jpegmeta_rs::{
    CollectWarnings, DocumentKind, EncodeParams, LayoutColorSpace, PixelLayout, SegmentKind,
    TableSet, default_image_metadata, default_stream_metadata, parse_metadata, serialize_metadata,
};
use std::io::Cursor;

const COLOR_SPACES: [(LayoutColorSpace, usize); 6] = [
    (LayoutColorSpace::Gray, 1),
    (LayoutColorSpace::Rgb, 3),
    (LayoutColorSpace::YCbCr, 3),
    (LayoutColorSpace::PhotoYcc, 3),
    (LayoutColorSpace::Cmyk, 4),
    (LayoutColorSpace::Other, 2),
];

#[test]
fn test_every_layout_yields_consistent_metadata() {
    let param_sets = [
        EncodeParams::default(),
        EncodeParams {
            progressive: true,
            ..EncodeParams::default()
        },
        EncodeParams {
            optimize_huffman: true,
            quality: 95,
            ..EncodeParams::default()
        },
    ];
    for (color_space, components) in COLOR_SPACES {
        for params in &param_sets {
            for alpha in [false, true] {
                let mut layout = PixelLayout::new(color_space, components);
                if alpha {
                    layout = layout.with_alpha();
                }
                let document = default_image_metadata(&layout, params)
                    .unwrap_or_else(|e| panic!("{:?} alpha={}: {}", color_space, alpha, e));
                assert!(document.is_consistent());
                assert_eq!(document.sof().unwrap().components.len(), layout.num_components);
                assert_eq!(document.count(SegmentKind::Sos), usize::from(!params.progressive));
            }
        }
    }
}

#[test]
fn test_standard_view_of_defaults() {
    let cases = [
        (LayoutColorSpace::Gray, 1, ColorSpaceName::Gray),
        (LayoutColorSpace::YCbCr, 3, ColorSpaceName::YCbCr),
        (LayoutColorSpace::Rgb, 3, ColorSpaceName::YCbCr),
        (LayoutColorSpace::Cmyk, 4, ColorSpaceName::Ycck),
    ];
    for (color_space, components, expected) in cases {
        let layout = PixelLayout::new(color_space, components);
        let document = default_image_metadata(&layout, &EncodeParams::default()).unwrap();
        assert_eq!(chroma_info(&document).unwrap().color_space, Some(expected));
    }
}

#[test]
fn test_photo_ycc_defaults() {
    let layout = PixelLayout::new(LayoutColorSpace::PhotoYcc, 3).with_alpha();
    let document = default_image_metadata(&layout, &EncodeParams::default()).unwrap();
    assert_eq!(document.sof().unwrap().component_ids(), b"YCcA");
    assert_eq!(document.adobe().unwrap().transform, AdobeTransform::Unknown);
    assert!(document.sof().unwrap().is_subsampled());
}

#[test]
fn test_quality_scales_tables() {
    let layout = PixelLayout::new(LayoutColorSpace::Gray, 1);
    let coarse = EncodeParams {
        quality: 10,
        ..EncodeParams::default()
    };
    let fine = EncodeParams {
        quality: 100,
        ..EncodeParams::default()
    };
    let table = |params: &EncodeParams| {
        let document = default_image_metadata(&layout, params).unwrap();
        document.quantization_segments().next().unwrap().tables[0].clone()
    };
    assert!(table(&coarse).values[0] > table(&fine).values[0]);
    assert!(table(&fine).values.iter().all(|&v| v == 1));
}

#[test]
fn test_stream_defaults_round_trip() {
    let document = default_stream_metadata(&EncodeParams::default()).unwrap();
    assert_eq!(document.kind(), DocumentKind::Stream);
    let bytes = serialize_metadata(&document, Vec::new()).unwrap();
    let mut sink = CollectWarnings::default();
    let reparsed = parse_metadata(&mut Cursor::new(bytes), true, &mut sink).unwrap();
    assert_eq!(reparsed.segments(), document.segments());
}

#[test]
fn test_stream_defaults_use_supplied_tables() {
    let tables = TableSet {
        quantization: vec![jpegmeta_rs::tables::luminance_quant_table(30)],
        huffman: vec![jpegmeta_rs::tables::luminance_ac_table()],
    };
    let params = EncodeParams {
        tables: Some(tables.clone()),
        ..EncodeParams::default()
    };
    let document = default_stream_metadata(&params).unwrap();
    assert_eq!(document.quantization_segments().next().unwrap().tables, tables.quantization);
    assert_eq!(document.huffman_segments().next().unwrap().tables, tables.huffman);

    let layout = PixelLayout::new(LayoutColorSpace::YCbCr, 3);
    let image = default_image_metadata(&layout, &params).unwrap();
    assert_eq!(image.count(SegmentKind::Dqt), 0);
    assert_eq!(image.sof().unwrap().process, FrameProcess::Baseline);
}
