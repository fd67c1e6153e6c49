// Parsing scenarios over hand-assembled marker streams.

use jpegmeta_rs::segments::{DensityUnits, MarkerSegment};
use jpegmeta_rs::{CollectWarnings, MetadataDocument, MetadataWarning, Result, parse_metadata};
use std::io::Cursor;

const SOI: [u8; 2] = [0xFF, 0xD8];
const EOI: [u8; 2] = [0xFF, 0xD9];

fn jfif_segment() -> Vec<u8> {
    let mut bytes = vec![0xFF, 0xE0, 0x00, 0x10];
    bytes.extend(b"JFIF\0");
    bytes.extend([0x01, 0x02, 0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00]);
    bytes
}

fn icc_chunk(index: u8, count: u8, data: &[u8]) -> Vec<u8> {
    let length = (2 + 12 + 2 + data.len()) as u16;
    let mut bytes = vec![0xFF, 0xE2];
    bytes.extend(length.to_be_bytes());
    bytes.extend(b"ICC_PROFILE\0");
    bytes.extend([index, count]);
    bytes.extend(data);
    bytes
}

fn parse(bytes: &[u8]) -> Result<(MetadataDocument, Vec<MetadataWarning>)> {
    let mut sink = CollectWarnings::default();
    let document = parse_metadata(&mut Cursor::new(bytes), false, &mut sink)?;
    Ok((document, sink.warnings))
}

#[test]
fn test_minimal_jfif_stream() {
    let bytes = [SOI.to_vec(), jfif_segment(), EOI.to_vec()].concat();
    let (document, warnings) = parse(&bytes).unwrap();
    assert!(warnings.is_empty());
    assert_eq!(document.len(), 1);

    let jfif = document.jfif().unwrap();
    assert_eq!((jfif.major_version, jfif.minor_version), (1, 2));
    assert_eq!(jfif.units, DensityUnits::None);
    assert_eq!((jfif.x_density, jfif.y_density), (1, 1));
    assert_eq!((jfif.thumb_width(), jfif.thumb_height()), (0, 0));
}

#[test]
fn test_icc_chunks_out_of_order() {
    let first = [0x10u8; 40];
    let second = [0x20u8; 24];
    let bytes = [
        SOI.to_vec(),
        jfif_segment(),
        icc_chunk(2, 2, &second),
        icc_chunk(1, 2, &first),
        EOI.to_vec(),
    ]
    .concat();
    let (document, _) = parse(&bytes).unwrap();
    let profile = &document.icc_profile().unwrap().profile;
    assert_eq!(profile.len(), 64);
    assert_eq!(&profile[..40], &first);
    assert_eq!(&profile[40..], &second);
}

#[test]
fn test_missing_icc_chunk_is_format_error() {
    let bytes = [
        SOI.to_vec(),
        jfif_segment(),
        icc_chunk(1, 3, &[1, 2, 3]),
        icc_chunk(3, 3, &[7, 8, 9]),
        EOI.to_vec(),
    ]
    .concat();
    assert!(parse(&bytes).unwrap_err().is_format_error());
}

#[test]
fn test_icc_without_jfif_is_opaque() {
    let bytes = [SOI.to_vec(), icc_chunk(1, 1, &[5; 8]), EOI.to_vec()].concat();
    let (document, _) = parse(&bytes).unwrap();
    assert!(matches!(document.segments(), [MarkerSegment::Unknown(u)] if u.tag == 0xE2));
}

#[test]
fn test_truncated_scan_is_implicit_end() {
    let bytes = [
        0xFF, 0xD8, 0xFF, 0xC0, 0x00, 0x0B, 8, 0, 16, 0, 16, 1, 1, 0x11, 0, 0xFF, 0xDA, 0x00,
        0x08, 1, 1, 0x00, 0, 63, 0, 0x12, 0x34, 0x56, 0x78,
    ];
    let (document, warnings) = parse(&bytes).unwrap();
    assert_eq!(warnings, [MetadataWarning::ImplicitEndOfImage]);
    assert_eq!(document.len(), 2);
    assert_eq!(document.sof().unwrap().num_lines, 16);
}

#[test]
fn test_truncated_segment_is_format_error() {
    let mut bytes = SOI.to_vec();
    bytes.extend([0xFF, 0xFE, 0x00, 0x20, b'a', b'b']);
    let err = parse(&bytes).unwrap_err();
    assert!(err.is_format_error());
}

#[test]
fn test_adobe_segment_parsed() {
    let mut bytes = SOI.to_vec();
    bytes.extend([0xFF, 0xEE, 0x00, 0x0E]);
    bytes.extend(b"Adobe");
    bytes.extend([0x00, 0x64, 0x00, 0x00, 0x00, 0x00, 0x02]);
    bytes.extend(EOI);
    let (document, _) = parse(&bytes).unwrap();
    let adobe = document.adobe().unwrap();
    assert_eq!(adobe.version, 100);
    assert_eq!(adobe.transform, jpegmeta_rs::segments::AdobeTransform::Ycck);
}
