//! jpegmeta CLI - inspect and edit JPEG marker metadata.
//!
//! Reads the marker segments of a JPEG file, prints them, dumps the native
//! or standard tree as JSON and adds comments without touching the
//! compressed pixel data.

use clap::{Parser, Subcommand, ValueEnum};
use jpegmeta_rs::jpeg_stream_writer::JpegStreamWriter;
use jpegmeta_rs::segments::{HuffmanClass, MarkerSegment};
use jpegmeta_rs::{
    CollectWarnings, EncodeParams, LayoutColorSpace, MetadataDocument, PixelLayout, SegmentKind,
    TreeFormat, TreeNode,
};
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Inspect and edit JPEG marker-segment metadata
#[derive(Parser)]
#[command(name = "jpegmeta")]
#[command(version)]
#[command(about = "Inspect and edit JPEG marker-segment metadata", long_about = None)]
#[command(after_help = "EXAMPLES:
    jpegmeta info -i photo.jpg
    jpegmeta tree -i photo.jpg -f standard
    jpegmeta tables -i photo.jpg
    jpegmeta defaults -c ycbcr -n 3 --progressive
    jpegmeta comment -i photo.jpg -o tagged.jpg -t \"scanned 2024\"

Set RUST_LOG=debug to trace every parsed segment.")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the marker segments of a JPEG file
    #[command(visible_alias = "i")]
    Info {
        #[arg(short, long, help = "Path to the JPEG file")]
        input: PathBuf,

        /// Treat the file as a tables-only stream
        #[arg(long)]
        stream: bool,
    },

    /// Print the metadata tree as JSON
    #[command(visible_alias = "t")]
    Tree {
        #[arg(short, long, help = "Path to the JPEG file")]
        input: PathBuf,

        #[arg(short, long, default_value = "native", value_enum)]
        format: FormatArg,

        /// Treat the file as a tables-only stream
        #[arg(long)]
        stream: bool,
    },

    /// Print the quantization and Huffman tables
    Tables {
        #[arg(short, long, help = "Path to the JPEG file")]
        input: PathBuf,
    },

    /// Print the default metadata the writer would use, as a native tree
    Defaults {
        /// Color space of the pixels
        #[arg(short, long, default_value = "ycbcr", value_enum)]
        color_space: ColorSpaceArg,

        /// Number of color components
        #[arg(short = 'n', long, default_value = "3")]
        components: usize,

        /// Add an alpha component
        #[arg(long)]
        alpha: bool,

        #[arg(long)]
        progressive: bool,

        #[arg(long)]
        optimize: bool,

        /// Quality level (1-100)
        #[arg(short, long, default_value = "75")]
        quality: u8,

        /// Tables-only stream metadata instead of image metadata
        #[arg(long)]
        stream: bool,
    },

    /// Add a comment segment and write the result
    Comment {
        #[arg(short, long, help = "Path to the JPEG file")]
        input: PathBuf,

        #[arg(short, long, help = "Path for the edited file")]
        output: PathBuf,

        /// Comment text (Latin-1)
        #[arg(short, long)]
        text: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum FormatArg {
    Native,
    Standard,
}

impl From<FormatArg> for TreeFormat {
    fn from(format: FormatArg) -> Self {
        match format {
            FormatArg::Native => TreeFormat::Native,
            FormatArg::Standard => TreeFormat::Standard,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum ColorSpaceArg {
    Gray,
    Rgb,
    Ycbcr,
    Photoycc,
    Cmyk,
    Other,
}

impl From<ColorSpaceArg> for LayoutColorSpace {
    fn from(color_space: ColorSpaceArg) -> Self {
        match color_space {
            ColorSpaceArg::Gray => LayoutColorSpace::Gray,
            ColorSpaceArg::Rgb => LayoutColorSpace::Rgb,
            ColorSpaceArg::Ycbcr => LayoutColorSpace::YCbCr,
            ColorSpaceArg::Photoycc => LayoutColorSpace::PhotoYcc,
            ColorSpaceArg::Cmyk => LayoutColorSpace::Cmyk,
            ColorSpaceArg::Other => LayoutColorSpace::Other,
        }
    }
}

fn main() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Info { input, stream } => show_info(&input, stream),
        Commands::Tree {
            input,
            format,
            stream,
        } => print_tree(&input, format.into(), stream),
        Commands::Tables { input } => print_tables(&input),
        Commands::Defaults {
            color_space,
            components,
            alpha,
            progressive,
            optimize,
            quality,
            stream,
        } => {
            let mut layout = PixelLayout::new(color_space.into(), components);
            if alpha {
                layout = layout.with_alpha();
            }
            let params = EncodeParams {
                progressive,
                optimize_huffman: optimize,
                quality,
                tables: None,
            };
            print_defaults(&layout, &params, stream)
        }
        Commands::Comment {
            input,
            output,
            text,
        } => add_comment(&input, &output, &text),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn read_document(
    input: &Path,
    stream: bool,
) -> Result<(Vec<u8>, MetadataDocument), Box<dyn std::error::Error>> {
    let data = fs::read(input)?;
    let mut sink = CollectWarnings::default();
    let document = jpegmeta_rs::parse_metadata(&mut Cursor::new(&data), stream, &mut sink)?;
    for warning in &sink.warnings {
        eprintln!("warning: {}", warning);
    }
    Ok((data, document))
}

fn describe(segment: &MarkerSegment) -> String {
    match segment {
        MarkerSegment::Jfif(jfif) => format!(
            "JFIF {}.{:02} density {}x{} ({:?}), {} thumbnail(s){}",
            jfif.major_version,
            jfif.minor_version,
            jfif.x_density,
            jfif.y_density,
            jfif.units,
            jfif.thumbnail_count(),
            if jfif.icc.is_some() { ", ICC profile" } else { "" }
        ),
        MarkerSegment::Adobe(adobe) => {
            format!("Adobe version {} transform {:?}", adobe.version, adobe.transform)
        }
        MarkerSegment::Dqt(dqt) => {
            let ids: Vec<_> = dqt.tables.iter().map(|t| t.id).collect();
            format!("DQT tables {:?}", ids)
        }
        MarkerSegment::Dht(dht) => {
            let keys: Vec<_> = dht.tables.iter().map(|t| t.key()).collect();
            format!("DHT tables {:?}", keys)
        }
        MarkerSegment::Dri(dri) => format!("DRI interval {}", dri.interval),
        MarkerSegment::Com(com) => format!("COM \"{}\"", com.text()),
        MarkerSegment::Sof(sof) => format!(
            "SOF {:?} {}x{} components {:?}",
            sof.process,
            sof.samples_per_line,
            sof.num_lines,
            sof.component_ids()
        ),
        MarkerSegment::Sos(sos) => {
            let selectors: Vec<_> = sos.selectors().collect();
            format!(
                "SOS components {:?} spectral {}..={} approx {}/{}",
                selectors, sos.start_spectral, sos.end_spectral, sos.approx_high, sos.approx_low
            )
        }
        MarkerSegment::Unknown(unknown) => {
            format!("APP/unknown 0x{:02X}, {} bytes", unknown.tag, unknown.data.len())
        }
    }
}

fn show_info(input: &Path, stream: bool) -> Result<(), Box<dyn std::error::Error>> {
    let (data, document) = read_document(input, stream)?;
    println!("File: {:?} ({} bytes)", input, data.len());
    println!("Kind: {:?}, {} segment(s)", document.kind(), document.len());
    for segment in document.segments() {
        let offset = segment
            .origin()
            .stream_offset()
            .map_or_else(|| "-".to_string(), |o| o.to_string());
        println!("  @{:>8}  {}", offset, describe(segment));
    }
    if let Some(icc) = document.icc_profile() {
        println!("ICC profile: {} bytes in {} chunk(s)", icc.profile.len(), icc.chunk_count());
    }
    for (i, thumbnail) in document.thumbnails().iter().enumerate() {
        println!("Thumbnail {}: {}x{}", i, thumbnail.width(), thumbnail.height());
    }
    Ok(())
}

fn print_tree(input: &Path, format: TreeFormat, stream: bool) -> Result<(), Box<dyn std::error::Error>> {
    let (_, document) = read_document(input, stream)?;
    let tree: TreeNode = jpegmeta_rs::to_tree(&document, format)?;
    println!("{}", serde_json::to_string_pretty(&tree)?);
    Ok(())
}

fn print_tables(input: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let (_, document) = read_document(input, false)?;
    for dqt in document.quantization_segments() {
        for table in &dqt.tables {
            println!("Quantization table {} ({}-bit)", table.id, if table.precision == 0 { 8 } else { 16 });
            for row in table.values.chunks(8) {
                let row: Vec<String> = row.iter().map(|v| format!("{:>4}", v)).collect();
                println!("  {}", row.join(""));
            }
        }
    }
    for dht in document.huffman_segments() {
        for table in &dht.tables {
            let class = match table.class {
                HuffmanClass::Dc => "DC",
                HuffmanClass::Ac => "AC",
            };
            println!(
                "Huffman {} table {}: {} codes, lengths {:?}",
                class,
                table.id,
                table.values.len(),
                table.lengths
            );
        }
    }
    Ok(())
}

fn print_defaults(
    layout: &PixelLayout,
    params: &EncodeParams,
    stream: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let document = if stream {
        jpegmeta_rs::default_stream_metadata(params)?
    } else {
        jpegmeta_rs::default_image_metadata(layout, params)?
    };
    let tree = jpegmeta_rs::to_tree(&document, TreeFormat::Native)?;
    println!("{}", serde_json::to_string_pretty(&tree)?);
    Ok(())
}

/// Writes the edited header, then copies everything from the first SOS
/// marker on verbatim.
fn add_comment(input: &Path, output: &Path, text: &str) -> Result<(), Box<dyn std::error::Error>> {
    let (data, mut document) = read_document(input, false)?;
    let scan_start = document
        .segments()
        .iter()
        .find(|segment| segment.kind() == SegmentKind::Sos)
        .and_then(|sos| sos.origin().stream_offset())
        .ok_or("no scan data found")?;
    // Payload offset minus the marker and length bytes.
    let scan_start = scan_start as usize - 4;

    let text_node = TreeNode::new("Text").with_child(
        TreeNode::new("TextEntry")
            .with_attribute("keyword", "comment")
            .with_attribute("value", text),
    );
    let root = TreeNode::new(TreeFormat::Standard.root_name(document.kind())).with_child(text_node);
    jpegmeta_rs::merge_tree(&mut document, &root, TreeFormat::Standard)?;

    let mut writer = JpegStreamWriter::new(Vec::new());
    writer.write_start_of_image()?;
    for segment in document.segments().iter().take_while(|s| s.kind() != SegmentKind::Sos) {
        segment.write_to(&mut writer)?;
    }
    writer.write_bytes(&data[scan_start..])?;
    fs::write(output, writer.into_inner())?;
    println!("Added comment to {:?}", output);
    Ok(())
}
