use std::path::{Path, PathBuf};
use std::process;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use watermark_overlay::{
    archive_file_name, build_zip, is_supported_image, load_watermark, BatchConfig, BatchDriver,
    FormatChoice, InputImage, ProcessedResult, DEFAULT_ARCHIVE_NAME,
};

#[derive(Parser)]
#[command(
    name = "watermark-overlay",
    about = "Stamp a centered, semi-transparent watermark onto one or more images",
    version,
    after_help = "Simple usage: watermark-overlay -w logo.png photo.jpg  (writes photo_wm.jpg)\n\n\
                  Without --watermark the bundled assets/watermark.png is used."
)]
struct Cli {
    /// Input image files or directories
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Watermark image (png, jpg, webp)
    #[arg(short, long)]
    watermark: Option<PathBuf>,

    /// Output directory
    #[arg(short, long, default_value = ".")]
    output: PathBuf,

    /// Watermark opacity in percent (0 = invisible, 100 = opaque)
    #[arg(long, default_value_t = 50, value_parser = clap::value_parser!(u8).range(0..=100))]
    opacity: u8,

    /// Watermark width as a percentage of the image width
    #[arg(long, default_value_t = 20, value_parser = clap::value_parser!(u8).range(5..=60))]
    scale: u8,

    /// Output format: keep, jpeg, png or webp
    #[arg(short, long, default_value = "keep")]
    format: FormatChoice,

    /// JPEG/WebP quality
    #[arg(long, default_value_t = 90, value_parser = clap::value_parser!(u8).range(60..=100))]
    quality: u8,

    /// Name of the zip archive bundling all outputs
    #[arg(long, default_value = DEFAULT_ARCHIVE_NAME)]
    archive: String,

    /// Do not write the zip archive
    #[arg(long)]
    no_archive: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Suppress all non-error output
    #[arg(short, long)]
    quiet: bool,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(&cli);

    let config = BatchConfig {
        opacity: cli.opacity,
        scale: cli.scale,
        format: cli.format,
        quality: cli.quality,
    };

    let watermark = match load_watermark(cli.watermark.as_deref()) {
        Ok(wm) => wm,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    };

    let driver = match BatchDriver::new(&watermark, config) {
        Ok(d) => d,
        Err(e) => {
            eprintln!("Fatal: Failed to initialize batch: {e}");
            process::exit(1);
        }
    };

    if !cli.quiet {
        let c = driver.config();
        eprintln!(
            "Opacity {}%, scale {}%, format {}, quality {}",
            c.opacity, c.scale, c.format, c.quality
        );
        eprintln!();
    }

    let mut read_failures = 0usize;
    let mut inputs = Vec::new();
    for path in collect_inputs(&cli.inputs) {
        match InputImage::from_path(&path) {
            Ok(input) => inputs.push(input),
            Err(e) => {
                eprintln!("[FAIL] {}: {e}", path.display());
                read_failures += 1;
            }
        }
    }

    if inputs.is_empty() {
        eprintln!("Error: No input images to process");
        process::exit(1);
    }

    if let Err(e) = std::fs::create_dir_all(&cli.output) {
        eprintln!("Error: Failed to create output directory: {e}");
        process::exit(1);
    }

    let outcome = match driver.run(&inputs, |p| {
        if cli.verbose {
            eprintln!(
                "  [{}/{}] {} ({:.0}%)",
                p.completed,
                p.total,
                p.file_name,
                p.fraction() * 100.0
            );
        }
    }) {
        Ok(o) => o,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    };

    for err in &outcome.errors {
        eprintln!("[FAIL] {}: {}", err.file_name, err.message);
    }
    let mut fail_count = read_failures + outcome.errors.len();

    let mut success_count = 0usize;
    for result in &outcome.results {
        let path = cli.output.join(&result.file_name);
        match std::fs::write(&path, &result.data) {
            Ok(()) => {
                success_count += 1;
                if !cli.quiet {
                    eprintln!("[OK] {} ({})", result.file_name, result.mime_type());
                }
            }
            Err(e) => {
                eprintln!("[FAIL] {}: Failed to save: {e}", result.file_name);
                fail_count += 1;
            }
        }
    }

    if !cli.no_archive && !outcome.results.is_empty() {
        let name = archive_file_name(&cli.archive);
        match write_archive(&cli.output.join(&name), &outcome.results) {
            Ok(()) => {
                if !cli.quiet {
                    eprintln!("[OK] {name} ({} files)", outcome.results.len());
                }
            }
            Err(e) => {
                eprintln!("[FAIL] {name}: {e}");
                fail_count += 1;
            }
        }
    }

    if !cli.quiet {
        eprintln!();
        eprint!("[Summary] Processed: {success_count}");
        if fail_count > 0 {
            eprint!(", Failed: {fail_count}");
        }
        eprintln!(" (Total: {})", inputs.len() + read_failures);
    }

    if fail_count > 0 {
        process::exit(1);
    }
}

fn init_tracing(cli: &Cli) {
    let default_level = if cli.quiet {
        "error"
    } else if cli.verbose {
        "info"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Expand directories into their supported images, sorted by name.
/// Plain file arguments are kept in the order given.
fn collect_inputs(args: &[PathBuf]) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    for arg in args {
        if !arg.is_dir() {
            paths.push(arg.clone());
            continue;
        }

        match std::fs::read_dir(arg) {
            Ok(rd) => {
                let mut entries: Vec<PathBuf> = rd
                    .filter_map(std::result::Result::ok)
                    .filter(|e| e.file_type().map(|ft| ft.is_file()).unwrap_or(false))
                    .map(|e| e.path())
                    .filter(|p| is_supported_image(p))
                    .collect();
                entries.sort();
                paths.extend(entries);
            }
            Err(e) => eprintln!("[FAIL] {}: Failed to read directory: {e}", arg.display()),
        }
    }
    paths
}

fn write_archive(path: &Path, results: &[ProcessedResult]) -> watermark_overlay::Result<()> {
    let bytes = build_zip(results)?;
    std::fs::write(path, bytes)?;
    Ok(())
}
