//! Stamp a centered, semi-transparent watermark onto batches of images.
//!
//! The watermark is scaled to a percentage of each image's width (aspect
//! ratio kept), faded to the requested opacity, centered, and alpha-blended
//! over a copy of the image. Results are re-encoded per image and can be
//! bundled into a single zip archive.
//!
//! # Quick Start
//!
//! ```no_run
//! use watermark_overlay::compose;
//!
//! let base = image::open("photo.jpg").unwrap();
//! let logo = image::open("logo.png").unwrap();
//! let stamped = compose(&base, &logo, 50, 20).unwrap();
//! stamped.save("photo_wm.png").unwrap();
//! ```
//!
//! # Batches
//!
//! A [`BatchDriver`] applies one watermark to many uploads. A failure on one
//! image is recorded and the rest of the batch carries on.
//!
//! ```no_run
//! use std::path::Path;
//! use watermark_overlay::{build_zip, load_watermark, BatchConfig, BatchDriver, InputImage};
//!
//! let watermark = load_watermark(None).expect("no watermark available");
//! let driver = BatchDriver::new(&watermark, BatchConfig::default()).unwrap();
//! let inputs = vec![InputImage::from_path(Path::new("a.png")).unwrap()];
//! let outcome = driver
//!     .run(&inputs, |p| println!("{}/{}", p.completed, p.total))
//!     .unwrap();
//! let zip = build_zip(&outcome.results).unwrap();
//! std::fs::write("watermarked.zip", zip).unwrap();
//! ```

#![deny(missing_docs)]

pub mod archive;
pub mod batch;
pub mod compositor;
pub mod error;
pub mod format;

pub use archive::{archive_file_name, build_zip, DEFAULT_ARCHIVE_NAME};
pub use batch::{
    load_watermark, load_watermark_from, BatchConfig, BatchDriver, BatchOutcome, InputImage,
    ItemError, ProcessedResult, Progress, DEFAULT_WATERMARK_PATH,
};
pub use compositor::compose;
pub use error::{Error, Result};
pub use format::{
    is_supported_image, is_supported_watermark, output_file_name, FormatChoice, OutputFormat,
};
