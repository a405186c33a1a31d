//! Batch driver: watermark a list of uploads one after another.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use image::{DynamicImage, RgbaImage};
use tracing::{debug, info, warn};

use crate::compositor;
use crate::error::{Error, Result};
use crate::format::{self, FormatChoice, OutputFormat};

/// Location of the bundled watermark used when none is uploaded.
pub const DEFAULT_WATERMARK_PATH: &str = "assets/watermark.png";

/// Settings shared by every image of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchConfig {
    /// Watermark opacity in percent (0-100).
    pub opacity: u8,
    /// Watermark width as a percentage of each image's width (5-60).
    pub scale: u8,
    /// Output format.
    pub format: FormatChoice,
    /// JPEG/WebP quality (60-100).
    pub quality: u8,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            opacity: 50,
            scale: 20,
            format: FormatChoice::KeepOriginal,
            quality: 90,
        }
    }
}

impl BatchConfig {
    /// Check every setting against its accepted range.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] naming the first offending setting.
    pub fn validate(&self) -> Result<()> {
        if self.opacity > 100 {
            return Err(Error::InvalidConfig(format!(
                "opacity must be between 0 and 100, got {}",
                self.opacity
            )));
        }
        if !(5..=60).contains(&self.scale) {
            return Err(Error::InvalidConfig(format!(
                "scale must be between 5 and 60, got {}",
                self.scale
            )));
        }
        if !(60..=100).contains(&self.quality) {
            return Err(Error::InvalidConfig(format!(
                "quality must be between 60 and 100, got {}",
                self.quality
            )));
        }
        Ok(())
    }
}

/// An uploaded image: its original file name and raw bytes.
#[derive(Debug, Clone)]
pub struct InputImage {
    /// File name as uploaded, extension included.
    pub name: String,
    /// Undecoded file contents.
    pub data: Vec<u8>,
}

impl InputImage {
    /// Wrap bytes that are already in memory.
    pub fn new(name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }

    /// Read a file from disk, keeping only its file name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be read.
    pub fn from_path(path: &Path) -> Result<Self> {
        let data = std::fs::read(path)?;
        let name = path.file_name().map_or_else(
            || path.display().to_string(),
            |f| f.to_string_lossy().to_string(),
        );
        Ok(Self { name, data })
    }
}

/// One successfully watermarked image.
#[derive(Debug, Clone)]
pub struct ProcessedResult {
    /// Derived output name, e.g. `photo_wm.jpg`.
    pub file_name: String,
    /// Encoded payload.
    pub data: Vec<u8>,
    /// Format the payload is encoded in.
    pub format: OutputFormat,
}

impl ProcessedResult {
    /// MIME type of the payload.
    #[must_use]
    pub fn mime_type(&self) -> &'static str {
        self.format.mime_type()
    }
}

/// An input that was skipped.
#[derive(Debug, Clone)]
pub struct ItemError {
    /// File name of the offending input.
    pub file_name: String,
    /// Human-readable cause.
    pub message: String,
}

/// Everything a batch run produced, in input order.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    /// Successfully processed images.
    pub results: Vec<ProcessedResult>,
    /// Inputs that failed and were skipped.
    pub errors: Vec<ItemError>,
}

/// Progress report emitted after each input, success or not.
#[derive(Debug, Clone, Copy)]
pub struct Progress<'a> {
    /// Number of inputs handled so far.
    pub completed: usize,
    /// Number of inputs in the batch.
    pub total: usize,
    /// Name of the input just handled.
    pub file_name: &'a str,
}

impl Progress<'_> {
    /// `completed / total` in `[0, 1]`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn fraction(&self) -> f32 {
        if self.total == 0 {
            return 1.0;
        }
        self.completed as f32 / self.total as f32
    }
}

/// Applies one watermark to any number of images.
///
/// Create with [`BatchDriver::new()`] and call [`BatchDriver::run()`] once per
/// batch. The watermark is converted to RGBA once and shared read-only.
pub struct BatchDriver {
    watermark: RgbaImage,
    config: BatchConfig,
}

impl BatchDriver {
    /// Create a driver for `watermark` with validated settings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] for out-of-range settings and
    /// [`Error::EmptyImage`] for a watermark with a zero dimension.
    pub fn new(watermark: &DynamicImage, config: BatchConfig) -> Result<Self> {
        config.validate()?;
        if watermark.width() == 0 || watermark.height() == 0 {
            return Err(Error::EmptyImage {
                width: watermark.width(),
                height: watermark.height(),
            });
        }
        Ok(Self {
            watermark: watermark.to_rgba8(),
            config,
        })
    }

    /// Settings this driver applies.
    #[must_use]
    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Decode, watermark, and encode a single input.
    ///
    /// # Errors
    ///
    /// Returns the first decode, format, or encode error for this input.
    pub fn process_one(&self, input: &InputImage) -> Result<ProcessedResult> {
        let decoded = image::load_from_memory(&input.data)?;
        debug!(
            file_name = %input.name,
            width = decoded.width(),
            height = decoded.height(),
            "decoded input"
        );

        let composed = compositor::compose_rgba(
            decoded.to_rgba8(),
            &self.watermark,
            self.config.opacity,
            self.config.scale,
        )?;

        let format = format::resolve(self.config.format, &input.name)?;
        let data = format::encode(&composed, format, self.config.quality)?;

        Ok(ProcessedResult {
            file_name: format::output_file_name(&input.name, format),
            data,
            format,
        })
    }

    /// Process every input in order, skipping the ones that fail.
    ///
    /// Output names are unique within the run: a name already produced by an
    /// earlier input gets a `_2`, `_3`, ... suffix before its extension.
    /// `on_progress` is called after each input.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoInputs`] if `inputs` is empty. Per-image failures
    /// never abort the run; they are collected in [`BatchOutcome::errors`].
    pub fn run<F>(&self, inputs: &[InputImage], mut on_progress: F) -> Result<BatchOutcome>
    where
        F: FnMut(Progress<'_>),
    {
        if inputs.is_empty() {
            return Err(Error::NoInputs);
        }

        info!(
            count = inputs.len(),
            opacity = self.config.opacity,
            scale = self.config.scale,
            "processing batch"
        );

        let mut outcome = BatchOutcome::default();
        let mut taken = HashSet::new();
        for (idx, input) in inputs.iter().enumerate() {
            match self.process_one(input) {
                Ok(mut result) => {
                    let unique = unique_file_name(&result.file_name, &taken);
                    if unique != result.file_name {
                        warn!(
                            file_name = %input.name,
                            derived = %result.file_name,
                            renamed = %unique,
                            "output name already used in this batch"
                        );
                        result.file_name = unique;
                    }
                    taken.insert(result.file_name.clone());
                    outcome.results.push(result);
                }
                Err(e) => {
                    warn!(file_name = %input.name, error = %e, "skipping image");
                    outcome.errors.push(ItemError {
                        file_name: input.name.clone(),
                        message: e.to_string(),
                    });
                }
            }
            on_progress(Progress {
                completed: idx + 1,
                total: inputs.len(),
                file_name: &input.name,
            });
        }

        info!(
            processed = outcome.results.len(),
            failed = outcome.errors.len(),
            "batch finished"
        );
        Ok(outcome)
    }
}

/// `name`, or `name` with a `_N` suffix before its extension if already taken.
fn unique_file_name(name: &str, taken: &HashSet<String>) -> String {
    if !taken.contains(name) {
        return name.to_string();
    }
    let (stem, ext) = name
        .rsplit_once('.')
        .map_or((name, None), |(stem, ext)| (stem, Some(ext)));
    (2u32..)
        .map(|n| match ext {
            Some(ext) => format!("{stem}_{n}.{ext}"),
            None => format!("{stem}_{n}"),
        })
        .find(|candidate| !taken.contains(candidate))
        .unwrap_or_else(|| name.to_string())
}

/// Load the uploaded watermark, or the bundled default if there is none.
///
/// # Errors
///
/// See [`load_watermark_from`].
pub fn load_watermark(upload: Option<&Path>) -> Result<DynamicImage> {
    load_watermark_from(upload, Path::new(DEFAULT_WATERMARK_PATH))
}

/// Load the uploaded watermark, falling back to `default_path`.
///
/// An upload that fails to open is an error of its own; only a missing
/// upload triggers the fallback.
///
/// # Errors
///
/// Returns [`Error::UnsupportedFormat`] for an upload that is not a PNG,
/// JPEG, or WebP file, [`Error::Image`] if the upload cannot be decoded, and
/// [`Error::MissingWatermark`] if there is no upload and the default asset
/// cannot be loaded.
pub fn load_watermark_from(upload: Option<&Path>, default_path: &Path) -> Result<DynamicImage> {
    if let Some(path) = upload {
        if !format::is_supported_watermark(path) {
            return Err(Error::UnsupportedFormat(path.display().to_string()));
        }
        return Ok(image::open(path)?);
    }

    match image::open(default_path) {
        Ok(img) => {
            info!(path = %default_path.display(), "using default watermark");
            Ok(img)
        }
        Err(e) => {
            debug!(path = %default_path.display(), error = %e, "default watermark unavailable");
            Err(Error::MissingWatermark {
                default_path: PathBuf::from(default_path),
            })
        }
    }
}
