//! Output format resolution, naming, and encoding.

use std::fmt;
use std::io::Cursor;
use std::path::Path;
use std::str::FromStr;

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage, RgbaImage};
use tracing::debug;

use crate::error::{Error, Result};

/// Largest width or height libwebp accepts.
pub const WEBP_MAX_DIMENSION: u32 = 16383;

/// Format an encoded result is written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputFormat {
    /// Baseline JPEG. No alpha: transparent areas are flattened onto white.
    Jpeg,
    /// Lossless PNG with alpha.
    Png,
    /// Lossy WebP with alpha.
    WebP,
    /// Lossless TIFF with alpha.
    Tiff,
}

impl OutputFormat {
    /// Map a file extension (without the dot, any case) to a format.
    #[must_use]
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            "webp" => Some(Self::WebP),
            "tif" | "tiff" => Some(Self::Tiff),
            _ => None,
        }
    }

    /// Upper-case tag, e.g. `"JPEG"`.
    #[must_use]
    pub fn tag(self) -> &'static str {
        match self {
            Self::Jpeg => "JPEG",
            Self::Png => "PNG",
            Self::WebP => "WEBP",
            Self::Tiff => "TIFF",
        }
    }

    /// Extension used for output files (`jpg` for JPEG).
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::WebP => "webp",
            Self::Tiff => "tiff",
        }
    }

    /// MIME type of the encoded payload.
    #[must_use]
    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::WebP => "image/webp",
            Self::Tiff => "image/tiff",
        }
    }

    /// Whether the format can carry an alpha channel.
    #[must_use]
    pub fn supports_alpha(self) -> bool {
        !matches!(self, Self::Jpeg)
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Requested output format for a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FormatChoice {
    /// Reuse the format implied by each input's file extension.
    #[default]
    KeepOriginal,
    /// Always write JPEG.
    Jpeg,
    /// Always write PNG.
    Png,
    /// Always write WebP.
    WebP,
}

impl fmt::Display for FormatChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::KeepOriginal => f.write_str("keep original"),
            Self::Jpeg => f.write_str(OutputFormat::Jpeg.tag()),
            Self::Png => f.write_str(OutputFormat::Png.tag()),
            Self::WebP => f.write_str(OutputFormat::WebP.tag()),
        }
    }
}

impl FromStr for FormatChoice {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "keep" | "original" => Ok(Self::KeepOriginal),
            "jpeg" | "jpg" => Ok(Self::Jpeg),
            "png" => Ok(Self::Png),
            "webp" => Ok(Self::WebP),
            other => Err(Error::UnsupportedFormat(other.to_string())),
        }
    }
}

/// Decide the output format for an input named `file_name`.
///
/// With [`FormatChoice::KeepOriginal`] the text after the last `.` decides.
/// A trailing `.` with nothing after it falls back to JPEG; a name with no
/// `.` at all is treated as its own extension and therefore rejected.
///
/// # Errors
///
/// Returns [`Error::UnsupportedFormat`] if the original extension has no
/// matching encoder.
pub fn resolve(choice: FormatChoice, file_name: &str) -> Result<OutputFormat> {
    let format = match choice {
        FormatChoice::Jpeg => OutputFormat::Jpeg,
        FormatChoice::Png => OutputFormat::Png,
        FormatChoice::WebP => OutputFormat::WebP,
        FormatChoice::KeepOriginal => {
            let ext = file_name.rsplit_once('.').map_or(file_name, |(_, ext)| ext);
            if ext.is_empty() {
                OutputFormat::Jpeg
            } else {
                OutputFormat::from_extension(ext)
                    .ok_or_else(|| Error::UnsupportedFormat(ext.to_uppercase()))?
            }
        }
    };
    debug!(file_name, format = %format, "resolved output format");
    Ok(format)
}

/// Name of the watermarked output, e.g. `"photo.JPG"` becomes `"photo_wm.jpg"`.
#[must_use]
pub fn output_file_name(file_name: &str, format: OutputFormat) -> String {
    let stem = file_name.rsplit_once('.').map_or(file_name, |(stem, _)| stem);
    format!("{stem}_wm.{}", format.extension())
}

/// Check if a file has an extension accepted as batch input.
#[must_use]
pub fn is_supported_image(path: &Path) -> bool {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => matches!(
            ext.to_lowercase().as_str(),
            "png" | "jpg" | "jpeg" | "webp" | "tif" | "tiff"
        ),
        None => false,
    }
}

/// Check if a file has an extension accepted for the watermark itself.
#[must_use]
pub fn is_supported_watermark(path: &Path) -> bool {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => matches!(ext.to_lowercase().as_str(), "png" | "jpg" | "jpeg" | "webp"),
        None => false,
    }
}

/// Paste `img` onto an opaque white canvas using its alpha as the mask.
#[must_use]
pub fn flatten_onto_white(img: &RgbaImage) -> RgbImage {
    RgbImage::from_fn(img.width(), img.height(), |x, y| {
        let px = img.get_pixel(x, y);
        let a = u32::from(px[3]);
        let mut out = [0u8; 3];
        for (ch, slot) in out.iter_mut().enumerate() {
            let v = u32::from(px[ch]) * a + 255 * (255 - a);
            #[allow(clippy::cast_possible_truncation)]
            {
                *slot = ((v + 127) / 255) as u8;
            }
        }
        Rgb(out)
    })
}

/// Encode a composed image.
///
/// `quality` (1-100) applies to JPEG and WebP only.
///
/// # Errors
///
/// Returns [`Error::Image`] if a JPEG, PNG, or TIFF encoder fails and
/// [`Error::Encode`] if libwebp rejects the image.
pub fn encode(img: &RgbaImage, format: OutputFormat, quality: u8) -> Result<Vec<u8>> {
    let mut buf = Vec::new();

    match format {
        OutputFormat::Jpeg => {
            let flat = flatten_onto_white(img);
            let mut encoder = JpegEncoder::new_with_quality(&mut buf, quality);
            encoder.encode_image(&flat)?;
        }
        OutputFormat::WebP => {
            if img.width() > WEBP_MAX_DIMENSION || img.height() > WEBP_MAX_DIMENSION {
                return Err(Error::Encode {
                    format: OutputFormat::WebP.tag(),
                    reason: format!(
                        "{}x{} exceeds the {WEBP_MAX_DIMENSION}px limit",
                        img.width(),
                        img.height()
                    ),
                });
            }
            let encoder = webp::Encoder::from_rgba(img.as_raw(), img.width(), img.height());
            let encoded = encoder
                .encode_simple(false, f32::from(quality))
                .map_err(|e| Error::Encode {
                    format: OutputFormat::WebP.tag(),
                    reason: format!("{e:?}"),
                })?;
            buf.extend_from_slice(&encoded);
        }
        OutputFormat::Png | OutputFormat::Tiff => {
            let image_format = if format == OutputFormat::Png {
                ImageFormat::Png
            } else {
                ImageFormat::Tiff
            };
            DynamicImage::ImageRgba8(img.clone())
                .write_to(&mut Cursor::new(&mut buf), image_format)?;
        }
    }

    debug!(format = %format, bytes = buf.len(), "encoded image");
    Ok(buf)
}
