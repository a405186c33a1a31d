//! Error types for the watermark-overlay crate.

use std::path::PathBuf;

/// Errors that can occur while compositing, encoding, or packaging images.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Neither an uploaded watermark nor the default asset could be loaded.
    #[error("no watermark available: upload one or provide {}", default_path.display())]
    MissingWatermark {
        /// Where the default watermark was looked up.
        default_path: PathBuf,
    },

    /// The batch was started without any input images.
    #[error("no input images to process")]
    NoInputs,

    /// An image has a zero width or height.
    #[error("degenerate image ({width}x{height})")]
    EmptyImage {
        /// Image width in pixels.
        width: u32,
        /// Image height in pixels.
        height: u32,
    },

    /// A batch setting is outside its accepted range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// An I/O error occurred while reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The image format is not supported.
    #[error("unsupported image format: {0}")]
    UnsupportedFormat(String),

    /// An error occurred during image processing (decode, encode).
    #[error("image processing error: {0}")]
    Image(#[from] image::ImageError),

    /// An encoder rejected the image.
    #[error("failed to encode {format}: {reason}")]
    Encode {
        /// Target format tag.
        format: &'static str,
        /// Encoder-reported cause.
        reason: String,
    },

    /// Building the zip archive failed.
    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),
}

/// A specialized `Result` type for this crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let io_err = Error::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        assert!(io_err.to_string().contains("gone"));

        let unsupported = Error::UnsupportedFormat("bmp".to_string());
        assert!(unsupported.to_string().contains("bmp"));

        let empty = Error::EmptyImage {
            width: 0,
            height: 20,
        };
        assert!(empty.to_string().contains("0x20"));

        let missing = Error::MissingWatermark {
            default_path: PathBuf::from("assets/watermark.png"),
        };
        assert!(missing.to_string().contains("assets/watermark.png"));

        let encode = Error::Encode {
            format: "WEBP",
            reason: "VP8_ENC_ERROR_BAD_DIMENSION".to_string(),
        };
        assert!(encode.to_string().contains("WEBP"));
        assert!(encode.to_string().contains("BAD_DIMENSION"));
    }
}
