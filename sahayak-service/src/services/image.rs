//! Decoding and normalisation of uploaded images.
//!
//! Accepts base64 text (optionally a `data:` URL) or raw bytes, enforces the
//! byte cap before parsing, and downscales oversized images so neither side
//! exceeds the configured dimension.

use crate::services::providers::InlineImage;
use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig, STANDARD};
use base64::engine::DecodePaddingMode;
use base64::Engine as _;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};
use service_core::error::AppError;
use std::io::Cursor;
use thiserror::Error;

/// Standard alphabet, padding optional.
const LENIENT_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("image data is not valid base64: {0}")]
    InvalidBase64(String),

    #[error("image data is not a recognised image format")]
    UnrecognisedFormat,

    #[error("image could not be decoded: {0}")]
    Corrupt(String),

    #[error("image is {size} bytes, the limit is {max} bytes")]
    TooLarge { size: usize, max: usize },

    #[error("failed to re-encode image: {0}")]
    Encode(String),
}

impl ImageError {
    /// Convert to an HTTP error, attributing validation failures to `field`.
    pub fn into_app_error(self, field: &'static str) -> AppError {
        match self {
            ImageError::TooLarge { .. } => AppError::PayloadTooLarge(self.to_string()),
            ImageError::Encode(_) => AppError::InternalError(anyhow::Error::new(self)),
            other => AppError::invalid_field(field, other.to_string()),
        }
    }
}

impl From<ImageError> for AppError {
    fn from(err: ImageError) -> Self {
        err.into_app_error("image_data")
    }
}

/// A decoded image ready to be forwarded to the model.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    image: DynamicImage,
    format: ImageFormat,
    original: Vec<u8>,
    original_dimensions: (u32, u32),
    resized: bool,
}

impl DecodedImage {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width(), self.height())
    }

    pub fn original_dimensions(&self) -> (u32, u32) {
        self.original_dimensions
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }

    /// Size of the payload as received, in bytes.
    pub fn byte_len(&self) -> usize {
        self.original.len()
    }

    pub fn was_resized(&self) -> bool {
        self.resized
    }

    /// Encode for transmission.
    ///
    /// Unmodified PNG, JPEG and WebP images are sent as received. Resized
    /// JPEGs are re-encoded as JPEG, everything else as PNG.
    pub fn to_inline(&self) -> Result<InlineImage, ImageError> {
        if !self.resized && is_forwardable(self.format) {
            return Ok(InlineImage {
                mime_type: self.format.to_mime_type().to_string(),
                data: STANDARD.encode(&self.original),
            });
        }

        let mut buffer = Cursor::new(Vec::new());
        let format = if self.format == ImageFormat::Jpeg {
            DynamicImage::ImageRgb8(self.image.to_rgb8())
                .write_to(&mut buffer, ImageFormat::Jpeg)
                .map_err(|e| ImageError::Encode(e.to_string()))?;
            ImageFormat::Jpeg
        } else {
            self.image
                .write_to(&mut buffer, ImageFormat::Png)
                .map_err(|e| ImageError::Encode(e.to_string()))?;
            ImageFormat::Png
        };

        Ok(InlineImage {
            mime_type: format.to_mime_type().to_string(),
            data: STANDARD.encode(buffer.into_inner()),
        })
    }
}

/// Formats the model accepts as inline data without conversion.
fn is_forwardable(format: ImageFormat) -> bool {
    matches!(
        format,
        ImageFormat::Png | ImageFormat::Jpeg | ImageFormat::WebP
    )
}

/// Remove a `data:<mime>;base64,` style prefix, if present.
pub fn strip_data_url(raw: &str) -> &str {
    match raw.split_once(',') {
        Some((_, payload)) => payload,
        None => raw,
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ImageDecoder {
    max_bytes: usize,
    max_dimension: u32,
}

impl ImageDecoder {
    pub fn new(max_bytes: usize, max_dimension: u32) -> Self {
        Self {
            max_bytes,
            max_dimension: max_dimension.max(1),
        }
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    pub fn max_dimension(&self) -> u32 {
        self.max_dimension
    }

    pub fn decode_base64(&self, raw: &str) -> Result<DecodedImage, ImageError> {
        let payload: String = strip_data_url(raw.trim())
            .chars()
            .filter(|c| !c.is_ascii_whitespace())
            .collect();

        // Every 4 base64 characters carry at most 3 bytes.
        let estimated = payload.len() / 4 * 3;
        if estimated > self.max_bytes.saturating_add(3) {
            return Err(ImageError::TooLarge {
                size: estimated,
                max: self.max_bytes,
            });
        }

        let bytes = LENIENT_BASE64
            .decode(payload.as_bytes())
            .map_err(|e| ImageError::InvalidBase64(e.to_string()))?;

        self.decode_bytes(bytes)
    }

    pub fn decode_bytes(&self, bytes: Vec<u8>) -> Result<DecodedImage, ImageError> {
        if bytes.len() > self.max_bytes {
            return Err(ImageError::TooLarge {
                size: bytes.len(),
                max: self.max_bytes,
            });
        }

        let format = image::guess_format(&bytes).map_err(|_| ImageError::UnrecognisedFormat)?;
        let image = image::load_from_memory_with_format(&bytes, format)
            .map_err(|e| ImageError::Corrupt(e.to_string()))?;

        let original_dimensions = (image.width(), image.height());
        let (image, resized) = self.fit(image);

        if resized {
            tracing::debug!(
                from_width = original_dimensions.0,
                from_height = original_dimensions.1,
                to_width = image.width(),
                to_height = image.height(),
                "Downscaled image"
            );
        }

        Ok(DecodedImage {
            image,
            format,
            original: bytes,
            original_dimensions,
            resized,
        })
    }

    /// Downscale proportionally so both sides fit; never upscale.
    fn fit(&self, image: DynamicImage) -> (DynamicImage, bool) {
        if image.width() <= self.max_dimension && image.height() <= self.max_dimension {
            return (image, false);
        }
        let resized = image.resize(self.max_dimension, self.max_dimension, FilterType::Lanczos3);
        (resized, true)
    }
}
