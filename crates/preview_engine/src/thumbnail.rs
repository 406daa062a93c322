use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageReader, Limits, Rgb, RgbImage, Rgba};
use preview_logging::preview_debug;
use thiserror::Error;

use crate::filename::hex_digest;
use crate::{FailureKind, Thumbnail, ThumbnailSize, ThumbnailSource};

/// Largest source accepted for decoding, in pixels per side.
pub const MAX_SOURCE_DIMENSION: u32 = 16_384;
/// Allocation ceiling for a single decode.
pub const MAX_DECODE_ALLOC: u64 = 256 * 1024 * 1024;
const JPEG_QUALITIES: &[u8] = &[85, 70, 55, 40, 25];
const PLACEHOLDER_QUALITY: u8 = 80;

#[derive(Debug, Error)]
pub enum ThumbnailError {
    #[error("no image data")]
    Empty,
    #[error("unrecognised image format: {0}")]
    Format(String),
    #[error("image codec error: {0}")]
    Image(#[from] image::ImageError),
    #[error("encoded thumbnail exceeds {max} bytes")]
    TooLarge { max: usize },
}

pub trait Thumbnailer: Send + Sync {
    /// Always yields a `target`-sized thumbnail. When `image_bytes` cannot be
    /// used, the placeholder is returned together with `DecodeFailure`.
    fn make_thumbnail(
        &self,
        url: &str,
        image_bytes: Option<&[u8]>,
        target: ThumbnailSize,
        source: ThumbnailSource,
    ) -> (Thumbnail, Option<FailureKind>);

    fn placeholder(&self, url: &str, target: ThumbnailSize) -> Thumbnail;
}

#[derive(Debug, Clone)]
pub struct ImageThumbnailer {
    max_bytes: usize,
}

impl ImageThumbnailer {
    pub fn new(max_bytes: usize) -> Self {
        Self { max_bytes }
    }

    /// Decode, fill-and-crop to `target`, and encode as JPEG within the byte cap.
    pub fn render(&self, bytes: &[u8], target: ThumbnailSize) -> Result<Vec<u8>, ThumbnailError> {
        let source = decode_bounded(bytes)?;
        let fitted = fill_to(&source, target);
        encode_within(&fitted, self.max_bytes)
    }
}

impl Thumbnailer for ImageThumbnailer {
    fn make_thumbnail(
        &self,
        url: &str,
        image_bytes: Option<&[u8]>,
        target: ThumbnailSize,
        source: ThumbnailSource,
    ) -> (Thumbnail, Option<FailureKind>) {
        let Some(bytes) = image_bytes.filter(|_| source != ThumbnailSource::Placeholder) else {
            return (self.placeholder(url, target), None);
        };
        match self.render(bytes, target) {
            Ok(image_bytes) => (
                Thumbnail {
                    url: url.to_string(),
                    image_bytes,
                    width: target.width,
                    height: target.height,
                    source,
                },
                None,
            ),
            Err(err) => {
                preview_debug!("thumbnail for {} fell back to placeholder: {}", url, err);
                (self.placeholder(url, target), Some(FailureKind::DecodeFailure))
            }
        }
    }

    fn placeholder(&self, url: &str, target: ThumbnailSize) -> Thumbnail {
        let image = placeholder_image(url, target);
        // Encoding an in-memory RGB buffer cannot fail short of allocation failure.
        let image_bytes = encode_jpeg(&image, PLACEHOLDER_QUALITY).unwrap_or_default();
        Thumbnail {
            url: url.to_string(),
            image_bytes,
            width: target.width,
            height: target.height,
            source: ThumbnailSource::Placeholder,
        }
    }
}

fn decode_bounded(bytes: &[u8]) -> Result<DynamicImage, ThumbnailError> {
    if bytes.is_empty() {
        return Err(ThumbnailError::Empty);
    }
    let mut limits = Limits::default();
    limits.max_image_width = Some(MAX_SOURCE_DIMENSION);
    limits.max_image_height = Some(MAX_SOURCE_DIMENSION);
    limits.max_alloc = Some(MAX_DECODE_ALLOC);

    let mut reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|err| ThumbnailError::Format(err.to_string()))?;
    if reader.format().is_none() {
        return Err(ThumbnailError::Format("unknown".into()));
    }
    reader.limits(limits);
    Ok(reader.decode()?)
}

/// Scale to cover `target` preserving aspect ratio, then centre-crop.
fn fill_to(source: &DynamicImage, target: ThumbnailSize) -> RgbImage {
    // Cheap pre-shrink for very large captures before the expensive filter.
    let prepass_w = target.width.saturating_mul(4);
    let prepass_h = target.height.saturating_mul(4);
    let working = if source.width() > prepass_w && source.height() > prepass_h {
        source.resize(prepass_w, prepass_h, FilterType::Triangle)
    } else {
        source.clone()
    };
    let filled = working.resize_to_fill(target.width, target.height, FilterType::Lanczos3);
    flatten_alpha(&filled)
}

/// Composite over white so transparent favicons do not turn black in JPEG.
fn flatten_alpha(image: &DynamicImage) -> RgbImage {
    let rgba = image.to_rgba8();
    let mut out = RgbImage::new(rgba.width(), rgba.height());
    for (x, y, Rgba([r, g, b, a])) in rgba.enumerate_pixels().map(|(x, y, p)| (x, y, *p)) {
        let alpha = u16::from(a);
        let blend = |c: u8| ((u16::from(c) * alpha + 255 * (255 - alpha)) / 255) as u8;
        out.put_pixel(x, y, Rgb([blend(r), blend(g), blend(b)]));
    }
    out
}

fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>, ThumbnailError> {
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, quality).encode_image(image)?;
    Ok(buf)
}

fn encode_within(image: &RgbImage, max_bytes: usize) -> Result<Vec<u8>, ThumbnailError> {
    for quality in JPEG_QUALITIES {
        let encoded = encode_jpeg(image, *quality)?;
        if encoded.len() <= max_bytes {
            return Ok(encoded);
        }
    }
    Err(ThumbnailError::TooLarge { max: max_bytes })
}

/// Pastel background keyed on the URL with a darker band along the bottom.
fn placeholder_image(url: &str, target: ThumbnailSize) -> RgbImage {
    let digest = hex_digest(url, 3);
    let channel = |i: usize| {
        let byte = u8::from_str_radix(&digest[i * 2..i * 2 + 2], 16).unwrap_or(0x80);
        // Pastel range 160..=255.
        160 + byte % 96
    };
    let background = Rgb([channel(0), channel(1), channel(2)]);
    let band = Rgb([background[0] / 2, background[1] / 2, background[2] / 2]);
    let band_top = target.height - (target.height / 8).max(1).min(target.height);

    RgbImage::from_fn(target.width, target.height, |_, y| {
        if y >= band_top {
            band
        } else {
            background
        }
    })
}
