use std::io::Cursor;

use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use preview_engine::{
    FailureKind, ImageThumbnailer, ThumbnailSize, ThumbnailSource, Thumbnailer,
};

const TARGET: ThumbnailSize = ThumbnailSize::new(320, 200);
const URL: &str = "https://example.com/";

fn png(width: u32, height: u32) -> Vec<u8> {
    let image = RgbaImage::from_fn(width, height, |x, y| {
        Rgba([(x % 256) as u8, (y % 256) as u8, ((x ^ y) % 256) as u8, 255])
    });
    let mut bytes = Vec::new();
    DynamicImage::ImageRgba8(image)
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    bytes
}

fn decoded_dimensions(bytes: &[u8]) -> (u32, u32) {
    let image = image::load_from_memory(bytes).expect("thumbnail decodes");
    (image.width(), image.height())
}

#[test]
fn any_aspect_ratio_yields_exact_target_size() {
    let thumbnailer = ImageThumbnailer::new(64 * 1024);
    for (width, height) in [(1600, 200), (90, 1200), (16, 16), (320, 200), (4000, 2500)] {
        let (thumbnail, error) = thumbnailer.make_thumbnail(
            URL,
            Some(&png(width, height)),
            TARGET,
            ThumbnailSource::Screenshot,
        );
        assert_eq!(error, None, "{width}x{height}");
        assert_eq!(thumbnail.source, ThumbnailSource::Screenshot);
        assert_eq!((thumbnail.width, thumbnail.height), (320, 200));
        assert_eq!(decoded_dimensions(&thumbnail.image_bytes), (320, 200));
    }
}

#[test]
fn undecodable_bytes_become_a_placeholder() {
    let thumbnailer = ImageThumbnailer::new(64 * 1024);
    let (thumbnail, error) = thumbnailer.make_thumbnail(
        URL,
        Some(b"definitely not an image"),
        TARGET,
        ThumbnailSource::Favicon,
    );
    assert_eq!(error, Some(FailureKind::DecodeFailure));
    assert_eq!(thumbnail.source, ThumbnailSource::Placeholder);
    assert_eq!(decoded_dimensions(&thumbnail.image_bytes), (320, 200));
}

#[test]
fn missing_image_is_a_placeholder_without_error() {
    let thumbnailer = ImageThumbnailer::new(64 * 1024);
    let (thumbnail, error) =
        thumbnailer.make_thumbnail(URL, None, TARGET, ThumbnailSource::Screenshot);
    assert_eq!(error, None);
    assert_eq!(thumbnail.source, ThumbnailSource::Placeholder);
    assert_eq!(thumbnail, thumbnailer.placeholder(URL, TARGET));
}

#[test]
fn placeholders_differ_per_url_and_are_stable() {
    let thumbnailer = ImageThumbnailer::new(64 * 1024);
    let a = thumbnailer.placeholder("https://a.example/", TARGET);
    let b = thumbnailer.placeholder("https://b.example/", TARGET);
    assert_eq!(a, thumbnailer.placeholder("https://a.example/", TARGET));
    assert_ne!(a.image_bytes, b.image_bytes);
}

#[test]
fn encoded_size_respects_the_cap() {
    let cap = 32 * 1024;
    let thumbnailer = ImageThumbnailer::new(cap);
    let bytes = thumbnailer.render(&png(1280, 800), TARGET).unwrap();
    assert!(bytes.len() <= cap, "{} > {}", bytes.len(), cap);
}
