//! Integration tests for texture decoding.

use vkforge_resources::{ResourceError, TextureData};

#[test]
fn test_load_png_as_rgba8() {
    let path = std::env::temp_dir().join(format!("vkforge-test-{}.png", std::process::id()));

    // RGB source; loading must expand it to RGBA with opaque alpha
    let mut img = image::RgbImage::new(3, 2);
    img.put_pixel(0, 0, image::Rgb([10, 20, 30]));
    img.put_pixel(2, 1, image::Rgb([200, 100, 50]));
    img.save(&path).expect("Failed to write test image");

    let texture = TextureData::load(&path);
    let _ = std::fs::remove_file(&path);
    let texture = texture.expect("Failed to load test image");

    assert_eq!(texture.width(), 3);
    assert_eq!(texture.height(), 2);
    assert_eq!(texture.pixels().len(), 3 * 2 * 4);
    assert_eq!(&texture.pixels()[0..4], &[10, 20, 30, 255]);

    // row 1, column 2
    let last = (3 + 2) * 4;
    assert_eq!(&texture.pixels()[last..last + 4], &[200, 100, 50, 255]);
}

#[test]
fn test_load_garbage_is_image_error() {
    let path = std::env::temp_dir().join(format!("vkforge-garbage-{}.png", std::process::id()));
    std::fs::write(&path, b"not a png").expect("Failed to write garbage file");

    let result = TextureData::load(&path);
    let _ = std::fs::remove_file(&path);

    assert!(matches!(result, Err(ResourceError::Image(_))));
}
