use image::{ImageBuffer, ImageFormat, Rgb};
use std::io::Cursor;

pub const PLACEHOLDER_SIZE: u32 = 64;

/// Plain PNG with a diagonal gradient, used when no artwork exists.
pub fn placeholder_png() -> Vec<u8> {
    let image = ImageBuffer::from_fn(PLACEHOLDER_SIZE, PLACEHOLDER_SIZE, |x, y| {
        let shade = (48 + (x + y) * 64 / (2 * PLACEHOLDER_SIZE)) as u8;
        Rgb([shade, shade, shade.saturating_add(16)])
    });
    let mut bytes = Vec::new();
    if image
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .is_err()
    {
        bytes.clear();
    }
    bytes
}

/// Pixel dimensions of an encoded image, if its format is recognised.
pub fn image_dimensions(data: &[u8]) -> Option<(u32, u32)> {
    image::ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .ok()?
        .into_dimensions()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_is_a_decodable_png() {
        let png = placeholder_png();
        assert!(png.starts_with(&[0x89, b'P', b'N', b'G']));
        assert_eq!(
            image_dimensions(&png),
            Some((PLACEHOLDER_SIZE, PLACEHOLDER_SIZE))
        );
    }

    #[test]
    fn garbage_has_no_dimensions() {
        assert_eq!(image_dimensions(b"not an image"), None);
    }
}
