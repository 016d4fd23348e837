//! Synthetic images shared by the unit tests.

use crate::{Color, OwnedImage};

/// Smooth, textured icon-like image.
pub fn icon(w: u32, h: u32) -> OwnedImage {
	OwnedImage::from_fn(w, h, |x, y| {
		let v = 128.0 + 90.0 * (x as f32 / 4.0).sin() * (y as f32 / 5.0).cos();
		Color::new(v as u8, (255.0 - v) as u8, ((x * 6) % 256) as u8)
	})
}

/// High-frequency background unrelated to [`icon`].
pub fn noise(w: u32, h: u32) -> OwnedImage {
	OwnedImage::from_fn(w, h, |x, y| {
		let v = ((x * 31 + y * 17 + x * y) % 97) as u8;
		Color::new(v, v / 2, 200 - v)
	})
}

/// Copy of `dst` with `src` drawn at (`ox`, `oy`), clipped to `dst`.
pub fn paste(dst: &OwnedImage, src: &OwnedImage, ox: u32, oy: u32) -> OwnedImage {
	OwnedImage::from_fn(dst.width(), dst.height(), |x, y| {
		if x >= ox && y >= oy && x - ox < src.width() && y - oy < src.height() {
			src.as_image().pixel(x - ox, y - oy)
		} else {
			dst.as_image().pixel(x, y)
		}
	})
}
