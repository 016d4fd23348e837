//! DCT perceptual hash.
//!
//! The image is reduced to grayscale, the low-frequency 8x8 block of its DCT is
//! compared against the block's median and each coefficient above the median sets
//! one bit. Icons and live frames must go through this exact function or Hamming
//! distances between them are meaningless.

use anyhow::{Context, Result, ensure};
use image_hasher::{HashAlg, Hasher, HasherConfig};

use crate::Image;

fn hasher() -> Hasher {
	HasherConfig::new()
		.hash_size(8, 8)
		.hash_alg(HashAlg::Median)
		.preproc_dct()
		.to_hasher()
}

/// 64-bit perceptual fingerprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PerceptualHash(pub u64);

impl PerceptualHash {
	pub fn of(image: Image) -> Result<Self> {
		ensure!(image.width() > 0 && image.height() > 0, "cannot hash an empty image");
		let rgb = image.to_rgb_image()?;
		let hash = hasher().hash_image(&image::DynamicImage::ImageRgb8(rgb));
		let bytes: [u8; 8] = hash
			.as_bytes()
			.try_into()
			.with_context(|| format!("expected a 64-bit hash, got {} bytes", hash.as_bytes().len()))?;
		Ok(Self(u64::from_be_bytes(bytes)))
	}

	/// Hamming distance (number of differing bits).
	#[inline]
	pub fn distance(self, other: Self) -> u32 {
		(self.0 ^ other.0).count_ones()
	}
}

impl std::fmt::Display for PerceptualHash {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{:016x}", self.0)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{Color, OwnedImage};

	// 4x4 grid of flat blocks; strong low-frequency content.
	fn blocks(size: u32) -> OwnedImage {
		const LEVELS: [u8; 16] = [20, 230, 90, 160, 250, 10, 180, 60, 120, 200, 30, 140, 70, 110, 240, 0];
		let cell = size / 4;
		OwnedImage::from_fn(size, size, |x, y| {
			let v = LEVELS[((y / cell).min(3) * 4 + (x / cell).min(3)) as usize];
			Color::new(v, v, v)
		})
	}

	#[test]
	fn hashing_is_deterministic() {
		let img = blocks(48);
		let a = PerceptualHash::of(img.as_image()).unwrap();
		let b = PerceptualHash::of(img.as_image()).unwrap();
		assert_eq!(a, b);
		assert_eq!(a.distance(b), 0);
	}

	#[test]
	fn distance_counts_differing_bits() {
		let a = PerceptualHash(0xAAAA_AAAA_AAAA_AAAA);
		let b = PerceptualHash(0x5555_5555_5555_5555);
		assert_eq!(a.distance(b), 64);
		assert_eq!(a.distance(PerceptualHash(0xAAAA_AAAA_AAAA_AAAB)), 1);
		assert_eq!(format!("{a}"), "aaaaaaaaaaaaaaaa");
	}

	#[test]
	fn inverted_image_is_far_away() {
		let img = blocks(64);
		let inverted = OwnedImage::from_fn(img.width(), img.height(), |x, y| {
			let c = img.as_image().pixel(x, y);
			Color::new(255 - c.r, 255 - c.g, 255 - c.b)
		});
		let a = PerceptualHash::of(img.as_image()).unwrap();
		let b = PerceptualHash::of(inverted.as_image()).unwrap();
		assert!(a.distance(b) >= 40, "distance {}", a.distance(b));
	}

	#[test]
	fn rescaled_copy_stays_close() {
		let img = OwnedImage::from_fn(64, 64, |x, y| {
			let v = 128.0 + 100.0 * (x as f32 / 9.0).sin() * (y as f32 / 13.0).cos();
			Color::new(v as u8, v as u8, 96)
		});
		let smaller = img.scaled(0.9).unwrap();
		let a = PerceptualHash::of(img.as_image()).unwrap();
		let b = PerceptualHash::of(smaller.as_image()).unwrap();
		assert!(a.distance(b) < 20, "distance {}", a.distance(b));
	}

	#[test]
	fn empty_image_is_rejected() {
		let img = OwnedImage::from_fn(0, 0, |_, _| Color::BLACK);
		assert!(PerceptualHash::of(img.as_image()).is_err());
	}
}
