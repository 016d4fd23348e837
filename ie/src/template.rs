//! Template correlation for icons the perceptual hash cannot tell apart.
//!
//! Scores are zero-mean normalized cross-correlation over all three channels
//! (OpenCV's `TM_CCOEFF_NORMED`): 1.0 is a perfect match, 0.0 is no linear
//! relation, -1.0 is an inverted match. The template slides over every
//! position where it fits inside the frame and the best position wins.
//!
//! Window means and energies come from integral images, so only the cross term
//! costs a pass over the template at each position.

use anyhow::Result;
use image::{ImageBuffer, Luma, Rgb, RgbImage};
use imageproc::integral_image::{integral_image, integral_squared_image, sum_image_pixels};
use imageproc::template_matching::find_extremes;

use crate::{Image, OwnedImage};

/// Below this the window (or template) is treated as flat and scores 0.
const FLAT_EPSILON: f64 = 1e-6;

/// The reference icon pre-resized to one of the configured scales.
#[derive(Debug, Clone)]
pub struct ScaledTemplate {
	pub scale: f32,
	pub image: OwnedImage,
}

impl ScaledTemplate {
	pub fn build(reference: &OwnedImage, scales: &[f32]) -> Result<Vec<Self>> {
		scales
			.iter()
			.map(|&scale| {
				Ok(Self {
					scale,
					image: reference.scaled(scale)?,
				})
			})
			.collect()
	}
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleScore {
	pub scale: f32,
	pub correlation: f32,
}

/// Maximum correlation across `templates`, skipping scales that do not fit the frame.
///
/// Returns `None` when no scale fits.
pub fn best_correlation(frame: Image, templates: &[ScaledTemplate]) -> Option<ScaleScore> {
	templates
		.iter()
		.filter_map(|t| {
			correlate(frame, t.image.as_image()).map(|correlation| ScaleScore {
				scale: t.scale,
				correlation,
			})
		})
		.fold(None, |best: Option<ScaleScore>, s| match best {
			Some(b) if b.correlation >= s.correlation => Some(b),
			_ => Some(s),
		})
}

/// Best correlation of `template` anywhere inside `frame`.
///
/// Returns `None` when the template is empty or larger than the frame.
pub fn correlate(frame: Image, template: Image) -> Option<f32> {
	let (tw, th) = (template.width(), template.height());
	if tw == 0 || th == 0 || !frame.contains_size(template) {
		return None;
	}

	let n = (tw * th) as f64;

	// Centered template per channel; the numerator then reduces to sum(t' * I)
	// because sum(t') is zero for every channel.
	let mut means = [0.0f64; 3];
	for y in 0..th {
		for x in 0..tw {
			let c = template.pixel(x, y);
			means[0] += c.r as f64;
			means[1] += c.g as f64;
			means[2] += c.b as f64;
		}
	}
	means.iter_mut().for_each(|m| *m /= n);

	let mut centered = Vec::with_capacity((tw * th) as usize);
	let mut template_energy = 0.0f64;
	for y in 0..th {
		for x in 0..tw {
			let c = template.pixel(x, y);
			let v = [c.r as f64 - means[0], c.g as f64 - means[1], c.b as f64 - means[2]];
			template_energy += v.iter().map(|x| x * x).sum::<f64>();
			centered.push(v);
		}
	}

	let rgb = RgbImage::from_fn(frame.width(), frame.height(), |x, y| {
		let c = frame.pixel(x, y);
		Rgb([c.r, c.g, c.b])
	});
	let sums: ImageBuffer<Rgb<u64>, Vec<u64>> = integral_image(&rgb);
	let squares: ImageBuffer<Rgb<u64>, Vec<u64>> = integral_squared_image(&rgb);

	let out_w = frame.width() - tw + 1;
	let out_h = frame.height() - th + 1;
	let mut scores: ImageBuffer<Luma<f32>, Vec<f32>> = ImageBuffer::new(out_w, out_h);

	for oy in 0..out_h {
		for ox in 0..out_w {
			let mut cross = 0.0f64;
			for y in 0..th {
				for x in 0..tw {
					let c = frame.pixel(ox + x, oy + y);
					let t = &centered[(x + y * tw) as usize];
					cross += t[0] * c.r as f64 + t[1] * c.g as f64 + t[2] * c.b as f64;
				}
			}

			let (right, bottom) = (ox + tw - 1, oy + th - 1);
			let sum = sum_image_pixels(&sums, ox, oy, right, bottom);
			let sum_sq = sum_image_pixels(&squares, ox, oy, right, bottom);
			let window_energy: f64 = (0..3)
				.map(|ch| sum_sq[ch] as f64 - (sum[ch] as f64).powi(2) / n)
				.sum();

			let denom = (template_energy * window_energy).sqrt();
			let score = if denom > FLAT_EPSILON { cross / denom } else { 0.0 };
			scores.put_pixel(ox, oy, Luma([score.clamp(-1.0, 1.0) as f32]));
		}
	}

	Some(find_extremes(&scores).max_value)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::Color;
	use crate::fixtures::{icon, noise, paste};

	#[test]
	fn identical_images_correlate_fully() {
		let img = icon(24, 24);
		let score = correlate(img.as_image(), img.as_image()).unwrap();
		assert!(score > 0.999, "score {score}");
	}

	#[test]
	fn finds_template_at_offset() {
		let tpl = icon(16, 16);
		let frame = paste(&noise(30, 28), &tpl, 9, 5);
		let score = correlate(frame.as_image(), tpl.as_image()).unwrap();
		assert!(score > 0.999, "score {score}");
	}

	#[test]
	fn oversized_template_is_skipped() {
		let frame = icon(10, 10);
		let tpl = icon(11, 10);
		assert_eq!(correlate(frame.as_image(), tpl.as_image()), None);
	}

	#[test]
	fn flat_regions_score_zero() {
		let flat = OwnedImage::from_fn(8, 8, |_, _| Color::new(40, 40, 40));
		let tpl = icon(8, 8);
		assert_eq!(correlate(flat.as_image(), tpl.as_image()), Some(0.0));
		assert_eq!(correlate(tpl.as_image(), flat.as_image()), Some(0.0));
	}

	#[test]
	fn inverted_image_is_anticorrelated() {
		let img = icon(12, 12);
		let inverted = OwnedImage::from_fn(12, 12, |x, y| {
			let c = img.as_image().pixel(x, y);
			Color::new(255 - c.r, 255 - c.g, 255 - c.b)
		});
		let score = correlate(img.as_image(), inverted.as_image()).unwrap();
		assert!(score < -0.99, "score {score}");
	}

	#[test]
	fn best_scale_is_reported() {
		let reference = icon(40, 40);
		let templates = ScaledTemplate::build(&reference, &[1.0, 0.95, 0.9]).unwrap();
		assert_eq!(templates[1].image.width(), 38);

		// The frame is too small for scale 1.0 and holds the 0.95 rendition.
		let frame = paste(&noise(39, 39), &templates[1].image, 1, 0);
		let best = best_correlation(frame.as_image(), &templates).unwrap();
		assert_eq!(best.scale, 0.95);
		assert!(best.correlation > 0.999);
	}

	/// Direct evaluation of the correlation at every position.
	fn direct_correlate(frame: &OwnedImage, template: &OwnedImage) -> f32 {
		let (fw, fh) = (frame.width() as usize, frame.height() as usize);
		let (tw, th) = (template.width() as usize, template.height() as usize);
		let px = |img: &OwnedImage, x: usize, y: usize| {
			let c = img.as_image().pixel(x as u32, y as u32);
			[c.r as f64, c.g as f64, c.b as f64]
		};
		let n = (tw * th) as f64;

		let mut best = f64::MIN;
		for oy in 0..=fh - th {
			for ox in 0..=fw - tw {
				let (mut tm, mut wm) = ([0.0; 3], [0.0; 3]);
				for y in 0..th {
					for x in 0..tw {
						let (t, w) = (px(template, x, y), px(frame, ox + x, oy + y));
						for ch in 0..3 {
							tm[ch] += t[ch] / n;
							wm[ch] += w[ch] / n;
						}
					}
				}
				let (mut cross, mut te, mut we) = (0.0, 0.0, 0.0);
				for y in 0..th {
					for x in 0..tw {
						let (t, w) = (px(template, x, y), px(frame, ox + x, oy + y));
						for ch in 0..3 {
							let (a, b) = (t[ch] - tm[ch], w[ch] - wm[ch]);
							cross += a * b;
							te += a * a;
							we += b * b;
						}
					}
				}
				best = best.max(cross / (te * we).sqrt());
			}
		}
		best as f32
	}

	#[test]
	fn window_sums_agree_with_direct_evaluation() {
		let tpl = icon(9, 7);
		// Altered copy so the peak is not a trivial 1.0.
		let smudged = OwnedImage::from_fn(9, 7, |x, y| {
			let c = tpl.as_image().pixel(x, y);
			Color::new(c.r.saturating_add(((x * y) % 23) as u8), c.g, c.b / 2 + 40)
		});
		let frame = paste(&noise(61, 45), &smudged, 37, 22);

		let fast = correlate(frame.as_image(), tpl.as_image()).unwrap();
		let direct = direct_correlate(&frame, &tpl);
		assert!((fast - direct).abs() < 1e-4, "{fast} vs {direct}");
	}

	#[test]
	fn no_scale_fits() {
		let reference = icon(40, 40);
		let templates = ScaledTemplate::build(&reference, &[1.0, 0.95, 0.9]).unwrap();
		let frame = noise(20, 20);
		assert_eq!(best_correlation(frame.as_image(), &templates), None);
	}
}
