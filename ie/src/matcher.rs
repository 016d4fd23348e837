//! Frame classification.
//!
//! Two passes, short-circuiting:
//! 1. Template correlation against the ambiguous icons only. The first one that
//!    clears `template_threshold` is the answer.
//! 2. Perceptual-hash nearest neighbour over the whole library. Ambiguous icons
//!    are held to the stricter `ambiguous_hash_threshold` and are not even
//!    candidates above it, so a qualifying runner-up can still win.

use std::ops::RangeInclusive;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::template::{best_correlation, correlate};
use crate::{IconLibrary, Image, MatchStrategy, PerceptualHash, SpellIcon};

pub const DEFAULT_HASH_THRESHOLD: u32 = 15;
pub const HASH_THRESHOLD_RANGE: RangeInclusive<u32> = 5..=25;
pub const AMBIGUOUS_HASH_THRESHOLD: u32 = 12;
pub const TEMPLATE_THRESHOLD: f32 = 0.70;

/// Scales reported by [`probe`]; one step wider than the live template pass.
pub const PROBE_SCALES: [f32; 4] = [1.0, 0.95, 0.9, 0.85];

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchConfig {
	/// Hash distance must be strictly below this for regular icons.
	pub hash_threshold: u32,
	/// Hash distance must be strictly below this for ambiguous icons.
	pub ambiguous_hash_threshold: u32,
	/// Minimum correlation for a template match.
	pub template_threshold: f32,
}

impl Default for MatchConfig {
	fn default() -> Self {
		Self {
			hash_threshold: DEFAULT_HASH_THRESHOLD,
			ambiguous_hash_threshold: AMBIGUOUS_HASH_THRESHOLD,
			template_threshold: TEMPLATE_THRESHOLD,
		}
	}
}

impl MatchConfig {
	/// Default config with a user-chosen hash threshold, clamped to [`HASH_THRESHOLD_RANGE`].
	pub fn with_hash_threshold(threshold: u32) -> Self {
		Self {
			hash_threshold: threshold.clamp(*HASH_THRESHOLD_RANGE.start(), *HASH_THRESHOLD_RANGE.end()),
			..Self::default()
		}
	}

	/// Hash bound that applies to `icon`.
	pub fn hash_threshold_for(&self, icon: &SpellIcon) -> u32 {
		if icon.is_ambiguous() {
			self.ambiguous_hash_threshold
		} else {
			self.hash_threshold
		}
	}
}

/// Outcome of classifying one frame.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchResult {
	Template { spell: String, correlation: f32, scale: f32 },
	Hash { spell: String, distance: u32 },
	NoMatch,
}

impl MatchResult {
	pub fn spell(&self) -> Option<&str> {
		match self {
			MatchResult::Template { spell, .. } | MatchResult::Hash { spell, .. } => Some(spell),
			MatchResult::NoMatch => None,
		}
	}

	pub fn strategy(&self) -> Option<MatchStrategy> {
		match self {
			MatchResult::Template { .. } => Some(MatchStrategy::Template),
			MatchResult::Hash { .. } => Some(MatchStrategy::Hash),
			MatchResult::NoMatch => None,
		}
	}
}

impl std::fmt::Display for MatchResult {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			MatchResult::Template { spell, correlation, scale } => {
				write!(f, "Template matching found: {spell} (confidence: {correlation:.2}, scale {scale})")
			}
			MatchResult::Hash { spell, distance } => write!(f, "Hash matching found: {spell} (diff: {distance})"),
			MatchResult::NoMatch => write!(f, "no match"),
		}
	}
}

/// Hash acceptance rule shared by every pass.
#[inline]
pub fn within(distance: u32, threshold: u32) -> bool {
	distance < threshold
}

/// Classify `frame` against `library`. Pure: no I/O, no side effects.
pub fn classify(frame: Image, library: &IconLibrary, config: &MatchConfig) -> Result<MatchResult> {
	if let Some(found) = template_pass(frame, library, config) {
		return Ok(found);
	}
	let hash = PerceptualHash::of(frame)?;
	Ok(match_hash(hash, library, config))
}

/// First ambiguous icon whose best correlation clears the template threshold.
pub fn template_pass(frame: Image, library: &IconLibrary, config: &MatchConfig) -> Option<MatchResult> {
	for icon in library.ambiguous() {
		let Some(best) = best_correlation(frame, icon.templates()) else {
			tracing::trace!(spell = icon.name(), "frame smaller than every template scale");
			continue;
		};
		tracing::trace!(spell = icon.name(), correlation = best.correlation, scale = best.scale, "template score");

		if best.correlation >= config.template_threshold {
			return Some(MatchResult::Template {
				spell: icon.name().to_owned(),
				correlation: best.correlation,
				scale: best.scale,
			});
		}
	}
	None
}

/// Nearest icon by Hamming distance, subject to the per-icon bounds.
pub fn match_hash(frame_hash: PerceptualHash, library: &IconLibrary, config: &MatchConfig) -> MatchResult {
	let mut best: Option<(&SpellIcon, u32)> = None;
	for icon in library.iter() {
		let distance = icon.hash().distance(frame_hash);
		if icon.is_ambiguous() && !within(distance, config.ambiguous_hash_threshold) {
			continue;
		}
		if best.is_none_or(|(_, d)| distance < d) {
			best = Some((icon, distance));
		}
	}

	match best {
		Some((icon, distance)) if within(distance, config.hash_threshold_for(icon)) => MatchResult::Hash {
			spell: icon.name().to_owned(),
			distance,
		},
		Some((icon, distance)) => {
			tracing::trace!(spell = icon.name(), distance, "closest icon above threshold");
			MatchResult::NoMatch
		}
		None => MatchResult::NoMatch,
	}
}

/// Diagnostic comparison of one frame against one icon with both strategies.
#[derive(Debug, Clone, PartialEq)]
pub struct Probe {
	pub spell: String,
	pub strategy: MatchStrategy,
	pub frame_hash: PerceptualHash,
	pub icon_hash: PerceptualHash,
	pub distance: u32,
	pub hash_threshold: u32,
	pub template_threshold: f32,
	pub scales: Vec<ScaleProbe>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleProbe {
	pub scale: f32,
	/// `None` when the scaled icon does not fit inside the frame.
	pub correlation: Option<f32>,
}

impl Probe {
	pub fn hash_match(&self) -> bool {
		within(self.distance, self.hash_threshold)
	}

	pub fn template_match(&self) -> bool {
		self.scales
			.iter()
			.filter_map(|s| s.correlation)
			.any(|c| c >= self.template_threshold)
	}
}

pub fn probe(frame: Image, icon: &SpellIcon, config: &MatchConfig) -> Result<Probe> {
	let frame_hash = PerceptualHash::of(frame)?;
	let scales = PROBE_SCALES
		.iter()
		.map(|&scale| {
			let scaled = icon.image().scaled(scale)?;
			Ok(ScaleProbe {
				scale,
				correlation: correlate(frame, scaled.as_image()),
			})
		})
		.collect::<Result<Vec<_>>>()?;

	Ok(Probe {
		spell: icon.name().to_owned(),
		strategy: icon.strategy(),
		frame_hash,
		icon_hash: icon.hash(),
		distance: icon.hash().distance(frame_hash),
		hash_threshold: config.hash_threshold_for(icon),
		template_threshold: config.template_threshold,
		scales,
	})
}
