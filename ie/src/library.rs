//! Reference icon library for one class/spec.
//!
//! Every image in a class/spec icon directory becomes a [`SpellIcon`] named after
//! its file stem. Hashes (and, for icons matched by template, the scaled
//! templates) are computed once here so the per-frame path only compares.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};

use crate::template::ScaledTemplate;
use crate::{OwnedImage, PerceptualHash};

/// Scales tried for template matching (tolerates minor addon icon resizing).
pub const TEMPLATE_SCALES: [f32; 3] = [1.0, 0.95, 0.9];

const ICON_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// How an icon is recognized.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchStrategy {
	/// Template correlation first, then a stricter hash bound.
	Template,
	/// Perceptual hash nearest neighbour only.
	#[default]
	Hash,
}

impl std::fmt::Display for MatchStrategy {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			MatchStrategy::Template => write!(f, "template"),
			MatchStrategy::Hash => write!(f, "hash"),
		}
	}
}

/// Strategy override for every spell whose name contains `pattern` (case-insensitive).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IconRule {
	pub pattern: String,
	pub strategy: MatchStrategy,
}

impl IconRule {
	pub fn template(pattern: impl Into<String>) -> Self {
		Self {
			pattern: pattern.into(),
			strategy: MatchStrategy::Template,
		}
	}

	/// Icons known to collide under perceptual hashing.
	pub fn defaults() -> Vec<Self> {
		vec![Self::template("storm_elemental"), Self::template("ascendance")]
	}

	pub fn matches(&self, spell: &str) -> bool {
		spell.to_lowercase().contains(&self.pattern.to_lowercase())
	}
}

/// First matching rule wins; unmatched spells use [`MatchStrategy::Hash`].
pub fn strategy_for(spell: &str, rules: &[IconRule]) -> MatchStrategy {
	rules
		.iter()
		.find(|rule| rule.matches(spell))
		.map(|rule| rule.strategy)
		.unwrap_or_default()
}

#[derive(Debug, Clone)]
pub struct SpellIcon {
	name: String,
	path: Option<PathBuf>,
	image: OwnedImage,
	hash: PerceptualHash,
	strategy: MatchStrategy,
	templates: Vec<ScaledTemplate>,
}

impl SpellIcon {
	pub fn new(name: impl Into<String>, image: OwnedImage, strategy: MatchStrategy) -> Result<Self> {
		let hash = PerceptualHash::of(image.as_image())?;
		Self::with_hash(name, image, hash, strategy)
	}

	/// Build an icon with a precomputed hash.
	pub fn with_hash(name: impl Into<String>, image: OwnedImage, hash: PerceptualHash, strategy: MatchStrategy) -> Result<Self> {
		let templates = match strategy {
			MatchStrategy::Template => ScaledTemplate::build(&image, &TEMPLATE_SCALES)?,
			MatchStrategy::Hash => Vec::new(),
		};

		Ok(Self {
			name: name.into(),
			path: None,
			image,
			hash,
			strategy,
			templates,
		})
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	/// Source file, when loaded from disk.
	pub fn path(&self) -> Option<&Path> {
		self.path.as_deref()
	}

	pub fn image(&self) -> &OwnedImage {
		&self.image
	}

	pub fn hash(&self) -> PerceptualHash {
		self.hash
	}

	pub fn strategy(&self) -> MatchStrategy {
		self.strategy
	}

	#[inline]
	pub fn is_ambiguous(&self) -> bool {
		self.strategy == MatchStrategy::Template
	}

	pub fn templates(&self) -> &[ScaledTemplate] {
		&self.templates
	}
}

/// Immutable set of reference icons keyed (and iterated) by spell name.
#[derive(Debug, Clone, Default)]
pub struct IconLibrary {
	icons: BTreeMap<String, SpellIcon>,
}

impl IconLibrary {
	/// Load every icon in `dir`.
	///
	/// Unreadable images are logged and left out. A missing directory, or one
	/// without a single usable icon, is an error.
	pub fn load(dir: impl AsRef<Path>, rules: &[IconRule]) -> Result<Self> {
		let dir = dir.as_ref();
		ensure!(dir.is_dir(), "icon directory {:?} does not exist", dir);

		let mut paths = std::fs::read_dir(dir)
			.with_context(|| format!("read {:?}", dir))?
			.filter_map(|entry| entry.ok().map(|e| e.path()))
			.filter(|path| path.is_file() && is_icon_file(path))
			.collect::<Vec<_>>();
		paths.sort();

		let mut icons = BTreeMap::new();
		for path in paths {
			let Some(name) = path.file_stem().and_then(|s| s.to_str()).map(str::to_owned) else {
				tracing::warn!(path = ?path, "skipping icon with a non UTF-8 name");
				continue;
			};
			if icons.contains_key(&name) {
				tracing::warn!(spell = %name, path = ?path, "duplicate icon name; keeping the first");
				continue;
			}

			let icon = OwnedImage::open(&path)
				.and_then(|image| SpellIcon::new(name.clone(), image, strategy_for(&name, rules)));
			match icon {
				Ok(mut icon) => {
					icon.path = Some(path);
					icons.insert(name, icon);
				}
				Err(err) => {
					tracing::warn!(spell = %name, error = %err, "failed to load icon; spell omitted");
				}
			}
		}

		ensure!(!icons.is_empty(), "no usable icons in {:?}", dir);

		let library = Self { icons };
		tracing::info!(
			dir = ?dir,
			icons = library.len(),
			ambiguous = library.ambiguous().count(),
			"icon library loaded"
		);
		Ok(library)
	}

	pub fn from_icons(icons: impl IntoIterator<Item = SpellIcon>) -> Self {
		Self {
			icons: icons.into_iter().map(|icon| (icon.name.clone(), icon)).collect(),
		}
	}

	pub fn get(&self, spell: &str) -> Option<&SpellIcon> {
		self.icons.get(spell)
	}

	/// Exact name, else the first icon whose name contains `query` (case-insensitive).
	pub fn find(&self, query: &str) -> Option<&SpellIcon> {
		if let Some(icon) = self.get(query) {
			return Some(icon);
		}
		let query = query.to_lowercase();
		self.iter().find(|icon| icon.name.to_lowercase().contains(&query))
	}

	/// Icons in name order.
	pub fn iter(&self) -> impl Iterator<Item = &SpellIcon> {
		self.icons.values()
	}

	/// Icons recognized by template, in name order.
	pub fn ambiguous(&self) -> impl Iterator<Item = &SpellIcon> {
		self.iter().filter(|icon| icon.is_ambiguous())
	}

	pub fn len(&self) -> usize {
		self.icons.len()
	}

	pub fn is_empty(&self) -> bool {
		self.icons.is_empty()
	}
}

fn is_icon_file(path: &Path) -> bool {
	path.extension()
		.and_then(|e| e.to_str())
		.is_some_and(|e| ICON_EXTENSIONS.iter().any(|ext| e.eq_ignore_ascii_case(ext)))
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::Color;

	fn icon_image(seed: u32) -> OwnedImage {
		OwnedImage::from_fn(20, 20, |x, y| {
			let v = ((x * seed + y * (seed + 3)) % 251) as u8;
			Color::new(v, v.wrapping_mul(3), 255 - v)
		})
	}

	#[test]
	fn rules_match_substrings_case_insensitively() {
		let rules = IconRule::defaults();
		assert_eq!(strategy_for("Storm_Elemental", &rules), MatchStrategy::Template);
		assert_eq!(strategy_for("ascendance_fire", &rules), MatchStrategy::Template);
		assert_eq!(strategy_for("lava_burst", &rules), MatchStrategy::Hash);
		assert_eq!(strategy_for("storm_elemental", &[]), MatchStrategy::Hash);
	}

	#[test]
	fn first_rule_wins() {
		let rules = vec![
			IconRule {
				pattern: "storm".into(),
				strategy: MatchStrategy::Hash,
			},
			IconRule::template("storm_elemental"),
		];
		assert_eq!(strategy_for("storm_elemental", &rules), MatchStrategy::Hash);
	}

	#[test]
	fn only_template_icons_carry_scaled_templates() {
		let a = SpellIcon::new("a", icon_image(3), MatchStrategy::Template).unwrap();
		let b = SpellIcon::new("b", icon_image(5), MatchStrategy::Hash).unwrap();
		assert_eq!(a.templates().len(), TEMPLATE_SCALES.len());
		assert_eq!(a.templates()[2].image.width(), 18);
		assert!(b.templates().is_empty());
		assert!(a.is_ambiguous() && !b.is_ambiguous());
	}

	#[test]
	fn load_skips_broken_and_foreign_files() {
		let dir = tempfile::tempdir().unwrap();
		icon_image(3).as_image().save_png(dir.path().join("lava_burst.png")).unwrap();
		icon_image(7).as_image().save_png(dir.path().join("storm_elemental.png")).unwrap();
		std::fs::write(dir.path().join("broken.png"), b"not an image").unwrap();
		std::fs::write(dir.path().join("notes.txt"), b"hello").unwrap();
		std::fs::create_dir(dir.path().join("nested.png")).unwrap();

		let library = IconLibrary::load(dir.path(), &IconRule::defaults()).unwrap();
		let names = library.iter().map(|i| i.name().to_owned()).collect::<Vec<_>>();
		assert_eq!(names, ["lava_burst", "storm_elemental"]);
		assert_eq!(library.ambiguous().map(|i| i.name()).collect::<Vec<_>>(), ["storm_elemental"]);
		assert!(library.get("broken").is_none());
		assert_eq!(
			library.get("lava_burst").unwrap().path(),
			Some(dir.path().join("lava_burst.png").as_path())
		);
	}

	#[test]
	fn names_are_case_sensitive_stems() {
		let dir = tempfile::tempdir().unwrap();
		icon_image(3).as_image().save_png(dir.path().join("Frost_Shock.PNG")).unwrap();
		let library = IconLibrary::load(dir.path(), &[]).unwrap();
		assert!(library.get("Frost_Shock").is_some());
		assert!(library.get("frost_shock").is_none());
	}

	#[test]
	fn find_prefers_exact_then_substring() {
		let library = IconLibrary::from_icons([
			SpellIcon::new("storm_elemental", icon_image(3), MatchStrategy::Hash).unwrap(),
			SpellIcon::new("storm", icon_image(5), MatchStrategy::Hash).unwrap(),
		]);
		assert_eq!(library.find("storm").unwrap().name(), "storm");
		assert_eq!(library.find("ELEMENTAL").unwrap().name(), "storm_elemental");
		assert!(library.find("fireball").is_none());
	}

	#[test]
	fn missing_or_empty_directory_is_fatal() {
		let dir = tempfile::tempdir().unwrap();
		assert!(IconLibrary::load(dir.path().join("nope"), &[]).is_err());
		assert!(IconLibrary::load(dir.path(), &[]).is_err());
	}
}
