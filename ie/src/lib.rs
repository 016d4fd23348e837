mod image;
pub use self::image::*;
mod phash;
pub use phash::PerceptualHash;
mod library;
pub use library::*;
mod matcher;
pub use matcher::*;

pub mod template;

#[cfg(test)]
mod fixtures;

/// Recognition engine for one class/spec: the icon library plus the thresholds
/// it is matched with. Immutable once built; rebuild it to change either.
pub struct Ie {
	library: IconLibrary,
	config: MatchConfig,
}

impl Ie {
	pub fn new(library: IconLibrary, config: MatchConfig) -> Self {
		Self { library, config }
	}

	/// Load the icons in `icon_dir` and build an engine around them.
	pub fn try_new(icon_dir: impl AsRef<std::path::Path>, rules: &[IconRule], config: MatchConfig) -> anyhow::Result<Self> {
		Ok(Self::new(IconLibrary::load(icon_dir, rules)?, config))
	}

	pub fn library(&self) -> &IconLibrary {
		&self.library
	}

	pub fn config(&self) -> &MatchConfig {
		&self.config
	}

	pub fn classify(&self, frame: Image) -> anyhow::Result<MatchResult> {
		matcher::classify(frame, &self.library, &self.config)
	}

	/// Compare `frame` against the icon found by [`IconLibrary::find`].
	pub fn probe(&self, frame: Image, spell: &str) -> anyhow::Result<Probe> {
		let icon = self
			.library
			.find(spell)
			.ok_or_else(|| anyhow::anyhow!("{spell} not found in the current class/spec"))?;
		matcher::probe(frame, icon, &self.config)
	}
}
