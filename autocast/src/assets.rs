use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};

const IMG_DIR: &str = "img";
const ENV_ASSETS_DIR: &str = "AUTOCAST_ASSETS_DIR";

// Explicit locations may point either to the folder containing `img/` or to
// `img/` itself. Guessed ones (exe dir, cwd) must contain `img/`.
fn normalize_img_dir(dir: &Path, explicit: bool) -> Option<PathBuf> {
	let nested = dir.join(IMG_DIR);
	if nested.is_dir() {
		Some(nested)
	} else if explicit && dir.is_dir() {
		Some(dir.to_path_buf())
	} else {
		None
	}
}

/// Resolve the icon root (`img/`) in a way that works both:
/// - when running from the repo (`cargo run`), and
/// - when running a packaged binary (assets next to the executable).
///
/// `AUTOCAST_ASSETS_DIR` wins over the configured `assets_dir`.
pub fn resolve_icon_root(configured: Option<&Path>) -> Result<PathBuf> {
	let mut candidates: Vec<(PathBuf, bool)> = Vec::new();
	if let Some(dir) = std::env::var_os(ENV_ASSETS_DIR) {
		candidates.push((PathBuf::from(dir), true));
	}
	if let Some(dir) = configured {
		candidates.push((dir.to_path_buf(), true));
	}
	if let Ok(exe) = std::env::current_exe()
		&& let Some(dir) = exe.parent()
	{
		candidates.push((dir.to_path_buf(), false));
	}
	if let Ok(cwd) = std::env::current_dir() {
		candidates.push((cwd, false));
	}
	#[cfg(debug_assertions)]
	candidates.push((PathBuf::from(env!("CARGO_MANIFEST_DIR")).join(".."), false));

	resolve_from(&candidates)
}

fn resolve_from(candidates: &[(PathBuf, bool)]) -> Result<PathBuf> {
	let mut tried = Vec::new();
	for (base, explicit) in candidates {
		if let Some(dir) = normalize_img_dir(base, *explicit) {
			return Ok(dir);
		}
		tried.push(base.join(IMG_DIR));
	}

	bail!(
		"Icon folder not found. Expected an '{IMG_DIR}/' folder with one sub-folder per class/spec.\n\nSearched in:\n{}\n\nFix: copy the '{IMG_DIR}/' folder next to the executable (or set {ENV_ASSETS_DIR} to the folder that contains it).",
		tried
			.into_iter()
			.map(|p| format!("  - {}", p.display()))
			.collect::<Vec<_>>()
			.join("\n")
	)
}

/// Class/spec folders under `root`, sorted.
pub fn list_class_specs(root: &Path) -> Result<Vec<String>> {
	let mut specs = std::fs::read_dir(root)
		.with_context(|| format!("read {:?}", root))?
		.filter_map(|entry| entry.ok())
		.filter(|entry| entry.path().is_dir())
		.filter_map(|entry| entry.file_name().into_string().ok())
		.collect::<Vec<_>>();
	specs.sort();
	Ok(specs)
}

/// Icon directory for `class_spec`, with the known choices listed when it is missing.
pub fn icon_dir(root: &Path, class_spec: &str) -> Result<PathBuf> {
	if class_spec.trim().is_empty() {
		bail!("no class/spec selected; pick one of: {}", list_class_specs(root)?.join(", "));
	}
	let dir = root.join(class_spec);
	if !dir.is_dir() {
		bail!(
			"unknown class/spec {class_spec:?}; available: {}",
			list_class_specs(root)?.join(", ")
		);
	}
	Ok(dir)
}
