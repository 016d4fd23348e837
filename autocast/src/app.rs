//! Command-line front end.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc::RecvTimeoutError;
use std::time::Duration;

use anyhow::{Context, Result, ensure};
use clap::{Parser, Subcommand};
use tracing::Level;

use crate::assets;
use crate::automation::{LoopSettings, Notification, Session, Timings};
use crate::capture::{Region, ScreenSampler, XcapSampler};
use crate::config::Config;
use crate::input::{EnigoInjector, RdevHotkey};
use crate::keybind::{Key, KeyBindings};

#[derive(Debug, Parser)]
#[command(name = "autocast", version, about = "Presses the key for the spell your rotation addon suggests")]
struct Cli {
	/// Config file (defaults to the platform config directory).
	#[arg(long, global = true)]
	config: Option<PathBuf>,

	#[command(subcommand)]
	command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
	/// Recognize the suggested spell and press its key until Ctrl+C.
	Run {
		/// Class/spec folder to use instead of the configured one.
		#[arg(long)]
		class: Option<String>,
	},
	/// List the available class/spec folders.
	Classes,
	/// Select the class/spec folder.
	Class { name: String },
	/// List the spells of the selected class/spec with their bindings.
	Spells,
	/// Bind a spell to a key token (`1`, `f`, `ctrl+f`, or `skip`).
	Bind { spell: String, key: String },
	/// Remove a spell's binding.
	Unbind { spell: String },
	/// Set the screen region holding the suggested-spell icon.
	Region {
		left: i32,
		top: i32,
		#[arg(default_value_t = 50)]
		width: u32,
		#[arg(default_value_t = 50)]
		height: u32,
	},
	/// Set the hash threshold (5 to 25, lower is stricter).
	Threshold { value: u32 },
	/// Capture the region once and save it as PNG.
	Snapshot {
		#[arg(long)]
		out: Option<PathBuf>,
	},
	/// Compare the current screen region against one spell's icon.
	Probe { spell: String },
}

pub fn run() -> Result<()> {
	let cli = Cli::parse();
	let path = match cli.config {
		Some(path) => path,
		None => Config::path()?,
	};
	let mut config = Config::load_or_default(&path);

	match cli.command {
		Command::Run { class } => {
			if let Some(class) = class {
				config.class_spec = class;
			}
			run_automation(&config)
		}
		Command::Classes => {
			let root = assets::resolve_icon_root(config.assets_dir.as_deref())?;
			for spec in assets::list_class_specs(&root)? {
				let marker = if spec == config.class_spec { '*' } else { ' ' };
				println!("{marker} {spec}");
			}
			Ok(())
		}
		Command::Class { name } => {
			let root = assets::resolve_icon_root(config.assets_dir.as_deref())?;
			assets::icon_dir(&root, &name)?;
			println!("Class/spec set to {name}");
			config.class_spec = name;
			config.save(&path)
		}
		Command::Spells => {
			let engine = load_engine(&config)?;
			print!("{}", render_spells(&engine, &config));
			Ok(())
		}
		Command::Bind { spell, key } => {
			if let Ok(engine) = load_engine(&config)
				&& engine.library().get(&spell).is_none()
			{
				tracing::warn!(spell = %spell, class_spec = %config.class_spec, "no icon with this name in the selected class/spec");
			}
			config.bind(&spell, &key)?;
			match config.keybindings[&spell].as_str() {
				"" => println!("{spell} will be recognized but skipped"),
				token => println!("{spell} → {token}"),
			}
			config.save(&path)
		}
		Command::Unbind { spell } => {
			if config.unbind(&spell) {
				println!("Removed binding for {spell}");
			} else {
				println!("{spell} had no binding");
			}
			config.save(&path)
		}
		Command::Region { left, top, width, height } => {
			ensure!(width > 0 && height > 0, "region must be at least 1x1");
			config.region = Region { left, top, width, height };
			println!("Capture region set to {}", config.region);
			config.save(&path)
		}
		Command::Threshold { value } => {
			let previous = config.hash_threshold;
			config.hash_threshold = value;
			let applied = config.match_config().hash_threshold;
			if applied != value {
				tracing::warn!(requested = value, applied, "threshold clamped to 5..=25");
			}
			config.hash_threshold = applied;
			println!("Hash threshold {previous} → {applied}");
			config.save(&path)
		}
		Command::Snapshot { out } => {
			let image = XcapSampler.capture(config.region)?;
			let out = match out {
				Some(out) => out,
				None => debug_path(&config, &format!("snapshot_{}.png", chrono::Local::now().format("%Y%m%d_%H%M%S")))?,
			};
			image.as_image().save_png(&out)?;
			println!("Saved {} capture to {}", config.region, out.display());
			Ok(())
		}
		Command::Probe { spell } => {
			let engine = load_engine(&config)?;
			let frame = XcapSampler.capture(config.region)?;
			let report = engine.probe(frame.as_image(), &spell)?;
			let icon_path = engine.library().get(&report.spell).and_then(|icon| icon.path());

			if config.debug_dir.is_some() {
				let path = debug_path(&config, &format!("test_{}.png", report.spell))?;
				frame.as_image().save_png(&path)?;
				println!("Captured region saved to {}", path.display());
			}
			print!("{}", render_probe(&report, icon_path));
			Ok(())
		}
	}
}

fn load_engine(config: &Config) -> Result<ie::Ie> {
	let root = assets::resolve_icon_root(config.assets_dir.as_deref())?;
	let dir = assets::icon_dir(&root, &config.class_spec)?;
	ie::Ie::try_new(&dir, &config.icon_rules, config.match_config())
}

/// `name` inside the debug directory, which is created on demand.
fn debug_path(config: &Config, name: &str) -> Result<PathBuf> {
	let dir = config.debug_dir.clone().unwrap_or_else(|| PathBuf::from("."));
	std::fs::create_dir_all(&dir).with_context(|| format!("create {:?}", dir))?;
	Ok(dir.join(name))
}

fn run_automation(config: &Config) -> Result<()> {
	let toggle_key: Key = config
		.toggle_key
		.parse()
		.with_context(|| format!("invalid toggle key {:?}", config.toggle_key))?;
	let engine = Arc::new(load_engine(config)?);
	let bindings = Arc::new(KeyBindings::from_config(&config.keybindings));

	log_session_summary(&engine, &bindings);
	if let Some(dir) = &config.debug_dir {
		save_references(&engine, dir);
	}

	let settings = LoopSettings {
		region: config.region,
		toggle_key,
		timings: Timings {
			poll: config.poll_delay(),
			..Timings::default()
		},
		debug_dir: config.debug_dir.clone(),
		..LoopSettings::default()
	};
	let mut session = Session::start(engine, bindings, settings, || {
		Ok((XcapSampler, EnigoInjector::new()?, RdevHotkey::start()?))
	})?;

	let state = session.state().clone();
	ctrlc::set_handler(move || state.request_stop()).context("install Ctrl+C handler")?;

	let mut last_preview = None;
	loop {
		match session.notifications().recv_timeout(Duration::from_millis(250)) {
			Ok(Notification::Log(line)) if line.level <= Level::WARN => eprintln!("{line}"),
			Ok(Notification::Log(line)) => println!("{line}"),
			Ok(Notification::Status(status)) => tracing::debug!(?status, "automation status"),
			Ok(Notification::Spell(spell)) => tracing::debug!(spell = %spell, "recognized spell changed"),
			Ok(Notification::Preview(frame)) => last_preview = Some(frame),
			Err(RecvTimeoutError::Timeout) if session.is_finished() => break,
			Err(RecvTimeoutError::Timeout) => {}
			Err(RecvTimeoutError::Disconnected) => break,
		}
	}
	session.stop();

	if let Some(frame) = last_preview
		&& config.debug_dir.is_some()
	{
		let path = debug_path(config, "last_preview.png")?;
		frame.image.as_image().save_png(&path)?;
		tracing::info!(path = ?path, seq = frame.seq, captured_at = %frame.captured_at, "last preview saved");
	}
	if let Some(spell) = session.state().last_spell() {
		println!("Last recognized spell: {spell}");
	}
	Ok(())
}

fn log_session_summary(engine: &ie::Ie, bindings: &KeyBindings) {
	let library = engine.library();
	tracing::info!(
		icons = library.len(),
		bindings = bindings.len(),
		hash_threshold = engine.config().hash_threshold,
		"session ready"
	);

	let mut ambiguous = 0;
	for icon in library.ambiguous() {
		ambiguous += 1;
		match bindings.get(icon.name()) {
			Some(binding) => tracing::info!(spell = icon.name(), key = %binding, "template matching enabled"),
			None => tracing::warn!(spell = icon.name(), "template matching enabled but the spell has no binding"),
		}
	}
	if ambiguous == 0 {
		tracing::warn!("no icon uses template matching; look-alike icons may be confused");
	}

	for (spell, _) in bindings.iter() {
		if library.get(spell).is_none() {
			tracing::warn!(spell, "binding for a spell without an icon");
		}
	}
}

fn save_references(engine: &ie::Ie, dir: &Path) {
	if let Err(err) = std::fs::create_dir_all(dir) {
		tracing::warn!(dir = ?dir, error = %err, "cannot create debug directory");
		return;
	}
	for icon in engine.library().ambiguous() {
		let path = dir.join(format!("reference_{}.png", icon.name()));
		if let Err(err) = icon.image().as_image().save_png(&path) {
			tracing::warn!(path = ?path, error = %format!("{err:#}"), "failed to save reference icon");
		}
	}
}

fn render_spells(engine: &ie::Ie, config: &Config) -> String {
	let mut out = String::new();
	let _ = writeln!(out, "{} ({} icons)", config.class_spec, engine.library().len());
	for icon in engine.library().iter() {
		let binding = match config.keybindings.get(icon.name()).map(String::as_str) {
			None => "(unbound)",
			Some("") => "(skip)",
			Some(token) => token,
		};
		let _ = writeln!(out, "  {:<32} {:<10} {}", icon.name(), binding, icon.strategy());
	}
	out
}

fn render_probe(report: &ie::Probe, icon_path: Option<&Path>) -> String {
	let verdict = |matched: bool| if matched { "MATCH" } else { "NO MATCH" };

	let mut out = String::new();
	let _ = writeln!(out, "Testing recognition for: {} ({} matching)", report.spell, report.strategy);
	if let Some(path) = icon_path {
		let _ = writeln!(out, "Icon path: {}", path.display());
	}
	let _ = writeln!(out, "Frame hash {} vs icon hash {}", report.frame_hash, report.icon_hash);
	let _ = writeln!(
		out,
		"Hash comparison: diff = {} (threshold {}): {}",
		report.distance,
		report.hash_threshold,
		verdict(report.hash_match())
	);
	for scale in &report.scales {
		match scale.correlation {
			Some(c) => {
				let _ = writeln!(out, "Template matching (scale {}): confidence = {c:.4}", scale.scale);
			}
			None => {
				let _ = writeln!(out, "Template matching (scale {}): skipped, icon larger than region", scale.scale);
			}
		}
	}
	let _ = writeln!(
		out,
		"Template result (threshold {}): {}",
		report.template_threshold,
		verdict(report.template_match())
	);
	out
}
