//! The automation worker: capture → classify → dispatch on a background thread.
//!
//! The foreground owns a [`Session`]. It can only request a stop and drain
//! [`Notification`]s; everything else happens on the worker, which never
//! blocks on the foreground (a full channel drops the notification).

use std::path::PathBuf;
use std::sync::{
	Arc, Condvar, Mutex,
	atomic::{AtomicBool, Ordering},
	mpsc::{self, Receiver, SyncSender, TrySendError},
};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Local};
use tracing::Level;

use crate::capture::{Region, ScreenSampler, check_size};
use crate::dispatch::{ActionDispatcher, DispatchOutcome, DispatchTimings};
use crate::input::{HotkeyPoll, KeyInjector};
use crate::keybind::{Key, KeyBindings};

const NOTIFICATION_CAPACITY: usize = 256;

/// Frame classifier consumed by the loop.
pub trait Classify: Send + Sync {
	fn classify(&self, frame: ie::Image) -> Result<ie::MatchResult>;
}

impl Classify for ie::Ie {
	fn classify(&self, frame: ie::Image) -> Result<ie::MatchResult> {
		ie::Ie::classify(self, frame)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timings {
	/// Sleep after a successful round.
	pub poll: Duration,
	/// Sleep per round while paused.
	pub paused: Duration,
	/// Sleep after the toggle hotkey was seen.
	pub toggle_debounce: Duration,
	/// Sleep after a failed round.
	pub error_backoff: Duration,
	pub dispatch: DispatchTimings,
}

impl Default for Timings {
	fn default() -> Self {
		Self {
			poll: Duration::from_millis(50),
			paused: Duration::from_millis(100),
			toggle_debounce: Duration::from_millis(300),
			error_backoff: Duration::from_secs(1),
			dispatch: DispatchTimings::default(),
		}
	}
}

#[derive(Debug, Clone)]
pub struct LoopSettings {
	pub region: Region,
	pub toggle_key: Key,
	pub timings: Timings,
	/// A preview goes out every n-th frame.
	pub preview_stride: u64,
	/// A debug PNG is written every n-th frame when `debug_dir` is set.
	pub debug_stride: u64,
	pub debug_dir: Option<PathBuf>,
}

impl Default for LoopSettings {
	fn default() -> Self {
		Self {
			region: Region::default(),
			toggle_key: Key::F(3),
			timings: Timings::default(),
			preview_stride: 10,
			debug_stride: 200,
			debug_dir: None,
		}
	}
}

/// Flags shared between the worker and the foreground for one session.
#[derive(Debug)]
pub struct AutomationState {
	active: AtomicBool,
	stop: Mutex<bool>,
	wake: Condvar,
	last_spell: Mutex<Option<String>>,
}

impl Default for AutomationState {
	fn default() -> Self {
		Self {
			active: AtomicBool::new(true),
			stop: Mutex::new(false),
			wake: Condvar::new(),
			last_spell: Mutex::new(None),
		}
	}
}

impl AutomationState {
	pub fn is_active(&self) -> bool {
		self.active.load(Ordering::Acquire)
	}

	/// Flip between active and paused; returns the new `active` value.
	pub fn toggle(&self) -> bool {
		!self.active.fetch_xor(true, Ordering::AcqRel)
	}

	pub fn request_stop(&self) {
		*self.stop.lock().expect("stop lock poisoned") = true;
		self.wake.notify_all();
	}

	pub fn stop_requested(&self) -> bool {
		*self.stop.lock().expect("stop lock poisoned")
	}

	/// Sleep for `duration` or until a stop is requested. Returns whether a
	/// stop was requested.
	pub fn sleep(&self, duration: Duration) -> bool {
		let deadline = Instant::now() + duration;
		let mut stopped = self.stop.lock().expect("stop lock poisoned");
		while !*stopped {
			let now = Instant::now();
			if now >= deadline {
				break;
			}
			let (guard, _timeout) = self
				.wake
				.wait_timeout(stopped, deadline - now)
				.expect("stop lock poisoned during wait");
			stopped = guard;
		}
		*stopped
	}

	/// Last spell announced by the worker.
	pub fn last_spell(&self) -> Option<String> {
		self.last_spell.lock().expect("last_spell lock poisoned").clone()
	}

	fn remember_spell(&self, spell: &str) {
		*self.last_spell.lock().expect("last_spell lock poisoned") = Some(spell.to_string());
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
	Active,
	Paused,
	Stopped,
}

#[derive(Debug, Clone)]
pub struct LogLine {
	pub at: DateTime<Local>,
	pub level: Level,
	pub message: String,
}

impl std::fmt::Display for LogLine {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "[{}] {}", self.at.format("%H:%M:%S"), self.message)
	}
}

/// One region snapshot, numbered in capture order.
#[derive(Debug, Clone)]
pub struct CaptureFrame {
	pub image: Arc<ie::OwnedImage>,
	pub captured_at: DateTime<Local>,
	pub seq: u64,
}

#[derive(Debug, Clone)]
pub enum Notification {
	Log(LogLine),
	Status(Status),
	/// The recognized spell changed.
	Spell(String),
	Preview(CaptureFrame),
}

/// Everything the worker thread needs besides the OS collaborators.
pub struct Worker {
	pub state: Arc<AutomationState>,
	pub engine: Arc<dyn Classify>,
	pub bindings: Arc<KeyBindings>,
	pub settings: LoopSettings,
	pub notifications: SyncSender<Notification>,
}

impl Worker {
	/// Run the loop on the current thread until a stop is requested.
	pub fn run<S: ScreenSampler, K: KeyInjector, H: HotkeyPoll>(self, sampler: S, injector: K, hotkey: H) {
		let dispatcher = ActionDispatcher::new(self.settings.timings.dispatch);
		AutomationLoop {
			worker: self,
			sampler,
			injector,
			hotkey,
			dispatcher,
			seq: 0,
		}
		.run();
	}
}

struct AutomationLoop<S, K, H> {
	worker: Worker,
	sampler: S,
	injector: K,
	hotkey: H,
	dispatcher: ActionDispatcher,
	seq: u64,
}

impl<S: ScreenSampler, K: KeyInjector, H: HotkeyPoll> AutomationLoop<S, K, H> {
	fn run(mut self) {
		self.prepare_debug_dir();
		let state = self.worker.state.clone();
		let timings = self.worker.settings.timings;
		let toggle_key = self.worker.settings.toggle_key;

		self.notify(Notification::Status(Status::Active));
		self.log(
			Level::INFO,
			format!("Automation started. Press {toggle_key} to pause or resume."),
		);

		while !state.stop_requested() {
			if self.hotkey.is_pressed(toggle_key) {
				let active = state.toggle();
				if active {
					self.notify(Notification::Status(Status::Active));
					self.log(Level::INFO, "Automation resumed");
				} else {
					self.notify(Notification::Status(Status::Paused));
					self.log(Level::INFO, "Automation paused");
				}
				state.sleep(timings.toggle_debounce);
				continue;
			}

			if !state.is_active() {
				state.sleep(timings.paused);
				continue;
			}

			match self.round() {
				Ok(()) => {
					state.sleep(timings.poll);
				}
				Err(err) => {
					self.log(Level::WARN, format!("Error in capture and compare: {err:#}"));
					state.sleep(timings.error_backoff);
				}
			}
		}

		if let Some(modifier) = self.dispatcher.held()
			&& let Err(err) = self.dispatcher.release_held(&mut self.injector)
		{
			self.log(Level::ERROR, format!("Failed to release {modifier}: {err:#}"));
		}
		self.log(Level::INFO, "Automation stopped");
		self.notify(Notification::Status(Status::Stopped));
	}

	/// One capture → classify → dispatch cycle.
	fn round(&mut self) -> Result<()> {
		let region = self.worker.settings.region;
		let image = self.sampler.capture(region)?;
		check_size(region, &image)?;

		let frame = CaptureFrame {
			image: Arc::new(image),
			captured_at: Local::now(),
			seq: self.seq,
		};
		self.seq += 1;
		self.publish(&frame);

		let result = self.worker.engine.classify(frame.image.as_image())?;
		let Some(spell) = result.spell() else {
			tracing::trace!(seq = frame.seq, "no match");
			return Ok(());
		};

		if self.worker.state.last_spell().as_deref() != Some(spell) {
			self.log(Level::INFO, result.to_string());
			if matches!(result, ie::MatchResult::Template { .. }) {
				self.save_debug(&frame, &format!("detected_{spell}_{:06}.png", frame.seq));
			}
			self.worker.state.remember_spell(spell);
			self.notify(Notification::Spell(spell.to_string()));
		}

		match self.dispatcher.trigger(spell, &self.worker.bindings, &mut self.injector)? {
			DispatchOutcome::Pressed(binding) => tracing::trace!(spell, key = %binding, seq = frame.seq, "dispatched"),
			DispatchOutcome::Unbound => tracing::debug!(spell, "no key binding; skipped"),
		}
		Ok(())
	}

	fn publish(&self, frame: &CaptureFrame) {
		let settings = &self.worker.settings;
		if settings.preview_stride > 0 && frame.seq % settings.preview_stride == 0 {
			self.notify(Notification::Preview(frame.clone()));
		}
		if settings.debug_stride > 0 && frame.seq % settings.debug_stride == 0 {
			self.save_debug(frame, &format!("capture_{:06}.png", frame.seq));
		}
	}

	fn prepare_debug_dir(&mut self) {
		let Some(dir) = &self.worker.settings.debug_dir else {
			return;
		};
		if let Err(err) = std::fs::create_dir_all(dir) {
			tracing::warn!(dir = ?dir, error = %err, "cannot create debug directory; debug captures disabled");
			self.worker.settings.debug_dir = None;
		}
	}

	fn save_debug(&self, frame: &CaptureFrame, name: &str) {
		let Some(dir) = &self.worker.settings.debug_dir else {
			return;
		};
		let path = dir.join(name);
		match frame.image.as_image().save_png(&path) {
			Ok(()) => tracing::debug!(path = ?path, "debug capture saved"),
			Err(err) => tracing::warn!(path = ?path, error = %format!("{err:#}"), "failed to save debug capture"),
		}
	}

	fn notify(&self, notification: Notification) {
		match self.worker.notifications.try_send(notification) {
			Ok(()) | Err(TrySendError::Disconnected(_)) => {}
			Err(TrySendError::Full(_)) => tracing::trace!("notification channel full; dropped"),
		}
	}

	/// User-facing line. Warnings and errors also go to the log.
	fn log(&self, level: Level, message: impl Into<String>) {
		let message = message.into();
		if level == Level::ERROR {
			tracing::error!("{message}");
		} else if level == Level::WARN {
			tracing::warn!("{message}");
		} else {
			tracing::debug!("{message}");
		}
		self.notify(Notification::Log(LogLine {
			at: Local::now(),
			level,
			message,
		}));
	}
}

/// A running automation worker.
pub struct Session {
	state: Arc<AutomationState>,
	notifications: Receiver<Notification>,
	worker: Option<JoinHandle<()>>,
}

impl Session {
	/// Spawn the worker. `connect` runs on the worker thread and builds the OS
	/// collaborators; its failure is returned here and no loop is started.
	pub fn start<S, K, H, F>(engine: Arc<dyn Classify>, bindings: Arc<KeyBindings>, settings: LoopSettings, connect: F) -> Result<Self>
	where
		S: ScreenSampler + 'static,
		K: KeyInjector + 'static,
		H: HotkeyPoll + 'static,
		F: FnOnce() -> Result<(S, K, H)> + Send + 'static,
	{
		let state = Arc::new(AutomationState::default());
		let (tx, notifications) = mpsc::sync_channel(NOTIFICATION_CAPACITY);
		let (ready_tx, ready_rx) = mpsc::channel::<Result<()>>();

		let worker = Worker {
			state: state.clone(),
			engine,
			bindings,
			settings,
			notifications: tx,
		};
		let handle = std::thread::Builder::new()
			.name("automation".into())
			.spawn(move || {
				let (sampler, injector, hotkey) = match connect() {
					Ok(devices) => {
						let _ = ready_tx.send(Ok(()));
						devices
					}
					Err(err) => {
						let _ = ready_tx.send(Err(err));
						return;
					}
				};
				worker.run(sampler, injector, hotkey);
			})
			.context("spawn automation worker")?;

		match ready_rx.recv() {
			Ok(Ok(())) => {}
			Ok(Err(err)) => {
				let _ = handle.join();
				return Err(err.context("automation setup failed"));
			}
			Err(_) => {
				let _ = handle.join();
				bail!("automation worker exited during setup");
			}
		}

		tracing::info!("automation worker started");
		Ok(Self {
			state,
			notifications,
			worker: Some(handle),
		})
	}

	pub fn state(&self) -> &Arc<AutomationState> {
		&self.state
	}

	pub fn notifications(&self) -> &Receiver<Notification> {
		&self.notifications
	}

	pub fn is_finished(&self) -> bool {
		self.worker.as_ref().is_none_or(|h| h.is_finished())
	}

	/// Request a stop and wait for the worker to wind down. Idempotent.
	pub fn stop(&mut self) {
		self.state.request_stop();
		if let Some(handle) = self.worker.take()
			&& handle.join().is_err()
		{
			tracing::error!("automation worker panicked");
		}
	}
}

impl Drop for Session {
	fn drop(&mut self) {
		self.stop();
	}
}
