//! Turns a recognized spell into key events.

use std::thread;
use std::time::Duration;

use anyhow::Result;

use crate::input::KeyInjector;
use crate::keybind::{KeyBinding, KeyBindings, Modifier};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchTimings {
	/// Pause between modifier down, key and modifier up.
	pub settle: Duration,
	/// Pause after every press.
	pub post_press: Duration,
}

impl Default for DispatchTimings {
	fn default() -> Self {
		Self {
			settle: Duration::from_millis(50),
			post_press: Duration::from_millis(100),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
	Pressed(KeyBinding),
	/// No binding for the spell; nothing was sent.
	Unbound,
}

/// Sends bindings and remembers a modifier that is still down, so the worker
/// can release it on the way out.
#[derive(Debug, Default)]
pub struct ActionDispatcher {
	timings: DispatchTimings,
	held: Option<Modifier>,
}

impl ActionDispatcher {
	pub fn new(timings: DispatchTimings) -> Self {
		Self { timings, held: None }
	}

	/// Modifier currently held down, if a release failed.
	pub fn held(&self) -> Option<Modifier> {
		self.held
	}

	/// Press the binding for `spell`.
	///
	/// With a modifier the order is always modifier down, key, modifier up. The
	/// modifier is released even when the key press fails. A modifier left held
	/// by an earlier failed release is released before anything else is sent.
	pub fn trigger(&mut self, spell: &str, bindings: &KeyBindings, injector: &mut dyn KeyInjector) -> Result<DispatchOutcome> {
		self.release_held(injector)?;

		let Some(binding) = bindings.get(spell) else {
			return Ok(DispatchOutcome::Unbound);
		};

		match binding.modifier {
			None => injector.press(binding.key)?,
			Some(modifier) => {
				injector.press_modifier(modifier)?;
				self.held = Some(modifier);
				thread::sleep(self.timings.settle);
				let pressed = injector.press(binding.key);
				thread::sleep(self.timings.settle);
				self.release_held(injector)?;
				pressed?;
			}
		}

		tracing::trace!(spell, key = %binding, "pressed");
		thread::sleep(self.timings.post_press);
		Ok(DispatchOutcome::Pressed(binding))
	}

	/// Release the held modifier, if any. Stays held when the release fails.
	pub fn release_held(&mut self, injector: &mut dyn KeyInjector) -> Result<()> {
		if let Some(modifier) = self.held {
			injector.release_modifier(modifier)?;
			self.held = None;
		}
		Ok(())
	}
}
