//! Scripted stand-ins for the OS collaborators.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{Result, bail};

use crate::automation::{AutomationState, Classify};
use crate::capture::{CaptureError, Region, ScreenSampler};
use crate::input::{HotkeyPoll, KeyInjector};
use crate::keybind::{Key, Modifier};

#[derive(Debug, Clone, PartialEq)]
pub enum Ev {
	Poll(bool),
	Capture,
	Classify,
	Press(Key),
	ModDown(Modifier),
	ModUp(Modifier),
	ReleaseFailed(Modifier),
}

/// Shared, ordered record of every collaborator call.
#[derive(Debug, Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<Ev>>>);

impl Journal {
	pub fn push(&self, ev: Ev) {
		self.0.lock().unwrap().push(ev);
	}

	pub fn events(&self) -> Vec<Ev> {
		self.0.lock().unwrap().clone()
	}

	pub fn count(&self, f: impl Fn(&Ev) -> bool) -> usize {
		self.events().iter().filter(|ev| f(ev)).count()
	}
}

/// Records key events. Optionally requests a stop on the n-th key press and
/// fails the first `failing_releases` modifier releases.
pub struct RecordingInjector {
	pub journal: Journal,
	pub stop_on_press: Option<(usize, Arc<AutomationState>)>,
	pub failing_releases: usize,
	pub fail_presses: bool,
	presses: usize,
}

impl RecordingInjector {
	pub fn new(journal: Journal) -> Self {
		Self {
			journal,
			stop_on_press: None,
			failing_releases: 0,
			fail_presses: false,
			presses: 0,
		}
	}
}

impl KeyInjector for RecordingInjector {
	fn press(&mut self, key: Key) -> Result<()> {
		if self.fail_presses {
			bail!("press {key} rejected");
		}
		self.journal.push(Ev::Press(key));
		self.presses += 1;
		if let Some((n, state)) = &self.stop_on_press
			&& self.presses >= *n
		{
			state.request_stop();
		}
		Ok(())
	}

	fn press_modifier(&mut self, modifier: Modifier) -> Result<()> {
		self.journal.push(Ev::ModDown(modifier));
		Ok(())
	}

	fn release_modifier(&mut self, modifier: Modifier) -> Result<()> {
		if self.failing_releases > 0 {
			self.failing_releases -= 1;
			self.journal.push(Ev::ReleaseFailed(modifier));
			bail!("release {modifier} rejected");
		}
		self.journal.push(Ev::ModUp(modifier));
		Ok(())
	}
}

/// Returns a fixed frame; scripted failures first. Requests a stop after
/// `stop_after` captures (successful or not).
pub struct FakeSampler {
	pub journal: Journal,
	pub failures: usize,
	pub stop_after: Option<(usize, Arc<AutomationState>)>,
	captures: usize,
}

impl FakeSampler {
	pub fn new(journal: Journal) -> Self {
		Self {
			journal,
			failures: 0,
			stop_after: None,
			captures: 0,
		}
	}
}

impl ScreenSampler for FakeSampler {
	fn capture(&mut self, region: Region) -> Result<ie::OwnedImage, CaptureError> {
		self.journal.push(Ev::Capture);
		self.captures += 1;
		if let Some((n, state)) = &self.stop_after
			&& self.captures >= *n
		{
			state.request_stop();
		}
		if self.failures > 0 {
			self.failures -= 1;
			return Err(CaptureError::Backend("display unavailable".into()));
		}
		Ok(ie::OwnedImage::from_fn(region.width, region.height, |x, y| {
			ie::Color::new((x * 9) as u8, (y * 7) as u8, 90)
		}))
	}
}

/// Answers hotkey polls from a script; once exhausted it requests a stop
/// (when given a state) and reports the key as released.
pub struct ScriptedHotkey {
	pub journal: Journal,
	script: Mutex<VecDeque<bool>>,
	pub stop_when_done: Option<Arc<AutomationState>>,
}

impl ScriptedHotkey {
	pub fn new(journal: Journal, script: impl IntoIterator<Item = bool>) -> Self {
		Self {
			journal,
			script: Mutex::new(script.into_iter().collect()),
			stop_when_done: None,
		}
	}

	pub fn idle(journal: Journal) -> Self {
		Self::new(journal, [])
	}
}

impl HotkeyPoll for ScriptedHotkey {
	fn is_pressed(&self, _key: Key) -> bool {
		let next = self.script.lock().unwrap().pop_front();
		if next.is_none()
			&& let Some(state) = &self.stop_when_done
		{
			state.request_stop();
		}
		let pressed = next.unwrap_or(false);
		self.journal.push(Ev::Poll(pressed));
		pressed
	}
}

/// Classifies every frame from a script, repeating the last answer. The first
/// `failures` calls return an error.
pub struct ScriptedClassifier {
	pub journal: Journal,
	answers: Mutex<VecDeque<ie::MatchResult>>,
	last: Mutex<ie::MatchResult>,
	failures: AtomicUsize,
}

impl ScriptedClassifier {
	pub fn new(journal: Journal, answers: impl IntoIterator<Item = ie::MatchResult>) -> Self {
		Self {
			journal,
			answers: Mutex::new(answers.into_iter().collect()),
			last: Mutex::new(ie::MatchResult::NoMatch),
			failures: AtomicUsize::new(0),
		}
	}

	pub fn failing_first(self, failures: usize) -> Self {
		self.failures.store(failures, Ordering::SeqCst);
		self
	}
}

impl Classify for ScriptedClassifier {
	fn classify(&self, _frame: ie::Image) -> Result<ie::MatchResult> {
		self.journal.push(Ev::Classify);
		if self
			.failures
			.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
			.is_ok()
		{
			bail!("corrupt frame");
		}
		let mut last = self.last.lock().unwrap();
		if let Some(next) = self.answers.lock().unwrap().pop_front() {
			*last = next;
		}
		Ok(last.clone())
	}
}

pub fn hash(spell: &str) -> ie::MatchResult {
	ie::MatchResult::Hash {
		spell: spell.into(),
		distance: 3,
	}
}
