//! OS keyboard plumbing: synthetic key presses (enigo) and global key state
//! for the toggle hotkey (rdev).

use std::collections::HashSet;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use enigo::{Direction, Enigo, Keyboard, Settings};

use crate::keybind::{Key, Modifier};

/// Sink for synthetic key events.
pub trait KeyInjector {
	/// Press and release `key`.
	fn press(&mut self, key: Key) -> Result<()>;
	fn press_modifier(&mut self, modifier: Modifier) -> Result<()>;
	fn release_modifier(&mut self, modifier: Modifier) -> Result<()>;
}

/// Level-triggered query of the physical keyboard.
pub trait HotkeyPoll {
	fn is_pressed(&self, key: Key) -> bool;
}

pub struct EnigoInjector {
	enigo: Enigo,
}

impl EnigoInjector {
	pub fn new() -> Result<Self> {
		let enigo = Enigo::new(&Settings::default()).context("initialize key injection")?;
		Ok(Self { enigo })
	}

	fn send(&mut self, key: enigo::Key, direction: Direction) -> Result<()> {
		let what = format!("send {key:?} {direction:?}");
		self.enigo.key(key, direction).context(what)
	}
}

impl KeyInjector for EnigoInjector {
	fn press(&mut self, key: Key) -> Result<()> {
		self.send(to_enigo(key), Direction::Click)
	}

	fn press_modifier(&mut self, modifier: Modifier) -> Result<()> {
		self.send(modifier_to_enigo(modifier), Direction::Press)
	}

	fn release_modifier(&mut self, modifier: Modifier) -> Result<()> {
		self.send(modifier_to_enigo(modifier), Direction::Release)
	}
}

fn to_enigo(key: Key) -> enigo::Key {
	use enigo::Key as E;
	match key {
		Key::Char(c) => E::Unicode(c),
		Key::F(n) => match n {
			1 => E::F1,
			2 => E::F2,
			3 => E::F3,
			4 => E::F4,
			5 => E::F5,
			6 => E::F6,
			7 => E::F7,
			8 => E::F8,
			9 => E::F9,
			10 => E::F10,
			11 => E::F11,
			_ => E::F12,
		},
		Key::Space => E::Space,
		Key::Tab => E::Tab,
		Key::Enter => E::Return,
		Key::Escape => E::Escape,
		Key::Backspace => E::Backspace,
		Key::Delete => E::Delete,
		Key::Up => E::UpArrow,
		Key::Down => E::DownArrow,
		Key::Left => E::LeftArrow,
		Key::Right => E::RightArrow,
		Key::Home => E::Home,
		Key::End => E::End,
		Key::PageUp => E::PageUp,
		Key::PageDown => E::PageDown,
	}
}

fn modifier_to_enigo(modifier: Modifier) -> enigo::Key {
	match modifier {
		Modifier::Alt => enigo::Key::Alt,
		Modifier::Ctrl => enigo::Key::Control,
		Modifier::Shift => enigo::Key::Shift,
	}
}

/// How long `RdevHotkey::start` waits for the listener to fail before
/// treating it as running.
const LISTENER_GRACE: Duration = Duration::from_millis(250);

/// Tracks currently held keys from a global rdev listener.
///
/// The listener thread cannot be stopped and lives until the process exits.
pub struct RdevHotkey {
	pressed: Arc<Mutex<HashSet<rdev::Key>>>,
}

impl RdevHotkey {
	pub fn start() -> Result<Self> {
		let pressed: Arc<Mutex<HashSet<rdev::Key>>> = Arc::default();
		let held = pressed.clone();
		let (failed_tx, failed_rx) = mpsc::channel();

		std::thread::Builder::new()
			.name("hotkey-listener".into())
			.spawn(move || {
				let result = rdev::listen(move |event| {
					let mut held = held.lock().expect("hotkey lock poisoned");
					match event.event_type {
						rdev::EventType::KeyPress(key) => {
							held.insert(key);
						}
						rdev::EventType::KeyRelease(key) => {
							held.remove(&key);
						}
						_ => {}
					}
				});
				if let Err(err) = result {
					let message = format!("{err:?}");
					tracing::error!(error = %message, "global key listener stopped; toggle hotkey disabled");
					let _ = failed_tx.send(message);
				}
			})
			.context("spawn hotkey listener")?;

		await_listener(&failed_rx, LISTENER_GRACE)?;
		Ok(Self { pressed })
	}
}

/// Fails when the listener reports an error (or exits) within `grace`.
fn await_listener(failed: &Receiver<String>, grace: Duration) -> Result<()> {
	match failed.recv_timeout(grace) {
		Ok(err) => bail!("global key listener unavailable: {err}"),
		Err(RecvTimeoutError::Timeout) => Ok(()),
		Err(RecvTimeoutError::Disconnected) => bail!("global key listener exited during startup"),
	}
}

impl HotkeyPoll for RdevHotkey {
	fn is_pressed(&self, key: Key) -> bool {
		let Some(key) = to_rdev(key) else {
			return false;
		};
		self.pressed.lock().expect("hotkey lock poisoned").contains(&key)
	}
}

/// Physical key for `key`, if the listener can observe it.
pub fn to_rdev(key: Key) -> Option<rdev::Key> {
	use rdev::Key as R;
	let key = match key {
		Key::Char(c) => match c {
			'a' => R::KeyA,
			'b' => R::KeyB,
			'c' => R::KeyC,
			'd' => R::KeyD,
			'e' => R::KeyE,
			'f' => R::KeyF,
			'g' => R::KeyG,
			'h' => R::KeyH,
			'i' => R::KeyI,
			'j' => R::KeyJ,
			'k' => R::KeyK,
			'l' => R::KeyL,
			'm' => R::KeyM,
			'n' => R::KeyN,
			'o' => R::KeyO,
			'p' => R::KeyP,
			'q' => R::KeyQ,
			'r' => R::KeyR,
			's' => R::KeyS,
			't' => R::KeyT,
			'u' => R::KeyU,
			'v' => R::KeyV,
			'w' => R::KeyW,
			'x' => R::KeyX,
			'y' => R::KeyY,
			'z' => R::KeyZ,
			'0' => R::Num0,
			'1' => R::Num1,
			'2' => R::Num2,
			'3' => R::Num3,
			'4' => R::Num4,
			'5' => R::Num5,
			'6' => R::Num6,
			'7' => R::Num7,
			'8' => R::Num8,
			'9' => R::Num9,
			'-' => R::Minus,
			'=' => R::Equal,
			'[' => R::LeftBracket,
			']' => R::RightBracket,
			';' => R::SemiColon,
			'\'' => R::Quote,
			'\\' => R::BackSlash,
			',' => R::Comma,
			'.' => R::Dot,
			'/' => R::Slash,
			'`' => R::BackQuote,
			_ => return None,
		},
		Key::F(n) => match n {
			1 => R::F1,
			2 => R::F2,
			3 => R::F3,
			4 => R::F4,
			5 => R::F5,
			6 => R::F6,
			7 => R::F7,
			8 => R::F8,
			9 => R::F9,
			10 => R::F10,
			11 => R::F11,
			12 => R::F12,
			_ => return None,
		},
		Key::Space => R::Space,
		Key::Tab => R::Tab,
		Key::Enter => R::Return,
		Key::Escape => R::Escape,
		Key::Backspace => R::Backspace,
		Key::Delete => R::Delete,
		Key::Up => R::UpArrow,
		Key::Down => R::DownArrow,
		Key::Left => R::LeftArrow,
		Key::Right => R::RightArrow,
		Key::Home => R::Home,
		Key::End => R::End,
		Key::PageUp => R::PageUp,
		Key::PageDown => R::PageDown,
	};
	Some(key)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn toggle_keys_map_to_physical_keys() {
		assert_eq!(to_rdev("f3".parse().unwrap()), Some(rdev::Key::F3));
		assert_eq!(to_rdev("q".parse().unwrap()), Some(rdev::Key::KeyQ));
		assert_eq!(to_rdev("7".parse().unwrap()), Some(rdev::Key::Num7));
		assert_eq!(to_rdev(Key::Char('é')), None);
	}

	#[test]
	fn listener_error_fails_startup() {
		let (tx, rx) = mpsc::channel();
		tx.send("XOpenDisplay failed".to_string()).unwrap();
		let err = await_listener(&rx, Duration::from_secs(5)).unwrap_err();
		assert!(err.to_string().contains("XOpenDisplay failed"), "{err}");
	}

	#[test]
	fn listener_exit_fails_startup() {
		let (tx, rx) = mpsc::channel::<String>();
		drop(tx);
		assert!(await_listener(&rx, Duration::from_secs(5)).is_err());
	}

	#[test]
	fn quiet_listener_is_running() {
		let (_tx, rx) = mpsc::channel::<String>();
		await_listener(&rx, Duration::from_millis(10)).unwrap();
	}
}
