//! Key binding tokens.
//!
//! A token is either a bare key name (`1`, `f`, `f5`, `space`) or a
//! `modifier+key` pair where the modifier is `alt`, `ctrl` or `shift`
//! (case-insensitive).

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;

static COMBO_REGEX: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r"^\s*(?<modifier>[A-Za-z]+)\s*\+\s*(?<key>\S+)\s*$").expect("regex"));

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyParseError {
	#[error("empty key binding")]
	Empty,
	#[error("unknown modifier {0:?} (expected alt, ctrl or shift)")]
	UnknownModifier(String),
	#[error("unknown key {0:?}")]
	UnknownKey(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Modifier {
	Alt,
	Ctrl,
	Shift,
}

impl FromStr for Modifier {
	type Err = KeyParseError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.trim().to_ascii_lowercase().as_str() {
			"alt" => Ok(Modifier::Alt),
			"ctrl" => Ok(Modifier::Ctrl),
			"shift" => Ok(Modifier::Shift),
			_ => Err(KeyParseError::UnknownModifier(s.trim().to_owned())),
		}
	}
}

impl std::fmt::Display for Modifier {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Modifier::Alt => write!(f, "alt"),
			Modifier::Ctrl => write!(f, "ctrl"),
			Modifier::Shift => write!(f, "shift"),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
	/// Printable key, stored lowercase.
	Char(char),
	/// Function key `F1`..=`F12`.
	F(u8),
	Space,
	Tab,
	Enter,
	Escape,
	Backspace,
	Delete,
	Up,
	Down,
	Left,
	Right,
	Home,
	End,
	PageUp,
	PageDown,
}

impl FromStr for Key {
	type Err = KeyParseError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let token = s.trim();
		let mut chars = token.chars();
		if let (Some(c), None) = (chars.next(), chars.next()) {
			return if c.is_whitespace() {
				Err(KeyParseError::Empty)
			} else {
				Ok(Key::Char(c.to_ascii_lowercase()))
			};
		}

		let lower = token.to_ascii_lowercase();
		let key = match lower.as_str() {
			"" => return Err(KeyParseError::Empty),
			"space" => Key::Space,
			"tab" => Key::Tab,
			"enter" | "return" => Key::Enter,
			"esc" | "escape" => Key::Escape,
			"backspace" => Key::Backspace,
			"del" | "delete" => Key::Delete,
			"up" => Key::Up,
			"down" => Key::Down,
			"left" => Key::Left,
			"right" => Key::Right,
			"home" => Key::Home,
			"end" => Key::End,
			"pgup" | "pageup" => Key::PageUp,
			"pgdn" | "pagedown" => Key::PageDown,
			other => match other.strip_prefix('f').and_then(|n| n.parse::<u8>().ok()) {
				Some(n @ 1..=12) => Key::F(n),
				_ => return Err(KeyParseError::UnknownKey(token.to_owned())),
			},
		};
		Ok(key)
	}
}

impl std::fmt::Display for Key {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Key::Char(c) => write!(f, "{c}"),
			Key::F(n) => write!(f, "f{n}"),
			Key::Space => write!(f, "space"),
			Key::Tab => write!(f, "tab"),
			Key::Enter => write!(f, "enter"),
			Key::Escape => write!(f, "esc"),
			Key::Backspace => write!(f, "backspace"),
			Key::Delete => write!(f, "delete"),
			Key::Up => write!(f, "up"),
			Key::Down => write!(f, "down"),
			Key::Left => write!(f, "left"),
			Key::Right => write!(f, "right"),
			Key::Home => write!(f, "home"),
			Key::End => write!(f, "end"),
			Key::PageUp => write!(f, "pageup"),
			Key::PageDown => write!(f, "pagedown"),
		}
	}
}

/// A parsed key token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyBinding {
	pub modifier: Option<Modifier>,
	pub key: Key,
}

impl FromStr for KeyBinding {
	type Err = KeyParseError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		if s.trim().is_empty() {
			return Err(KeyParseError::Empty);
		}

		if let Some(caps) = COMBO_REGEX.captures(s) {
			return Ok(Self {
				modifier: Some(caps["modifier"].parse()?),
				key: caps["key"].parse()?,
			});
		}

		Ok(Self {
			modifier: None,
			key: s.parse()?,
		})
	}
}

impl std::fmt::Display for KeyBinding {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self.modifier {
			Some(modifier) => write!(f, "{modifier}+{}", self.key),
			None => write!(f, "{}", self.key),
		}
	}
}

/// Spell name → binding for one session. Spells without an entry are skipped.
#[derive(Debug, Clone, Default)]
pub struct KeyBindings(BTreeMap<String, KeyBinding>);

impl KeyBindings {
	/// Parse the configured tokens. Empty tokens mean "skip"; invalid ones are
	/// logged and also skipped.
	pub fn from_config(tokens: &BTreeMap<String, String>) -> Self {
		let mut bindings = BTreeMap::new();
		for (spell, token) in tokens {
			if token.trim().is_empty() {
				continue;
			}
			match token.parse::<KeyBinding>() {
				Ok(binding) => {
					bindings.insert(spell.clone(), binding);
				}
				Err(err) => {
					tracing::warn!(spell = %spell, token = %token, error = %err, "ignoring invalid key binding");
				}
			}
		}
		Self(bindings)
	}

	pub fn get(&self, spell: &str) -> Option<KeyBinding> {
		self.0.get(spell).copied()
	}

	pub fn iter(&self) -> impl Iterator<Item = (&str, KeyBinding)> {
		self.0.iter().map(|(spell, binding)| (spell.as_str(), *binding))
	}

	pub fn len(&self) -> usize {
		self.0.len()
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}

impl FromIterator<(String, KeyBinding)> for KeyBindings {
	fn from_iter<T: IntoIterator<Item = (String, KeyBinding)>>(iter: T) -> Self {
		Self(iter.into_iter().collect())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn bare_keys() {
		assert_eq!(
			"1".parse::<KeyBinding>().unwrap(),
			KeyBinding {
				modifier: None,
				key: Key::Char('1')
			}
		);
		assert_eq!("F".parse::<Key>().unwrap(), Key::Char('f'));
		assert_eq!("F5".parse::<Key>().unwrap(), Key::F(5));
		assert_eq!(" Space ".parse::<Key>().unwrap(), Key::Space);
		assert_eq!("+".parse::<Key>().unwrap(), Key::Char('+'));
	}

	#[test]
	fn modifier_combos_are_case_insensitive() {
		assert_eq!(
			"CTRL + f".parse::<KeyBinding>().unwrap(),
			KeyBinding {
				modifier: Some(Modifier::Ctrl),
				key: Key::Char('f')
			}
		);
		assert_eq!(
			"Shift+=".parse::<KeyBinding>().unwrap(),
			KeyBinding {
				modifier: Some(Modifier::Shift),
				key: Key::Char('=')
			}
		);
		assert_eq!("alt+f12".parse::<KeyBinding>().unwrap().to_string(), "alt+f12");
	}

	#[test]
	fn rejects_unknown_tokens() {
		assert_eq!("".parse::<KeyBinding>(), Err(KeyParseError::Empty));
		assert_eq!(
			"cmd+x".parse::<KeyBinding>(),
			Err(KeyParseError::UnknownModifier("cmd".into()))
		);
		assert_eq!("f13".parse::<Key>(), Err(KeyParseError::UnknownKey("f13".into())));
		assert_eq!(
			"ctrl+banana".parse::<KeyBinding>(),
			Err(KeyParseError::UnknownKey("banana".into()))
		);
	}

	#[test]
	fn config_map_skips_empty_and_invalid() {
		let tokens = BTreeMap::from([
			("fireball".to_owned(), "1".to_owned()),
			("frostbolt".to_owned(), "ctrl+f".to_owned()),
			("racial".to_owned(), "".to_owned()),
			("broken".to_owned(), "hyper+q".to_owned()),
		]);
		let bindings = KeyBindings::from_config(&tokens);
		assert_eq!(bindings.len(), 2);
		assert!(bindings.get("racial").is_none());
		assert!(bindings.get("broken").is_none());
		assert_eq!(bindings.get("frostbolt").unwrap().modifier, Some(Modifier::Ctrl));
	}
}
