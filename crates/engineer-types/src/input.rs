//! Remote-control input snapshot.
//!
//! An [`InputFrame`] is produced once per received remote-control packet by
//! an external acquisition component and read (never written) by the control
//! tick.  Frames deserialise from JSON so that recorded sessions can be piped
//! into the `engineer` binary; the key set travels as a list of key names:
//!
//! ```json
//! { "s_r": "mid", "s_l": "down", "ch_r_y": 0.5, "keys": ["ctrl", "r"] }
//! ```

use std::fmt;
use std::str::FromStr;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::ManualError;

// ────────────────────────────────────────────────────────────────────────────
// Keys
// ────────────────────────────────────────────────────────────────────────────

/// Keyboard keys carried by the remote-control link.
///
/// `Ctrl` and `Shift` are ordinary members of the key set; chords are
/// evaluated by the binding layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum Key {
    W = 0,
    S,
    A,
    D,
    Q,
    E,
    R,
    F,
    G,
    Z,
    X,
    C,
    V,
    B,
    Ctrl,
    Shift,
}

impl Key {
    /// Every key, in bit order.
    pub const ALL: [Key; 16] = [
        Key::W,
        Key::S,
        Key::A,
        Key::D,
        Key::Q,
        Key::E,
        Key::R,
        Key::F,
        Key::G,
        Key::Z,
        Key::X,
        Key::C,
        Key::V,
        Key::B,
        Key::Ctrl,
        Key::Shift,
    ];

    const fn bit(self) -> u32 {
        1 << (self as u8)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Key::W => "w",
            Key::S => "s",
            Key::A => "a",
            Key::D => "d",
            Key::Q => "q",
            Key::E => "e",
            Key::R => "r",
            Key::F => "f",
            Key::G => "g",
            Key::Z => "z",
            Key::X => "x",
            Key::C => "c",
            Key::V => "v",
            Key::B => "b",
            Key::Ctrl => "ctrl",
            Key::Shift => "shift",
        };
        f.write_str(name)
    }
}

impl FromStr for Key {
    type Err = ManualError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        Key::ALL
            .into_iter()
            .find(|k| k.to_string() == lower)
            .ok_or_else(|| ManualError::InvalidBinding(format!("unknown key '{s}'")))
    }
}

/// Set of keys held down during one frame, packed into a bitmask.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<Key>", into = "Vec<Key>")]
pub struct KeySet(u32);

impl KeySet {
    /// The empty key set.
    pub const fn empty() -> Self {
        Self(0)
    }

    pub fn insert(&mut self, key: Key) {
        self.0 |= key.bit();
    }

    pub fn remove(&mut self, key: Key) {
        self.0 &= !key.bit();
    }

    pub const fn contains(&self, key: Key) -> bool {
        self.0 & key.bit() != 0
    }

    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Iterate over the held keys in bit order.
    pub fn iter(&self) -> impl Iterator<Item = Key> + '_ {
        Key::ALL.into_iter().filter(|k| self.contains(*k))
    }
}

impl FromIterator<Key> for KeySet {
    fn from_iter<I: IntoIterator<Item = Key>>(iter: I) -> Self {
        let mut set = KeySet::empty();
        for key in iter {
            set.insert(key);
        }
        set
    }
}

impl From<Vec<Key>> for KeySet {
    fn from(keys: Vec<Key>) -> Self {
        keys.into_iter().collect()
    }
}

impl From<KeySet> for Vec<Key> {
    fn from(set: KeySet) -> Self {
        set.iter().collect()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Switches
// ────────────────────────────────────────────────────────────────────────────

/// Position of a three-way remote-control switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwitchPosition {
    Up,
    Mid,
    #[default]
    Down,
}

impl FromStr for SwitchPosition {
    type Err = ManualError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "up" => Ok(SwitchPosition::Up),
            "mid" => Ok(SwitchPosition::Mid),
            "down" => Ok(SwitchPosition::Down),
            other => Err(ManualError::InvalidBinding(format!(
                "unknown switch position '{other}'"
            ))),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Frame
// ────────────────────────────────────────────────────────────────────────────

/// One remote-control packet plus the referee chassis-output flag.
///
/// Stick and mouse axes are normalised to `[-1.0, 1.0]`.  `stamp` is the
/// receipt time; it is not serialised and defaults to "now" when a frame is
/// parsed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputFrame {
    #[serde(skip, default = "Instant::now")]
    pub stamp: Instant,
    #[serde(default)]
    pub ch_r_x: f32,
    #[serde(default)]
    pub ch_r_y: f32,
    #[serde(default)]
    pub ch_l_x: f32,
    #[serde(default)]
    pub ch_l_y: f32,
    #[serde(default)]
    pub wheel: f32,
    /// Left switch.
    #[serde(default)]
    pub s_l: SwitchPosition,
    /// Right switch.
    #[serde(default)]
    pub s_r: SwitchPosition,
    #[serde(default)]
    pub m_x: f32,
    #[serde(default)]
    pub m_y: f32,
    #[serde(default)]
    pub m_z: f32,
    #[serde(default)]
    pub p_l: bool,
    #[serde(default)]
    pub p_r: bool,
    #[serde(default)]
    pub keys: KeySet,
    /// Referee power-management flag: chassis output rail energised.
    #[serde(default)]
    pub chassis_output_on: bool,
}

impl Default for InputFrame {
    fn default() -> Self {
        Self {
            stamp: Instant::now(),
            ch_r_x: 0.0,
            ch_r_y: 0.0,
            ch_l_x: 0.0,
            ch_l_y: 0.0,
            wheel: 0.0,
            s_l: SwitchPosition::default(),
            s_r: SwitchPosition::default(),
            m_x: 0.0,
            m_y: 0.0,
            m_z: 0.0,
            p_l: false,
            p_r: false,
            keys: KeySet::empty(),
            chassis_output_on: false,
        }
    }
}

impl InputFrame {
    /// A neutral frame stamped at `stamp`.
    pub fn at(stamp: Instant) -> Self {
        Self {
            stamp,
            ..Self::default()
        }
    }

    #[inline]
    pub fn key(&self, key: Key) -> bool {
        self.keys.contains(key)
    }

    #[inline]
    pub fn ctrl(&self) -> bool {
        self.keys.contains(Key::Ctrl)
    }

    #[inline]
    pub fn shift(&self) -> bool {
        self.keys.contains(Key::Shift)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_set_insert_remove() {
        let mut keys = KeySet::empty();
        keys.insert(Key::C);
        keys.insert(Key::Ctrl);
        assert!(keys.contains(Key::C));
        assert!(keys.contains(Key::Ctrl));
        assert!(!keys.contains(Key::Shift));

        keys.remove(Key::C);
        assert!(!keys.contains(Key::C));
        assert!(!keys.is_empty());
    }

    #[test]
    fn key_parses_case_insensitively() {
        assert_eq!("Ctrl".parse::<Key>().unwrap(), Key::Ctrl);
        assert_eq!(" r ".parse::<Key>().unwrap(), Key::R);
        assert!("f13".parse::<Key>().is_err());
    }

    #[test]
    fn frame_parses_from_sparse_json() {
        let json = r#"{ "s_r": "mid", "ch_r_y": 0.5, "keys": ["ctrl", "r"] }"#;
        let frame: InputFrame = serde_json::from_str(json).unwrap();
        assert_eq!(frame.s_r, SwitchPosition::Mid);
        assert_eq!(frame.s_l, SwitchPosition::Down);
        assert!(frame.ctrl());
        assert!(frame.key(Key::R));
        assert!(!frame.shift());
        assert!(!frame.chassis_output_on);
    }

    #[test]
    fn key_set_serialises_as_names() {
        let keys: KeySet = [Key::Shift, Key::C].into_iter().collect();
        let json = serde_json::to_string(&keys).unwrap();
        assert_eq!(json, r#"["c","shift"]"#);
    }
}
