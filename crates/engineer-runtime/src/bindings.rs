//! Operator bindings: which input edge triggers which engineer reaction.
//!
//! Bindings are plain data so they can be loaded from the config file:
//!
//! ```toml
//! [[bindings]]
//! trigger = { chord = "ctrl+z" }
//! edge = "rising"
//! reaction = { run_step_queue = { name = "install_module" } }
//!
//! [[bindings]]
//! trigger = { left_switch = "down" }
//! edge = "falling"
//! reaction = { reset_calibration = { groups = ["mast", "arm"] } }
//! ```
//!
//! Chord bindings are evaluated while the keyboard drives the robot (PC
//! state); left-switch bindings while the radio does (RC state).

use std::fmt;
use std::str::FromStr;

use engineer_types::{CalibrationGroup, InputFrame, Key, ManualError, SwitchPosition};
use serde::{Deserialize, Serialize};

// ────────────────────────────────────────────────────────────────────────────
// Chords
// ────────────────────────────────────────────────────────────────────────────

/// Modifier key of a chord.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Modifier {
    Ctrl,
    Shift,
}

/// A key with an optional modifier, written `"c"`, `"ctrl+r"` or
/// `"shift+x"`.
///
/// A bare key is held only while neither modifier is, so `c` and `ctrl+c`
/// never fire together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct KeyChord {
    pub modifier: Option<Modifier>,
    pub key: Key,
}

impl KeyChord {
    pub const fn bare(key: Key) -> Self {
        Self {
            modifier: None,
            key,
        }
    }

    pub const fn ctrl(key: Key) -> Self {
        Self {
            modifier: Some(Modifier::Ctrl),
            key,
        }
    }

    pub const fn shift(key: Key) -> Self {
        Self {
            modifier: Some(Modifier::Shift),
            key,
        }
    }

    /// Level of the chord in `frame`.
    pub fn is_held(&self, frame: &InputFrame) -> bool {
        if !frame.key(self.key) {
            return false;
        }
        match self.modifier {
            None => !frame.ctrl() && !frame.shift(),
            Some(Modifier::Ctrl) => frame.ctrl(),
            Some(Modifier::Shift) => frame.shift(),
        }
    }
}

impl fmt::Display for KeyChord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.modifier {
            None => write!(f, "{}", self.key),
            Some(Modifier::Ctrl) => write!(f, "ctrl+{}", self.key),
            Some(Modifier::Shift) => write!(f, "shift+{}", self.key),
        }
    }
}

impl FromStr for KeyChord {
    type Err = ManualError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        let (modifier, key) = match s.split_once('+') {
            Some(("ctrl", key)) => (Some(Modifier::Ctrl), key),
            Some(("shift", key)) => (Some(Modifier::Shift), key),
            Some((other, _)) => {
                return Err(ManualError::InvalidBinding(format!(
                    "unknown modifier '{other}' in chord '{s}'"
                )));
            }
            None => (None, s.as_str()),
        };
        let key: Key = key.parse()?;
        if matches!(key, Key::Ctrl | Key::Shift) {
            return Err(ManualError::InvalidBinding(format!(
                "chord '{s}' must end with a non-modifier key"
            )));
        }
        Ok(Self { modifier, key })
    }
}

impl TryFrom<String> for KeyChord {
    type Error = ManualError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<KeyChord> for String {
    fn from(chord: KeyChord) -> Self {
        chord.to_string()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Bindings
// ────────────────────────────────────────────────────────────────────────────

/// Input whose level is edge-detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    /// Keyboard chord, sampled in PC state.
    Chord(KeyChord),
    /// "Left switch is at this position", sampled in RC state.
    LeftSwitch(SwitchPosition),
}

impl Trigger {
    pub fn level(&self, frame: &InputFrame) -> bool {
        match self {
            Trigger::Chord(chord) => chord.is_held(frame),
            Trigger::LeftSwitch(position) => frame.s_l == *position,
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::Chord(chord) => write!(f, "{chord}"),
            Trigger::LeftSwitch(position) => write!(f, "left switch {position:?}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BindingEdge {
    Rising,
    Falling,
}

/// What the engineer does when a binding fires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reaction {
    /// Flip the card gripper between its two positions.
    ToggleCard,
    /// Submit the named step queue to the executor.
    RunStepQueue { name: String },
    /// Cancel the running step queue.
    CancelStepQueue,
    /// Restart the given calibration queues from their first step.
    ResetCalibration { groups: Vec<CalibrationGroup> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Binding {
    pub trigger: Trigger,
    pub edge: BindingEdge,
    pub reaction: Reaction,
}

impl Binding {
    pub fn new(trigger: Trigger, edge: BindingEdge, reaction: Reaction) -> Self {
        Self {
            trigger,
            edge,
            reaction,
        }
    }
}

fn run(name: &str) -> Reaction {
    Reaction::RunStepQueue {
        name: name.to_string(),
    }
}

/// Bindings used when the config file does not list any.
pub fn default_bindings() -> Vec<Binding> {
    use BindingEdge::{Falling, Rising};

    vec![
        Binding::new(Trigger::Chord(KeyChord::bare(Key::C)), Rising, Reaction::ToggleCard),
        Binding::new(
            Trigger::Chord(KeyChord::ctrl(Key::C)),
            Rising,
            Reaction::CancelStepQueue,
        ),
        Binding::new(
            Trigger::Chord(KeyChord::ctrl(Key::R)),
            Rising,
            Reaction::ResetCalibration {
                groups: vec![
                    CalibrationGroup::PowerOn,
                    CalibrationGroup::Mast,
                    CalibrationGroup::Arm,
                ],
            },
        ),
        Binding::new(Trigger::Chord(KeyChord::ctrl(Key::Z)), Rising, run("install_module")),
        Binding::new(Trigger::Chord(KeyChord::ctrl(Key::X)), Rising, run("pick_ore")),
        Binding::new(Trigger::Chord(KeyChord::ctrl(Key::B)), Rising, run("store_ore")),
        Binding::new(Trigger::Chord(KeyChord::shift(Key::C)), Rising, run("card_grab")),
        Binding::new(
            Trigger::LeftSwitch(SwitchPosition::Up),
            Falling,
            Reaction::CancelStepQueue,
        ),
        Binding::new(
            Trigger::LeftSwitch(SwitchPosition::Down),
            Falling,
            Reaction::ResetCalibration {
                groups: vec![CalibrationGroup::Mast, CalibrationGroup::Arm],
            },
        ),
    ]
}
