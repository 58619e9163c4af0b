//! Camelot wheel notation for harmonic mixing
//!
//! Maps musical keys to Camelot notation (1A-12B) and answers the
//! compatibility questions downstream matching asks about two wheel codes.
//! Minor keys take the A column, major keys the B column, and relative
//! major/minor pairs share a number.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Key mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyMode {
    Major,
    Minor,
}

impl KeyMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyMode::Major => "major",
            KeyMode::Minor => "minor",
        }
    }
}

impl fmt::Display for KeyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a mode string is neither "major" nor "minor"
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown key mode {0:?}")]
pub struct ParseKeyModeError(String);

impl FromStr for KeyMode {
    type Err = ParseKeyModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "major" | "maj" => Ok(KeyMode::Major),
            "minor" | "min" => Ok(KeyMode::Minor),
            _ => Err(ParseKeyModeError(s.to_string())),
        }
    }
}

/// Flat spellings by pitch class, used for canonical names
const ROOT_NAMES: [&str; 12] = ["C", "Db", "D", "Eb", "E", "F", "Gb", "G", "Ab", "A", "Bb", "B"];

/// Musical key (24 possible: 12 major + 12 minor)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MusicalKey {
    CMajor,
    DbMajor,
    DMajor,
    EbMajor,
    EMajor,
    FMajor,
    GbMajor,
    GMajor,
    AbMajor,
    AMajor,
    BbMajor,
    BMajor,
    CMinor,
    DbMinor,
    DMinor,
    EbMinor,
    EMinor,
    FMinor,
    GbMinor,
    GMinor,
    AbMinor,
    AMinor,
    BbMinor,
    BMinor,
}

impl MusicalKey {
    const MAJOR: [MusicalKey; 12] = [
        MusicalKey::CMajor,
        MusicalKey::DbMajor,
        MusicalKey::DMajor,
        MusicalKey::EbMajor,
        MusicalKey::EMajor,
        MusicalKey::FMajor,
        MusicalKey::GbMajor,
        MusicalKey::GMajor,
        MusicalKey::AbMajor,
        MusicalKey::AMajor,
        MusicalKey::BbMajor,
        MusicalKey::BMajor,
    ];

    const MINOR: [MusicalKey; 12] = [
        MusicalKey::CMinor,
        MusicalKey::DbMinor,
        MusicalKey::DMinor,
        MusicalKey::EbMinor,
        MusicalKey::EMinor,
        MusicalKey::FMinor,
        MusicalKey::GbMinor,
        MusicalKey::GMinor,
        MusicalKey::AbMinor,
        MusicalKey::AMinor,
        MusicalKey::BbMinor,
        MusicalKey::BMinor,
    ];

    /// Key with root `pitch_class` (0-11, 0=C, wraps) in `mode`
    pub fn new(pitch_class: u8, mode: KeyMode) -> Self {
        let pc = (pitch_class % 12) as usize;
        match mode {
            KeyMode::Major => Self::MAJOR[pc],
            KeyMode::Minor => Self::MINOR[pc],
        }
    }

    /// Pitch class (0-11, where 0=C) of this key's root
    pub fn root_pitch_class(&self) -> u8 {
        let index = *self as u8;
        index % 12
    }

    pub fn mode(&self) -> KeyMode {
        if (*self as u8) < 12 {
            KeyMode::Major
        } else {
            KeyMode::Minor
        }
    }

    /// Check if this key is major
    pub fn is_major(&self) -> bool {
        self.mode() == KeyMode::Major
    }

    /// Relative major of a minor key, relative minor of a major key
    pub fn relative(&self) -> Self {
        match self.mode() {
            KeyMode::Major => Self::new(self.root_pitch_class() + 9, KeyMode::Minor),
            KeyMode::Minor => Self::new(self.root_pitch_class() + 3, KeyMode::Major),
        }
    }

    /// Parse a key name such as `"C"`, `"Bb"`, `"F#"`, `"Am"` or `"G#m"`
    ///
    /// A trailing `m` marks minor. Sharps are accepted for the black keys
    /// only, so `"E#"` and `"Cb"` are rejected. Matching is case-sensitive.
    pub fn from_name(name: &str) -> Option<Self> {
        let (root, mode) = match name.strip_suffix('m') {
            Some(root) => (root, KeyMode::Minor),
            None => (name, KeyMode::Major),
        };

        let mut chars = root.chars();
        let natural: u8 = match chars.next()? {
            'C' => 0,
            'D' => 2,
            'E' => 4,
            'F' => 5,
            'G' => 7,
            'A' => 9,
            'B' => 11,
            _ => return None,
        };

        let pitch_class = match (chars.next(), chars.next()) {
            (None, _) => natural,
            (Some('#'), None) if !matches!(natural, 4 | 11) => natural + 1,
            (Some('b'), None) if !matches!(natural, 0 | 5) => natural - 1,
            _ => return None,
        };

        Some(Self::new(pitch_class, mode))
    }

    /// Canonical name using flat spellings, e.g. `"Bb"`, `"F#m"` is `"Gbm"`
    pub fn name(&self) -> String {
        let root = ROOT_NAMES[self.root_pitch_class() as usize];
        match self.mode() {
            KeyMode::Major => root.to_string(),
            KeyMode::Minor => format!("{}m", root),
        }
    }
}

impl fmt::Display for MusicalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// Relationship between two compatible wheel positions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTransition {
    /// Identical codes
    Same,
    /// One step around the wheel, same letter
    Adjacent,
    /// Same number, other letter
    Relative,
}

impl KeyTransition {
    /// Human-readable label for mix suggestions
    pub fn label(&self) -> &'static str {
        match self {
            KeyTransition::Same => "Perfect Match",
            KeyTransition::Adjacent => "Smooth Transition",
            KeyTransition::Relative => "Major/Minor Switch",
        }
    }
}

/// Camelot wheel notation (1A-12B)
///
/// - Numbers 1-12 walk the circle of fifths
/// - 'A' suffix = minor keys
/// - 'B' suffix = major keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CamelotKey {
    /// Position on the wheel (1-12)
    pub number: u8,
    /// true = B (major), false = A (minor)
    pub is_major: bool,
}

impl CamelotKey {
    /// Create a new Camelot key
    pub fn new(number: u8, is_major: bool) -> Option<Self> {
        if (1..=12).contains(&number) {
            Some(Self { number, is_major })
        } else {
            None
        }
    }

    /// Convert from musical key to Camelot notation
    ///
    /// C major sits at 8B and each fifth up adds one position.
    pub fn from_musical_key(key: MusicalKey) -> Self {
        let major_root = match key.mode() {
            KeyMode::Major => key.root_pitch_class(),
            KeyMode::Minor => key.relative().root_pitch_class(),
        };
        // Replaces the 24-entry wheel table; test_full_name_table pins every entry
        let fifths = (major_root as u32 * 7) % 12;
        CamelotKey {
            number: ((fifths + 7) % 12 + 1) as u8,
            is_major: key.is_major(),
        }
    }

    /// Convert to musical key
    pub fn to_musical_key(&self) -> MusicalKey {
        // 7 is its own inverse mod 12
        let fifths = (self.number as u32 + 12 - 8) % 12;
        let major = MusicalKey::new(((fifths * 7) % 12) as u8, KeyMode::Major);
        if self.is_major {
            major
        } else {
            major.relative()
        }
    }

    /// Get display string (e.g., "8A", "12B")
    pub fn display(&self) -> String {
        format!("{}{}", self.number, if self.is_major { 'B' } else { 'A' })
    }

    /// Parse from string (e.g., "8A", "12B"); the letter is case-insensitive
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        let last = s.chars().last()?;
        let is_major = match last.to_ascii_uppercase() {
            'B' => true,
            'A' => false,
            _ => return None,
        };

        let number: u8 = s[..s.len() - 1].parse().ok()?;
        Self::new(number, is_major)
    }

    fn step(&self, delta: i8) -> Self {
        let number = (self.number as i8 - 1 + delta).rem_euclid(12) as u8 + 1;
        Self {
            number,
            is_major: self.is_major,
        }
    }

    fn relative(&self) -> Self {
        Self {
            number: self.number,
            is_major: !self.is_major,
        }
    }

    /// How two keys relate on the wheel, `None` if they do not mix harmonically
    pub fn transition_to(&self, other: &CamelotKey) -> Option<KeyTransition> {
        if self == other {
            Some(KeyTransition::Same)
        } else if self.number == other.number {
            Some(KeyTransition::Relative)
        } else if *other == self.step(1) || *other == self.step(-1) {
            Some(KeyTransition::Adjacent)
        } else {
            None
        }
    }

    /// Check if two keys are harmonically compatible for mixing
    ///
    /// Same key, ±1 on the wheel with the same letter, or the relative key.
    pub fn is_compatible(&self, other: &CamelotKey) -> bool {
        self.transition_to(other).is_some()
    }

    /// Shortest number of wheel steps plus one for a mode change
    ///
    /// 0 is the same key, 1 is adjacent or relative.
    pub fn wheel_distance(&self, other: &CamelotKey) -> u8 {
        let d = self.number.abs_diff(other.number);
        let num_diff = d.min(12 - d);
        num_diff + u8::from(self.is_major != other.is_major)
    }

    /// All compatible keys: self, previous, next, relative
    pub fn compatible_keys(&self) -> Vec<CamelotKey> {
        vec![*self, self.step(-1), self.step(1), self.relative()]
    }
}

impl fmt::Display for CamelotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display())
    }
}

impl FromStr for CamelotKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("invalid Camelot key {:?}", s))
    }
}

/// Camelot code for a key name already carrying its minor marker ("Am" is 8A)
///
/// Returns an empty string for unknown names.
pub fn camelot_for_name(name: &str) -> String {
    MusicalKey::from_name(name)
        .map(|key| CamelotKey::from_musical_key(key).display())
        .unwrap_or_default()
}

/// Camelot code for `key` in `mode` ("major" or "minor")
///
/// A minor mode appends the `m` marker when the key lacks it. Unknown keys
/// give an empty string rather than an error.
pub fn map_to_camelot(key: &str, mode: &str) -> String {
    let minor = matches!(mode.parse::<KeyMode>(), Ok(KeyMode::Minor));
    if minor && !key.ends_with('m') {
        camelot_for_name(&format!("{}m", key))
    } else {
        camelot_for_name(key)
    }
}

/// Compatibility of two wheel codes given as strings; invalid codes never match
pub fn is_key_compatible(from: &str, to: &str) -> bool {
    match (CamelotKey::parse(from), CamelotKey::parse(to)) {
        (Some(a), Some(b)) => a.is_compatible(&b),
        _ => false,
    }
}
