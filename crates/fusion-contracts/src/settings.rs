use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Mode {
    #[default]
    Merge,
    Edit,
}

impl Mode {
    /// Number of source images a submission in this mode requires.
    pub fn required_sources(self) -> usize {
        match self {
            Self::Merge => 2,
            Self::Edit => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Merge => "merge",
            Self::Edit => "edit",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "merge" => Ok(Self::Merge),
            "edit" => Ok(Self::Edit),
            other => Err(format!("Unknown mode '{other}' (expected merge or edit).")),
        }
    }
}

/// Artistic rendering target. The descriptor text only ever reaches the
/// backend through the composed prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Style {
    #[default]
    Photorealistic,
    Anime,
    Watercolor,
    Cyberpunk,
    Fantasy,
    #[serde(rename = "3d_model")]
    ThreeD,
    PixelArt,
    SupermanComic,
    Spongebob,
    Ghibli,
    OnePiece,
}

impl Style {
    pub const ALL: [Style; 11] = [
        Style::Photorealistic,
        Style::Anime,
        Style::Watercolor,
        Style::Cyberpunk,
        Style::Fantasy,
        Style::ThreeD,
        Style::PixelArt,
        Style::SupermanComic,
        Style::Spongebob,
        Style::Ghibli,
        Style::OnePiece,
    ];

    pub fn id(self) -> &'static str {
        match self {
            Self::Photorealistic => "photorealistic",
            Self::Anime => "anime",
            Self::Watercolor => "watercolor",
            Self::Cyberpunk => "cyberpunk",
            Self::Fantasy => "fantasy",
            Self::ThreeD => "3d_model",
            Self::PixelArt => "pixel_art",
            Self::SupermanComic => "superman_comic",
            Self::Spongebob => "spongebob",
            Self::Ghibli => "ghibli",
            Self::OnePiece => "one_piece",
        }
    }

    pub fn descriptor(self) -> &'static str {
        match self {
            Self::Photorealistic => "photorealistic",
            Self::Anime => "anime",
            Self::Watercolor => "watercolor",
            Self::Cyberpunk => "cyberpunk",
            Self::Fantasy => "fantasy art",
            Self::ThreeD => "3d model",
            Self::PixelArt => "pixel art",
            Self::SupermanComic => "American Superman comic book art",
            Self::Spongebob => "SpongeBob SquarePants cartoon style",
            Self::Ghibli => "Ghibli anime film style",
            Self::OnePiece => "One Piece anime style",
        }
    }
}

impl fmt::Display for Style {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Style {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        let alias = match normalized.as_str() {
            "3d" | "threed" => "3d_model",
            "pixel" => "pixel_art",
            "superman" => "superman_comic",
            other => other,
        };
        Self::ALL
            .into_iter()
            .find(|style| style.id() == alias)
            .ok_or_else(|| format!("Unknown style '{}'.", raw.trim()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrengthTier {
    Subtle,
    ClearInfluence,
    CompleteRedraw,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("style strength {0} is outside 1..=100")]
pub struct StrengthError(pub i64);

/// Style strength, always within `1..=100`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u8")]
pub struct StyleStrength(u8);

impl StyleStrength {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 100;

    pub fn new(value: i64) -> Result<Self, StrengthError> {
        if (i64::from(Self::MIN)..=i64::from(Self::MAX)).contains(&value) {
            Ok(Self(value as u8))
        } else {
            Err(StrengthError(value))
        }
    }

    pub fn value(self) -> u8 {
        self.0
    }

    pub fn tier(self) -> StrengthTier {
        match self.0 {
            0..=33 => StrengthTier::Subtle,
            34..=66 => StrengthTier::ClearInfluence,
            _ => StrengthTier::CompleteRedraw,
        }
    }
}

impl Default for StyleStrength {
    fn default() -> Self {
        Self(80)
    }
}

impl TryFrom<i64> for StyleStrength {
    type Error = StrengthError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<StyleStrength> for u8 {
    fn from(value: StyleStrength) -> Self {
        value.0
    }
}

impl fmt::Display for StyleStrength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
