//! The backend runtime family tag.
//!
//! Every model in the catalog belongs to exactly one family. A family
//! shares launch flags and wire protocol across all its models; this is
//! the tagged enum the router switches on instead of dispatching through a
//! trait object per model.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Family {
    #[serde(rename = "llamacpp")]
    LlamaCpp,
    #[serde(rename = "flm")]
    Flm,
    #[serde(rename = "sd")]
    StableDiffusion,
    #[serde(rename = "whisper")]
    Whisper,
    #[serde(rename = "tts")]
    Tts,
}

impl Family {
    pub const ALL: [Family; 5] = [
        Family::LlamaCpp,
        Family::Flm,
        Family::StableDiffusion,
        Family::Whisper,
        Family::Tts,
    ];

    /// Default per-family co-residency cap, used when no override is configured.
    pub fn default_capacity(&self) -> usize {
        match self {
            Family::LlamaCpp => 2,
            Family::Flm => 1,
            Family::StableDiffusion => 1,
            Family::Whisper => 1,
            Family::Tts => 1,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Family::LlamaCpp => "llamacpp",
            Family::Flm => "flm",
            Family::StableDiffusion => "sd",
            Family::Whisper => "whisper",
            Family::Tts => "tts",
        }
    }
}

impl std::fmt::Display for Family {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Family {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "llamacpp" => Ok(Family::LlamaCpp),
            "flm" => Ok(Family::Flm),
            "sd" | "stable_diffusion" => Ok(Family::StableDiffusion),
            "whisper" => Ok(Family::Whisper),
            "tts" => Ok(Family::Tts),
            other => Err(format!("unknown family: {other}")),
        }
    }
}

/// Labels a ModelEntry may declare; drives validation (e.g. embeddings
/// requests against a model lacking the label are BadRequest).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Label {
    Vision,
    Embeddings,
    Reranking,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn family_roundtrips_through_str() {
        for family in Family::ALL {
            let parsed = Family::from_str(family.as_str()).unwrap();
            assert_eq!(parsed, family);
        }
    }

    #[test]
    fn family_serializes_lowercase() {
        let json = serde_json::to_string(&Family::LlamaCpp).unwrap();
        assert_eq!(json, r#""llamacpp""#);
    }

    #[test]
    fn unknown_family_is_an_error() {
        assert!(Family::from_str("not-a-family").is_err());
    }

    #[test]
    fn default_capacity_matches_llamacpp_spec() {
        assert_eq!(Family::LlamaCpp.default_capacity(), 2);
    }
}
