//! Validated per-session settings.
//!
//! [`RagSettings`] holds everything a user may adjust at runtime: the
//! access token, the generation model, chunking and retrieval parameters,
//! and sampling parameters. Values are checked against their legal ranges
//! when the settings are built, so a `RagSettings` value is always valid.

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

/// Generation models offered by the configuration surface.
///
/// The first entry is the default.
pub const SUPPORTED_MODELS: [&str; 4] = [
    "google/flan-t5-large",
    "google/flan-t5-xl",
    "meta-llama/Llama-2-7b-chat-hf",
    "mistralai/Mistral-7B-Instruct-v0.1",
];

pub const CHUNK_SIZE_RANGE: (usize, usize) = (200, 2000);
pub const CHUNK_OVERLAP_RANGE: (usize, usize) = (0, 200);
pub const K_RANGE: (usize, usize) = (1, 5);
pub const TEMPERATURE_RANGE: (f32, f32) = (0.0, 1.0);
pub const MAX_TOKENS_RANGE: (u32, u32) = (128, 1024);

/// Whether a model should be decoded greedily (`do_sample = false`).
///
/// Seq2seq flan-t5 checkpoints produce degenerate output when sampled
/// through the hosted endpoint.
pub fn is_deterministic_model(model: &str) -> bool {
    model.to_lowercase().contains("flan-t5")
}

/// Unvalidated settings as they arrive from a config file, CLI flags or
/// an HTTP body. Every field is optional; missing fields take defaults.
#[derive(Clone, Default, Deserialize)]
pub struct SettingsInput {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub chunk_size: Option<usize>,
    #[serde(default)]
    pub chunk_overlap: Option<usize>,
    #[serde(default)]
    pub k: Option<usize>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

impl std::fmt::Debug for SettingsInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettingsInput")
            .field("token", &redacted(self.token.as_deref()))
            .field("model", &self.model)
            .field("chunk_size", &self.chunk_size)
            .field("chunk_overlap", &self.chunk_overlap)
            .field("k", &self.k)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

/// Debug stand-in for a secret: shows whether it is set, never its value.
fn redacted(token: Option<&str>) -> Option<&'static str> {
    token.map(|_| "<redacted>")
}

impl SettingsInput {
    /// Overlay `other` on top of `self`; fields set in `other` win.
    pub fn merge(self, other: SettingsInput) -> SettingsInput {
        SettingsInput {
            token: other.token.or(self.token),
            model: other.model.or(self.model),
            chunk_size: other.chunk_size.or(self.chunk_size),
            chunk_overlap: other.chunk_overlap.or(self.chunk_overlap),
            k: other.k.or(self.k),
            temperature: other.temperature.or(self.temperature),
            max_tokens: other.max_tokens.or(self.max_tokens),
        }
    }
}

/// Validated session settings.
#[derive(Clone, PartialEq, Serialize)]
pub struct RagSettings {
    #[serde(skip_serializing)]
    token: Option<String>,
    model: String,
    chunk_size: usize,
    chunk_overlap: usize,
    k: usize,
    temperature: f32,
    max_tokens: u32,
}

impl std::fmt::Debug for RagSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RagSettings")
            .field("token", &redacted(self.token.as_deref()))
            .field("model", &self.model)
            .field("chunk_size", &self.chunk_size)
            .field("chunk_overlap", &self.chunk_overlap)
            .field("k", &self.k)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

impl Default for RagSettings {
    fn default() -> Self {
        Self {
            token: None,
            model: SUPPORTED_MODELS[0].to_string(),
            chunk_size: 500,
            chunk_overlap: 50,
            k: 3,
            temperature: 0.3,
            max_tokens: 512,
        }
    }
}

impl RagSettings {
    /// Build settings from partial input, filling gaps with defaults and
    /// rejecting out-of-range values.
    pub fn from_input(input: SettingsInput) -> Result<Self> {
        let defaults = RagSettings::default();

        let token = input
            .token
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());

        let model = input.model.unwrap_or(defaults.model);
        if !SUPPORTED_MODELS.contains(&model.as_str()) {
            return Err(RagError::InvalidSetting(format!(
                "model '{}' is not supported; choose one of: {}",
                model,
                SUPPORTED_MODELS.join(", ")
            )));
        }

        let chunk_size = input.chunk_size.unwrap_or(defaults.chunk_size);
        check_range("chunk_size", chunk_size, CHUNK_SIZE_RANGE)?;

        let chunk_overlap = input.chunk_overlap.unwrap_or(defaults.chunk_overlap);
        check_range("chunk_overlap", chunk_overlap, CHUNK_OVERLAP_RANGE)?;
        if chunk_overlap >= chunk_size {
            return Err(RagError::InvalidSetting(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                chunk_overlap, chunk_size
            )));
        }

        let k = input.k.unwrap_or(defaults.k);
        check_range("k", k, K_RANGE)?;

        let temperature = input.temperature.unwrap_or(defaults.temperature);
        if !temperature.is_finite() {
            return Err(RagError::InvalidSetting(
                "temperature must be a finite number".to_string(),
            ));
        }
        check_range("temperature", temperature, TEMPERATURE_RANGE)?;

        let max_tokens = input.max_tokens.unwrap_or(defaults.max_tokens);
        check_range("max_tokens", max_tokens, MAX_TOKENS_RANGE)?;

        Ok(Self {
            token,
            model,
            chunk_size,
            chunk_overlap,
            k,
            temperature,
            max_tokens,
        })
    }

    /// Apply `overrides` on top of the current values and re-validate.
    pub fn with_overrides(&self, overrides: SettingsInput) -> Result<Self> {
        RagSettings::from_input(self.to_input().merge(overrides))
    }

    fn to_input(&self) -> SettingsInput {
        SettingsInput {
            token: self.token.clone(),
            model: Some(self.model.clone()),
            chunk_size: Some(self.chunk_size),
            chunk_overlap: Some(self.chunk_overlap),
            k: Some(self.k),
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
        }
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }
    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }
    pub fn model(&self) -> &str {
        &self.model
    }
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }
    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }
    pub fn k(&self) -> usize {
        self.k
    }
    pub fn temperature(&self) -> f32 {
        self.temperature
    }
    pub fn max_tokens(&self) -> u32 {
        self.max_tokens
    }
    pub fn deterministic(&self) -> bool {
        is_deterministic_model(&self.model)
    }
}

fn check_range<T: PartialOrd + std::fmt::Display>(name: &str, value: T, range: (T, T)) -> Result<()> {
    if value < range.0 || value > range.1 {
        return Err(RagError::InvalidSetting(format!(
            "{} must be in [{}, {}], got {}",
            name, range.0, range.1, value
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let s = RagSettings::from_input(SettingsInput::default()).unwrap();
        assert_eq!(s, RagSettings::default());
        assert_eq!(s.model(), "google/flan-t5-large");
        assert!(s.deterministic());
        assert!(!s.has_token());
    }

    #[test]
    fn rejects_out_of_range_values() {
        let cases = [
            SettingsInput {
                chunk_size: Some(199),
                ..Default::default()
            },
            SettingsInput {
                chunk_size: Some(2001),
                ..Default::default()
            },
            SettingsInput {
                chunk_overlap: Some(201),
                ..Default::default()
            },
            SettingsInput {
                k: Some(0),
                ..Default::default()
            },
            SettingsInput {
                k: Some(6),
                ..Default::default()
            },
            SettingsInput {
                temperature: Some(1.5),
                ..Default::default()
            },
            SettingsInput {
                temperature: Some(f32::NAN),
                ..Default::default()
            },
            SettingsInput {
                max_tokens: Some(64),
                ..Default::default()
            },
            SettingsInput {
                model: Some("gpt2".into()),
                ..Default::default()
            },
        ];
        for input in cases {
            let err = RagSettings::from_input(input.clone()).unwrap_err();
            assert!(
                matches!(err, RagError::InvalidSetting(_)),
                "expected InvalidSetting for {:?}",
                input
            );
        }
    }

    #[test]
    fn boundary_values_accepted() {
        let s = RagSettings::from_input(SettingsInput {
            chunk_size: Some(2000),
            chunk_overlap: Some(200),
            k: Some(5),
            temperature: Some(0.0),
            max_tokens: Some(1024),
            model: Some("mistralai/Mistral-7B-Instruct-v0.1".into()),
            token: None,
        })
        .unwrap();
        assert_eq!(s.k(), 5);
        assert!(!s.deterministic());
    }

    #[test]
    fn overlap_must_be_below_chunk_size() {
        let err = RagSettings::from_input(SettingsInput {
            chunk_size: Some(200),
            chunk_overlap: Some(200),
            ..Default::default()
        })
        .unwrap_err();
        assert!(err.to_string().contains("smaller than chunk_size"));
    }

    #[test]
    fn blank_token_is_treated_as_missing() {
        let s = RagSettings::from_input(SettingsInput {
            token: Some("   ".into()),
            ..Default::default()
        })
        .unwrap();
        assert!(!s.has_token());
    }

    #[test]
    fn overrides_keep_unset_fields() {
        let base = RagSettings::from_input(SettingsInput {
            token: Some("hf_abc".into()),
            k: Some(2),
            ..Default::default()
        })
        .unwrap();
        let next = base
            .with_overrides(SettingsInput {
                temperature: Some(0.9),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(next.token(), Some("hf_abc"));
        assert_eq!(next.k(), 2);
        assert!((next.temperature() - 0.9).abs() < f32::EPSILON);
    }

    #[test]
    fn token_is_not_serialized() {
        let s = RagSettings::from_input(SettingsInput {
            token: Some("hf_secret".into()),
            ..Default::default()
        })
        .unwrap();
        let json = serde_json::to_string(&s).unwrap();
        assert!(!json.contains("hf_secret"));
        assert!(json.contains("chunk_size"));
    }

    #[test]
    fn debug_output_hides_the_token() {
        let input = SettingsInput {
            token: Some("hf_secret".into()),
            k: Some(2),
            ..Default::default()
        };
        let shown = format!("{:?}", input);
        assert!(!shown.contains("hf_secret"));
        assert!(shown.contains("<redacted>"));

        let s = RagSettings::from_input(input).unwrap();
        let shown = format!("{:?}", s);
        assert!(!shown.contains("hf_secret"));
        assert!(shown.contains("<redacted>"));
        assert!(shown.contains("k: 2"));

        let session = crate::session::Session::new(s);
        assert!(!format!("{:?}", session).contains("hf_secret"));
        assert!(format!("{:?}", RagSettings::default()).contains("token: None"));
    }
}
