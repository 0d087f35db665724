//! Consensus: parsing advocate/moderator responses and merging them into one
//! decision with a provenance tag.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::roles::{AdvocateSide, DebateRole};
use super::DebateError;
use crate::taxonomy::{ImageSettings, SettingsAxis};

/// Where the adopted settings came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// Every axis from the performance advocate.
    FullMl,
    /// Every axis from the brand advocate.
    FullCreative,
    /// A mix of both.
    Hybrid,
}

impl Provenance {
    /// Tag for a per-axis source map. An empty map counts as `FullMl`.
    pub fn from_sources(sources: &BTreeMap<SettingsAxis, AdvocateSide>) -> Self {
        let brand = sources.values().filter(|s| **s == AdvocateSide::Brand).count();
        match brand {
            0 => Self::FullMl,
            n if n == sources.len() => Self::FullCreative,
            _ => Self::Hybrid,
        }
    }
}

impl std::fmt::Display for Provenance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FullMl => write!(f, "full_ml"),
            Self::FullCreative => write!(f, "full_creative"),
            Self::Hybrid => write!(f, "hybrid"),
        }
    }
}

/// The settings actually used for generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusDecision {
    pub settings: ImageSettings,
    pub provenance: Provenance,
    /// Which advocate each axis was taken from.
    pub sources: BTreeMap<SettingsAxis, AdvocateSide>,
    pub reasoning: String,
}

impl ConsensusDecision {
    /// Merge two positions given a per-axis choice.
    pub fn merge(
        performance: &ImageSettings,
        brand: &ImageSettings,
        sources: BTreeMap<SettingsAxis, AdvocateSide>,
        reasoning: String,
    ) -> Self {
        let mut settings = *performance;
        for (axis, side) in &sources {
            if *side == AdvocateSide::Brand {
                settings.take_axis(*axis, brand);
            }
        }
        Self {
            provenance: Provenance::from_sources(&sources),
            settings,
            sources,
            reasoning,
        }
    }
}

/// Brand advocate's parsed turn.
#[derive(Debug, Clone, PartialEq)]
pub struct BrandProposal {
    pub argument: String,
    pub settings: ImageSettings,
}

/// Strip a surrounding markdown code fence, if any.
pub fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    body.strip_suffix("```").unwrap_or(body).trim()
}

fn parse_object(role: DebateRole, raw: &str) -> Result<serde_json::Map<String, Value>, DebateError> {
    let unparseable = |reason: String| DebateError::Unparseable { role, reason };
    match serde_json::from_str::<Value>(strip_code_fences(raw)) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(unparseable(format!("expected a JSON object, got {other}"))),
        Err(e) => Err(unparseable(format!("invalid JSON: {e}"))),
    }
}

/// String value with surrounding whitespace removed.
fn string_field<'a>(role: DebateRole, axis: &str, value: &'a Value) -> Result<&'a str, DebateError> {
    value.as_str().map(str::trim).ok_or_else(|| DebateError::Unparseable {
        role,
        reason: format!("value for '{axis}' is not a string"),
    })
}

/// Parse the brand advocate's JSON turn. Omitted axes keep `baseline`.
pub fn parse_brand_proposal(raw: &str, baseline: &ImageSettings) -> Result<BrandProposal, DebateError> {
    let role = DebateRole::BRAND;
    let object = parse_object(role, raw)?;

    let argument = object
        .get("argument")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .ok_or_else(|| DebateError::Unparseable {
            role,
            reason: "missing 'argument'".into(),
        })?
        .to_string();

    let mut settings = *baseline;
    if let Some(proposed) = object.get("proposed_settings") {
        let proposed = proposed.as_object().ok_or_else(|| DebateError::Unparseable {
            role,
            reason: "'proposed_settings' is not an object".into(),
        })?;
        for (key, value) in proposed {
            let axis: SettingsAxis = key
                .parse()
                .map_err(|e| DebateError::InvalidSetting { role, source: e })?;
            settings
                .set(axis, string_field(role, key, value)?)
                .map_err(|e| DebateError::InvalidSetting { role, source: e })?;
        }
    }

    Ok(BrandProposal { argument, settings })
}

/// Parse the moderator's JSON turn and merge the two positions.
///
/// Accepts either per-axis labels (`"choices"`) or concrete values
/// (`"final_image_settings"`). Concrete values must match one of the two
/// advocates on that axis; when both advocates agree the axis is attributed
/// to performance.
pub fn parse_moderator_decision(
    raw: &str,
    performance: &ImageSettings,
    brand: &ImageSettings,
) -> Result<ConsensusDecision, DebateError> {
    let role = DebateRole::Moderator;
    let object = parse_object(role, raw)?;
    let reasoning = object
        .get("reasoning")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .trim()
        .to_string();

    let (key, by_label) = if object.contains_key("choices") {
        ("choices", true)
    } else if object.contains_key("final_image_settings") {
        ("final_image_settings", false)
    } else {
        return Err(DebateError::Unparseable {
            role,
            reason: "expected 'choices' or 'final_image_settings'".into(),
        });
    };
    let entries = object
        .get(key)
        .and_then(Value::as_object)
        .ok_or_else(|| DebateError::Unparseable {
            role,
            reason: format!("'{key}' is not an object"),
        })?;

    let mut sources = BTreeMap::new();
    for axis in SettingsAxis::ALL {
        let value = entries.get(axis.as_str()).ok_or_else(|| DebateError::Unparseable {
            role,
            reason: format!("no decision for axis '{axis}'"),
        })?;
        let value = string_field(role, axis.as_str(), value)?;

        let side = if by_label {
            match value.to_lowercase().as_str() {
                "performance" => AdvocateSide::Performance,
                "brand" => AdvocateSide::Brand,
                other => {
                    return Err(DebateError::Unparseable {
                        role,
                        reason: format!("choice for '{axis}' must be performance or brand, got '{other}'"),
                    })
                }
            }
        } else if value == performance.value(axis) {
            AdvocateSide::Performance
        } else if value == brand.value(axis) {
            AdvocateSide::Brand
        } else {
            return Err(DebateError::InventedValue {
                axis,
                value: value.to_string(),
            });
        };
        sources.insert(axis, side);
    }

    Ok(ConsensusDecision::merge(performance, brand, sources, reasoning))
}
