//! Debate roles as data, and the single contract used to invoke them.
//!
//! A role is a tagged value carrying its standing instructions. The
//! orchestrator renders a per-turn prompt and dispatches every role through
//! [`RoleInvoker::invoke`]; nothing else differs between roles.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::predictor::SettingsCandidate;
use crate::taxonomy::{AttributeSet, ImageSettings, SettingsAxis};

/// Which strategy an advocate argues for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdvocateSide {
    /// The model's predicted settings.
    Performance,
    /// Brand-differentiating alternatives.
    Brand,
}

impl std::fmt::Display for AdvocateSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Performance => write!(f, "performance"),
            Self::Brand => write!(f, "brand"),
        }
    }
}

/// A debate participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebateRole {
    Advocate(AdvocateSide),
    Moderator,
}

impl DebateRole {
    pub const PERFORMANCE: DebateRole = DebateRole::Advocate(AdvocateSide::Performance);
    pub const BRAND: DebateRole = DebateRole::Advocate(AdvocateSide::Brand);

    /// Standing instructions (system prompt) for this role.
    pub fn instructions(self) -> &'static str {
        match self {
            Self::Advocate(AdvocateSide::Performance) => PERFORMANCE_INSTRUCTIONS,
            Self::Advocate(AdvocateSide::Brand) => BRAND_INSTRUCTIONS,
            Self::Moderator => MODERATOR_INSTRUCTIONS,
        }
    }
}

impl std::fmt::Display for DebateRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Advocate(side) => write!(f, "{side}_advocate"),
            Self::Moderator => write!(f, "moderator"),
        }
    }
}

const PERFORMANCE_INSTRUCTIONS: &str = "\
You are a data-driven optimizer for e-commerce product photography. \
Advocate for proven, high-performing image settings based on the model's analysis. \
Keep your argument under 100 words, direct and specific.";

const BRAND_INSTRUCTIONS: &str = "\
You are a creative strategist for e-commerce product photography. \
Balance data-driven settings with brand differentiation. \
Respond with JSON only: {\"argument\": string, \"proposed_settings\": {axis: value}}. \
Keep the argument under 100 words.";

const MODERATOR_INSTRUCTIONS: &str = "\
You moderate a debate between a performance advocate and a brand advocate. \
For every settings axis you must adopt one advocate's value; never invent a third value. \
Respond with JSON only.";

/// One rendered turn: standing instructions plus the turn's prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleRequest {
    pub instructions: String,
    pub prompt: String,
}

/// A role call that produced no usable text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct RoleCallError(pub String);

/// Invokes a language model on behalf of a debate role.
#[async_trait]
pub trait RoleInvoker: Send + Sync {
    async fn invoke(&self, role: DebateRole, request: &RoleRequest) -> Result<String, RoleCallError>;
}

fn settings_json(settings: &ImageSettings) -> String {
    serde_json::to_string_pretty(settings).unwrap_or_else(|_| settings.to_string())
}

fn product_json(attributes: &AttributeSet) -> String {
    serde_json::to_string_pretty(attributes).unwrap_or_else(|_| attributes.label())
}

fn valid_values_block() -> String {
    SettingsAxis::ALL
        .iter()
        .map(|axis| {
            let values: Vec<String> = axis.values().iter().map(|v| format!("\"{v}\"")).collect();
            format!("- {}: {}", axis, values.join(", "))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Prompt for the performance advocate.
pub fn performance_request(candidate: &SettingsCandidate) -> RoleRequest {
    let prompt = format!(
        "MODEL PREDICTION:\n{}\n\nPREDICTED SCORE: {:.2}%\nMODEL CONFIDENCE: {:.1}%\n\nREASONING:\n{}\n\n\
Make your case for following this data-driven approach. Be specific about:\n\
1. Why these settings are predicted to perform well\n\
2. What the data shows about similar products\n\
3. The business value of optimizing for performance",
        settings_json(&candidate.settings),
        candidate.predicted_score * 100.0,
        candidate.confidence * 100.0,
        candidate.reasoning,
    );
    RoleRequest {
        instructions: DebateRole::PERFORMANCE.instructions().to_string(),
        prompt,
    }
}

/// Prompt for the brand advocate.
pub fn brand_request(
    candidate: &SettingsCandidate,
    attributes: &AttributeSet,
    brand_identity: &str,
) -> RoleRequest {
    let prompt = format!(
        "BRAND IDENTITY:\n{}\n\nPRODUCT:\n{}\n\nMODEL RECOMMENDATION:\n{}\n\n\
While data shows these settings perform well, consider whether they fit the brand, \
whether they differentiate from competitors, and whether a creative alternative would \
build stronger recall. Keep what already fits; change only what you would argue for.\n\n\
VALID VALUES (use these exact strings):\n{}\n\n\
Respond with JSON:\n{{\n  \"argument\": \"your argument\",\n  \"proposed_settings\": {{ \"<axis>\": \"<value>\" }}\n}}\n\
Axes you omit keep the model's value.",
        brand_identity,
        product_json(attributes),
        settings_json(&candidate.settings),
        valid_values_block(),
    );
    RoleRequest {
        instructions: DebateRole::BRAND.instructions().to_string(),
        prompt,
    }
}

/// Prompt for the moderator.
pub fn moderator_request(
    candidate: &SettingsCandidate,
    attributes: &AttributeSet,
    performance_argument: &str,
    brand_argument: &str,
    brand_settings: &ImageSettings,
) -> RoleRequest {
    let prompt = format!(
        "PRODUCT:\n{}\n\n\
PERFORMANCE ADVOCATE SETTINGS (predicted score {:.2}%):\n{}\n\n\
PERFORMANCE ADVOCATE ARGUMENT:\n{}\n\n\
BRAND ADVOCATE SETTINGS:\n{}\n\n\
BRAND ADVOCATE ARGUMENT:\n{}\n\n\
Decide, axis by axis, whose value to adopt. Respond with JSON in this exact format:\n\
{{\n  \"choices\": {{\n    \"style\": \"performance\" | \"brand\",\n    \"lighting\": \"performance\" | \"brand\",\n    \
\"background\": \"performance\" | \"brand\",\n    \"pose\": \"performance\" | \"brand\",\n    \
\"expression\": \"performance\" | \"brand\",\n    \"angle\": \"performance\" | \"brand\"\n  }},\n  \
\"reasoning\": \"2-3 sentence explanation of your synthesis\"\n}}",
        product_json(attributes),
        candidate.predicted_score * 100.0,
        settings_json(&candidate.settings),
        performance_argument,
        settings_json(brand_settings),
        brand_argument,
    );
    RoleRequest {
        instructions: DebateRole::Moderator.instructions().to_string(),
        prompt,
    }
}
