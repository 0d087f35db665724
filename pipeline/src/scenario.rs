//! Rendering a consensus decision into generation directives.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::debate::ConsensusDecision;
use crate::generation::ImageSlot;
use crate::taxonomy::{
    AttributeSet, Background, Expression, ImageSettings, Lighting, Pose, Style, Angle,
};

/// Everything the image generator needs for one attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationDirectives {
    pub settings: ImageSettings,
    /// Structured photography scenario.
    pub scenario: serde_json::Value,
    /// Full text prompt.
    pub prompt: String,
    /// Human guidance merged into this directive, verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guidance: Option<String>,
    /// Viewpoint for variant slots; `None` for the main image.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viewpoint: Option<ImageSlot>,
}

impl GenerationDirectives {
    /// Re-target these directives at a variant viewpoint.
    pub fn with_viewpoint(mut self, slot: ImageSlot) -> Self {
        if let Some(text) = viewpoint_directive(slot) {
            self.prompt.push_str("\n\n");
            self.prompt.push_str(&text);
            self.viewpoint = Some(slot);
        }
        self
    }
}

/// Viewpoint instruction for a variant slot.
pub fn viewpoint_directive(slot: ImageSlot) -> Option<String> {
    let direction = match slot {
        ImageSlot::Main => return None,
        ImageSlot::Side => "from the side",
        ImageSlot::Back => "from behind",
    };
    Some(format!(
        "VIEWPOINT: Generate THE EXACT SAME SCENE photographed {direction}. \
Use the scene reference for the person, environment, lighting and pose. \
Use the product references for how the garment looks {direction}. \
Only the camera angle changes. Keep the 4:5 format."
    ))
}

/// Renders directives from a decision. The default is [`TemplateScenarioBuilder`].
pub trait ScenarioBuilder: Send + Sync {
    fn build(
        &self,
        decision: &ConsensusDecision,
        attributes: &AttributeSet,
        guidance: Option<&str>,
    ) -> GenerationDirectives;
}

/// Template-based scenario rendering.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateScenarioBuilder;

impl ScenarioBuilder for TemplateScenarioBuilder {
    fn build(
        &self,
        decision: &ConsensusDecision,
        attributes: &AttributeSet,
        guidance: Option<&str>,
    ) -> GenerationDirectives {
        let settings = decision.settings;
        let (setting, atmosphere, camera_style) = style_template(settings.style);
        let scenario = json!({
            "setting": setting,
            "atmosphere": atmosphere,
            "camera_style": camera_style,
            "lighting": lighting_template(settings.lighting),
            "background": background_template(settings.background),
            "subject": {
                "gender": attributes.gender.as_str(),
                "pose": pose_template(settings.pose),
                "expression": expression_template(settings.expression),
                "clothing": {
                    "top": "Use the EXACT garment from the reference image. Match color, texture, fit and graphics.",
                    "bottom": "Use garments that naturally match the scenario and the top garment."
                }
            },
            "camera": {
                "angle": angle_template(settings.angle),
                "format": "4:5 portrait"
            }
        });
        let scenario_text =
            serde_json::to_string_pretty(&scenario).unwrap_or_else(|_| scenario.to_string());

        let mut prompt = format!(
            "TASK: Generate a photorealistic fashion PHOTOGRAPH of a {} {}.\n\n\
You MUST return an IMAGE, not text.\n\n\
GARMENT: The reference image shows the exact garment. Copy its color, texture, fit, silhouette \
and graphics with full accuracy. Replace copyrighted logos with generic abstract alternatives. \
No real celebrities, no real brand logos.\n\n\
PHOTO SPECIFICATION:\n{}",
            attributes.label(),
            attributes.gender,
            scenario_text
        );
        let guidance = guidance.map(str::trim).filter(|g| !g.is_empty()).map(str::to_string);
        if let Some(text) = &guidance {
            prompt.push_str("\n\nADDITIONAL DIRECTION FROM REVIEWER:\n");
            prompt.push_str(text);
        }

        GenerationDirectives {
            settings,
            scenario,
            prompt,
            guidance,
            viewpoint: None,
        }
    }
}

fn style_template(style: Style) -> (&'static str, &'static str, &'static str) {
    match style {
        Style::CasualLifestyle => (
            "everyday casual setting",
            "relaxed, approachable, authentic",
            "professional lifestyle photography",
        ),
        Style::LifestyleIndoor => (
            "casual indoor lifestyle environment",
            "relaxed, authentic, lifestyle-focused",
            "professional lifestyle photography",
        ),
        Style::LifestyleOutdoor => (
            "open outdoor lifestyle environment",
            "fresh, natural, easygoing",
            "professional outdoor lifestyle photography",
        ),
        Style::Streetwear => (
            "urban street fashion environment",
            "stylish, contemporary, fashion-forward",
            "professional street fashion photography",
        ),
        Style::StudioMinimal => (
            "clean minimalist studio",
            "modern, sophisticated, clean",
            "professional studio portrait photography",
        ),
        Style::UrbanOutdoor => (
            "urban outdoor environment with street photography aesthetic",
            "energetic, authentic, street-style",
            "professional street photography",
        ),
    }
}

fn lighting_template(lighting: Lighting) -> &'static str {
    match lighting {
        Lighting::Dramatic => "high-contrast dramatic lighting with strong shadows and highlights",
        Lighting::GoldenHour => "warm golden hour lighting from the side, soft rim light and long shadows",
        Lighting::Natural => "natural daylight with soft shadows, balanced exposure",
        Lighting::Overcast => "soft diffused overcast lighting, minimal shadows, even tones",
        Lighting::Studio => "controlled studio lighting with key light and fill, even illumination",
    }
}

fn background_template(background: Background) -> &'static str {
    match background {
        Background::BusyPattern => "bold patterned backdrop with strong graphic elements",
        Background::GraffitiWall => "colorful graffiti-covered brick wall with urban street art",
        Background::NatureOutdoor => "natural outdoor environment with greenery and organic elements",
        Background::NeutralWall => "plain neutral-toned wall with subtle texture",
        Background::Park => "city park with trees, grass and soft depth of field",
        Background::StudioGrey => "seamless mid-grey studio backdrop",
        Background::StudioWhite => "clean white studio backdrop, seamless and minimal",
        Background::UrbanStreet => "authentic urban street with buildings and infrastructure",
    }
}

fn pose_template(pose: Pose) -> &'static str {
    match pose {
        Pose::Action => "dynamic action pose with energy and movement",
        Pose::Casual => "casual relaxed pose, natural and authentic",
        Pose::Dynamic => "dynamic pose with movement and energy",
        Pose::Sitting => "seated pose, relaxed and natural",
        Pose::Standing => "standing pose with natural stance",
        Pose::Walking => "natural walking pose, dynamic movement",
    }
}

fn expression_template(expression: Expression) -> &'static str {
    match expression {
        Expression::Confident => "confident expression with direct eye contact",
        Expression::Focused => "focused intense expression",
        Expression::Neutral => "neutral calm expression",
        Expression::Serious => "serious focused expression",
        Expression::Smiling => "genuine smiling expression",
    }
}

fn angle_template(angle: Angle) -> &'static str {
    match angle {
        Angle::ThreeQuarter => "three-quarter angle for dynamic perspective",
        Angle::Back => "back angle showing rear details",
        Angle::Front => "eye-level front angle, direct composition",
        Angle::Side => "side angle showing profile and garment details",
    }
}
