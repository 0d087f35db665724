//! Fixed vocabularies for product attributes and photo settings.
//!
//! Every categorical value that flows through the pipeline is one of the
//! enums below. Raw extractor output is normalized into an [`AttributeSet`]
//! once per item; after that, invalid values are unrepresentable.
//!
//! ```text
//! RawAttributes ──normalize()──▶ AttributeSet ──▶ predictor / debate / corpus
//!                     │
//!                     └─ unknown value → ValidationError
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Input that does not match the fixed vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Value outside the vocabulary for a field.
    #[error("invalid {field} '{value}'; valid values: {}", .allowed.join(", "))]
    UnknownValue {
        field: String,
        value: String,
        allowed: Vec<String>,
    },
    /// Required field absent or empty.
    #[error("missing required field: {field}")]
    MissingField { field: String },
    /// Composition was neither a string nor a map of part → material.
    #[error("invalid composition: expected string or object, got {kind}")]
    InvalidComposition { kind: String },
}

impl ValidationError {
    fn unknown(field: &str, value: &str, allowed: &[&str]) -> Self {
        Self::UnknownValue {
            field: field.to_string(),
            value: value.to_string(),
            allowed: allowed.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Declares a closed vocabulary enum with its wire strings.
macro_rules! vocabulary {
    (
        $(#[$meta:meta])*
        $name:ident, field = $field:literal {
            $( $variant:ident => $value:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub enum $name {
            $( #[serde(rename = $value)] $variant, )+
        }

        impl $name {
            /// Every value, in vocabulary order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];
            /// Field name used in records and error messages.
            pub const FIELD: &'static str = $field;

            pub fn as_str(self) -> &'static str {
                match self {
                    $( Self::$variant => $value, )+
                }
            }

            /// Position in vocabulary order.
            pub fn index(self) -> usize {
                Self::ALL.iter().position(|v| *v == self).unwrap_or(0)
            }

            fn wire_values() -> Vec<&'static str> {
                Self::ALL.iter().map(|v| v.as_str()).collect()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ValidationError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::ALL
                    .iter()
                    .copied()
                    .find(|v| v.as_str() == s)
                    .ok_or_else(|| ValidationError::unknown($field, s, &Self::wire_values()))
            }
        }
    };
}

vocabulary! {
    /// Garment category.
    GarmentType, field = "garment_type" {
        Hoodie => "hoodie",
        Jacket => "jacket",
        Jeans => "jeans",
        TShirt => "t-shirt",
        ZipUpHoodie => "zip-up hoodie",
    }
}

vocabulary! {
    /// Dominant garment color.
    Color, field = "color" {
        Black => "black",
        Colorful => "colorful",
        Dark => "dark",
        DarkGrey => "dark grey",
        Light => "light",
        White => "white",
    }
}

vocabulary! {
    /// Garment fit.
    Fit, field = "fit" {
        Loose => "loose",
        Oversized => "oversized",
        Regular => "regular",
        Tight => "tight",
    }
}

vocabulary! {
    /// Target gender.
    Gender, field = "gender" {
        Female => "female",
        Male => "male",
        Unisex => "unisex",
    }
}

vocabulary! {
    /// Overall photographic style.
    Style, field = "style" {
        CasualLifestyle => "casual_lifestyle",
        LifestyleIndoor => "lifestyle_indoor",
        LifestyleOutdoor => "lifestyle_outdoor",
        Streetwear => "streetwear",
        StudioMinimal => "studio_minimal",
        UrbanOutdoor => "urban_outdoor",
    }
}

vocabulary! {
    /// Lighting setup.
    Lighting, field = "lighting" {
        Dramatic => "dramatic",
        GoldenHour => "golden_hour",
        Natural => "natural",
        Overcast => "overcast",
        Studio => "studio",
    }
}

vocabulary! {
    /// Scene background.
    Background, field = "background" {
        BusyPattern => "busy_pattern",
        GraffitiWall => "graffiti_wall",
        NatureOutdoor => "nature_outdoor",
        NeutralWall => "neutral_wall",
        Park => "park",
        StudioGrey => "studio_grey",
        StudioWhite => "studio_white",
        UrbanStreet => "urban_street",
    }
}

vocabulary! {
    /// Model pose.
    Pose, field = "pose" {
        Action => "action",
        Casual => "casual",
        Dynamic => "dynamic",
        Sitting => "sitting",
        Standing => "standing",
        Walking => "walking",
    }
}

vocabulary! {
    /// Model facial expression.
    Expression, field = "expression" {
        Confident => "confident",
        Focused => "focused",
        Neutral => "neutral",
        Serious => "serious",
        Smiling => "smiling",
    }
}

vocabulary! {
    /// Camera angle.
    Angle, field = "angle" {
        ThreeQuarter => "3/4",
        Back => "back",
        Front => "front",
        Side => "side",
    }
}

// ── Settings axes ────────────────────────────────────────────────────────────

/// One axis of the settings space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettingsAxis {
    Style,
    Lighting,
    Background,
    Pose,
    Expression,
    Angle,
}

impl SettingsAxis {
    /// Axes in enumeration order.
    pub const ALL: [SettingsAxis; 6] = [
        Self::Style,
        Self::Lighting,
        Self::Background,
        Self::Pose,
        Self::Expression,
        Self::Angle,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Style => Style::FIELD,
            Self::Lighting => Lighting::FIELD,
            Self::Background => Background::FIELD,
            Self::Pose => Pose::FIELD,
            Self::Expression => Expression::FIELD,
            Self::Angle => Angle::FIELD,
        }
    }

    /// Wire values for this axis, in vocabulary order.
    pub fn values(self) -> Vec<&'static str> {
        match self {
            Self::Style => Style::wire_values(),
            Self::Lighting => Lighting::wire_values(),
            Self::Background => Background::wire_values(),
            Self::Pose => Pose::wire_values(),
            Self::Expression => Expression::wire_values(),
            Self::Angle => Angle::wire_values(),
        }
    }
}

impl fmt::Display for SettingsAxis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SettingsAxis {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| {
                let names: Vec<&str> = Self::ALL.iter().map(|a| a.as_str()).collect();
                ValidationError::unknown("settings axis", s, &names)
            })
    }
}

/// A point in the settings space: one value per axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageSettings {
    pub style: Style,
    pub lighting: Lighting,
    pub background: Background,
    pub pose: Pose,
    pub expression: Expression,
    pub angle: Angle,
}

impl ImageSettings {
    /// Wire value on one axis.
    pub fn value(&self, axis: SettingsAxis) -> &'static str {
        match axis {
            SettingsAxis::Style => self.style.as_str(),
            SettingsAxis::Lighting => self.lighting.as_str(),
            SettingsAxis::Background => self.background.as_str(),
            SettingsAxis::Pose => self.pose.as_str(),
            SettingsAxis::Expression => self.expression.as_str(),
            SettingsAxis::Angle => self.angle.as_str(),
        }
    }

    /// Replace the value on one axis, parsing it against that axis' vocabulary.
    pub fn set(&mut self, axis: SettingsAxis, value: &str) -> Result<(), ValidationError> {
        match axis {
            SettingsAxis::Style => self.style = value.parse()?,
            SettingsAxis::Lighting => self.lighting = value.parse()?,
            SettingsAxis::Background => self.background = value.parse()?,
            SettingsAxis::Pose => self.pose = value.parse()?,
            SettingsAxis::Expression => self.expression = value.parse()?,
            SettingsAxis::Angle => self.angle = value.parse()?,
        }
        Ok(())
    }

    /// Vocabulary index of the value on one axis.
    pub fn value_index(&self, axis: SettingsAxis) -> usize {
        match axis {
            SettingsAxis::Style => self.style.index(),
            SettingsAxis::Lighting => self.lighting.index(),
            SettingsAxis::Background => self.background.index(),
            SettingsAxis::Pose => self.pose.index(),
            SettingsAxis::Expression => self.expression.index(),
            SettingsAxis::Angle => self.angle.index(),
        }
    }

    /// Copy the value on `axis` from `other`.
    pub fn take_axis(&mut self, axis: SettingsAxis, other: &ImageSettings) {
        match axis {
            SettingsAxis::Style => self.style = other.style,
            SettingsAxis::Lighting => self.lighting = other.lighting,
            SettingsAxis::Background => self.background = other.background,
            SettingsAxis::Pose => self.pose = other.pose,
            SettingsAxis::Expression => self.expression = other.expression,
            SettingsAxis::Angle => self.angle = other.angle,
        }
    }

    /// Axes on which `self` and `other` differ.
    pub fn differing_axes(&self, other: &ImageSettings) -> Vec<SettingsAxis> {
        SettingsAxis::ALL
            .iter()
            .copied()
            .filter(|a| self.value(*a) != other.value(*a))
            .collect()
    }

    /// Number of points in the full settings space.
    pub fn space_size() -> usize {
        Style::ALL.len()
            * Lighting::ALL.len()
            * Background::ALL.len()
            * Pose::ALL.len()
            * Expression::ALL.len()
            * Angle::ALL.len()
    }

    /// Every point of the settings space in fixed enumeration order
    /// (style outermost, angle innermost; values in vocabulary order).
    pub fn enumerate() -> impl Iterator<Item = ImageSettings> {
        Style::ALL.iter().flat_map(|&style| {
            Lighting::ALL.iter().flat_map(move |&lighting| {
                Background::ALL.iter().flat_map(move |&background| {
                    Pose::ALL.iter().flat_map(move |&pose| {
                        Expression::ALL.iter().flat_map(move |&expression| {
                            Angle::ALL.iter().map(move |&angle| ImageSettings {
                                style,
                                lighting,
                                background,
                                pose,
                                expression,
                                angle,
                            })
                        })
                    })
                })
            })
        })
    }
}

impl fmt::Display for ImageSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}, {}, {}, {}, {}, {}",
            self.style, self.lighting, self.background, self.pose, self.expression, self.angle
        )
    }
}

// ── Product attributes ───────────────────────────────────────────────────────

/// One categorical product attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeField {
    GarmentType,
    Color,
    Fit,
    Gender,
}

impl AttributeField {
    pub const ALL: [AttributeField; 4] = [Self::GarmentType, Self::Color, Self::Fit, Self::Gender];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::GarmentType => GarmentType::FIELD,
            Self::Color => Color::FIELD,
            Self::Fit => Fit::FIELD,
            Self::Gender => Gender::FIELD,
        }
    }
}

/// Normalized facts about one product. Immutable for the rest of a run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttributeSet {
    /// Product identifier (SKU or upload stem).
    #[serde(default)]
    pub identifier: String,
    pub garment_type: GarmentType,
    pub color: Color,
    pub fit: Fit,
    pub gender: Gender,
    /// Material composition, e.g. `"Shell: 100% Cotton"`.
    #[serde(default)]
    pub composition: String,
}

impl AttributeSet {
    /// Wire value of one categorical attribute.
    pub fn value(&self, field: AttributeField) -> &'static str {
        match field {
            AttributeField::GarmentType => self.garment_type.as_str(),
            AttributeField::Color => self.color.as_str(),
            AttributeField::Fit => self.fit.as_str(),
            AttributeField::Gender => self.gender.as_str(),
        }
    }

    /// Short human label, e.g. `"black oversized hoodie"`.
    pub fn label(&self) -> String {
        format!("{} {} {}", self.color, self.fit, self.garment_type)
    }
}

/// Attribute values as returned by an extractor, before normalization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawAttributes {
    #[serde(default)]
    pub identifier: Option<String>,
    #[serde(default)]
    pub garment_type: String,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub fit: String,
    #[serde(default)]
    pub gender: String,
    /// Either a plain string or a map of part → material.
    #[serde(default)]
    pub composition: Option<serde_json::Value>,
}

impl RawAttributes {
    /// Normalize into an [`AttributeSet`].
    ///
    /// Values are trimmed and lowercased; a trailing " fit" is dropped from the
    /// fit value. `fallback_id` is used when the extractor supplied no
    /// identifier.
    pub fn normalize(&self, fallback_id: &str) -> Result<AttributeSet, ValidationError> {
        let garment_type = parse_field(GarmentType::FIELD, &self.garment_type)?;
        let color = parse_field(Color::FIELD, &self.color)?;
        let fit_raw = self.fit.to_lowercase().replace(" fit", "");
        let fit = parse_field(Fit::FIELD, &fit_raw)?;
        let gender = parse_field(Gender::FIELD, &self.gender)?;

        let identifier = self
            .identifier
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(fallback_id)
            .to_string();

        Ok(AttributeSet {
            identifier,
            garment_type,
            color,
            fit,
            gender,
            composition: normalize_composition(self.composition.as_ref())?,
        })
    }
}

fn parse_field<T>(field: &str, raw: &str) -> Result<T, ValidationError>
where
    T: FromStr<Err = ValidationError>,
{
    let normalized = raw.trim().to_lowercase();
    if normalized.is_empty() {
        return Err(ValidationError::MissingField {
            field: field.to_string(),
        });
    }
    normalized.parse()
}

/// Render composition as `"Part: material, Part: material"`.
pub fn normalize_composition(
    value: Option<&serde_json::Value>,
) -> Result<String, ValidationError> {
    use serde_json::Value;

    match value {
        None | Some(Value::Null) => Ok(String::new()),
        Some(Value::String(s)) => Ok(s.trim().to_string()),
        Some(Value::Object(map)) => Ok(map
            .iter()
            .map(|(part, material)| match material {
                Value::String(m) => format!("{part}: {m}"),
                other => format!("{part}: {other}"),
            })
            .collect::<Vec<_>>()
            .join(", ")),
        Some(other) => Err(ValidationError::InvalidComposition {
            kind: match other {
                Value::Bool(_) => "bool",
                Value::Number(_) => "number",
                Value::Array(_) => "array",
                _ => "unknown",
            }
            .to_string(),
        }),
    }
}
