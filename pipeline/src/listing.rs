//! Listing copy handed to the publisher.

use serde::{Deserialize, Serialize};

use crate::generation::ImageSlot;
use crate::taxonomy::AttributeSet;

/// Tag added to every listing produced by the engine.
pub const GENERATED_TAG: &str = "ai-generated";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingDraft {
    pub title: String,
    pub description: String,
    pub sku: String,
    pub product_type: String,
    pub tags: Vec<String>,
}

impl ListingDraft {
    /// Default copy derived from the product attributes.
    pub fn from_attributes(attributes: &AttributeSet) -> Self {
        let title = capitalize(&attributes.label());
        let mut description = format!("{title} for {}.", attributes.gender);
        if !attributes.composition.is_empty() {
            description.push_str(&format!(" Material: {}.", attributes.composition));
        }
        Self {
            title,
            description,
            sku: attributes.identifier.clone(),
            product_type: "Apparel".into(),
            tags: vec![
                attributes.garment_type.to_string(),
                attributes.gender.to_string(),
                attributes.color.to_string(),
                attributes.fit.to_string(),
                GENERATED_TAG.into(),
            ],
        }
    }

    /// Alt text for an image in `slot`.
    pub fn alt_text(&self, slot: ImageSlot) -> String {
        format!("{} - {} view", self.title, capitalize(slot.as_str()))
    }
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
