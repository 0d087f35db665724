//! Contracts for the external services the engine drives.
//!
//! Every collaborator is a single blocking call behind an async trait. The
//! engine never inspects how they are implemented; tests drive it with
//! in-memory stubs.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::generation::ImageSlot;
use crate::listing::ListingDraft;
use crate::scenario::GenerationDirectives;
use crate::taxonomy::{AttributeSet, RawAttributes};

/// Encoded image bytes plus their media type.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    pub mime_type: String,
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
}

impl Image {
    pub fn new(mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data,
        }
    }

    pub fn jpeg(data: Vec<u8>) -> Self {
        Self::new("image/jpeg", data)
    }

    pub fn png(data: Vec<u8>) -> Self {
        Self::new("image/png", data)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl std::fmt::Debug for Image {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Image")
            .field("mime_type", &self.mime_type)
            .field("bytes", &self.data.len())
            .finish()
    }
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

/// Images the generator and validator compare against.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceImages {
    /// Uploaded product photos, front view first.
    pub product: Vec<Image>,
    /// Accepted main image, supplied when generating variants.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scene: Option<Image>,
}

impl ReferenceImages {
    pub fn product(product: Vec<Image>) -> Self {
        Self {
            product,
            scene: None,
        }
    }

    pub fn with_scene(&self, scene: Image) -> Self {
        Self {
            product: self.product.clone(),
            scene: Some(scene),
        }
    }
}

/// A generation or edit call that produced no usable image.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum GenerationFailure {
    #[error("service returned no image")]
    NoImage,
    #[error("request blocked by the service: {0}")]
    Blocked(String),
    #[error("generated image could not be decoded: {0}")]
    Undecodable(String),
    #[error("image service error: {0}")]
    Service(String),
}

/// Validator decision for one candidate image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum Verdict {
    Approved { note: String },
    Rejected { reason: String },
}

impl Verdict {
    pub fn is_approved(&self) -> bool {
        matches!(self, Self::Approved { .. })
    }
}

/// Failure of an extractor or validator call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ServiceError(pub String);

/// Failure to publish a listing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PublishError {
    #[error("publisher rejected the listing: {0}")]
    Rejected(String),
    #[error("publisher unreachable: {0}")]
    Transport(String),
}

/// What the validator compares.
#[derive(Debug, Clone, Copy)]
pub struct ValidationRequest<'a> {
    pub slot: ImageSlot,
    pub attributes: &'a AttributeSet,
    pub references: &'a ReferenceImages,
    pub candidate: &'a Image,
}

/// Vision extraction of product attributes from the uploaded photos.
#[async_trait]
pub trait AttributeExtractor: Send + Sync {
    async fn extract(&self, images: &[Image]) -> Result<RawAttributes, ServiceError>;
}

/// Image generation and single-shot edits.
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn generate(
        &self,
        directives: &GenerationDirectives,
        references: &ReferenceImages,
    ) -> Result<Image, GenerationFailure>;

    async fn edit(
        &self,
        image: &Image,
        instruction: &str,
        references: &ReferenceImages,
    ) -> Result<Image, GenerationFailure>;
}

/// Compares a candidate against the references. Must be a pure function of
/// the images it is given.
#[async_trait]
pub trait ImageValidator: Send + Sync {
    async fn validate(&self, request: ValidationRequest<'_>) -> Result<Verdict, ServiceError>;
}

/// Commerce platform listing creation. Returns the platform's listing id.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, listing: &ListingDraft, images: &[Image]) -> Result<String, PublishError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_serializes_as_base64() {
        let image = Image::png(vec![0x89, b'P', b'N', b'G']);
        let json = serde_json::to_value(&image).unwrap();
        assert_eq!(json["data"], "iVBORw==");
        let back: Image = serde_json::from_value(json).unwrap();
        assert_eq!(back, image);
    }

    #[test]
    fn test_image_debug_hides_bytes() {
        let image = Image::jpeg(vec![0; 1024]);
        assert_eq!(format!("{image:?}"), "Image { mime_type: \"image/jpeg\", bytes: 1024 }");
    }

    #[test]
    fn test_verdict_wire_format() {
        let rejected = Verdict::Rejected {
            reason: "color too dark".into(),
        };
        let json = serde_json::to_value(&rejected).unwrap();
        assert_eq!(json["verdict"], "rejected");
        assert!(!rejected.is_approved());
    }
}
