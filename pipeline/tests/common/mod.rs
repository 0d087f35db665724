//! Deterministic stub collaborators shared by the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::io::Cursor;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use pipeline::debate::AdvocateSide;
use pipeline::feedback::ScoreSource;
use pipeline::predictor::RetrainConfig;
use pipeline::taxonomy::*;
use pipeline::{
    AttributeExtractor, Corpus, DebateRole, GenerationDirectives, GenerationFailure, Image,
    ImageGenerator, ImageValidator, ListingDraft, ModelSlot, ModelStore, Provenance, PublishError,
    Publisher, RawAttributes, ReferenceImages, RoleCallError, RoleInvoker, RoleRequest,
    ServiceError, Services, TemplateScenarioBuilder, TrainingSample, ValidationRequest, Verdict,
};

/// PNG of the given size.
pub fn png(width: u32, height: u32) -> Image {
    let pixels = image::RgbImage::from_pixel(width, height, image::Rgb([40, 40, 40]));
    let mut bytes = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(pixels)
        .write_to(&mut bytes, image::ImageFormat::Png)
        .unwrap();
    Image::png(bytes.into_inner())
}

pub fn hoodie_raw() -> RawAttributes {
    serde_json::from_value(serde_json::json!({
        "garment_type": "Hoodie",
        "color": "black",
        "fit": "oversized fit",
        "gender": "unisex",
        "composition": {"Shell": "80% Cotton", "Lining": "20% Polyester"}
    }))
    .unwrap()
}

pub fn hoodie() -> AttributeSet {
    hoodie_raw().normalize("ART-1").unwrap()
}

// ── Extraction ──────────────────────────────────────────────────────

pub struct StubExtractor {
    pub raw: RawAttributes,
}

#[async_trait]
impl AttributeExtractor for StubExtractor {
    async fn extract(&self, _images: &[Image]) -> Result<RawAttributes, ServiceError> {
        Ok(self.raw.clone())
    }
}

// ── Image generation ────────────────────────────────────────────────

/// Pops scripted results; succeeds with a 4:5 PNG once the script runs out.
#[derive(Default)]
pub struct ScriptedGenerator {
    pub results: Mutex<VecDeque<Result<Image, GenerationFailure>>>,
    pub prompts: Mutex<Vec<String>>,
    pub edits: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    pub fn with(results: Vec<Result<Image, GenerationFailure>>) -> Self {
        Self {
            results: Mutex::new(results.into()),
            ..Self::default()
        }
    }

    pub fn generate_calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn edit_calls(&self) -> usize {
        self.edits.lock().unwrap().len()
    }

    fn next(&self) -> Result<Image, GenerationFailure> {
        self.results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(png(80, 100)))
    }
}

#[async_trait]
impl ImageGenerator for ScriptedGenerator {
    async fn generate(
        &self,
        directives: &GenerationDirectives,
        _references: &ReferenceImages,
    ) -> Result<Image, GenerationFailure> {
        self.prompts.lock().unwrap().push(directives.prompt.clone());
        self.next()
    }

    async fn edit(
        &self,
        _image: &Image,
        instruction: &str,
        _references: &ReferenceImages,
    ) -> Result<Image, GenerationFailure> {
        self.edits.lock().unwrap().push(instruction.to_string());
        self.next()
    }
}

pub fn failure() -> Result<Image, GenerationFailure> {
    Err(GenerationFailure::Service("upstream 503".into()))
}

// ── Validation ──────────────────────────────────────────────────────

/// Approves everything. Counts calls.
#[derive(Default)]
pub struct ApproveAll {
    pub calls: Mutex<usize>,
}

#[async_trait]
impl ImageValidator for ApproveAll {
    async fn validate(&self, _request: ValidationRequest<'_>) -> Result<Verdict, ServiceError> {
        *self.calls.lock().unwrap() += 1;
        Ok(Verdict::Approved {
            note: "garment matches".into(),
        })
    }
}

/// Verdict depends only on the candidate bytes.
pub struct RejectBytes {
    pub rejected: Vec<u8>,
}

#[async_trait]
impl ImageValidator for RejectBytes {
    async fn validate(&self, request: ValidationRequest<'_>) -> Result<Verdict, ServiceError> {
        if request.candidate.data == self.rejected {
            Ok(Verdict::Rejected {
                reason: "logo missing".into(),
            })
        } else {
            Ok(Verdict::Approved {
                note: "ok".into(),
            })
        }
    }
}

// ── Publishing ──────────────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingPublisher {
    pub fail_with: Mutex<Option<PublishError>>,
    pub published: Mutex<Vec<(ListingDraft, usize)>>,
}

impl RecordingPublisher {
    pub fn failing(error: PublishError) -> Self {
        Self {
            fail_with: Mutex::new(Some(error)),
            ..Self::default()
        }
    }
}

#[async_trait]
impl Publisher for RecordingPublisher {
    async fn publish(&self, listing: &ListingDraft, images: &[Image]) -> Result<String, PublishError> {
        if let Some(error) = self.fail_with.lock().unwrap().take() {
            return Err(error);
        }
        let mut published = self.published.lock().unwrap();
        published.push((listing.clone(), images.len()));
        Ok(format!("gid://shop/Product/{}", published.len()))
    }
}

// ── Debate roles ────────────────────────────────────────────────────

pub const BRAND_LIGHTING: &str = r#"```json
{"argument": "Natural light keeps the brand honest.", "proposed_settings": {"lighting": "natural", "background": "neutral_wall"}}
```"#;

pub const MODERATOR_HYBRID: &str = r#"{"choices": {"style": "performance", "lighting": "brand",
    "background": "performance", "pose": "performance", "expression": "performance", "angle": "performance"},
    "reasoning": "Keep the proven composition, soften the light."}"#;

pub struct ScriptedRoles {
    pub brand: String,
    pub moderator: String,
    pub calls: Mutex<Vec<DebateRole>>,
}

impl ScriptedRoles {
    pub fn new(brand: &str, moderator: &str) -> Self {
        Self {
            brand: brand.into(),
            moderator: moderator.into(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn hybrid() -> Self {
        Self::new(BRAND_LIGHTING, MODERATOR_HYBRID)
    }
}

#[async_trait]
impl RoleInvoker for ScriptedRoles {
    async fn invoke(&self, role: DebateRole, _request: &RoleRequest) -> Result<String, RoleCallError> {
        self.calls.lock().unwrap().push(role);
        Ok(match role {
            DebateRole::Advocate(AdvocateSide::Performance) => {
                "The model's pick has the best predicted score.".to_string()
            }
            DebateRole::Advocate(AdvocateSide::Brand) => self.brand.clone(),
            DebateRole::Moderator => self.moderator.clone(),
        })
    }
}

// ── Model and corpus ────────────────────────────────────────────────

/// Training sample for `attributes` with the `n`-th settings combination.
pub fn training_sample(attributes: &AttributeSet, n: usize, score: f64) -> TrainingSample {
    let settings = ImageSettings::enumerate()
        .nth(n * 97 % ImageSettings::space_size())
        .unwrap();
    TrainingSample {
        attributes: attributes.clone(),
        settings,
        score,
        exposures: 1000,
        provenance: Some(Provenance::FullMl),
        score_source: ScoreSource::Measured,
        recorded_at: None,
    }
}

/// Append `n` varied samples.
pub async fn seed_corpus(corpus: &Corpus, n: usize) {
    let attributes = hoodie();
    for i in 0..n {
        let score = 0.02 + (i % 7) as f64 * 0.01;
        corpus.append(&training_sample(&attributes, i, score)).await.unwrap();
    }
}

/// Model slot trained on a seeded corpus in `dir`. The corpus is left with
/// `seed` samples.
pub async fn trained_slot(dir: &Path, seed: usize) -> (ModelSlot, Arc<Corpus>) {
    let corpus = Arc::new(Corpus::open(dir.join("corpus.jsonl")));
    seed_corpus(&corpus, seed).await;
    let slot = ModelSlot::empty(ModelStore::new(dir.join("model.json")));
    slot.retrain(&corpus, &RetrainConfig::default()).await.unwrap();
    (slot, corpus)
}

pub struct Stubs {
    pub generator: Arc<ScriptedGenerator>,
    pub validator: Arc<dyn ImageValidator>,
    pub publisher: Arc<RecordingPublisher>,
    pub roles: Arc<ScriptedRoles>,
}

impl Stubs {
    pub fn new(generator: ScriptedGenerator) -> Self {
        Self {
            generator: Arc::new(generator),
            validator: Arc::new(ApproveAll::default()),
            publisher: Arc::new(RecordingPublisher::default()),
            roles: Arc::new(ScriptedRoles::hybrid()),
        }
    }

    pub fn services(&self) -> Services {
        Services {
            extractor: Arc::new(StubExtractor { raw: hoodie_raw() }),
            scenario: Arc::new(TemplateScenarioBuilder),
            generator: self.generator.clone(),
            validator: self.validator.clone(),
            publisher: self.publisher.clone(),
            roles: self.roles.clone(),
        }
    }
}
