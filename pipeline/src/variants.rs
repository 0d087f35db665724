//! Side and back views of an accepted main image.
//!
//! Each variant runs its own [`GenerationLoop`] with its own budget, the same
//! consensus decision plus a viewpoint directive, and the accepted main image
//! as scene reference. A variant never touches the main image or the other
//! variant.

use tracing::info;

use crate::collaborators::Image;
use crate::generation::{GenerationLoop, ImageSlot, LoopContext, LoopError, LoopState};

#[derive(Debug, Clone, Copy)]
pub struct VariantGenerator {
    budget: u32,
}

impl VariantGenerator {
    pub fn new(budget: u32) -> Self {
        Self { budget }
    }

    /// Fresh loop for a variant slot; `None` for the main slot.
    pub fn start(&self, slot: ImageSlot) -> Option<GenerationLoop> {
        slot.is_variant().then(|| GenerationLoop::new(slot, self.budget))
    }

    /// Drive a variant loop against `main` until it rests.
    pub async fn run(
        &self,
        variant: &mut GenerationLoop,
        main: &Image,
        ctx: &LoopContext<'_>,
    ) -> Result<LoopState, LoopError> {
        let references = ctx.references.with_scene(main.clone());
        let variant_ctx = LoopContext {
            references: &references,
            ..*ctx
        };
        let state = variant.run(&variant_ctx).await?;
        info!(slot = %variant.slot(), state = %state, attempts = variant.attempts().len(), "Variant loop rested");
        Ok(state)
    }
}
