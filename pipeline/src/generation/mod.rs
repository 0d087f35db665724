//! Generation loop: bounded generate → crop → validate cycles per image slot.
//!
//! # Loop Flow
//!
//! ```text
//! Drafting → Attempting ──image──▶ Validating ──approved──▶ Accepted
//!               ▲  │                   │                      │
//!               │  └─failed────────────┤ rejected             │ refine (one edit)
//!               └──── budget left ─────┘                      ▼
//!                                      │                 Attempting → Validating → Accepted
//!                               budget spent
//!                                      ▼
//!                              AwaitingFeedback ──guidance──▶ Drafting (budget reset)
//!                                      │
//!                                      └──abandon──▶ Exhausted
//! ```

pub mod attempt;
pub mod crop;
pub mod driver;
pub mod state;

pub use attempt::{AttemptOutcome, AttemptRequest, GenerationAttempt};
pub use crop::{crop_to_portrait, PORTRAIT_RATIO};
pub use driver::{
    refine_instruction, GenerationLoop, LoopContext, LoopError, RefineOutcome, DEFAULT_ATTEMPT_BUDGET,
};
pub use state::{IllegalTransition, ImageSlot, LoopState, TransitionRecord};
