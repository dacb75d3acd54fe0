//! Promotion Subsystem
//!
//! Moves a definition from one environment to a later one:
//! - Only trunk to qa, trunk to production and qa to production are legal
//! - Illegal pairs are rejected before any store call
//! - The candidate must satisfy every client of the destination
//! - Destination revisions are checked optimistically by the store
//! - Post promote hook failures do not roll back the promotion
//!
//! [`AutopromoteCascade`] reuses the same protocol to carry allocation-only
//! trunk edits downstream.

mod cascade;
mod errors;
mod machine;
mod promoter;
mod transition;

pub use cascade::{AutopromoteCascade, CascadeEdit, CascadeOutcome};
pub use errors::{PromotionError, PromotionErrorKind, PromotionResult};
pub use machine::{PromotionRequest, PromotionStateMachine};
pub use promoter::{Promoter, StorePromoter};
pub use transition::{PromoteAction, Transition};
