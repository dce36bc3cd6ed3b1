// Core moderation module - classification and escalation business logic.

pub mod classifier;
pub mod escalation;
pub mod lexicon;
pub mod links;
pub mod moderation_models;
pub mod spam;

pub use classifier::*;
pub use escalation::*;
pub use lexicon::*;
pub use links::*;
pub use moderation_models::*;
pub use spam::*;
