pub mod embed_text;
pub mod extract;
pub mod lane;
pub mod vocabulary;

pub use extract::{Entity, EntitySource, EntityType, ModelEntity, Patterns};
pub use lane::{ClassifierRules, Lane, LaneDecision, ReasonCode, classify};
