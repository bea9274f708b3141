mod error;

pub mod models;
pub mod postgres;
pub mod schema;
pub mod store;

pub use error::{Error, Result};
pub use models::{EmbeddingSource, FocusRef, LinkKind, RecordKind, RelatedRecord};
pub use postgres::Db;
pub use store::EntityStore;
