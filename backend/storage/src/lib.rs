pub mod model_cache;
pub mod sqlite_store;
pub mod store;
pub mod templates;

pub use model_cache::{ModelCacheRegistry, cache_key};
pub use sqlite_store::SqliteKvStore;
pub use store::InMemoryKvStore;
pub use templates::{TEMPLATES_KEY, TemplateStore};
