// Cache store implementations
pub mod cache_trait;
pub mod memory_store;
pub mod lru_store;

pub use cache_trait::*;
pub use memory_store::*;
pub use lru_store::*;
