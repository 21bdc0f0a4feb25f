// Core engine components
pub mod descriptor;
pub mod pending;
pub mod query_engine;
pub mod builder;

pub use descriptor::*;
pub use pending::*;
pub use query_engine::*;
pub use builder::*;
