pub mod engine;
pub mod cache;
pub mod transport;
pub mod utils;

pub use engine::*;
pub use cache::*;
pub use transport::*;
pub use utils::*;
