// Transport implementations
pub mod transport_trait;
pub mod http_transport;
pub mod mock_transport;

pub use transport_trait::*;
pub use http_transport::*;
pub use mock_transport::*;
