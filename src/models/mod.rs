// Re-export all model types for ease of use

pub mod collection;
pub mod receipt;
pub mod service_document;

pub use collection::*;
pub use receipt::*;
pub use service_document::*;
