// Public module exports for the structurer binary and integration tests
pub mod error;
pub mod config;
pub mod logging;
pub mod tabular;
pub mod aggregator;
pub mod schema;
pub mod prompt;
pub mod backend;
pub mod extractor;
pub mod render;
pub mod edit;
pub mod session;
pub mod cli;

pub use error::{StructurerError, StructurerResult};
pub use session::Session;
