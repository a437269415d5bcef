pub mod config;
pub mod error;
pub mod fetch;
pub mod pipeline;
pub mod process;
pub mod store;

pub use error::{FetchError, LoadError, ParseError, RunError, TransformError};
pub use fetch::{FeedSource, HttpFeed};
pub use pipeline::{run, PipelineConfig, RunSummary, StopSignal};
pub use store::Store;
