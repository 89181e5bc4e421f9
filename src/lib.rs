//! Keyword image search over Are.na, filtered by CLIP similarity.
//!
//! [`pipeline::Pipeline`] searches channels for a keyword, downloads each
//! channel's image blocks, scores them against the keyword with a hosted CLIP
//! model and yields the images that clear a threshold. Output goes to a
//! [`sink::PresentationSink`].

pub mod arena;
pub mod clip;
pub mod config;
pub mod error;
pub mod fetch;
pub mod http;
pub mod logging;
pub mod pipeline;
pub mod sink;

pub use config::Config;
pub use error::{Error, Result};
pub use pipeline::{run_search, Pipeline, ScoredImage, SearchEvent, SearchOutcome, SearchRequest};
pub use sink::{ConsoleSink, PresentationSink};
