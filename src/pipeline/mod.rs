//! Keyword-to-matched-images pipeline.
//!
//! Channel search is the single fatal step. Channel, image and scoring
//! failures are reported as warnings and the run continues.

mod request;
mod run;

pub use request::{format_caption, ScoredImage, SearchRequest};
pub use run::{
    run_search, Pipeline, ProbeReport, SearchEvent, SearchOutcome, SearchRun, NO_MATCHES_NOTICE,
    PROBE_IMAGE_URL, PROBE_PROMPT,
};
