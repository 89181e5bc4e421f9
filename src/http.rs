//! Shared ureq agent construction.

use std::time::Duration;

/// Browser-like agent string. Several image CDNs refuse library defaults.
pub const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// Build an agent with an overall per-request timeout and a fixed User-Agent.
pub fn build_agent(timeout_secs: u64, user_agent: &str) -> ureq::Agent {
    ureq::AgentBuilder::new()
        .timeout(Duration::from_secs(timeout_secs))
        .user_agent(user_agent)
        .build()
}
