//! Outbound HTTP transport shared by the relay and the artifact downloader.

use std::time::Duration;

use reqwest::redirect::Policy;

/// How the transport treats 3xx responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectMode {
    /// Hand 3xx back to the caller (the relay chases them itself).
    Manual,
    /// Let the client follow up to `n` redirects.
    Follow(usize),
}

/// Build the outbound client.
///
/// Proxy environment variables are ignored: the relay *is* the egress path
/// and must not loop back through itself.
pub fn build_client(user_agent: &str, redirects: RedirectMode) -> reqwest::Result<reqwest::Client> {
    let policy = match redirects {
        RedirectMode::Manual => Policy::none(),
        RedirectMode::Follow(n) => Policy::limited(n),
    };

    reqwest::Client::builder()
        .user_agent(user_agent)
        .redirect(policy)
        .no_proxy()
        .connect_timeout(Duration::from_secs(10))
        .build()
}
