//! Redirect-following network relay.
//!
//! # Data Flow
//! ```text
//! GET /?url=<encoded target>
//!     → server.rs (parse query, reject missing target with 400)
//!     → redirect.rs (fetch loop: GET, follow 3xx up to MAX_REDIRECTS)
//!     → headers.rs (strip hop-by-hop + auth challenges, inject CORS)
//!     → streamed body back to the caller
//! ```
//!
//! # Design Decisions
//! - Only GET is ever sent upstream, whatever the inbound method
//! - Redirects are followed by hand in an explicit loop; the shared
//!   transport never follows them on its own
//! - Bodies are streamed, never buffered whole
//! - Every failure reaching the caller is a 502 with a plain-text body

pub mod headers;
pub mod redirect;
pub mod server;
pub mod transport;

pub use redirect::{RedirectChain, Relay, RelayError, RelayResponse};
pub use server::RelayServer;

/// Maximum number of redirects followed before failing closed.
pub const MAX_REDIRECTS: u32 = 5;

/// Browser-like User-Agent; some upstreams reject obvious bots.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.114 Safari/537.36";
