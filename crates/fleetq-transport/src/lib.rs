//! Session transport for fleetq.
//!
//! This crate defines what the orchestrator needs from the platform and
//! provides two implementations:
//!
//! - [`HttpTransport`] talks to the platform's REST API with `reqwest`
//! - [`MockTransport`] (feature `test-utils`) keeps state in memory and
//!   records every call
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐     ┌──────────────────┐
//! │   Orchestrator   │────▶│   Transport      │
//! │   (control)      │     │   (trait)        │
//! └──────────────────┘     └────────┬─────────┘
//!                                   │
//!                          ┌────────▼─────────┐
//!                          │  HttpTransport   │
//!                          │  (impl)          │
//!                          └────────┬─────────┘
//!                                   │ HTTPS
//!                          ┌────────▼─────────┐
//!                          │   Platform       │
//!                          │   REST API       │
//!                          └──────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use fleetq_transport::{HttpTransport, Transport, TransportConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let transport = HttpTransport::new(TransportConfig {
//!     base_url: "https://fleet.example.com".to_string(),
//!     session: Some("session-token".to_string()),
//!     ..TransportConfig::default()
//! });
//!
//! println!("server version: {}", transport.server_version().await?);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod transport;
pub mod types;

#[cfg(any(test, feature = "test-utils"))]
pub mod mock;

use serde::{Deserialize, Serialize};

pub use error::{Result, TransportError};
pub use transport::{HttpTransport, Transport, SESSION_HEADER};
pub use types::{CacheFilter, ExportRequest, FetchRequest, FetchTarget};

#[cfg(any(test, feature = "test-utils"))]
pub use mock::{MockTransport, TransportCall};

/// Connection settings for the platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Base URL of the platform (e.g., `https://fleet.example.com`).
    pub base_url: String,
    /// Session token sent with every request.
    #[serde(default)]
    pub session: Option<String>,
    /// Overall request timeout, in seconds.
    #[serde(default = "TransportConfig::default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,
    /// Connection timeout, in seconds.
    #[serde(default = "TransportConfig::default_connect_timeout_seconds")]
    pub connect_timeout_seconds: u64,
}

impl TransportConfig {
    const fn default_request_timeout_seconds() -> u64 {
        60
    }

    const fn default_connect_timeout_seconds() -> u64 {
        5
    }

    /// Join a request path onto the base URL.
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url.trim_end_matches('/'))
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            base_url: "https://localhost".to_string(),
            session: None,
            request_timeout_seconds: Self::default_request_timeout_seconds(),
            connect_timeout_seconds: Self::default_connect_timeout_seconds(),
        }
    }
}
