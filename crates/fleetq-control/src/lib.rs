//! Query orchestration for fleetq.
//!
//! This crate turns human-authored query fragments into submitted questions,
//! waits for reporting agents to answer, and fetches the answers, directly
//! or through server-side bulk exports. It also retrieves administrative
//! objects through one generic engine that knows each collection's server
//! defects.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      fleetq CLI / caller                     │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Orchestrator                          │
//! │  ┌─────────────┐ ┌─────────────┐ ┌─────────────────────┐    │
//! │  │  Coercion   │ │  Question   │ │  Pollers            │    │
//! │  │  + Builder  │ │  Lifecycle  │ │  (interactive,      │    │
//! │  └─────────────┘ └─────────────┘ │   bulk export)      │    │
//! │  ┌─────────────┐ ┌─────────────┐ └─────────────────────┘    │
//! │  │  Retrieval  │ │  Version    │                             │
//! │  │  + Limits   │ │  Gate       │                             │
//! │  └─────────────┘ └─────────────┘                             │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//!                    ┌──────────────────┐
//!                    │    Transport     │
//!                    │ (HTTP or mock)   │
//!                    └──────────────────┘
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use fleetq_control::{AskManualOptions, CancelToken, Orchestrator};
//! use fleetq_transport::{HttpTransport, TransportConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let transport = HttpTransport::new(TransportConfig {
//!     base_url: "https://console.example.com".to_string(),
//!     session: Some("token".to_string()),
//!     ..TransportConfig::default()
//! });
//! let orchestrator = Orchestrator::with_defaults(Arc::new(transport));
//!
//! let options = AskManualOptions {
//!     selectors: vec!["Computer Name".into()],
//!     groupings: vec!["Operating System, that contains:Windows".into()],
//!     ..AskManualOptions::default()
//! };
//! let bundle = orchestrator.ask_manual(&options, &CancelToken::new()).await?;
//! println!("{} rows", bundle.result_info.row_count);
//! # Ok(())
//! # }
//! ```
//!
//! # State Machines
//!
//! - Interactive poller: `Pending` → `Polling` → `Succeeded` or `TimedOut`
//! - Bulk export: `NotStarted` → `Running` → `Completed` or `Failed`
//!
//! Either may end in cancellation. See the [`lifecycle`] module.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod builder;
pub mod cancel;
pub mod coerce;
pub mod error;
pub mod export;
pub mod gate;
pub mod lifecycle;
pub mod poller;
pub mod question;
pub mod retrieve;
pub mod service;
pub mod types;

pub use cancel::CancelToken;
pub use coerce::{GroupingInput, SelectorInput, SensorCatalog};
pub use error::{ControlError, Result};
pub use gate::VersionGate;
pub use retrieve::Retrieved;
pub use service::Orchestrator;
pub use types::{
    AskManualOptions, AskParsedOptions, AskSavedOptions, DeleteOptions, ExportOptions,
    ExportPollConfig, ExportState, Limits, OrchestratorConfig, PollConfig, PollOutcome, PollState,
    PollerReport, QuestionOptions, RefreshConfig, ResultBundle, ResultOptions, RetrieveOptions,
};
