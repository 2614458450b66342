//! `templatebot-clients`: HTTP implementations of the collaborator traits
//! defined in `templatebot-core`.
//!
//! # Architecture
//!
//! ```text
//! reqwest::Client (one per process, see http::build_client)
//!     │
//!     ├── GitHubAppClient  → SourceHost      (repos, installation tokens)
//!     ├── LtdClient        → DocsHost        (LSST the Docs products)
//!     ├── AuthorDbClient   → AuthorDirectory (author records)
//!     ├── SlackClient      → Notifier        (messages and modals)
//!     └── WebhookSink      → EventSink       (render hand-off)
//! ```
//!
//! Each client exposes inherent methods returning [`ClientError`] and maps
//! to `templatebot_core::TemplatebotError` at the trait boundary.

pub mod authordb;
pub mod error;
pub mod github;
pub mod http;
pub mod ltd;
pub mod slack;
pub mod webhook;

pub use authordb::AuthorDbClient;
pub use error::{ClientError, Result};
pub use github::GitHubAppClient;
pub use http::build_client;
pub use ltd::LtdClient;
pub use slack::SlackClient;
pub use webhook::WebhookSink;
