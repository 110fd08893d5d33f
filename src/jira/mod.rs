pub mod api_types;
pub mod client;
pub mod error;
pub mod gateway;
pub mod types;

pub use client::JiraClient;
pub use error::{GatewayError, Result};
pub use gateway::{RelayClient, TrackerGateway};
pub use types::{Credential, Issue, SearchRequest, WorklogEntry};
