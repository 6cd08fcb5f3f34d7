//! Shared types and error hierarchy for mcp-bridge.

pub mod error;
pub mod message;
pub mod provider;
pub mod server;
pub mod tool;
pub mod util;

pub use error::{ApiError, BridgeError, CatalogError, ConfigError, ToolError, TransportError};
pub use message::*;
pub use tool::*;
pub use util::{truncate_str, truncate_string};
