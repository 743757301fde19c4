//! # loghub-server
//!
//! HTTP front end of the loghub log search gateway.
//!
//! A single search request is fanned out, in configuration order, to every
//! backend whose routes accept it; the merged page is returned together with
//! a per-backend report.
//!
//! ## Example
//!
//! ```rust,no_run
//! use loghub_backends::{load_backends, GatewayConfig, LoadOptions};
//! use loghub_server::{GatewayServer, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = GatewayConfig::from_file("backends.yaml")?;
//!     let report = load_backends(config, &LoadOptions::default()).await;
//!
//!     let server = GatewayServer::new(ServerConfig::default(), report.backends);
//!     server.serve().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## API Endpoints
//!
//! | Endpoint | Method | Description |
//! |----------|--------|-------------|
//! | `/` | GET | Plain-text banner |
//! | `/health` | GET | Backend count, snapshot generation, load time and uptime |
//! | `/search` | POST | Search with JSON params, returns results and backend report |

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod handlers;
pub mod logging;
pub mod routes;
pub mod server;
pub mod state;

pub use config::ServerConfig;
pub use error::{GatewayError, GatewayResult};
pub use logging::{init_logging, LogFormat};
pub use server::GatewayServer;
pub use state::GatewayState;
