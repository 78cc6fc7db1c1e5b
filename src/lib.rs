//! intentgate: a hybrid assistant router.
//!
//! Every message is classified by a local TF-IDF intent model first.
//! Confident, low-stakes intents get a canned reply. Everything else goes
//! to a generative backend with context retrieved from a small vector index
//! over the knowledge base. Each exchange is logged for the stats endpoint.

pub mod artifacts;
pub mod assistant;
pub mod classifier;
pub mod config;
pub mod error;
pub mod gatekeeper;
pub mod gateway;
pub mod providers;
pub mod retrieval;
pub mod sentiment;
pub mod telemetry;

pub use assistant::{Assistant, Components, Status, Versioned};
pub use config::Config;
pub use error::{Error, Result};
pub use gatekeeper::{ResponseRouter, ResponseType, RouteOutcome};
