//! Library root for `genie-bot`.
//!
//! Genie-bot is a Slack bridge for Databricks Genie designed to:
//! - Forward natural-language data questions from Slack threads to a Genie space
//! - Poll the asynchronous Genie job API until an answer is ready
//! - Render plain-text answers and bounded-width result tables back into threads
//! - Forward thumbs-up / thumbs-down feedback on answers
//!
//! The bot integrates with Slack for chat and the Genie REST API for answers,
//! keeping the thread → conversation mapping in an in-memory store. The
//! architecture is built around extensible traits that allow for different
//! implementations of each service.

#[deny(missing_docs)]
pub mod base;
pub mod interaction;
pub mod runtime;
pub mod service;

use base::{config::Config, types::Void};
use rustls::crypto;
use tracing::info;

/// Public async entry for the binary crate.
///
/// Sets up necessary services and starts the genie-bot runtime:
/// - Initializes the crypto provider
/// - Creates the runtime context with the store, Genie, and chat clients
/// - Starts the socket-mode event loop
pub async fn start(config: Config) -> Void {
    info!("Starting genie-bot ...");

    // Start the crypto provider.
    crypto::ring::default_provider().install_default().unwrap();

    // Initialize the runtime.
    let runtime = runtime::Runtime::new(config).await?;

    // Start the runtime.
    runtime.start().await?;

    Ok(())
}
