//! Service integrations for external APIs and clients.
//!
//! This module contains implementations for various services used by the genie-bot:
//! - Chat services (e.g., Slack)
//! - Question-answering backend services (e.g., Databricks Genie)
//! - Conversation-mapping stores (e.g., in-memory)
//!
//! Each service module defines both generic traits and concrete implementations,
//! allowing for extensibility and easy testing.

pub mod chat;
pub mod genie;
pub mod store;
