//! Event handling and user interactions for genie-bot.
//!
//! This module provides functionality for handling chat events:
//! - Forwarding user questions to Genie and posting the answers
//! - Forwarding feedback button clicks
//! - Coordinating between services (Genie, conversation store, chat)

pub mod feedback;
pub mod question;
