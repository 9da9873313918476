//! SPL Shield Bot — conversational front end for the SPL Shield risk scanner.

pub mod channels;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod gateway;
pub mod prompts;
pub mod runtime;
pub mod session;
