//! Persona chat web server - Library exports for testing
//!
//! Users sign in, pick a character and talk to a generative backend that
//! plays that character. Conversations are persisted per character.

pub mod api;
pub mod config;
pub mod core;
pub mod infrastructure;
