//! Core domain + application logic for the article publishing bot.
//!
//! This crate is framework-agnostic. Telegram / OpenAI / Unsplash / WordPress
//! live behind ports (traits) implemented in adapter crates.

pub mod batch;
pub mod config;
pub mod domain;
pub mod errors;
pub mod formatting;
pub mod logging;
pub mod messaging;
pub mod ports;
pub mod scheduler;
pub mod security;
pub mod supervisor;
pub mod topics;
pub mod utils;

pub use errors::{Error, Result};
