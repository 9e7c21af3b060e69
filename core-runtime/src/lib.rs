//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure for the playback client:
//! - Logging and tracing infrastructure
//! - Configuration management
//! - Event bus system
//! - Task scheduling primitives
//!
//! ## Overview
//!
//! This crate contains the runtime utilities the other crates depend on. It
//! establishes the logging conventions, the configuration surface, the event
//! broadcasting mechanism, and the cancelable timers used for the watchdog,
//! the skip grace delay and the reconnect loop.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod tasks;

pub use error::{Error, Result};
