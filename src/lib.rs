//! Hydromate - hydration reminder bot daemon
//!
//! Collects a user's weight, city and wake/sleep window through a multi-step
//! chat wizard, derives a daily water goal and sends periodic drink reminders.

pub mod bot;
pub mod config;
pub mod error;
pub mod profile;
pub mod prompts;
pub mod resolver;
pub mod schedule;
pub mod session;
pub mod telegram;
pub mod tracker;
pub mod transport;
pub mod validate;
pub mod wizard;

pub use error::{Error, Result};
