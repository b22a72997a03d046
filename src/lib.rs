//! Community Post Watcher library.
//!
//! A service that periodically scrapes YouTube channel community pages,
//! detects newly published posts, and hands notification events to a
//! delivery boundary.

pub mod channels;
pub mod community;
pub mod config;
pub mod constants;
pub mod db;
pub mod monitor;
