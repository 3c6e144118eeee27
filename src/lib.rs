//! beo-split - split banquet event order packets into one PDF per event.
//!
//! The [`split`] module is the core: it classifies each page of a packet by
//! the BEO number printed on it and writes one PDF per number, plus review
//! files for pages it could not place. The remaining modules wrap that in an
//! upload service that archives, publishes and emails the results.

pub mod cli;
pub mod config;
pub mod models;
pub mod rate_limit;
pub mod repository;
pub mod schema;
pub mod server;
pub mod services;
pub mod split;
