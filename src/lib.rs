//! Soundbox - speaks incoming crypto payments in rupees
//!
//! This library exports core modules for testing and reuse by the binary.

/// Amount rendering into clip sequences
pub mod announce;
/// Playback devices and the sequenced player
pub mod audio;
/// Chain subscription and exchange rate
pub mod chain;
/// Configuration management
pub mod config;
/// Last-transaction ledger
pub mod ledger;
/// Transaction handling loop
pub mod soundbox;
/// Logging setup
pub mod telemetry;
