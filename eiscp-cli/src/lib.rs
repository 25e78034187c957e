//! Line-oriented remote control for eISCP receivers.

pub mod config;
pub mod output;
