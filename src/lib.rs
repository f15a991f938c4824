#![doc = include_str!("../README.md")]
pub mod app;
pub mod audio;
pub mod config;
pub mod daemon;
pub mod error;
pub mod inject;
pub mod logging;
pub mod recognize;
pub mod server;
pub mod transcript;
