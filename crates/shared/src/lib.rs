//! # Shared
//! Ambient components shared between the backup binaries.
//!

#![warn(missing_docs)]

mod logger;

pub use logger::{LoggerError, LoggerGuards, LoggerOptions, init_logger};
