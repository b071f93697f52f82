//! # atlassian-backup
//! Exports Confluence and Jira cloud backups, downloads them, and keeps a pruned offsite copy
//! in S3.
//!

pub mod cli;
pub mod config;
pub mod context;
pub mod download;
pub mod export;
pub mod progress;
pub mod retention;
pub mod service;
pub mod session;
pub mod storage;
