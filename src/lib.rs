//! gleaner: polls registered RSS feeds on a fixed cadence and stores their
//! posts in SQLite.
//!
//! The refresh path is [`scheduler`] → [`feed`] → [`ingest`] → [`storage`];
//! [`commands`] and [`report`] make up the CLI around it.

pub mod commands;
pub mod config;
pub mod feed;
pub mod ingest;
pub mod report;
pub mod scheduler;
pub mod storage;
pub mod util;
