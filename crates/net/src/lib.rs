#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! HTTP client, streaming package download, and progress callback delivery

mod client;
mod download;
mod report;

pub use client::NetClient;
pub use download::{fetch_package, verify_package, DownloadOutcome, DownloadRequest};
pub use report::ProgressReporter;
