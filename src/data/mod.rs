//! Data ingestion and storage
//!
//! Spreadsheet/CSV upload parsing and the SQLite prediction log.

pub mod database;
pub mod ingest;

pub use database::{RecordStore, StoreStats};
pub use ingest::{check_filename, parse_file, parse_upload, FileKind, IngestedTable};
