pub mod config;
pub mod ddl;
pub mod duration;
pub mod error;
pub mod fingerprint;
pub mod models;
pub mod spec_file;

/// Current time as unix seconds, the unit of every status timestamp.
pub fn now_unix() -> i64 {
    chrono::Utc::now().timestamp()
}
