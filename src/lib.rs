pub mod app;
pub mod auth;
pub mod client;
pub mod config;
pub mod detections;
pub mod error;
pub mod extract;
pub mod state;
pub mod storage;

#[cfg(test)]
pub(crate) mod test_support;
