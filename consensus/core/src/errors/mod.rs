pub mod config;
pub mod tx;
