extern crate self as lotus_core;

pub mod log;
pub mod panic;
