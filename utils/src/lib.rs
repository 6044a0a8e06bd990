//! General purpose utilities shared across the Lotus workspace.

pub mod mem_size;
