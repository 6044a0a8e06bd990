//! Core consensus types of the Lotus validation engine: transactions, coins, the coin cache,
//! signature hashing and network parameters.

extern crate self as lotus_consensus_core;

pub mod block;
pub mod config;
pub mod constants;
pub mod errors;
pub mod hashing;
pub mod network;
pub mod sign;
pub mod tx;
pub mod utxo;

/// Block hashes share the 32-byte hash type used across the workspace
pub type BlockHash = lotus_hashes::Hash;

/// Height of a block in the chain
pub type BlockHeight = u32;
