//! Transaction and block validation of a Lotus node over the coin set.
//!
//! Every transaction goes through the same pipeline: checks in isolation, resolution of its
//! inputs through the coin cache, amount and maturity checks, script verification of each
//! input, and finally the covenant token rules. Only a transaction passing all of them is
//! written to the coin cache.

pub mod chain_state;
pub mod errors;
pub mod processes;
pub mod token_inquirer;
