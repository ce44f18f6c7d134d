//! Pure pipeline logic: wire types, extraction, normalization and settlement.
//! No I/O happens here.

pub mod extract;
pub mod immutability;
pub mod invariants;
pub mod normalize;
pub mod settle;
pub mod transcript;
pub mod types;
