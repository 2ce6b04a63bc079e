//! Driftchat protocol library: stored-row and wire types, the
//! chunking/reassembly protocol for oversized payloads, and the postcard
//! wire codec.

pub mod chunk;
pub mod codec;
pub mod message;
