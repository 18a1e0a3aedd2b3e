//! Signed token layer: claim payloads and the HMAC codec.

pub mod claims;
pub mod codec;
