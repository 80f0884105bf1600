pub mod anchor;
pub mod chain;
pub mod clock;
pub mod config;
pub mod crypto;
pub mod document;
pub mod error;
pub mod funding;
pub mod issuer;
pub mod merkle;
pub mod proof;
pub mod signer;
pub mod telemetry;

#[cfg(test)]
pub(crate) mod test_utils;
