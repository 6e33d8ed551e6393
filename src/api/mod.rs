//! Backend access.
//!
//! - [`transport`]: Request/envelope types, the `Transport` seam and the reqwest client
//! - [`filter`]: Cache-first resolution of an issued request
//! - [`client`]: The named SDK operations

pub mod client;
pub mod filter;
pub mod transport;
