//! Network address helpers.

pub mod ip;

pub use ip::{is_ipv4, is_ipv6};
