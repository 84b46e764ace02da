//! rangekit - HTTP byte-range toolkit
//!
//! Range header parsing, client transport settings and a small range
//! download client.

pub mod config;
pub mod http;
pub mod net;
