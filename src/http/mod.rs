//! HTTP byte ranges.
//!
//! - **`range`**: parses `Range` request headers into byte ranges and
//!   formats `Content-Range` values
//! - **`transport`**: connection settings for the client, built from
//!   optional configuration values
//! - **`client`**: an HTTP/1.1 client that downloads byte ranges
//!
//! # Example
//!
//! ```
//! use rangekit::http::range::{parse_range, ByteRange, RangeError};
//!
//! let ranges = parse_range("bytes=0-99,-100", 1000).unwrap();
//! assert_eq!(ranges, vec![ByteRange::new(0, 100), ByteRange::new(900, 100)]);
//! assert_eq!(ranges[1].content_range(1000), "bytes 900-999/1000");
//!
//! assert_eq!(parse_range("bytes=2000-", 1000), Err(RangeError::NoOverlap));
//! ```

pub mod client;
pub mod range;
pub mod transport;

pub use client::{RangeClient, RangePart};
pub use range::{parse_range, ByteRange, RangeError};
pub use transport::{Transport, TransportOpts};
