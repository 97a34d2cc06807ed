//! Key encoding shared with the storage layer.
//!
//! - [`memcomparable`]: order-preserving integer and byte-string encodings
//! - [`key`]: table row keys and their PD hex form

pub mod key;
pub mod memcomparable;

pub use key::{decode, encode, BoundaryStatus, TableRowKey, TikvKey};
