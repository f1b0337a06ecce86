//! Codec for the FS4 transport spoken between search dispatchers and search
//! nodes.
//!
//! [`frame::Codec`] turns whole packets into bytes and back; the per-family
//! bodies live in [`messages`] and the feature flag registry in [`features`].

use config::ByteOrder;
use errors::Result;

pub mod config;
pub mod errors;
pub mod features;
pub mod frame;
pub mod header;
pub mod messages;
pub mod types;

pub use frame::{decode, encode, Codec, Frame, Packet};
pub use header::is_known_code;

/// Bodies with a fixed layout and no feature word.
pub trait Serializable {
    fn to_bytes(&self, byte_order: ByteOrder) -> Result<Vec<u8>>;

    fn from_bytes(bytes: &[u8], byte_order: ByteOrder) -> Result<Self>
    where
        Self: Sized;
}
