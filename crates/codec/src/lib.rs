//! Record types and the encode/decode layer for quire repositories.
//!
//! The broker never looks inside a record; it hands [`Metadata`] and
//! [`BibEntry`] values to an [`EnDecoder`] and stores whatever bytes come
//! back. Shape is only checked here, at the codec boundary.

pub mod error;
mod json;
mod value;

pub use crate::json::JsonEnDecoder;
pub use crate::value::{BibEntry, Fields, Metadata, Value};
use crate::error::Result;
use std::sync::Arc;

pub type CodecHandle = Arc<dyn EnDecoder>;

/// Byte-string to record transforms for the two per-citekey artifacts.
///
/// Decoders must return [`Malformed`](crate::error::ErrorKind::Malformed) for
/// input they cannot make sense of, so that callers can tell a damaged file
/// apart from a missing one.
pub trait EnDecoder: std::fmt::Debug + Send + Sync {
    /// File extension (without the dot) for encoded metadata.
    fn metadata_extension(&self) -> &str;
    /// File extension (without the dot) for encoded bibliography data.
    fn bibdata_extension(&self) -> &str;

    fn encode_metadata(&self, metadata: &Metadata) -> Result<Vec<u8>>;
    fn decode_metadata(&self, raw: &[u8]) -> Result<Metadata>;

    fn encode_bibdata(&self, bibdata: &BibEntry) -> Result<Vec<u8>>;
    /// Decode bibliography bytes. At least one entry must be present.
    fn decode_bibdata(&self, raw: &[u8]) -> Result<BibEntry>;
}
