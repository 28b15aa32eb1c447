use crate::error::{ErrorKind, Result};
use crate::{BibEntry, EnDecoder, Metadata, Value};
use exn::ResultExt;
use tracing::instrument;

/// JSON encoding for both metadata and bibliography files.
///
/// Output is pretty-printed with a trailing newline so the files diff
/// cleanly under version control. Field order is preserved.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonEnDecoder;

impl JsonEnDecoder {
    fn pretty<T: serde::Serialize>(value: &T, what: &'static str) -> Result<Vec<u8>> {
        let mut raw = serde_json::to_vec_pretty(value).or_raise(|| ErrorKind::Encode(what))?;
        raw.push(b'\n');
        Ok(raw)
    }
}

impl EnDecoder for JsonEnDecoder {
    fn metadata_extension(&self) -> &str {
        "json"
    }

    fn bibdata_extension(&self) -> &str {
        "json"
    }

    fn encode_metadata(&self, metadata: &Metadata) -> Result<Vec<u8>> {
        // JSON has no NaN or infinity; serde_json would write them as null.
        if !metadata.values().all(Value::is_finite) {
            exn::bail!(ErrorKind::Encode("metadata"));
        }
        Self::pretty(metadata, "metadata")
    }

    #[instrument(level = "trace", skip(raw), fields(raw_size = raw.len()))]
    fn decode_metadata(&self, raw: &[u8]) -> Result<Metadata> {
        serde_json::from_slice(raw).or_raise(|| ErrorKind::Malformed("metadata"))
    }

    /// Refuses what [`decode_bibdata`](EnDecoder::decode_bibdata) would
    /// reject on read-back: no entries, or a non-finite float.
    fn encode_bibdata(&self, bibdata: &BibEntry) -> Result<Vec<u8>> {
        if bibdata.is_empty() || !bibdata.values().flat_map(|fields| fields.values()).all(Value::is_finite) {
            exn::bail!(ErrorKind::Encode("bibliography data"));
        }
        Self::pretty(bibdata, "bibliography data")
    }

    #[instrument(level = "trace", skip(raw), fields(raw_size = raw.len()))]
    fn decode_bibdata(&self, raw: &[u8]) -> Result<BibEntry> {
        let bibdata: BibEntry = serde_json::from_slice(raw).or_raise(|| ErrorKind::Malformed("bibliography data"))?;
        if bibdata.is_empty() {
            exn::bail!(ErrorKind::Malformed("bibliography data"));
        }
        Ok(bibdata)
    }
}
