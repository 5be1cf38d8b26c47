use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One decoded presence event for a single tag.
///
/// `anchor` is the positional reference the tag was last ranged against;
/// the three flags describe the tag's positional state at emission time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagEvent {
    pub tag_id: String,
    pub anchor: String,
    pub in_line: bool,
    pub in_poste: bool,
    pub is_strange: bool,
}

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("malformed batch payload: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Decodes one transport batch into its events.
///
/// A batch is a JSON array of event objects. Any structural defect in the
/// payload (not an array, a missing field, a mistyped field) rejects the
/// whole batch; the caller logs and drops it without stopping ingestion.
pub fn decode_batch(payload: &[u8]) -> Result<Vec<TagEvent>, DecodeError> {
    Ok(serde_json::from_slice(payload)?)
}
