use stride_core::{ActivityRecord, SyncCheckpoint};

use crate::StorageError;

pub fn encode_record(record: &ActivityRecord) -> Result<Vec<u8>, StorageError> {
    Ok(serde_json::to_vec(record)?)
}

pub fn decode_record(bytes: &[u8]) -> Result<ActivityRecord, StorageError> {
    Ok(serde_json::from_slice(bytes)?)
}

pub fn encode_checkpoint(checkpoint: &SyncCheckpoint) -> Result<String, StorageError> {
    Ok(serde_json::to_string(checkpoint)?)
}

pub fn decode_checkpoint(s: &str) -> Result<SyncCheckpoint, StorageError> {
    Ok(serde_json::from_str(s)?)
}
