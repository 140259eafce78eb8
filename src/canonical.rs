//! Canonical fingerprints of persisted dialogs.
//!
//! The save worker compares fingerprints to skip writing a snapshot that is
//! identical to the last one it wrote.
//!
//! ## Determinism
//!
//! - Struct fields serialize in declaration order
//! - Node maps are `BTreeMap`s, so keys serialize sorted
//! - Vectors serialize in index order

use serde::Serialize;
use xxhash_rust::xxh64::xxh64;

/// Serialize a value to canonical JSON bytes.
pub fn to_canonical_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(value)
}

/// Compute the canonical hash of a serializable value.
pub fn canonical_hash<T: Serialize>(value: &T) -> Result<u64, serde_json::Error> {
    let bytes = to_canonical_bytes(value)?;
    Ok(xxh64(&bytes, 0))
}

/// Compute the canonical hash as a hex string.
pub fn canonical_hash_hex<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    Ok(format!("{:016x}", canonical_hash(value)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{NodeId, PersistedDialog, PersistedDialogLine, PersistedNode, PersistedNodeData};

    fn dialog_with(ids: &[&str]) -> PersistedDialog {
        let mut dialog = PersistedDialog::new("d1", "Intro", None);
        for id in ids {
            dialog.nodes.insert(
                NodeId::from(*id),
                PersistedNode {
                    id: NodeId::from(*id),
                    pos_x: 0,
                    pos_y: 0,
                    data: PersistedNodeData::Dialog(PersistedDialogLine::default()),
                },
            );
        }
        dialog
    }

    #[test]
    fn test_insertion_order_does_not_matter() {
        let mut a = dialog_with(&["n1", "n2"]);
        let mut b = dialog_with(&["n2", "n1"]);
        b.created_at = a.created_at;
        a.root_node = Some(NodeId::from("n1"));
        b.root_node = Some(NodeId::from("n1"));

        assert_eq!(canonical_hash(&a).unwrap(), canonical_hash(&b).unwrap());
    }

    #[test]
    fn test_content_change_changes_hash() {
        let a = dialog_with(&["n1"]);
        let mut b = a.clone();
        b.name = "Renamed".to_string();

        assert_ne!(canonical_hash_hex(&a).unwrap(), canonical_hash_hex(&b).unwrap());
        assert_eq!(canonical_hash_hex(&a).unwrap().len(), 16);
    }
}
