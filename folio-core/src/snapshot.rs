use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Full serializable state of a project whiteboard.
///
/// The document is opaque here: it is loaded, replaced and saved wholesale,
/// never inspected or merged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanvasSnapshot {
    document: Value,
}

impl CanvasSnapshot {
    pub fn new(document: Value) -> Self {
        Self { document }
    }

    /// An empty whiteboard (`{}`).
    pub fn empty() -> Self {
        Self {
            document: Value::Object(Default::default()),
        }
    }

    pub fn document(&self) -> &Value {
        &self.document
    }

    pub fn into_document(self) -> Value {
        self.document
    }

    /// JSON encoding used for storage and transport.
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(&self.document)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        Ok(Self {
            document: serde_json::from_slice(bytes)?,
        })
    }
}

impl Default for CanvasSnapshot {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_bytes_round_trip() {
        let snapshot = CanvasSnapshot::new(json!({
            "shapes": [{ "id": "s1", "type": "rect", "x": 10, "y": 20 }],
            "camera": { "zoom": 1.5 }
        }));
        let bytes = snapshot.to_bytes().unwrap();
        assert_eq!(CanvasSnapshot::from_bytes(&bytes).unwrap(), snapshot);
    }

    #[test]
    fn test_empty_is_object() {
        assert_eq!(CanvasSnapshot::default().document(), &json!({}));
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(CanvasSnapshot::from_bytes(b"{not json").is_err());
    }
}
