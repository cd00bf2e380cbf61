use bytes::Bytes;
use serde::{Serialize, de::DeserializeOwned};

/// Schema wrapper for everything jobwatch itself publishes on the bus
/// (queue notifications, dead-letter records).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct DomainPayload<T> {
    /// Schema version, bumped on breaking changes.
    pub v: u32,

    /// Publish time (unix millis).
    pub ts: u64,

    /// Consumer-facing dedup key, unique per logical event.
    pub id: String,

    pub data: T,
}

impl<T: Serialize> DomainPayload<T> {
    pub fn new(v: u32, id: impl Into<String>, data: T) -> Self {
        Self {
            v,
            ts: crate::now_millis(),
            id: id.into(),
            data,
        }
    }

    /// # Errors
    /// Returns a `serde_json::Error` if serialization fails.
    pub fn to_bytes(&self) -> Result<Bytes, serde_json::Error> {
        serde_json::to_vec(self).map(Bytes::from)
    }
}

impl<T: DeserializeOwned> DomainPayload<T> {
    /// # Errors
    /// Returns a `serde_json::Error` if the bytes are not a valid payload.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
    struct QueuedAlert {
        job: String,
        attempt: u32,
    }

    #[test]
    fn wire_format_has_required_fields() {
        let payload = DomainPayload::new(
            1,
            "3f2a",
            QueuedAlert {
                job: "etl-1".into(),
                attempt: 1,
            },
        );

        let json: serde_json::Value = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["v"], 1);
        assert_eq!(json["id"], "3f2a");
        assert_eq!(json["data"]["job"], "etl-1");
        assert!(json["ts"].as_u64().unwrap() > 0);
    }

    #[test]
    fn from_bytes_rejects_missing_envelope_fields() {
        let result: Result<DomainPayload<QueuedAlert>, _> =
            DomainPayload::from_bytes(br#"{"job":"etl-1","attempt":1}"#);
        assert!(result.is_err());
    }

    #[test]
    fn decodes_what_it_encodes() {
        let payload = DomainPayload::new(
            2,
            "k",
            QueuedAlert {
                job: "etl-9".into(),
                attempt: 3,
            },
        );
        let bytes = payload.to_bytes().unwrap();
        let back: DomainPayload<QueuedAlert> = DomainPayload::from_bytes(&bytes).unwrap();
        assert_eq!(back.v, 2);
        assert_eq!(back.data, payload.data);
        assert_eq!(back.ts, payload.ts);
    }
}
