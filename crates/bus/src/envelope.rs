use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Wire envelope the bus wraps around every message.
///
/// Consumers normally only look at `payload`; the remaining fields are
/// set by the bus at publish time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    /// Bus-generated ULID.
    pub message_id: String,

    /// Routing subject, e.g. `jobwatch.events.job-state-change`.
    pub subject: String,

    /// Unix milliseconds at publish time.
    pub timestamp: u64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,

    /// Opaque payload, base64 in the JSON form.
    #[serde(with = "base64_bytes")]
    pub payload: Bytes,
}

impl Envelope {
    pub fn new(subject: impl Into<String>, payload: Bytes, trace_id: Option<String>) -> Self {
        Self {
            message_id: ulid::Ulid::new().to_string(),
            subject: subject.into(),
            timestamp: crate::now_millis(),
            trace_id,
            payload,
        }
    }
}

mod base64_bytes {
    use base64::{Engine, engine::general_purpose::STANDARD};
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &Bytes, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&STANDARD.encode(data))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Bytes, D::Error> {
        let s = String::deserialize(d)?;
        STANDARD
            .decode(s)
            .map(Bytes::from)
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_is_base64_on_the_wire() {
        let env = Envelope::new("jobwatch.test", Bytes::from_static(b"{\"a\":1}"), None);
        let json = serde_json::to_value(&env).unwrap();
        assert_eq!(json["payload"], "eyJhIjoxfQ==");
        assert!(json.get("trace_id").is_none());

        let back: Envelope = serde_json::from_value(json).unwrap();
        assert_eq!(back.payload, env.payload);
        assert_eq!(back.message_id.len(), 26);
    }
}
