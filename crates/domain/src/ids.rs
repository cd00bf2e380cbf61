use crate::error::DomainError;

const MAX_LEN: usize = 255;

/// Non-empty, bounded, printable. Upstream runners are lax about the
/// alphabet, so anything without control characters is accepted.
fn is_valid_identifier(s: &str) -> bool {
    !s.trim().is_empty() && s.len() <= MAX_LEN && !s.chars().any(char::is_control)
}

macro_rules! validated_id {
    ($name:ident, $err:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            pub fn new(raw: &str) -> Result<Self, DomainError> {
                if !is_valid_identifier(raw) {
                    return Err(DomainError::$err(raw.to_string()));
                }
                Ok(Self(raw.to_string()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = DomainError;
            fn try_from(s: String) -> Result<Self, Self::Error> {
                Self::new(&s)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> String {
                id.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

validated_id!(JobName, InvalidJobName);
validated_id!(RunId, InvalidRunId);
