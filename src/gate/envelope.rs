use serde::ser::{Serialize, SerializeMap, Serializer};

/// Uniform response of every gated command.
///
/// Serializes to exactly one of
/// `{"success": true, "data": ...}` or `{"success": false, "error": "..."}`.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandEnvelope<T> {
    Success(T),
    /// User-safe error text.
    Failure(String),
}

impl<T> CommandEnvelope<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, CommandEnvelope::Success(_))
    }

    pub fn data(&self) -> Option<&T> {
        match self {
            CommandEnvelope::Success(data) => Some(data),
            CommandEnvelope::Failure(_) => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            CommandEnvelope::Success(_) => None,
            CommandEnvelope::Failure(e) => Some(e),
        }
    }
}

impl<T: Serialize> Serialize for CommandEnvelope<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2))?;
        match self {
            CommandEnvelope::Success(data) => {
                map.serialize_entry("success", &true)?;
                map.serialize_entry("data", data)?;
            }
            CommandEnvelope::Failure(error) => {
                map.serialize_entry("success", &false)?;
                map.serialize_entry("error", error)?;
            }
        }
        map.end()
    }
}
