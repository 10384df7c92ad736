use std::collections::HashMap;

use compact_str::CompactString;
use serde_json::Value;

use super::{CodecError, DomainEvent};

type DecodeFn = dyn Fn(&[u8]) -> Result<Value, CodecError> + Send + Sync;

/// Maps event type names to payload decoders.
///
/// Registered types are decoded through their concrete Rust type, which
/// validates the payload. Anything else is passed through as JSON when it
/// parses, or as a base64 string when it does not.
#[derive(Default)]
pub struct EventTypeRegistry {
    decoders: HashMap<CompactString, Box<DecodeFn>>,
}

impl EventTypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a domain event type under its [`DomainEvent::TYPE_NAME`].
    pub fn register<E: DomainEvent>(mut self) -> Self {
        self.decoders.insert(
            CompactString::const_new(E::TYPE_NAME),
            Box::new(|payload: &[u8]| {
                let event: E = serde_json::from_slice(payload).map_err(|e| CodecError::Decode {
                    type_name: CompactString::const_new(E::TYPE_NAME),
                    reason: e.to_string(),
                })?;
                Ok(serde_json::to_value(&event)?)
            }),
        );
        self
    }

    pub fn is_registered(&self, type_name: &str) -> bool {
        self.decoders.contains_key(type_name)
    }

    /// Decode `payload` into the JSON body of a representation.
    pub fn decode(&self, type_name: &str, payload: &[u8]) -> Result<Value, CodecError> {
        if let Some(decode) = self.decoders.get(type_name) {
            return decode(payload);
        }
        match serde_json::from_slice(payload) {
            Ok(value) => Ok(value),
            Err(_) => Ok(Value::String(
                fast32::base64::RFC4648_NOPAD.encode(payload),
            )),
        }
    }
}

impl std::fmt::Debug for EventTypeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventTypeRegistry")
            .field("types", &self.decoders.keys().collect::<Vec<_>>())
            .finish()
    }
}
