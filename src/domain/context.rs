//! Operation Context
//!
//! Free-form provenance carried alongside a command: source system, acting user,
//! trace id, and the logical `command_id` used for idempotency at the event store.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Context for an operation, used for idempotency, auditing, and tracing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationContext {
    /// Logical identity of the command invocation. Two invocations with the same
    /// `command_id` against the same aggregate are treated as the same operation.
    pub command_id: Uuid,

    /// Identifier of the actor (user, service) issuing the command.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,

    /// Name of the originating system, for commands arriving from an external
    /// adapter (e.g. CRM ingestion) rather than a first-party caller.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    /// Correlation/trace id for cross-service tracing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<Uuid>,
}

impl OperationContext {
    /// Create a new context with a freshly generated `command_id`.
    pub fn new() -> Self {
        Self {
            command_id: Uuid::new_v4(),
            actor: None,
            source: None,
            trace_id: None,
        }
    }

    /// Create a context for a specific, caller-supplied `command_id` (the common
    /// case: the caller wants idempotent retries to reuse the same id).
    pub fn with_command_id(command_id: Uuid) -> Self {
        Self {
            command_id,
            actor: None,
            source: None,
            trace_id: None,
        }
    }

    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_trace_id(mut self, trace_id: Uuid) -> Self {
        self.trace_id = Some(trace_id);
        self
    }

    /// Generate a new trace id if not present, and return it.
    pub fn ensure_trace_id(&mut self) -> Uuid {
        *self.trace_id.get_or_insert_with(Uuid::new_v4)
    }

    /// Serialize this context into the event `metadata` JSON blob. `command_id`
    /// is always present — it's what `EventStore::append` keys its idempotency
    /// check on — the rest are included only when set.
    pub fn to_metadata(&self) -> serde_json::Value {
        let mut metadata = serde_json::json!({ "command_id": self.command_id });
        let map = metadata.as_object_mut().expect("object literal");
        if let Some(actor) = &self.actor {
            map.insert("actor".to_string(), serde_json::Value::String(actor.clone()));
        }
        if let Some(source) = &self.source {
            map.insert("source".to_string(), serde_json::Value::String(source.clone()));
        }
        if let Some(trace_id) = &self.trace_id {
            map.insert("trace_id".to_string(), serde_json::Value::String(trace_id.to_string()));
        }
        metadata
    }
}

impl Default for OperationContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_builder() {
        let command_id = Uuid::new_v4();
        let trace_id = Uuid::new_v4();

        let context = OperationContext::with_command_id(command_id)
            .with_actor("alice")
            .with_trace_id(trace_id);

        assert_eq!(context.command_id, command_id);
        assert_eq!(context.actor.as_deref(), Some("alice"));
        assert_eq!(context.trace_id, Some(trace_id));
    }

    #[test]
    fn test_ensure_trace_id() {
        let mut context = OperationContext::new();
        assert!(context.trace_id.is_none());

        let id = context.ensure_trace_id();
        assert!(context.trace_id.is_some());
        assert_eq!(context.trace_id.unwrap(), id);

        let id2 = context.ensure_trace_id();
        assert_eq!(id, id2);
    }
}
