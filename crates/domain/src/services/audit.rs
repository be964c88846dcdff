//! Audit recording for control plane mutations.
//!
//! Every mutating service call hands one entry to an [`AuditSink`]. The sink is
//! fire-and-forget: it never fails the calling operation and entries are never
//! read back by this crate.

use crate::models::{ActorType, AuditAction, AuditEntry, AuditMetadata, MetadataValue};
use chrono::{DateTime, Utc};

/// External audit collaborator.
#[async_trait::async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, entry: AuditEntry);
}

/// Builder for creating audit entries with a fluent API.
#[derive(Debug, Clone)]
pub struct AuditEntryBuilder {
    actor_type: ActorType,
    actor_id: Option<String>,
    action: AuditAction,
    resource_type: String,
    resource_id: Option<String>,
    metadata: AuditMetadata,
}

impl AuditEntryBuilder {
    /// Start an entry for an action taken by an administrator.
    pub fn admin_action(admin_id: Option<&str>, action: AuditAction) -> Self {
        Self {
            actor_type: ActorType::Admin,
            actor_id: admin_id.map(str::to_string),
            action,
            resource_type: String::new(),
            resource_id: None,
            metadata: AuditMetadata::new(),
        }
    }

    /// Start an entry for an action taken by a background job.
    pub fn system_action(action: AuditAction) -> Self {
        Self {
            actor_type: ActorType::System,
            actor_id: None,
            action,
            resource_type: String::new(),
            resource_id: None,
            metadata: AuditMetadata::new(),
        }
    }

    /// Set the resource being acted upon.
    pub fn on_resource(
        mut self,
        resource_type: impl Into<String>,
        resource_id: impl Into<String>,
    ) -> Self {
        self.resource_type = resource_type.into();
        self.resource_id = Some(resource_id.into());
        self
    }

    /// Add one metadata value.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn build(self, timestamp: DateTime<Utc>) -> AuditEntry {
        AuditEntry {
            timestamp,
            actor_type: self.actor_type,
            actor_id: self.actor_id,
            action: self.action,
            resource_type: self.resource_type,
            resource_id: self.resource_id,
            metadata: self.metadata,
        }
    }
}

/// Sink that emits each entry as a structured `tracing` event on the `audit` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

#[async_trait::async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, entry: AuditEntry) {
        let metadata = serde_json::to_string(&entry.metadata).unwrap_or_default();
        tracing::info!(
            target: "audit",
            action = %entry.action,
            actor_type = %entry.actor_type,
            actor_id = entry.actor_id.as_deref().unwrap_or("-"),
            resource_type = %entry.resource_type,
            resource_id = entry.resource_id.as_deref().unwrap_or("-"),
            metadata = %metadata,
            "Audit event"
        );
    }
}
