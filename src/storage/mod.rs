//! Persistence boundary.
//!
//! The engine persists everything through a key-value `PersistentStore`;
//! any durable store satisfying the trait works. Values are JSON documents
//! and keys are namespaced per tenant (`scheduled_reminders:{tenant}` etc.),
//! with a flat index key listing known tenants so the processor can poll
//! across all of them.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

pub use memory::MemoryStore;

/// Index key listing every tenant that has scheduled reminders
pub const TENANT_INDEX_KEY: &str = "reminder_tenants";

/// Per-tenant settings collection key
pub fn settings_key(tenant_id: &str) -> String {
    format!("reminder_settings:{tenant_id}")
}

/// Per-tenant scheduled reminder collection key
pub fn reminders_key(tenant_id: &str) -> String {
    format!("scheduled_reminders:{tenant_id}")
}

/// Per-tenant delivery log collection key
pub fn delivery_logs_key(tenant_id: &str) -> String {
    format!("delivery_logs:{tenant_id}")
}

/// Durable key-value storage for settings, reminders, and delivery logs.
///
/// Implementations only need atomic whole-value get/put; the repositories
/// serialize their own read-modify-write cycles.
#[async_trait]
pub trait PersistentStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn put(&self, key: &str, value: String) -> Result<()>;
    async fn remove(&self, key: &str) -> Result<()>;
}
