//! Unified `Database` trait, the single async interface for all persistence.

use async_trait::async_trait;

use crate::error::DatabaseError;
use crate::flow::{CallerIdentity, FlowState, UserProfile};

/// Backend-agnostic database trait covering flow state and user profiles.
///
/// A missing row is a normal outcome (`Ok(None)`), never an error.
#[async_trait]
pub trait Database: Send + Sync {
    /// Run all pending schema migrations.
    async fn run_migrations(&self) -> Result<(), DatabaseError>;

    // ── Flow state ──────────────────────────────────────────────────

    /// Load the active flow for a caller, if any.
    async fn load_flow_state(
        &self,
        identity: &CallerIdentity,
    ) -> Result<Option<FlowState>, DatabaseError>;

    /// Save (insert or overwrite) a caller's flow state.
    async fn save_flow_state(
        &self,
        identity: &CallerIdentity,
        state: &FlowState,
    ) -> Result<(), DatabaseError>;

    /// Remove a caller's flow state. Returns whether a row existed.
    async fn clear_flow_state(&self, identity: &CallerIdentity) -> Result<bool, DatabaseError>;

    // ── Users ───────────────────────────────────────────────────────

    /// Insert or update a user profile, keyed by phone number.
    async fn upsert_profile(&self, profile: &UserProfile) -> Result<(), DatabaseError>;

    /// Get a user profile by phone number.
    async fn get_profile(&self, phone: &str) -> Result<Option<UserProfile>, DatabaseError>;

    // ── Preferences ─────────────────────────────────────────────────

    /// Set a per-phone preference (e.g. `voice`), overwriting any previous value.
    async fn set_preference(&self, phone: &str, key: &str, value: &str)
    -> Result<(), DatabaseError>;

    /// Get a per-phone preference.
    async fn get_preference(&self, phone: &str, key: &str)
    -> Result<Option<String>, DatabaseError>;
}
