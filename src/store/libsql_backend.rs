//! libSQL backend, the async `Database` trait implementation.
//!
//! Supports local file and in-memory databases.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info, warn};

use crate::error::DatabaseError;
use crate::flow::{CallerIdentity, FlowState, Line, UserProfile};
use crate::store::migrations;
use crate::store::traits::Database;

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.run_migrations().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.run_migrations().await?;
        Ok(backend)
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

/// Convert `Option<&str>` to libsql Value.
fn opt_text(s: Option<&str>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s.to_string()),
        None => libsql::Value::Null,
    }
}

/// Map a `conversation_state` row to a FlowState.
///
/// Column order: 0:flow, 1:step, 2:data, 3:line.
///
/// Undecodable field data is dropped and the step blanked, so the engine
/// restarts the flow instead of continuing with half a record.
fn row_to_flow_state(row: &libsql::Row) -> Result<FlowState, libsql::Error> {
    let flow: String = row.get(0)?;
    let step: String = row.get(1)?;
    let data: String = row.get::<String>(2).unwrap_or_else(|_| "{}".into());
    let line: String = row.get(3)?;

    let mut state = FlowState::new(flow, step, Line::parse(&line));
    match serde_json::from_str::<BTreeMap<String, String>>(&data) {
        Ok(fields) => state.collected_fields = fields,
        Err(e) => {
            warn!(error = %e, step = %state.current_step, "Discarding undecodable flow data");
            state.current_step = String::new();
        }
    }
    Ok(state)
}

/// Map a `users` row to a UserProfile.
///
/// Column order: 0:phone, 1:name, 2:prison_id, 3:affiliate_code, 4:created_at, 5:updated_at
fn row_to_profile(row: &libsql::Row) -> Result<UserProfile, libsql::Error> {
    let created_at: String = row.get(4)?;
    let updated_at: String = row.get(5)?;
    Ok(UserProfile {
        phone: row.get(0)?,
        name: row.get(1).ok(),
        prison_id: row.get(2).ok(),
        affiliate_code: row.get(3).ok(),
        created_at: parse_datetime(&created_at),
        updated_at: parse_datetime(&updated_at),
    })
}

#[async_trait]
impl Database for LibSqlBackend {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    // ── Flow state ──────────────────────────────────────────────────

    async fn load_flow_state(
        &self,
        identity: &CallerIdentity,
    ) -> Result<Option<FlowState>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT flow, step, data, line FROM conversation_state
                 WHERE phone = ?1 AND line = ?2",
                params![identity.phone.as_str(), identity.line.as_str()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("load_flow_state: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let state = row_to_flow_state(&row)
                    .map_err(|e| DatabaseError::Query(format!("load_flow_state row: {e}")))?;
                debug!(%identity, step = %state.current_step, "Loaded flow state");
                Ok(Some(state))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("load_flow_state: {e}"))),
        }
    }

    async fn save_flow_state(
        &self,
        identity: &CallerIdentity,
        state: &FlowState,
    ) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        let data = serde_json::to_string(&state.collected_fields)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;

        self.conn()
            .execute(
                "INSERT INTO conversation_state (phone, line, flow, step, data, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT (phone, line) DO UPDATE SET
                    flow = ?3, step = ?4, data = ?5, updated_at = ?6",
                params![
                    identity.phone.as_str(),
                    identity.line.as_str(),
                    state.flow_name.as_str(),
                    state.current_step.as_str(),
                    data,
                    now
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("save_flow_state: {e}")))?;

        debug!(%identity, step = %state.current_step, "Saved flow state");
        Ok(())
    }

    async fn clear_flow_state(&self, identity: &CallerIdentity) -> Result<bool, DatabaseError> {
        let count = self
            .conn()
            .execute(
                "DELETE FROM conversation_state WHERE phone = ?1 AND line = ?2",
                params![identity.phone.as_str(), identity.line.as_str()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("clear_flow_state: {e}")))?;
        Ok(count > 0)
    }

    // ── Users ───────────────────────────────────────────────────────

    async fn upsert_profile(&self, profile: &UserProfile) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO users (phone, name, prison_id, affiliate_code, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT (phone) DO UPDATE SET
                    name = ?2, prison_id = ?3, affiliate_code = ?4, updated_at = ?6",
                params![
                    profile.phone.as_str(),
                    opt_text(profile.name.as_deref()),
                    opt_text(profile.prison_id.as_deref()),
                    opt_text(profile.affiliate_code.as_deref()),
                    profile.created_at.to_rfc3339(),
                    profile.updated_at.to_rfc3339()
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("upsert_profile: {e}")))?;
        Ok(())
    }

    async fn get_profile(&self, phone: &str) -> Result<Option<UserProfile>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT phone, name, prison_id, affiliate_code, created_at, updated_at
                 FROM users WHERE phone = ?1",
                params![phone],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_profile: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => row_to_profile(&row)
                .map(Some)
                .map_err(|e| DatabaseError::Query(format!("get_profile row: {e}"))),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_profile: {e}"))),
        }
    }

    // ── Preferences ─────────────────────────────────────────────────

    async fn set_preference(
        &self,
        phone: &str,
        key: &str,
        value: &str,
    ) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO user_preferences (phone, key, value, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (phone, key) DO UPDATE SET value = ?3, updated_at = ?4",
                params![phone, key, value, Utc::now().to_rfc3339()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("set_preference: {e}")))?;
        debug!(phone, key, "Saved preference");
        Ok(())
    }

    async fn get_preference(
        &self,
        phone: &str,
        key: &str,
    ) -> Result<Option<String>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT value FROM user_preferences WHERE phone = ?1 AND key = ?2",
                params![phone, key],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_preference: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => row
                .get::<String>(0)
                .map(Some)
                .map_err(|e| DatabaseError::Query(format!("get_preference row: {e}"))),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_preference: {e}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::FlowEngine;

    async fn test_db() -> LibSqlBackend {
        LibSqlBackend::new_memory().await.unwrap()
    }

    fn caller() -> CallerIdentity {
        CallerIdentity::new("+15551234567", Line::Onboarding)
    }

    fn sample_state() -> FlowState {
        let mut state = FlowState::new("onboard", "ask_prison_id", Line::Onboarding);
        state
            .collected_fields
            .insert("name".into(), "Jordan Lee".into());
        state
    }

    // ── Flow state tests ────────────────────────────────────────────

    #[tokio::test]
    async fn save_then_load_roundtrip() {
        let db = test_db().await;
        let state = sample_state();
        db.save_flow_state(&caller(), &state).await.unwrap();

        let loaded = db.load_flow_state(&caller()).await.unwrap().unwrap();
        assert_eq!(loaded, state);
    }

    #[tokio::test]
    async fn missing_state_is_none() {
        let db = test_db().await;
        assert!(db.load_flow_state(&caller()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn last_write_wins() {
        let db = test_db().await;
        db.save_flow_state(&caller(), &sample_state()).await.unwrap();

        let mut newer = sample_state();
        newer.current_step = "ask_affiliate".into();
        newer
            .collected_fields
            .insert("prison_id".into(), "48213".into());
        db.save_flow_state(&caller(), &newer).await.unwrap();

        let loaded = db.load_flow_state(&caller()).await.unwrap().unwrap();
        assert_eq!(loaded, newer);
    }

    #[tokio::test]
    async fn identities_are_isolated() {
        let db = test_db().await;
        let same_phone_other_line = CallerIdentity::new("+15551234567", Line::Normal);
        let other_phone = CallerIdentity::new("+15559876543", Line::Onboarding);

        db.save_flow_state(&caller(), &sample_state()).await.unwrap();
        assert!(db.load_flow_state(&same_phone_other_line).await.unwrap().is_none());
        assert!(db.load_flow_state(&other_phone).await.unwrap().is_none());

        db.save_flow_state(&other_phone, &FlowState::new("onboard", "ask_name", Line::Onboarding))
            .await
            .unwrap();
        assert!(db.clear_flow_state(&other_phone).await.unwrap());
        assert_eq!(
            db.load_flow_state(&caller()).await.unwrap().unwrap(),
            sample_state()
        );
    }

    #[tokio::test]
    async fn clear_reports_whether_row_existed() {
        let db = test_db().await;
        db.save_flow_state(&caller(), &sample_state()).await.unwrap();
        assert!(db.clear_flow_state(&caller()).await.unwrap());
        assert!(db.load_flow_state(&caller()).await.unwrap().is_none());
        assert!(!db.clear_flow_state(&caller()).await.unwrap());
    }

    #[tokio::test]
    async fn corrupt_data_loads_as_resettable_state() {
        let db = test_db().await;
        db.conn()
            .execute(
                "INSERT INTO conversation_state (phone, line, flow, step, data)
                 VALUES (?1, 'onboarding', 'onboard', 'ask_affiliate', 'not json')",
                params!["+15551234567"],
            )
            .await
            .unwrap();

        let loaded = db.load_flow_state(&caller()).await.unwrap().unwrap();
        assert!(loaded.collected_fields.is_empty());

        let out = FlowEngine::new().current_prompt(&loaded);
        assert_eq!(out.state.current_step, "ask_has_account");
    }

    #[tokio::test]
    async fn on_disk_database_persists_across_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("aicon.db");

        {
            let db = LibSqlBackend::new_local(&path).await.unwrap();
            db.save_flow_state(&caller(), &sample_state()).await.unwrap();
        }

        let db = LibSqlBackend::new_local(&path).await.unwrap();
        let loaded = db.load_flow_state(&caller()).await.unwrap().unwrap();
        assert_eq!(loaded, sample_state());
    }

    // ── Profile tests ───────────────────────────────────────────────

    #[tokio::test]
    async fn profile_upsert_and_get() {
        let db = test_db().await;
        let mut fields = BTreeMap::new();
        fields.insert("name".to_string(), "Jordan Lee".to_string());
        fields.insert("prison_id".to_string(), "48213".to_string());
        fields.insert("affiliate_code".to_string(), String::new());
        let profile = UserProfile::from_fields("+15551234567", &fields);

        db.upsert_profile(&profile).await.unwrap();
        let fetched = db.get_profile("+15551234567").await.unwrap().unwrap();
        assert_eq!(fetched.name.as_deref(), Some("Jordan Lee"));
        assert_eq!(fetched.prison_id.as_deref(), Some("48213"));
        assert!(fetched.affiliate_code.is_none());

        let mut updated = profile.clone();
        updated.affiliate_code = Some("REF42".into());
        db.upsert_profile(&updated).await.unwrap();
        let fetched = db.get_profile("+15551234567").await.unwrap().unwrap();
        assert_eq!(fetched.affiliate_code.as_deref(), Some("REF42"));
    }

    // ── Preference tests ────────────────────────────────────────────

    #[tokio::test]
    async fn preference_set_overwrites_per_phone() {
        let db = test_db().await;
        assert!(db.get_preference("+15551234567", "voice").await.unwrap().is_none());

        db.set_preference("+15551234567", "voice", "amy").await.unwrap();
        db.set_preference("+15551234567", "voice", "brian").await.unwrap();
        db.set_preference("+15559876543", "voice", "amy").await.unwrap();

        assert_eq!(
            db.get_preference("+15551234567", "voice").await.unwrap().as_deref(),
            Some("brian")
        );
        assert_eq!(
            db.get_preference("+15559876543", "voice").await.unwrap().as_deref(),
            Some("amy")
        );
    }

    #[tokio::test]
    async fn get_missing_profile() {
        let db = test_db().await;
        assert!(db.get_profile("+10000000000").await.unwrap().is_none());
    }
}
