//! Store trait definitions

use adwarden_api::{EntitySetting, SettingDefaults, SettingPatch};
use adwarden_util::{EntityId, ShiftWindow};
use std::collections::BTreeMap;

use crate::{AuditEvent, StoreResult};

/// Main store trait
///
/// Mutations are last-write-wins per row. Nothing here caches platform
/// run-state; that is always read fresh from the platform.
pub trait Store: Send + Sync {
    // Entity settings

    /// Fetch the setting for an entity, creating it from `defaults` if absent
    fn get_or_create_setting(
        &self,
        id: &EntityId,
        defaults: &SettingDefaults,
    ) -> StoreResult<EntitySetting>;

    /// Fetch the setting for an entity without creating it
    fn get_setting(&self, id: &EntityId) -> StoreResult<Option<EntitySetting>>;

    /// Apply a patch to an existing setting. Unknown ids are `EntityNotFound`.
    fn update_setting(&self, id: &EntityId, patch: &SettingPatch) -> StoreResult<EntitySetting>;

    /// Apply the same patch to every listed setting, all or nothing
    fn update_settings_bulk(&self, ids: &[EntityId], patch: &SettingPatch) -> StoreResult<usize>;

    /// All settings, ordered by entity id
    fn list_settings(&self) -> StoreResult<Vec<EntitySetting>>;

    /// Clear `frozen` on every setting, returning how many were frozen
    fn clear_all_frozen(&self) -> StoreResult<usize>;

    // Shift schedules

    /// Insert shifts that do not exist yet, returning how many were inserted.
    /// Existing shifts keep their stored window.
    fn seed_shifts(&self, shifts: &BTreeMap<String, ShiftWindow>) -> StoreResult<usize>;

    fn list_shifts(&self) -> StoreResult<BTreeMap<String, ShiftWindow>>;

    /// Replace the window of an existing shift. Unknown names are `ShiftNotFound`.
    fn update_shift(&self, name: &str, window: &ShiftWindow) -> StoreResult<()>;

    // Automation master switch

    /// Current master switch value (off on a fresh database)
    fn automation_active(&self) -> StoreResult<bool>;

    /// Flip the master switch, returning the new value
    fn toggle_automation(&self) -> StoreResult<bool>;

    // Audit log

    /// Append an audit event
    fn append_audit(&self, event: AuditEvent) -> StoreResult<()>;

    /// Get recent audit events, newest first
    fn get_recent_audits(&self, limit: usize) -> StoreResult<Vec<AuditEvent>>;

    // Health

    /// Check if store is healthy
    fn is_healthy(&self) -> bool;
}
