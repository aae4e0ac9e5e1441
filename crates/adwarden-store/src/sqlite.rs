//! SQLite-based store implementation

use adwarden_api::{dedup_shifts, EntitySetting, SettingDefaults, SettingPatch};
use adwarden_util::{DaysOfWeek, EntityId, ShiftWindow};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info, warn};

use crate::{AuditEvent, Store, StoreError, StoreResult};

/// SQLite-based store
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a store at the given path
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();

        conn.execute_batch(
            r#"
            -- Per-entity automation settings
            CREATE TABLE IF NOT EXISTS entity_settings (
                entity_id TEXT PRIMARY KEY,
                shifts_json TEXT NOT NULL,
                spend_limit_percent REAL NOT NULL,
                frozen INTEGER NOT NULL DEFAULT 0,
                updated_at TEXT NOT NULL
            );

            -- Shift schedules
            CREATE TABLE IF NOT EXISTS shifts (
                name TEXT PRIMARY KEY,
                days INTEGER NOT NULL,
                start_hour REAL NOT NULL,
                end_hour REAL NOT NULL
            );

            -- Master switch (single row)
            CREATE TABLE IF NOT EXISTS automation (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                active INTEGER NOT NULL DEFAULT 0
            );
            INSERT OR IGNORE INTO automation (id, active) VALUES (1, 0);

            -- Audit log (append-only)
            CREATE TABLE IF NOT EXISTS audit_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                event_json TEXT NOT NULL
            );

            -- Indexes
            CREATE INDEX IF NOT EXISTS idx_audit_timestamp ON audit_log(timestamp);
            "#,
        )?;

        debug!("Store schema initialized");
        Ok(())
    }
}

// Row helpers

const SETTING_COLUMNS: &str =
    "entity_id, shifts_json, spend_limit_percent, frozen, updated_at";

fn setting_from_row(row: &Row<'_>) -> rusqlite::Result<(String, String, f64, bool, String)> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
    ))
}

fn decode_setting(raw: (String, String, f64, bool, String)) -> StoreResult<EntitySetting> {
    let (entity_id, shifts_json, spend_limit_percent, frozen, updated_at) = raw;
    let assigned_shifts: Vec<String> = serde_json::from_str(&shifts_json)?;
    let updated_at = DateTime::parse_from_rfc3339(&updated_at)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now());

    Ok(EntitySetting {
        entity_id: EntityId::new(entity_id),
        assigned_shifts,
        spend_limit_percent,
        frozen,
        updated_at,
    })
}

fn read_setting(conn: &Connection, id: &EntityId) -> StoreResult<Option<EntitySetting>> {
    let raw = conn
        .query_row(
            &format!("SELECT {} FROM entity_settings WHERE entity_id = ?", SETTING_COLUMNS),
            [id.as_str()],
            setting_from_row,
        )
        .optional()?;

    raw.map(decode_setting).transpose()
}

fn write_setting(conn: &Connection, setting: &EntitySetting) -> StoreResult<()> {
    let shifts_json = serde_json::to_string(&setting.assigned_shifts)?;

    conn.execute(
        r#"
        INSERT INTO entity_settings (entity_id, shifts_json, spend_limit_percent, frozen, updated_at)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(entity_id)
        DO UPDATE SET
            shifts_json = excluded.shifts_json,
            spend_limit_percent = excluded.spend_limit_percent,
            frozen = excluded.frozen,
            updated_at = excluded.updated_at
        "#,
        params![
            setting.entity_id.as_str(),
            shifts_json,
            setting.spend_limit_percent,
            setting.frozen,
            setting.updated_at.to_rfc3339(),
        ],
    )?;

    Ok(())
}

fn apply_patch(setting: &mut EntitySetting, patch: &SettingPatch, now: DateTime<Utc>) {
    if let Some(shifts) = patch.normalized_shifts() {
        setting.assigned_shifts = shifts;
    }
    if let Some(limit) = patch.spend_limit_percent {
        setting.spend_limit_percent = limit;
    }
    if let Some(frozen) = patch.frozen {
        setting.frozen = frozen;
    }
    setting.updated_at = now;
}

impl Store for SqliteStore {
    fn get_or_create_setting(
        &self,
        id: &EntityId,
        defaults: &SettingDefaults,
    ) -> StoreResult<EntitySetting> {
        let conn = self.conn.lock().unwrap();

        if let Some(setting) = read_setting(&conn, id)? {
            return Ok(setting);
        }

        let setting = EntitySetting {
            entity_id: id.clone(),
            assigned_shifts: dedup_shifts(std::slice::from_ref(&defaults.shift)),
            spend_limit_percent: defaults.spend_limit_percent,
            frozen: false,
            updated_at: Utc::now(),
        };
        write_setting(&conn, &setting)?;

        info!(entity_id = %id, shift = %defaults.shift, "Entity setting created with defaults");
        Ok(setting)
    }

    fn get_setting(&self, id: &EntityId) -> StoreResult<Option<EntitySetting>> {
        let conn = self.conn.lock().unwrap();
        read_setting(&conn, id)
    }

    fn update_setting(&self, id: &EntityId, patch: &SettingPatch) -> StoreResult<EntitySetting> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let mut setting =
            read_setting(&tx, id)?.ok_or_else(|| StoreError::EntityNotFound(id.clone()))?;
        apply_patch(&mut setting, patch, Utc::now());
        write_setting(&tx, &setting)?;
        tx.commit()?;

        debug!(entity_id = %id, "Entity setting updated");
        Ok(setting)
    }

    fn update_settings_bulk(&self, ids: &[EntityId], patch: &SettingPatch) -> StoreResult<usize> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let now = Utc::now();

        let mut count = 0;
        for id in ids {
            // Returning early drops the transaction, which rolls it back
            let mut setting =
                read_setting(&tx, id)?.ok_or_else(|| StoreError::EntityNotFound(id.clone()))?;
            apply_patch(&mut setting, patch, now);
            write_setting(&tx, &setting)?;
            count += 1;
        }

        tx.commit()?;
        debug!(count, "Entity settings updated in bulk");
        Ok(count)
    }

    fn list_settings(&self) -> StoreResult<Vec<EntitySetting>> {
        let conn = self.conn.lock().unwrap();

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM entity_settings ORDER BY entity_id",
            SETTING_COLUMNS
        ))?;
        let rows = stmt.query_map([], setting_from_row)?;

        let mut settings = Vec::new();
        for row in rows {
            settings.push(decode_setting(row?)?);
        }

        Ok(settings)
    }

    fn clear_all_frozen(&self) -> StoreResult<usize> {
        let conn = self.conn.lock().unwrap();

        let count = conn.execute(
            "UPDATE entity_settings SET frozen = 0, updated_at = ? WHERE frozen = 1",
            [Utc::now().to_rfc3339()],
        )?;

        debug!(count, "Frozen flags cleared");
        Ok(count)
    }

    fn seed_shifts(&self, shifts: &BTreeMap<String, ShiftWindow>) -> StoreResult<usize> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let mut inserted = 0;
        for (name, window) in shifts {
            inserted += tx.execute(
                "INSERT OR IGNORE INTO shifts (name, days, start_hour, end_hour) VALUES (?, ?, ?, ?)",
                params![name, window.days.mask(), window.start_hour, window.end_hour],
            )?;
        }

        tx.commit()?;
        debug!(inserted, total = shifts.len(), "Shifts seeded");
        Ok(inserted)
    }

    fn list_shifts(&self) -> StoreResult<BTreeMap<String, ShiftWindow>> {
        let conn = self.conn.lock().unwrap();

        let mut stmt = conn.prepare("SELECT name, days, start_hour, end_hour FROM shifts")?;
        let rows = stmt.query_map([], |row| {
            let name: String = row.get(0)?;
            let days: u8 = row.get(1)?;
            let start_hour: f64 = row.get(2)?;
            let end_hour: f64 = row.get(3)?;
            Ok((name, days, start_hour, end_hour))
        })?;

        let mut shifts = BTreeMap::new();
        for row in rows {
            let (name, days, start_hour, end_hour) = row?;
            shifts.insert(
                name,
                ShiftWindow {
                    days: DaysOfWeek::new(days),
                    start_hour,
                    end_hour,
                },
            );
        }

        Ok(shifts)
    }

    fn update_shift(&self, name: &str, window: &ShiftWindow) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();

        let changed = conn.execute(
            "UPDATE shifts SET days = ?, start_hour = ?, end_hour = ? WHERE name = ?",
            params![window.days.mask(), window.start_hour, window.end_hour, name],
        )?;
        if changed == 0 {
            return Err(StoreError::ShiftNotFound(name.to_string()));
        }

        debug!(shift = name, window = %window, "Shift updated");
        Ok(())
    }

    fn automation_active(&self) -> StoreResult<bool> {
        let conn = self.conn.lock().unwrap();

        let active: Option<bool> = conn
            .query_row("SELECT active FROM automation WHERE id = 1", [], |row| {
                row.get(0)
            })
            .optional()?;

        Ok(active.unwrap_or(false))
    }

    fn toggle_automation(&self) -> StoreResult<bool> {
        let conn = self.conn.lock().unwrap();

        let active: bool = conn.query_row(
            r#"
            INSERT INTO automation (id, active) VALUES (1, 1)
            ON CONFLICT(id) DO UPDATE SET active = 1 - active
            RETURNING active
            "#,
            [],
            |row| row.get(0),
        )?;

        debug!(active, "Automation master switch toggled");
        Ok(active)
    }

    fn append_audit(&self, mut event: AuditEvent) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        let event_json = serde_json::to_string(&event.event)?;

        conn.execute(
            "INSERT INTO audit_log (timestamp, event_json) VALUES (?, ?)",
            params![event.timestamp.to_rfc3339(), event_json],
        )?;

        event.id = conn.last_insert_rowid();
        debug!(event_id = event.id, "Audit event appended");

        Ok(())
    }

    fn get_recent_audits(&self, limit: usize) -> StoreResult<Vec<AuditEvent>> {
        let conn = self.conn.lock().unwrap();

        let mut stmt = conn.prepare(
            "SELECT id, timestamp, event_json FROM audit_log ORDER BY id DESC LIMIT ?",
        )?;

        let rows = stmt.query_map([limit as i64], |row| {
            let id: i64 = row.get(0)?;
            let timestamp_str: String = row.get(1)?;
            let event_json: String = row.get(2)?;
            Ok((id, timestamp_str, event_json))
        })?;

        let mut events = Vec::new();
        for row in rows {
            let (id, timestamp_str, event_json) = row?;
            let timestamp = DateTime::parse_from_rfc3339(&timestamp_str)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now());
            let event: crate::AuditEventType = serde_json::from_str(&event_json)?;

            events.push(AuditEvent {
                id,
                timestamp,
                event,
            });
        }

        Ok(events)
    }

    fn is_healthy(&self) -> bool {
        match self.conn.lock() {
            Ok(conn) => conn.query_row("SELECT 1", [], |_| Ok(())).is_ok(),
            Err(_) => {
                warn!("Store lock poisoned");
                false
            }
        }
    }
}
