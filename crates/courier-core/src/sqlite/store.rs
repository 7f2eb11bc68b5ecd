use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rusqlite::{Connection, OptionalExtension, params};

use crate::models::{
    CoreError, CoreErrorKind, NewQueueRecord, QueueRecord, QueueRecordId, RecordTask, TaskType,
};
use crate::persistence::{MigrationStore, PersistenceResult, QueueStore, SchedulingStateStore};
use crate::sqlite::migrations::{SqliteMigration, current_schema_version, migration, migrations};

const MIGRATIONS_TABLE: &str = "courier_schema_migrations";
const LAST_MESSAGE_CHECK_TIME_KEY: &str = "last_message_check_time";
const LAST_DATABASE_CLEAN_TIME_KEY: &str = "last_database_clean_time";

pub struct SqliteStore {
    database_path: PathBuf,
}

impl SqliteStore {
    pub fn new(database_path: impl Into<PathBuf>) -> Self {
        Self {
            database_path: database_path.into(),
        }
    }

    pub fn database_path(&self) -> &Path {
        &self.database_path
    }

    pub fn planned_migrations(&self, from_version: i64) -> Vec<&'static SqliteMigration> {
        migrations()
            .iter()
            .filter(|entry| entry.version > from_version)
            .collect()
    }

    pub fn migrate_to_latest(&self) -> PersistenceResult<()> {
        self.apply_migration(current_schema_version())
    }

    fn with_connection<T>(
        &self,
        operation_name: &str,
        operation: impl FnOnce(&mut Connection) -> rusqlite::Result<T>,
    ) -> PersistenceResult<T> {
        let mut connection = open_connection(&self.database_path)
            .map_err(|error| storage_error(operation_name, error))?;
        operation(&mut connection).map_err(|error| storage_error(operation_name, error))
    }

    fn read_time_setting(&self, operation_name: &str, key: &str) -> PersistenceResult<SystemTime> {
        self.with_connection(operation_name, |connection| {
            ensure_schema_ready(connection)?;
            let value: Option<String> = connection
                .query_row(
                    "SELECT value FROM app_settings WHERE key = ?1",
                    [key],
                    |row| row.get(0),
                )
                .optional()?;
            let Some(value) = value else {
                return Ok(UNIX_EPOCH);
            };
            let seconds = value.trim().parse::<i64>().map_err(|_| {
                storage_error_sqlite(&format!("setting '{key}' is not a unix timestamp"))
            })?;
            from_unix_seconds(seconds)
        })
    }

    fn write_time_setting(
        &self,
        operation_name: &str,
        key: &str,
        at: SystemTime,
    ) -> PersistenceResult<()> {
        self.with_connection(operation_name, |connection| {
            ensure_schema_ready(connection)?;
            connection.execute(
                "
INSERT INTO app_settings (key, value)
VALUES (?1, ?2)
ON CONFLICT(key) DO UPDATE SET
    value = excluded.value
",
                params![key, to_unix_seconds(at)?.to_string()],
            )?;
            Ok(())
        })
    }
}

impl MigrationStore for SqliteStore {
    fn current_version(&self) -> PersistenceResult<i64> {
        self.with_connection("current_version", |connection| {
            ensure_migrations_table(connection)?;
            read_current_version(connection)
        })
    }

    fn apply_migration(&self, target_version: i64) -> PersistenceResult<()> {
        if target_version < 0 || target_version > current_schema_version() {
            return Err(storage_error_text(
                "apply_migration",
                format!("invalid migration target version '{target_version}'"),
            ));
        }

        if target_version > 0 && migration(target_version).is_none() {
            return Err(storage_error_text(
                "apply_migration",
                format!("migration version '{target_version}' is not defined"),
            ));
        }

        self.with_connection("apply_migration", |connection| {
            ensure_migrations_table(connection)?;
            let current_version = read_current_version(connection)?;

            if target_version == current_version {
                // Recorded versions can outlive dropped tables; all DDL is
                // IF NOT EXISTS so replaying it is safe.
                for version in 1..=target_version {
                    connection.execute_batch(defined_migration(version)?.up_sql)?;
                }
                return Ok(());
            }

            if target_version > current_version {
                for version in (current_version + 1)..=target_version {
                    apply_up_migration(connection, defined_migration(version)?)?;
                }
            } else {
                for version in ((target_version + 1)..=current_version).rev() {
                    apply_down_migration(connection, defined_migration(version)?)?;
                }
            }

            Ok(())
        })
    }
}

impl QueueStore for SqliteStore {
    fn list(&self) -> PersistenceResult<Vec<QueueRecord>> {
        self.with_connection("list_queue_records", |connection| {
            ensure_schema_ready(connection)?;
            let mut statement = connection.prepare(
                "
SELECT record_id, task_type, primary_ref, secondary_ref, attempts, last_attempt_unix, created_at_unix
FROM queue_records
ORDER BY last_attempt_unix ASC, record_id ASC
",
            )?;

            let rows = statement.query_map([], |row| {
                let record_id_raw: i64 = row.get(0)?;
                let task_raw: String = row.get(1)?;
                let primary_ref: Option<i64> = row.get(2)?;
                let secondary_ref: Option<i64> = row.get(3)?;
                let attempts_raw: i64 = row.get(4)?;
                let last_attempt_unix: Option<i64> = row.get(5)?;
                let created_at_unix: i64 = row.get(6)?;

                Ok(QueueRecord {
                    id: QueueRecordId(i64_to_u64(record_id_raw)?),
                    task: parse_record_task(task_raw),
                    primary_ref: primary_ref.map(i64_to_u64).transpose()?,
                    secondary_ref: secondary_ref.map(i64_to_u64).transpose()?,
                    attempts: u32::try_from(attempts_raw)
                        .map_err(|_| storage_error_sqlite("attempt counter out of range"))?,
                    last_attempt_at: last_attempt_unix.map(from_unix_seconds).transpose()?,
                    created_at: from_unix_seconds(created_at_unix)?,
                })
            })?;

            rows.collect()
        })
    }

    fn insert(&self, record: &NewQueueRecord) -> PersistenceResult<QueueRecord> {
        self.with_connection("insert_queue_record", |connection| {
            ensure_schema_ready(connection)?;
            insert_record(connection, record)
        })
    }

    fn update(&self, record: &QueueRecord) -> PersistenceResult<()> {
        let updated = self.with_connection("update_queue_record", |connection| {
            ensure_schema_ready(connection)?;
            connection.execute(
                "
UPDATE queue_records
SET attempts = ?2, last_attempt_unix = ?3
WHERE record_id = ?1
",
                params![
                    u64_to_i64(record.id.0)?,
                    i64::from(record.attempts),
                    record.last_attempt_at.map(to_unix_seconds).transpose()?,
                ],
            )
        })?;

        if updated == 0 {
            return Err(CoreError::new(
                CoreErrorKind::NotFound,
                format!("queue record '{}' was not found for update", record.id.0),
            )
            .with_record(record.id));
        }
        Ok(())
    }

    fn delete(&self, record: &QueueRecord) -> PersistenceResult<()> {
        self.with_connection("delete_queue_record", |connection| {
            ensure_schema_ready(connection)?;
            delete_record(connection, record.id)
        })
    }

    fn complete(
        &self,
        record: &QueueRecord,
        follow_ups: &[NewQueueRecord],
    ) -> PersistenceResult<Vec<QueueRecord>> {
        self.with_connection("complete_queue_record", |connection| {
            ensure_schema_ready(connection)?;
            let transaction = connection.transaction()?;
            let inserted = follow_ups
                .iter()
                .map(|follow_up| insert_record(&transaction, follow_up))
                .collect::<rusqlite::Result<Vec<_>>>()?;
            delete_record(&transaction, record.id)?;
            transaction.commit()?;
            Ok(inserted)
        })
    }
}

fn insert_record(
    connection: &Connection,
    record: &NewQueueRecord,
) -> rusqlite::Result<QueueRecord> {
    connection.execute(
        "
INSERT INTO queue_records (task_type, primary_ref, secondary_ref, attempts, last_attempt_unix, created_at_unix)
VALUES (?1, ?2, ?3, 0, NULL, ?4)
",
        params![
            record.task_type.as_str(),
            record.primary_ref.map(u64_to_i64).transpose()?,
            record.secondary_ref.map(u64_to_i64).transpose()?,
            to_unix_seconds(record.created_at)?,
        ],
    )?;
    let record_id = connection.last_insert_rowid();

    Ok(QueueRecord {
        id: QueueRecordId(i64_to_u64(record_id)?),
        task: RecordTask::Known(record.task_type),
        primary_ref: record.primary_ref,
        secondary_ref: record.secondary_ref,
        attempts: 0,
        last_attempt_at: None,
        // Stored at second precision; hand back what a reload yields.
        created_at: from_unix_seconds(to_unix_seconds(record.created_at)?)?,
    })
}

fn delete_record(connection: &Connection, id: QueueRecordId) -> rusqlite::Result<()> {
    connection.execute(
        "DELETE FROM queue_records WHERE record_id = ?1",
        params![u64_to_i64(id.0)?],
    )?;
    Ok(())
}

impl SchedulingStateStore for SqliteStore {
    fn last_message_check_time(&self) -> PersistenceResult<SystemTime> {
        self.read_time_setting("last_message_check_time", LAST_MESSAGE_CHECK_TIME_KEY)
    }

    fn set_last_message_check_time(&self, at: SystemTime) -> PersistenceResult<()> {
        self.write_time_setting("set_last_message_check_time", LAST_MESSAGE_CHECK_TIME_KEY, at)
    }

    fn last_database_clean_time(&self) -> PersistenceResult<SystemTime> {
        self.read_time_setting("last_database_clean_time", LAST_DATABASE_CLEAN_TIME_KEY)
    }

    fn set_last_database_clean_time(&self, at: SystemTime) -> PersistenceResult<()> {
        self.write_time_setting(
            "set_last_database_clean_time",
            LAST_DATABASE_CLEAN_TIME_KEY,
            at,
        )
    }
}

fn open_connection(database_path: &Path) -> rusqlite::Result<Connection> {
    if let Some(parent) = database_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|error| rusqlite::Error::ToSqlConversionFailure(Box::new(error)))?;
    }
    let connection = Connection::open(database_path)?;
    connection.busy_timeout(Duration::from_secs(5))?;
    Ok(connection)
}

fn ensure_migrations_table(connection: &Connection) -> rusqlite::Result<()> {
    connection.execute_batch(
        "
CREATE TABLE IF NOT EXISTS courier_schema_migrations (
    version INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    applied_at_unix INTEGER NOT NULL
);
",
    )?;
    Ok(())
}

fn ensure_schema_ready(connection: &Connection) -> rusqlite::Result<()> {
    ensure_migrations_table(connection)?;
    let version = read_current_version(connection)?;
    if version <= 0 {
        return Err(storage_error_sqlite(
            "database schema is not initialized; apply migrations before queue operations",
        ));
    }
    Ok(())
}

fn read_current_version(connection: &Connection) -> rusqlite::Result<i64> {
    connection.query_row(
        &format!("SELECT COALESCE(MAX(version), 0) FROM {MIGRATIONS_TABLE}"),
        [],
        |row| row.get(0),
    )
}

fn defined_migration(version: i64) -> rusqlite::Result<&'static SqliteMigration> {
    migration(version)
        .ok_or_else(|| storage_error_sqlite(&format!("migration '{version}' is not defined")))
}

fn apply_up_migration(
    connection: &mut Connection,
    migration: &SqliteMigration,
) -> rusqlite::Result<()> {
    let transaction = connection.transaction()?;
    transaction.execute_batch(migration.up_sql)?;
    transaction.execute(
        &format!(
            "INSERT INTO {MIGRATIONS_TABLE} (version, name, applied_at_unix)
             VALUES (?1, ?2, strftime('%s', 'now'))"
        ),
        (migration.version, migration.name),
    )?;
    transaction.commit()?;
    Ok(())
}

fn apply_down_migration(
    connection: &mut Connection,
    migration: &SqliteMigration,
) -> rusqlite::Result<()> {
    let transaction = connection.transaction()?;
    transaction.execute_batch(migration.down_sql)?;
    transaction.execute(
        &format!("DELETE FROM {MIGRATIONS_TABLE} WHERE version = ?1"),
        [migration.version],
    )?;
    transaction.commit()?;
    Ok(())
}

fn parse_record_task(raw: String) -> RecordTask {
    match raw.parse::<TaskType>() {
        Ok(task) => RecordTask::Known(task),
        Err(()) => RecordTask::Unrecognized(raw),
    }
}

fn storage_error(operation: &str, error: rusqlite::Error) -> CoreError {
    storage_error_text(operation, error.to_string())
}

fn storage_error_sqlite(message: &str) -> rusqlite::Error {
    rusqlite::Error::ToSqlConversionFailure(Box::new(std::io::Error::other(message.to_string())))
}

fn storage_error_text(operation: &str, message: impl AsRef<str>) -> CoreError {
    CoreError::new(
        CoreErrorKind::StorageFailure,
        format!("sqlite store '{operation}' failed: {}", message.as_ref()),
    )
}

fn to_unix_seconds(value: SystemTime) -> rusqlite::Result<i64> {
    let duration = value.duration_since(UNIX_EPOCH).map_err(|error| {
        storage_error_sqlite(&format!("time before unix epoch is not supported: {error}"))
    })?;
    i64::try_from(duration.as_secs())
        .map_err(|_| storage_error_sqlite("unix timestamp seconds exceed i64 range"))
}

fn from_unix_seconds(value: i64) -> rusqlite::Result<SystemTime> {
    let seconds = u64::try_from(value)
        .map_err(|_| storage_error_sqlite("negative unix timestamps are not supported"))?;
    Ok(UNIX_EPOCH + Duration::from_secs(seconds))
}

fn u64_to_i64(value: u64) -> rusqlite::Result<i64> {
    i64::try_from(value).map_err(|_| storage_error_sqlite("identifier exceeds i64 range"))
}

fn i64_to_u64(value: i64) -> rusqlite::Result<u64> {
    u64::try_from(value).map_err(|_| storage_error_sqlite("negative identifier in sqlite record"))
}
