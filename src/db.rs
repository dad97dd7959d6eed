// SQLite reference store
//
// Implements every collaborator port over a single rusqlite Connection.
// The connection sits behind a Mutex, so concurrent banking calls for the
// same route+period are serialized; commit_banking is overridden below to
// run the balance upsert and the ledger append in one transaction.

use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::ComplianceError;
use crate::ports::{BankLedger, BankingStore, ComplianceStore, PoolStore, ReadingStore, RouteStore};
use crate::types::{BankEntry, IntensityReading, Pool, Route};

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and ensure the schema exists.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database at {}", path.display()))?;
        setup_schema(&conn)?;
        Ok(SqliteStore {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory store for tests and throwaway runs.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        setup_schema(&conn)?;
        Ok(SqliteStore {
            conn: Mutex::new(conn),
        })
    }

    /// Insert or update a route record.
    pub fn upsert_route(&self, route: &Route) -> Result<(), ComplianceError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO routes (id, origin, destination, distance_km)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE
             SET origin = excluded.origin,
                 destination = excluded.destination,
                 distance_km = excluded.distance_km",
            params![route.id, route.origin, route.destination, route.distance_km],
        )?;
        Ok(())
    }

    /// Insert or replace the measurement for (route, period).
    pub fn upsert_reading(&self, reading: &IntensityReading) -> Result<(), ComplianceError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO intensity_readings (route_id, period, fuel_consumption, actual_intensity)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(route_id, period) DO UPDATE
             SET fuel_consumption = excluded.fuel_consumption,
                 actual_intensity = excluded.actual_intensity",
            params![
                reading.route_id,
                reading.period,
                reading.fuel_consumption,
                reading.actual_intensity
            ],
        )?;
        Ok(())
    }

    /// Load intensity readings from a fleet CSV file
    /// (columns: route_id, period, fuel_consumption, actual_intensity)
    /// and upsert each one. Numeric validation happens here, at the edge.
    pub fn import_readings_csv(&self, csv_path: &Path) -> Result<usize> {
        let mut rdr = csv::Reader::from_path(csv_path).context("Failed to open CSV file")?;

        let mut imported = 0;
        for (i, result) in rdr.deserialize().enumerate() {
            let reading: IntensityReading =
                result.with_context(|| format!("Failed to parse CSV row {}", i + 1))?;

            if !reading.fuel_consumption.is_finite() || reading.fuel_consumption < 0.0 {
                anyhow::bail!(
                    "CSV row {}: fuel consumption must be a finite, non-negative number",
                    i + 1
                );
            }
            if !reading.actual_intensity.is_finite() {
                anyhow::bail!("CSV row {}: actual intensity must be a finite number", i + 1);
            }

            self.upsert_reading(&reading)?;
            imported += 1;
        }

        Ok(imported)
    }

    /// Full ledger history for a route, oldest first.
    pub fn bank_entries(&self, route_id: &str) -> Result<Vec<BankEntry>, ComplianceError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, route_id, amount, period, created_at
             FROM bank_entries
             WHERE route_id = ?1
             ORDER BY created_at",
        )?;

        let entries = stmt
            .query_map([route_id], |row| {
                let created_at: String = row.get(4)?;
                Ok(BankEntry {
                    id: row.get(0)?,
                    route_id: row.get(1)?,
                    amount: row.get(2)?,
                    period: row.get(3)?,
                    created_at: DateTime::parse_from_rfc3339(&created_at)
                        .map_err(|_| rusqlite::Error::InvalidQuery)?
                        .with_timezone(&Utc),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(entries)
    }

    /// Row count across the measurement table, for post-import verification.
    pub fn reading_count(&self) -> Result<i64, ComplianceError> {
        let conn = self.conn.lock().unwrap();
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM intensity_readings", [], |row| row.get(0))?;
        Ok(count)
    }
}

fn setup_schema(conn: &Connection) -> Result<()> {
    // WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS routes (
            id TEXT PRIMARY KEY,
            origin TEXT NOT NULL,
            destination TEXT NOT NULL,
            distance_km REAL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS intensity_readings (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            route_id TEXT NOT NULL,
            period TEXT NOT NULL,
            fuel_consumption REAL NOT NULL,
            actual_intensity REAL NOT NULL,
            UNIQUE(route_id, period)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS compliance_balances (
            route_id TEXT NOT NULL,
            period TEXT NOT NULL,
            balance REAL NOT NULL,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (route_id, period)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS bank_entries (
            id TEXT PRIMARY KEY,
            route_id TEXT NOT NULL,
            amount REAL NOT NULL,
            period TEXT NOT NULL,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS pools (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS pool_members (
            pool_id TEXT NOT NULL,
            route_id TEXT NOT NULL,
            position INTEGER NOT NULL,
            PRIMARY KEY (pool_id, route_id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_bank_entries_route ON bank_entries(route_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_pool_members_pool ON pool_members(pool_id)",
        [],
    )?;

    Ok(())
}

impl RouteStore for SqliteStore {
    fn all_routes(&self) -> Result<Vec<Route>, ComplianceError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare("SELECT id, origin, destination, distance_km FROM routes ORDER BY id")?;

        let routes = stmt
            .query_map([], |row| {
                Ok(Route {
                    id: row.get(0)?,
                    origin: row.get(1)?,
                    destination: row.get(2)?,
                    distance_km: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(routes)
    }

    fn route_by_id(&self, id: &str) -> Result<Option<Route>, ComplianceError> {
        let conn = self.conn.lock().unwrap();
        let route = conn
            .query_row(
                "SELECT id, origin, destination, distance_km FROM routes WHERE id = ?1",
                [id],
                |row| {
                    Ok(Route {
                        id: row.get(0)?,
                        origin: row.get(1)?,
                        destination: row.get(2)?,
                        distance_km: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(route)
    }
}

impl ReadingStore for SqliteStore {
    fn fetch_reading(
        &self,
        route_id: &str,
        period: &str,
    ) -> Result<Option<IntensityReading>, ComplianceError> {
        let conn = self.conn.lock().unwrap();
        let reading = conn
            .query_row(
                "SELECT route_id, period, fuel_consumption, actual_intensity
                 FROM intensity_readings
                 WHERE route_id = ?1 AND period = ?2",
                params![route_id, period],
                |row| {
                    Ok(IntensityReading {
                        route_id: row.get(0)?,
                        period: row.get(1)?,
                        fuel_consumption: row.get(2)?,
                        actual_intensity: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(reading)
    }

    fn fetch_batch_readings(
        &self,
        route_ids: &[String],
        period: &str,
    ) -> Result<Vec<IntensityReading>, ComplianceError> {
        // One lookup per id, preserving request order. Absent routes are
        // skipped; the allocation engine reports them.
        let mut readings = Vec::with_capacity(route_ids.len());
        for route_id in route_ids {
            if let Some(reading) = self.fetch_reading(route_id, period)? {
                readings.push(reading);
            }
        }
        Ok(readings)
    }
}

impl BankLedger for SqliteStore {
    fn append_entry(
        &self,
        route_id: &str,
        amount: f64,
        period: &str,
    ) -> Result<(), ComplianceError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO bank_entries (id, route_id, amount, period, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                uuid::Uuid::new_v4().to_string(),
                route_id,
                amount,
                period,
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(())
    }

    fn total_banked(&self, route_id: &str) -> Result<f64, ComplianceError> {
        let conn = self.conn.lock().unwrap();
        let total: f64 = conn.query_row(
            "SELECT COALESCE(SUM(amount), 0) FROM bank_entries WHERE route_id = ?1",
            [route_id],
            |row| row.get(0),
        )?;
        Ok(total)
    }
}

impl ComplianceStore for SqliteStore {
    fn upsert_balance(
        &self,
        route_id: &str,
        period: &str,
        balance: f64,
    ) -> Result<(), ComplianceError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO compliance_balances (route_id, period, balance, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(route_id, period) DO UPDATE
             SET balance = excluded.balance,
                 updated_at = excluded.updated_at",
            params![route_id, period, balance, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    fn balance(&self, route_id: &str, period: &str) -> Result<Option<f64>, ComplianceError> {
        let conn = self.conn.lock().unwrap();
        let balance = conn
            .query_row(
                "SELECT balance FROM compliance_balances WHERE route_id = ?1 AND period = ?2",
                params![route_id, period],
                |row| row.get(0),
            )
            .optional()?;
        Ok(balance)
    }
}

impl BankingStore for SqliteStore {
    /// Both banking writes in a single transaction: either the stored
    /// balance and the ledger entry both land, or neither does.
    fn commit_banking(
        &self,
        route_id: &str,
        period: &str,
        balance: f64,
        amount: f64,
    ) -> Result<(), ComplianceError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let now = Utc::now().to_rfc3339();

        tx.execute(
            "INSERT INTO compliance_balances (route_id, period, balance, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(route_id, period) DO UPDATE
             SET balance = excluded.balance,
                 updated_at = excluded.updated_at",
            params![route_id, period, balance, now],
        )?;
        tx.execute(
            "INSERT INTO bank_entries (id, route_id, amount, period, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                uuid::Uuid::new_v4().to_string(),
                route_id,
                amount,
                period,
                now
            ],
        )?;

        tx.commit()?;
        Ok(())
    }
}

impl PoolStore for SqliteStore {
    fn create_pool(&self, pool: &Pool) -> Result<(), ComplianceError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO pools (id, name) VALUES (?1, ?2)
             ON CONFLICT(id) DO NOTHING",
            params![pool.id, pool.name],
        )?;
        for (position, route_id) in pool.member_route_ids.iter().enumerate() {
            tx.execute(
                "INSERT INTO pool_members (pool_id, route_id, position)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(pool_id, route_id) DO NOTHING",
                params![pool.id, route_id, position as i64],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    fn pool_by_id(&self, id: &str) -> Result<Option<Pool>, ComplianceError> {
        let conn = self.conn.lock().unwrap();
        let header = conn
            .query_row(
                "SELECT id, name FROM pools WHERE id = ?1",
                [id],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()?;

        let (pool_id, name) = match header {
            Some(h) => h,
            None => return Ok(None),
        };

        let mut stmt = conn.prepare(
            "SELECT route_id FROM pool_members WHERE pool_id = ?1 ORDER BY position",
        )?;
        let member_route_ids = stmt
            .query_map([id], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;

        Ok(Some(Pool {
            id: pool_id,
            name,
            member_route_ids,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(route_id: &str, fuel: f64, actual: f64, period: &str) -> IntensityReading {
        IntensityReading {
            route_id: route_id.to_string(),
            fuel_consumption: fuel,
            actual_intensity: actual,
            period: period.to_string(),
        }
    }

    #[test]
    fn test_route_round_trip() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .upsert_route(&Route {
                id: "r-1".to_string(),
                origin: "Rotterdam".to_string(),
                destination: "Singapore".to_string(),
                distance_km: Some(15_000.0),
            })
            .unwrap();

        let all = store.all_routes().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].origin, "Rotterdam");

        let found = store.route_by_id("r-1").unwrap().unwrap();
        assert_eq!(found.distance_km, Some(15_000.0));
        assert!(store.route_by_id("r-404").unwrap().is_none());
    }

    #[test]
    fn test_reading_upsert_overwrites_per_route_period() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.upsert_reading(&reading("r-1", 2.0, 91.0, "2025")).unwrap();
        store.upsert_reading(&reading("r-1", 3.5, 88.0, "2025")).unwrap();

        let stored = store.fetch_reading("r-1", "2025").unwrap().unwrap();
        assert_eq!(stored.fuel_consumption, 3.5);
        assert_eq!(stored.actual_intensity, 88.0);
        assert_eq!(store.reading_count().unwrap(), 1);
    }

    #[test]
    fn test_batch_fetch_preserves_order_and_skips_absent() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.upsert_reading(&reading("r-b", 1.0, 90.0, "2025")).unwrap();
        store.upsert_reading(&reading("r-a", 1.0, 85.0, "2025")).unwrap();

        let ids = vec!["r-b".to_string(), "r-missing".to_string(), "r-a".to_string()];
        let batch = store.fetch_batch_readings(&ids, "2025").unwrap();

        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].route_id, "r-b");
        assert_eq!(batch[1].route_id, "r-a");
    }

    #[test]
    fn test_balance_upsert_overwrites() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.upsert_balance("r-1", "2025", 120.0).unwrap();
        store.upsert_balance("r-1", "2025", -40.0).unwrap();
        store.upsert_balance("r-1", "2026", 7.0).unwrap();

        assert_eq!(store.balance("r-1", "2025").unwrap(), Some(-40.0));
        assert_eq!(store.balance("r-1", "2026").unwrap(), Some(7.0));
        assert_eq!(store.balance("r-2", "2025").unwrap(), None);
    }

    #[test]
    fn test_total_banked_sums_across_periods() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert_eq!(store.total_banked("r-1").unwrap(), 0.0);

        store.append_entry("r-1", 60.0, "2024").unwrap();
        store.append_entry("r-1", 40.0, "2025").unwrap();
        store.append_entry("r-2", 5.0, "2025").unwrap();

        assert_eq!(store.total_banked("r-1").unwrap(), 100.0);
        assert_eq!(store.total_banked("r-2").unwrap(), 5.0);

        let entries = store.bank_entries("r-1").unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].amount, 60.0);
        assert_eq!(entries[0].period, "2024");
        assert!(!entries[0].id.is_empty());
    }

    #[test]
    fn test_commit_banking_writes_balance_and_entry_together() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.commit_banking("r-1", "2025", 200.0, 150.0).unwrap();

        assert_eq!(store.balance("r-1", "2025").unwrap(), Some(200.0));
        assert_eq!(store.total_banked("r-1").unwrap(), 150.0);

        // Repeat banking overwrites the cached balance and appends again.
        store.commit_banking("r-1", "2025", 180.0, 30.0).unwrap();
        assert_eq!(store.balance("r-1", "2025").unwrap(), Some(180.0));
        assert_eq!(store.total_banked("r-1").unwrap(), 180.0);
    }

    #[test]
    fn test_pool_create_is_duplicate_safe() {
        let store = SqliteStore::open_in_memory().unwrap();
        let pool = Pool {
            id: "pool-1".to_string(),
            name: "Atlantic Pool".to_string(),
            member_route_ids: vec!["r-2".to_string(), "r-1".to_string()],
        };

        store.create_pool(&pool).unwrap();
        store.create_pool(&pool).unwrap(); // no-op, no error

        let found = store.pool_by_id("pool-1").unwrap().unwrap();
        assert_eq!(found.name, "Atlantic Pool");
        // Membership order is preserved, not alphabetized.
        assert_eq!(found.member_route_ids, vec!["r-2", "r-1"]);

        assert!(store.pool_by_id("pool-404").unwrap().is_none());
    }

    #[test]
    fn test_import_readings_csv() {
        let store = SqliteStore::open_in_memory().unwrap();

        let csv_path = std::env::temp_dir().join(format!(
            "fueleu_readings_{}.csv",
            std::process::id()
        ));
        std::fs::write(
            &csv_path,
            "route_id,fuel_consumption,actual_intensity,period\n\
             r-1,2.5,91.0,2025\n\
             r-2,1.2,84.5,2025\n",
        )
        .unwrap();

        let imported = store.import_readings_csv(&csv_path).unwrap();
        assert_eq!(imported, 2);
        assert_eq!(store.reading_count().unwrap(), 2);

        let r2 = store.fetch_reading("r-2", "2025").unwrap().unwrap();
        assert_eq!(r2.actual_intensity, 84.5);

        std::fs::remove_file(&csv_path).ok();
    }

    #[test]
    fn test_import_rejects_negative_fuel() {
        let store = SqliteStore::open_in_memory().unwrap();

        let csv_path = std::env::temp_dir().join(format!(
            "fueleu_bad_readings_{}.csv",
            std::process::id()
        ));
        std::fs::write(
            &csv_path,
            "route_id,fuel_consumption,actual_intensity,period\n\
             r-1,-2.5,91.0,2025\n",
        )
        .unwrap();

        assert!(store.import_readings_csv(&csv_path).is_err());
        assert_eq!(store.reading_count().unwrap(), 0);

        std::fs::remove_file(&csv_path).ok();
    }
}
