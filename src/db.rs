use crate::analysis::AnalysisResult;
use crate::comparables::{SaleRecord, SubjectProperty};
use crate::valuation::ValuationFact;
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::debug;

/// Event for audit trail: every write to the cache is recorded
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Event {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub data: serde_json::Value,
    pub actor: String,
}

impl Event {
    pub fn new(
        event_type: &str,
        entity_type: &str,
        entity_id: &str,
        data: serde_json::Value,
        actor: &str,
    ) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            data,
            actor: actor.to_string(),
        }
    }
}

/// Outcome of writing a batch of sales into the cache
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaleImport {
    /// Sales not seen before
    pub inserted: usize,
    /// Known sales whose observed_at was moved forward
    pub refreshed: usize,
}

impl SaleRecord {
    /// Deduplication key: the same sale scraped twice hashes the same
    pub fn compute_idempotency_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(format!(
            "{}|{}|{}",
            self.address.trim().to_lowercase(),
            self.sale_date,
            self.sale_price
        ));
        format!("{:x}", hasher.finalize())
    }
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery (in-memory databases report "memory")
    conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;

    // ==========================================================================
    // Properties (subjects of analysis, keyed by address)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS properties (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            address TEXT UNIQUE NOT NULL,
            suburb TEXT,
            bedrooms INTEGER,
            floor_area REAL,
            asking_price REAL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Valuations (append-only; the freshest row supersedes older ones)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS valuations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            property_id INTEGER NOT NULL REFERENCES properties(id),
            rv REAL,
            cv REAL,
            source TEXT NOT NULL,
            observed_at TEXT
        )",
        [],
    )?;

    // ==========================================================================
    // Recent sales (comparables, deduplicated by idempotency hash)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS recent_sales (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            idempotency_hash TEXT UNIQUE NOT NULL,
            address TEXT NOT NULL,
            suburb TEXT NOT NULL,
            bedrooms INTEGER NOT NULL,
            floor_area REAL,
            sale_price REAL NOT NULL,
            sale_date TEXT NOT NULL,
            observed_at TEXT
        )",
        [],
    )?;

    // ==========================================================================
    // Analysis results (append-only; latest per property is current)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS analysis_results (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            result_uuid TEXT UNIQUE NOT NULL,
            property_id INTEGER NOT NULL REFERENCES properties(id),
            purchase_price REAL NOT NULL,
            target_value REAL NOT NULL,
            post_tax_profit REAL NOT NULL,
            is_viable INTEGER NOT NULL,
            recommended_pp REAL,
            result_json TEXT NOT NULL,
            analyzed_at TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Events Table (audit trail)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            data TEXT NOT NULL,
            actor TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_valuations_property ON valuations(property_id, observed_at)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_sales_key ON recent_sales(suburb, bedrooms)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_analysis_property ON analysis_results(property_id, analyzed_at)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_entity ON events(entity_type, entity_id)",
        [],
    )?;

    Ok(())
}

// ============================================================================
// CSV IMPORT
// ============================================================================

/// Columns: address, suburb, bedrooms, floor_area, asking_price
pub fn load_properties_csv(csv_path: &Path) -> Result<Vec<SubjectProperty>> {
    let mut rdr = csv::Reader::from_path(csv_path).context("Failed to open properties CSV")?;

    let mut properties = Vec::new();
    for result in rdr.deserialize() {
        let property: SubjectProperty = result.context("Failed to deserialize property row")?;
        properties.push(property);
    }

    Ok(properties)
}

/// Columns: address, suburb, bedrooms, floor_area, sale_price, sale_date
/// (YYYY-MM-DD), optional observed_at (RFC 3339). Rows without observed_at
/// are stamped with `imported_at`.
pub fn load_sales_csv(csv_path: &Path, imported_at: DateTime<Utc>) -> Result<Vec<SaleRecord>> {
    let mut rdr = csv::Reader::from_path(csv_path).context("Failed to open sales CSV")?;

    let mut sales = Vec::new();
    for result in rdr.deserialize() {
        let mut sale: SaleRecord = result.context("Failed to deserialize sale row")?;
        if sale.observed_at.is_none() {
            sale.observed_at = Some(imported_at);
        }
        sales.push(sale);
    }

    Ok(sales)
}

// ============================================================================
// PROPERTIES
// ============================================================================

/// Insert or update by address; returns the property row id
pub fn save_property(conn: &Connection, property: &SubjectProperty) -> Result<i64> {
    let now = Utc::now().to_rfc3339();
    let address = property.address.trim();

    conn.execute(
        "INSERT INTO properties (address, suburb, bedrooms, floor_area, asking_price, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
         ON CONFLICT(address) DO UPDATE SET
            suburb = excluded.suburb,
            bedrooms = excluded.bedrooms,
            floor_area = excluded.floor_area,
            asking_price = excluded.asking_price,
            updated_at = excluded.updated_at",
        params![
            address,
            property.suburb,
            property.bedrooms,
            property.floor_area,
            property.asking_price,
            now,
        ],
    )?;

    let id: i64 = conn.query_row(
        "SELECT id FROM properties WHERE address = ?1",
        [address],
        |row| row.get(0),
    )?;

    let event = Event::new(
        "property_saved",
        "property",
        address,
        serde_json::json!({
            "suburb": property.suburb,
            "bedrooms": property.bedrooms,
            "asking_price": property.asking_price,
        }),
        "property_store",
    );
    insert_event(conn, &event)?;

    Ok(id)
}

fn property_id(conn: &Connection, address: &str) -> Result<Option<i64>> {
    let id = conn
        .query_row(
            "SELECT id FROM properties WHERE address = ?1",
            [address.trim()],
            |row| row.get(0),
        )
        .optional()?;
    Ok(id)
}

fn require_property_id(conn: &Connection, address: &str) -> Result<i64> {
    property_id(conn, address)?.with_context(|| format!("Unknown property: {}", address))
}

fn row_to_property(row: &Row) -> rusqlite::Result<SubjectProperty> {
    Ok(SubjectProperty {
        address: row.get(0)?,
        suburb: row.get(1)?,
        bedrooms: row.get(2)?,
        floor_area: row.get(3)?,
        asking_price: row.get(4)?,
    })
}

pub fn get_property(conn: &Connection, address: &str) -> Result<Option<SubjectProperty>> {
    let property = conn
        .query_row(
            "SELECT address, suburb, bedrooms, floor_area, asking_price
             FROM properties WHERE address = ?1",
            [address.trim()],
            row_to_property,
        )
        .optional()?;
    Ok(property)
}

pub fn get_all_properties(conn: &Connection) -> Result<Vec<SubjectProperty>> {
    let mut stmt = conn.prepare(
        "SELECT address, suburb, bedrooms, floor_area, asking_price
         FROM properties
         ORDER BY address",
    )?;

    let properties = stmt
        .query_map([], row_to_property)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(properties)
}

// ============================================================================
// VALUATIONS
// ============================================================================

pub fn insert_valuation(conn: &Connection, address: &str, fact: &ValuationFact) -> Result<()> {
    let property_id = require_property_id(conn, address)?;

    conn.execute(
        "INSERT INTO valuations (property_id, rv, cv, source, observed_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            property_id,
            fact.rateable_value,
            fact.capital_value,
            fact.source,
            fact.observed_at.map(|dt| dt.to_rfc3339()),
        ],
    )?;

    let event = Event::new(
        "valuation_recorded",
        "property",
        address.trim(),
        serde_json::json!({
            "rv": fact.rateable_value,
            "cv": fact.capital_value,
            "source": fact.source,
        }),
        "valuation_store",
    );
    insert_event(conn, &event)?;

    Ok(())
}

/// Freshest valuation on file, whether or not it is still fresh
pub fn latest_valuation(conn: &Connection, address: &str) -> Result<Option<ValuationFact>> {
    let fact = conn
        .query_row(
            "SELECT v.rv, v.cv, v.source, v.observed_at
             FROM valuations v
             JOIN properties p ON p.id = v.property_id
             WHERE p.address = ?1
             ORDER BY v.observed_at IS NULL, v.observed_at DESC, v.id DESC
             LIMIT 1",
            [address.trim()],
            |row| {
                let observed_at: Option<String> = row.get(3)?;
                Ok(ValuationFact {
                    rateable_value: row.get(0)?,
                    capital_value: row.get(1)?,
                    source: row.get(2)?,
                    observed_at: parse_timestamp(observed_at),
                })
            },
        )
        .optional()?;
    Ok(fact)
}

// ============================================================================
// RECENT SALES
// ============================================================================

pub fn insert_sales(conn: &Connection, sales: &[SaleRecord]) -> Result<SaleImport> {
    let mut import = SaleImport::default();

    for sale in sales {
        let hash = sale.compute_idempotency_hash();
        let observed_at = sale.observed_at.map(|dt| dt.to_rfc3339());

        let result = conn.execute(
            "INSERT INTO recent_sales (
                idempotency_hash, address, suburb, bedrooms, floor_area,
                sale_price, sale_date, observed_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                hash,
                sale.address,
                sale.suburb,
                sale.bedrooms,
                sale.floor_area,
                sale.sale_price,
                sale.sale_date.format("%Y-%m-%d").to_string(),
                observed_at,
            ],
        );

        match result {
            Ok(_) => {
                import.inserted += 1;
            }
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                // Seen before: only the observation time moves
                conn.execute(
                    "UPDATE recent_sales SET observed_at = ?1
                     WHERE idempotency_hash = ?2
                       AND (observed_at IS NULL OR observed_at < ?1)",
                    params![observed_at, hash],
                )?;
                import.refreshed += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }

    if import.inserted > 0 {
        let event = Event::new(
            "sales_imported",
            "recent_sales",
            "batch",
            serde_json::json!({
                "inserted": import.inserted,
                "refreshed": import.refreshed,
            }),
            "sales_store",
        );
        insert_event(conn, &event)?;
    }

    debug!(inserted = import.inserted, refreshed = import.refreshed, "sales written");
    Ok(import)
}

/// Every cached sale for the key, fresh or not; suburb compared case-insensitively
pub fn sales_for(conn: &Connection, suburb: &str, bedrooms: u32) -> Result<Vec<SaleRecord>> {
    let mut stmt = conn.prepare(
        "SELECT address, suburb, bedrooms, floor_area, sale_price, sale_date, observed_at
         FROM recent_sales
         WHERE LOWER(TRIM(suburb)) = LOWER(TRIM(?1)) AND bedrooms = ?2
         ORDER BY sale_date DESC",
    )?;

    let sales = stmt
        .query_map(params![suburb, bedrooms], |row| {
            let sale_date: String = row.get(5)?;
            let observed_at: Option<String> = row.get(6)?;

            Ok(SaleRecord {
                address: row.get(0)?,
                suburb: row.get(1)?,
                bedrooms: row.get(2)?,
                floor_area: row.get(3)?,
                sale_price: row.get(4)?,
                sale_date: NaiveDate::parse_from_str(&sale_date, "%Y-%m-%d").map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
                })?,
                observed_at: parse_timestamp(observed_at),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(sales)
}

pub fn count_sales(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM recent_sales", [], |row| row.get(0))?;
    Ok(count)
}

// ============================================================================
// ANALYSIS RESULTS
// ============================================================================

pub fn insert_analysis(conn: &Connection, result: &AnalysisResult) -> Result<()> {
    let property_id = require_property_id(conn, &result.address)?;
    let result_json = serde_json::to_string(result)?;

    conn.execute(
        "INSERT INTO analysis_results (
            result_uuid, property_id, purchase_price, target_value, post_tax_profit,
            is_viable, recommended_pp, result_json, analyzed_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            result.id,
            property_id,
            result.purchase_price(),
            result.target_value(),
            result.post_tax_profit(),
            result.is_viable,
            result.recommended_pp,
            result_json,
            result.analyzed_at.to_rfc3339(),
        ],
    )?;

    let event = Event::new(
        "analysis_recorded",
        "property",
        result.address.trim(),
        serde_json::json!({
            "result_id": result.id,
            "is_viable": result.is_viable,
            "post_tax_profit": result.post_tax_profit(),
        }),
        "analyzer",
    );
    insert_event(conn, &event)?;

    Ok(())
}

pub fn latest_analysis(conn: &Connection, address: &str) -> Result<Option<AnalysisResult>> {
    let json: Option<String> = conn
        .query_row(
            "SELECT a.result_json
             FROM analysis_results a
             JOIN properties p ON p.id = a.property_id
             WHERE p.address = ?1
             ORDER BY a.analyzed_at DESC, a.id DESC
             LIMIT 1",
            [address.trim()],
            |row| row.get(0),
        )
        .optional()?;

    json.map(|j| serde_json::from_str(&j).context("Failed to decode stored analysis"))
        .transpose()
}

/// Property, freshest valuation and latest analysis in one read
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisDetail {
    pub property: SubjectProperty,
    pub valuation: Option<ValuationFact>,
    pub analysis: AnalysisResult,
}

/// `None` until the property exists and has been analyzed at least once
pub fn analysis_detail(conn: &Connection, address: &str) -> Result<Option<AnalysisDetail>> {
    let Some(property) = get_property(conn, address)? else {
        return Ok(None);
    };
    let Some(analysis) = latest_analysis(conn, address)? else {
        return Ok(None);
    };

    Ok(Some(AnalysisDetail {
        property,
        valuation: latest_valuation(conn, address)?,
        analysis,
    }))
}

// ============================================================================
// EVENTS
// ============================================================================

/// Insert event into audit trail
pub fn insert_event(conn: &Connection, event: &Event) -> Result<()> {
    let data_json = serde_json::to_string(&event.data)?;

    conn.execute(
        "INSERT INTO events (
            event_id, timestamp, event_type, entity_type, entity_id, data, actor
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            event.event_id,
            event.timestamp.to_rfc3339(),
            event.event_type,
            event.entity_type,
            event.entity_id,
            data_json,
            event.actor,
        ],
    )?;

    Ok(())
}

/// Get events for a specific entity, newest first
pub fn get_events_for_entity(
    conn: &Connection,
    entity_type: &str,
    entity_id: &str,
) -> Result<Vec<Event>> {
    let mut stmt = conn.prepare(
        "SELECT event_id, timestamp, event_type, entity_type, entity_id, data, actor
         FROM events
         WHERE entity_type = ?1 AND entity_id = ?2
         ORDER BY timestamp DESC, id DESC",
    )?;

    let events = stmt
        .query_map(params![entity_type, entity_id], |row| {
            let timestamp_str: String = row.get(1)?;
            let data_json: String = row.get(5)?;

            Ok(Event {
                event_id: row.get(0)?,
                timestamp: DateTime::parse_from_rfc3339(&timestamp_str)
                    .map_err(|e| {
                        rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
                    })?
                    .with_timezone(&Utc),
                event_type: row.get(2)?,
                entity_type: row.get(3)?,
                entity_id: row.get(4)?,
                data: serde_json::from_str(&data_json).map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
                })?,
                actor: row.get(6)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(events)
}

fn parse_timestamp(value: Option<String>) -> Option<DateTime<Utc>> {
    value
        .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use std::io::Write;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 8, 0, 0).unwrap()
    }

    fn test_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        conn
    }

    fn property(address: &str) -> SubjectProperty {
        SubjectProperty {
            address: address.to_string(),
            suburb: Some("Kingsland".to_string()),
            bedrooms: Some(2),
            floor_area: Some(85.0),
            asking_price: None,
        }
    }

    fn sale(address: &str, price: f64, observed_at: DateTime<Utc>) -> SaleRecord {
        SaleRecord {
            address: address.to_string(),
            suburb: "Kingsland".to_string(),
            bedrooms: 2,
            floor_area: Some(80.0),
            sale_price: price,
            sale_date: NaiveDate::from_ymd_opt(2025, 5, 2).unwrap(),
            observed_at: Some(observed_at),
        }
    }

    #[test]
    fn test_save_property_upserts_by_address() {
        let conn = test_db();

        let id1 = save_property(&conn, &property("9 Sandringham Rd")).unwrap();

        let mut updated = property("9 Sandringham Rd");
        updated.asking_price = Some(870_000.0);
        let id2 = save_property(&conn, &updated).unwrap();

        assert_eq!(id1, id2);
        let stored = get_property(&conn, "9 Sandringham Rd").unwrap().unwrap();
        assert_eq!(stored.asking_price, Some(870_000.0));
        assert_eq!(get_all_properties(&conn).unwrap().len(), 1);
    }

    #[test]
    fn test_latest_valuation_supersedes_older() {
        let conn = test_db();
        save_property(&conn, &property("9 Sandringham Rd")).unwrap();

        insert_valuation(&conn, "9 Sandringham Rd", &ValuationFact::new(Some(700_000.0), None, "old", t0())).unwrap();
        insert_valuation(
            &conn,
            "9 Sandringham Rd",
            &ValuationFact::new(Some(720_000.0), Some(900_000.0), "new", t0() + Duration::days(3)),
        )
        .unwrap();

        let latest = latest_valuation(&conn, "9 Sandringham Rd").unwrap().unwrap();
        assert_eq!(latest.source, "new");
        assert_eq!(latest.rateable_value, Some(720_000.0));
        assert_eq!(latest.observed_at, Some(t0() + Duration::days(3)));
    }

    #[test]
    fn test_valuation_for_unknown_property_fails() {
        let conn = test_db();
        let fact = ValuationFact::new(Some(1.0), None, "x", t0());
        assert!(insert_valuation(&conn, "nowhere", &fact).is_err());
        assert!(latest_valuation(&conn, "nowhere").unwrap().is_none());
    }

    #[test]
    fn test_sales_idempotent_and_refreshed() {
        let conn = test_db();
        let first = vec![sale("1 A St", 800_000.0, t0()), sale("2 A St", 820_000.0, t0())];

        let import1 = insert_sales(&conn, &first).unwrap();
        assert_eq!(import1, SaleImport { inserted: 2, refreshed: 0 });

        let later = t0() + Duration::days(10);
        let again = vec![sale("1 A St", 800_000.0, later)];
        let import2 = insert_sales(&conn, &again).unwrap();
        assert_eq!(import2, SaleImport { inserted: 0, refreshed: 1 });
        assert_eq!(count_sales(&conn).unwrap(), 2);

        let stored = sales_for(&conn, "KINGSLAND", 2).unwrap();
        let one = stored.iter().find(|s| s.address == "1 A St").unwrap();
        assert_eq!(one.observed_at, Some(later));
        assert_eq!(one.sale_date, NaiveDate::from_ymd_opt(2025, 5, 2).unwrap());
    }

    #[test]
    fn test_sales_for_filters_by_bedrooms() {
        let conn = test_db();
        let mut three_bed = sale("3 A St", 950_000.0, t0());
        three_bed.bedrooms = 3;
        insert_sales(&conn, &[sale("1 A St", 800_000.0, t0()), three_bed]).unwrap();

        assert_eq!(sales_for(&conn, "Kingsland", 2).unwrap().len(), 1);
        assert_eq!(sales_for(&conn, "Kingsland", 3).unwrap().len(), 1);
        assert!(sales_for(&conn, "Morningside", 2).unwrap().is_empty());
    }

    #[test]
    fn test_idempotency_hash_is_stable() {
        let a = sale("1 A St", 800_000.0, t0());
        let b = sale(" 1 a st ", 800_000.0, t0() + Duration::days(1));

        assert_eq!(a.compute_idempotency_hash(), b.compute_idempotency_hash());
        assert_eq!(a.compute_idempotency_hash().len(), 64);
    }

    #[test]
    fn test_load_csv_files() {
        let dir = std::env::temp_dir().join(format!("property_flip_csv_{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();

        let properties_path = dir.join("properties.csv");
        let mut f = std::fs::File::create(&properties_path).unwrap();
        writeln!(f, "address,suburb,bedrooms,floor_area,asking_price").unwrap();
        writeln!(f, "12 Rata Street,Ponsonby,3,120,").unwrap();
        writeln!(f, "3 Tui Lane,,,,650000").unwrap();
        drop(f);

        let sales_path = dir.join("sales.csv");
        let mut f = std::fs::File::create(&sales_path).unwrap();
        writeln!(f, "address,suburb,bedrooms,floor_area,sale_price,sale_date,observed_at").unwrap();
        writeln!(f, "1 A St,Ponsonby,3,118,905000,2025-05-02,").unwrap();
        writeln!(f, "2 A St,Ponsonby,3,,880000,2025-04-20,2025-05-30T00:00:00Z").unwrap();
        drop(f);

        let properties = load_properties_csv(&properties_path).unwrap();
        assert_eq!(properties.len(), 2);
        assert_eq!(properties[0].bedrooms, Some(3));
        assert_eq!(properties[0].asking_price, None);
        assert_eq!(properties[1].suburb, None);
        assert_eq!(properties[1].asking_price, Some(650_000.0));

        let sales = load_sales_csv(&sales_path, t0()).unwrap();
        assert_eq!(sales.len(), 2);
        assert_eq!(sales[0].observed_at, Some(t0()));
        assert_eq!(sales[1].floor_area, None);
        assert_eq!(
            sales[1].observed_at,
            Some(Utc.with_ymd_and_hms(2025, 5, 30, 0, 0, 0).unwrap())
        );

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_event_log() {
        let conn = test_db();
        save_property(&conn, &property("9 Sandringham Rd")).unwrap();
        insert_valuation(&conn, "9 Sandringham Rd", &ValuationFact::new(Some(700_000.0), None, "council", t0())).unwrap();

        let events = get_events_for_entity(&conn, "property", "9 Sandringham Rd").unwrap();

        assert_eq!(events.len(), 2);
        assert!(events.iter().any(|e| e.event_type == "property_saved"));
        assert!(events.iter().any(|e| e.event_type == "valuation_recorded"));
    }

    #[test]
    fn test_analysis_detail_bundles_property_and_valuation() {
        use crate::analysis::{analyze, AnalysisInput};
        use crate::config::AnalysisConfig;

        let conn = test_db();
        let subject = property("9 Sandringham Rd");
        save_property(&conn, &subject).unwrap();
        assert!(analysis_detail(&conn, "9 Sandringham Rd").unwrap().is_none());

        let fact = ValuationFact::new(None, Some(900_000.0), "council", t0());
        insert_valuation(&conn, "9 Sandringham Rd", &fact).unwrap();

        let input = AnalysisInput {
            valuations: vec![fact.clone()],
            ..AnalysisInput::new(subject.clone())
        };
        let result = analyze(&input, &AnalysisConfig::default(), t0()).unwrap();
        insert_analysis(&conn, &result).unwrap();

        let detail = analysis_detail(&conn, "9 Sandringham Rd").unwrap().unwrap();
        assert_eq!(detail.property, subject);
        assert_eq!(detail.valuation, Some(fact));
        assert_eq!(detail.analysis.id, result.id);

        assert!(analysis_detail(&conn, "nowhere").unwrap().is_none());
    }
}
