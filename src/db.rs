// 🗄️ Stock Record Store - durable keyed storage of unit records
// SQLite (WAL) backend plus an in-memory backend behind one trait

use crate::error::{Result, StockError};
use crate::query::UnitQuery;
use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, Connection, Row};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// IDENTITY
// ============================================================================

/// Stable identity of a unit record, assigned by the store on creation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnitId(Uuid);

impl UnitId {
    pub fn new() -> Self {
        UnitId(Uuid::new_v4())
    }

}

impl Default for UnitId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for UnitId {
    type Err = StockError;

    fn from_str(s: &str) -> Result<Self> {
        Uuid::parse_str(s.trim())
            .map(UnitId)
            .map_err(|_| StockError::invalid(format!("Invalid unit id: {}", s)))
    }
}

// ============================================================================
// RECORDS
// ============================================================================

/// The sole persisted entity
///
/// `quantity` is unsigned, so no sequence of operations can leave a record
/// with negative stock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitRecord {
    pub id: UnitId,
    pub category: String,
    /// Percentage in [0, 100]
    pub composition_ratio: f64,
    pub quantity: u32,
}

impl UnitRecord {
    fn from_entry(id: UnitId, entry: StockEntry) -> Self {
        UnitRecord {
            id,
            category: entry.category,
            composition_ratio: entry.composition_ratio,
            quantity: entry.quantity,
        }
    }
}

/// Attributes of a stock movement: income, outcome or one imported line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockEntry {
    pub category: String,
    pub composition_ratio: f64,
    pub quantity: u32,
}

impl StockEntry {
    /// A `-0.0` ratio is stored as `0.0`
    pub fn new(category: impl Into<String>, composition_ratio: f64, quantity: u32) -> Self {
        StockEntry {
            category: category.into(),
            composition_ratio: if composition_ratio == 0.0 { 0.0 } else { composition_ratio },
            quantity,
        }
    }
}

/// Untrusted single-record request body, validated before it reaches the ledger
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitPayload {
    #[serde(alias = "color")]
    pub category: String,
    #[serde(alias = "cottonPart")]
    pub composition_ratio: f64,
    pub quantity: i64,
}

impl UnitPayload {
    pub fn validate(self) -> Result<StockEntry> {
        let category = validate_category(&self.category)?;

        if self.composition_ratio.is_nan() {
            return Err(StockError::invalid("Composition ratio is mandatory"));
        }
        if self.composition_ratio < 0.0 {
            return Err(StockError::invalid("Composition ratio cannot be under 0%"));
        }
        if self.composition_ratio > 100.0 {
            return Err(StockError::invalid("Composition ratio cannot be more than 100%"));
        }

        Ok(StockEntry::new(
            category,
            self.composition_ratio,
            validate_quantity(self.quantity)?,
        ))
    }
}

/// Trimmed, non-blank category
pub fn validate_category(category: &str) -> Result<String> {
    let trimmed = category.trim();
    if trimmed.is_empty() {
        return Err(StockError::invalid("Category cannot be empty"));
    }
    Ok(trimmed.to_string())
}

/// Non-negative quantity that fits the record's counter
pub fn validate_quantity(quantity: i64) -> Result<u32> {
    if quantity < 0 {
        return Err(StockError::invalid("Quantity cannot be under 0"));
    }
    u32::try_from(quantity).map_err(|_| StockError::invalid("Quantity is too large"))
}

/// Exact-match lookup key over (category, composition ratio, quantity)
///
/// A `None` quantity matches any stock level.
#[derive(Debug, Clone, PartialEq)]
pub struct UnitMatch {
    pub category: String,
    pub composition_ratio: f64,
    pub quantity: Option<u32>,
}

impl UnitMatch {
    pub fn attributes(category: &str, composition_ratio: f64) -> Self {
        UnitMatch {
            category: category.to_string(),
            composition_ratio,
            quantity: None,
        }
    }

    pub fn exact(category: &str, composition_ratio: f64, quantity: u32) -> Self {
        UnitMatch {
            category: category.to_string(),
            composition_ratio,
            quantity: Some(quantity),
        }
    }

    pub fn matches(&self, unit: &UnitRecord) -> bool {
        unit.category == self.category
            && unit.composition_ratio == self.composition_ratio
            && self.quantity.map_or(true, |q| unit.quantity == q)
    }
}

// ============================================================================
// STORE CONTRACT
// ============================================================================

/// Keyed storage of unit records
///
/// Every mutating call is atomic: it either lands completely or leaves the
/// store untouched. Iteration order is creation order.
pub trait StockStore {
    /// Persist a new record under a fresh id
    fn create(&mut self, entry: StockEntry) -> Result<UnitRecord>;

    /// Persist every entry in one batch, or none of them
    fn create_all(&mut self, entries: Vec<StockEntry>) -> Result<Vec<UnitRecord>>;

    fn get(&self, id: &UnitId) -> Result<Option<UnitRecord>>;

    fn list_all(&self) -> Result<Vec<UnitRecord>>;

    /// Apply `mutator` to the record with `id` and persist the result
    ///
    /// Fails with `NotFound` if absent. If the mutator returns an error the
    /// record is left unchanged. The record's id cannot be changed.
    fn update<F>(&mut self, id: &UnitId, mutator: F) -> Result<UnitRecord>
    where
        F: FnOnce(&mut UnitRecord) -> Result<()>;

    /// Id of the first record (in creation order) matching `key`
    fn find_one(&self, key: &UnitMatch) -> Result<Option<UnitId>> {
        Ok(self
            .list_all()?
            .into_iter()
            .find(|unit| key.matches(unit))
            .map(|unit| unit.id))
    }

    /// Filtered and sorted read
    fn query(&self, query: &UnitQuery) -> Result<Vec<UnitRecord>> {
        let mut units: Vec<UnitRecord> = self
            .list_all()?
            .into_iter()
            .filter(|unit| query.matches(unit))
            .collect();
        query.sort(&mut units);
        Ok(units)
    }
}

// ============================================================================
// SQLITE BACKEND
// ============================================================================

const UNIT_COLUMNS: &str = "unit_uuid, category, composition_ratio, quantity";

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS units (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            unit_uuid TEXT UNIQUE NOT NULL,
            category TEXT NOT NULL,
            composition_ratio REAL NOT NULL CHECK (composition_ratio >= 0 AND composition_ratio <= 100),
            quantity INTEGER NOT NULL CHECK (quantity >= 0),
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_units_category ON units(category)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_units_ratio ON units(composition_ratio)",
        [],
    )?;

    Ok(())
}

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (or create) a database file and make sure the schema exists
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        setup_database(&conn)?;
        Ok(SqliteStore { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        setup_database(&conn)?;
        Ok(SqliteStore { conn })
    }

    pub fn verify_count(&self) -> Result<i64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM units", [], |row| row.get(0))?;
        Ok(count)
    }
}

fn unit_from_row(row: &Row<'_>) -> rusqlite::Result<UnitRecord> {
    let uuid: String = row.get(0)?;
    let id = Uuid::parse_str(&uuid)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(e)))?;

    Ok(UnitRecord {
        id: UnitId(id),
        category: row.get(1)?,
        composition_ratio: row.get(2)?,
        quantity: row.get(3)?,
    })
}

fn insert_unit(conn: &Connection, entry: StockEntry) -> Result<UnitRecord> {
    let unit = UnitRecord::from_entry(UnitId::new(), entry);

    conn.execute(
        "INSERT INTO units (unit_uuid, category, composition_ratio, quantity)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            unit.id.to_string(),
            unit.category,
            unit.composition_ratio,
            unit.quantity,
        ],
    )?;

    Ok(unit)
}

fn select_unit(conn: &Connection, id: &UnitId) -> Result<Option<UnitRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {UNIT_COLUMNS} FROM units WHERE unit_uuid = ?1"
    ))?;

    let mut rows = stmt.query_map([id.to_string()], unit_from_row)?;
    let unit = rows.next().transpose()?;
    Ok(unit)
}

impl StockStore for SqliteStore {
    fn create(&mut self, entry: StockEntry) -> Result<UnitRecord> {
        insert_unit(&self.conn, entry)
    }

    fn create_all(&mut self, entries: Vec<StockEntry>) -> Result<Vec<UnitRecord>> {
        // Dropping the transaction on error rolls every insert back
        let tx = self.conn.transaction()?;
        let mut created = Vec::with_capacity(entries.len());
        for entry in entries {
            created.push(insert_unit(&tx, entry)?);
        }
        tx.commit()?;
        Ok(created)
    }

    fn get(&self, id: &UnitId) -> Result<Option<UnitRecord>> {
        select_unit(&self.conn, id)
    }

    fn list_all(&self) -> Result<Vec<UnitRecord>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {UNIT_COLUMNS} FROM units ORDER BY id"))?;

        let units = stmt
            .query_map([], unit_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(units)
    }

    fn update<F>(&mut self, id: &UnitId, mutator: F) -> Result<UnitRecord>
    where
        F: FnOnce(&mut UnitRecord) -> Result<()>,
    {
        let tx = self.conn.transaction()?;

        let mut unit = select_unit(&tx, id)?
            .ok_or_else(|| StockError::not_found(format!("Unit with ID {} not found", id)))?;
        mutator(&mut unit)?;
        unit.id = *id;

        tx.execute(
            "UPDATE units SET category = ?1, composition_ratio = ?2, quantity = ?3
             WHERE unit_uuid = ?4",
            params![
                unit.category,
                unit.composition_ratio,
                unit.quantity,
                id.to_string(),
            ],
        )?;
        tx.commit()?;

        Ok(unit)
    }

    fn find_one(&self, key: &UnitMatch) -> Result<Option<UnitId>> {
        let mut stmt = self.conn.prepare(
            "SELECT unit_uuid FROM units
             WHERE category = ?1 AND composition_ratio = ?2
               AND (?3 IS NULL OR quantity = ?3)
             ORDER BY id
             LIMIT 1",
        )?;

        let mut rows = stmt.query_map(
            params![key.category, key.composition_ratio, key.quantity],
            |row| row.get::<_, String>(0),
        )?;

        let uuid = rows.next().transpose()?;
        uuid.map(|uuid| uuid.parse::<UnitId>()).transpose()
    }

    fn query(&self, query: &UnitQuery) -> Result<Vec<UnitRecord>> {
        let (where_clause, values) = query.where_clause();
        let sql = format!(
            "SELECT {UNIT_COLUMNS} FROM units{} ORDER BY {} ASC, id ASC",
            where_clause,
            query.sort_key().column(),
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let units = stmt
            .query_map(params_from_iter(values.iter()), unit_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(units)
    }
}

// ============================================================================
// IN-MEMORY BACKEND
// ============================================================================

/// Vec-backed store in creation order
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    units: Vec<UnitRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

impl StockStore for MemoryStore {
    fn create(&mut self, entry: StockEntry) -> Result<UnitRecord> {
        let unit = UnitRecord::from_entry(UnitId::new(), entry);
        self.units.push(unit.clone());
        Ok(unit)
    }

    fn create_all(&mut self, entries: Vec<StockEntry>) -> Result<Vec<UnitRecord>> {
        let created: Vec<UnitRecord> = entries
            .into_iter()
            .map(|entry| UnitRecord::from_entry(UnitId::new(), entry))
            .collect();
        self.units.extend(created.iter().cloned());
        Ok(created)
    }

    fn get(&self, id: &UnitId) -> Result<Option<UnitRecord>> {
        Ok(self.units.iter().find(|unit| unit.id == *id).cloned())
    }

    fn list_all(&self) -> Result<Vec<UnitRecord>> {
        Ok(self.units.clone())
    }

    fn update<F>(&mut self, id: &UnitId, mutator: F) -> Result<UnitRecord>
    where
        F: FnOnce(&mut UnitRecord) -> Result<()>,
    {
        let slot = self
            .units
            .iter_mut()
            .find(|unit| unit.id == *id)
            .ok_or_else(|| StockError::not_found(format!("Unit with ID {} not found", id)))?;

        // Mutate a copy so a failing mutator leaves the slot untouched
        let mut unit = slot.clone();
        mutator(&mut unit)?;
        unit.id = *id;
        *slot = unit.clone();

        Ok(unit)
    }
}
