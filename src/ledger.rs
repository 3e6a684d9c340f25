// 📒 Stock Ledger - income / outcome / update / count over an injected store
//
// The ledger holds no copy of the records: every read goes to the store.

use crate::db::{StockEntry, StockStore, UnitId, UnitMatch, UnitRecord};
use crate::error::{Result, StockError};
use crate::import::{self, ImportSummary};
use crate::query::{ComparisonOperator, QueryParams, UnitQuery};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{error, info};

// ============================================================================
// OUTCOME LOOKUP POLICY
// ============================================================================

/// How an outcome locates the record it draws stock from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OutcomeLookup {
    /// Match on (category, composition ratio), then check the live quantity.
    #[default]
    #[serde(rename = "attributes")]
    ByAttributes,

    /// Match on (category, composition ratio, requested quantity).
    ///
    /// The matched record's quantity then equals the request, so the
    /// strictly-greater stock check always rejects it.
    #[serde(rename = "exact")]
    ExactQuantity,
}

impl OutcomeLookup {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeLookup::ByAttributes => "attributes",
            OutcomeLookup::ExactQuantity => "exact",
        }
    }

    fn key(&self, entry: &StockEntry) -> UnitMatch {
        match self {
            OutcomeLookup::ByAttributes => {
                UnitMatch::attributes(&entry.category, entry.composition_ratio)
            }
            OutcomeLookup::ExactQuantity => {
                UnitMatch::exact(&entry.category, entry.composition_ratio, entry.quantity)
            }
        }
    }
}

impl FromStr for OutcomeLookup {
    type Err = StockError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "attributes" => Ok(OutcomeLookup::ByAttributes),
            "exact" => Ok(OutcomeLookup::ExactQuantity),
            other => Err(StockError::invalid(format!(
                "Unknown outcome lookup '{}', expected 'attributes' or 'exact'",
                other
            ))),
        }
    }
}

impl fmt::Display for OutcomeLookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// LEDGER
// ============================================================================

pub struct StockLedger<S> {
    store: S,
    outcome_lookup: OutcomeLookup,
}

impl<S: StockStore> StockLedger<S> {
    pub fn new(store: S) -> Self {
        StockLedger {
            store,
            outcome_lookup: OutcomeLookup::default(),
        }
    }

    pub fn with_outcome_lookup(mut self, outcome_lookup: OutcomeLookup) -> Self {
        self.outcome_lookup = outcome_lookup;
        self
    }

    pub fn outcome_lookup(&self) -> OutcomeLookup {
        self.outcome_lookup
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Register incoming stock as a brand new record
    ///
    /// Never merges with an existing record of the same attributes.
    pub fn income(&mut self, entry: StockEntry) -> Result<UnitRecord> {
        info!(
            category = %entry.category,
            composition_ratio = entry.composition_ratio,
            quantity = entry.quantity,
            "Processing income"
        );

        let unit = self.store.create(entry)?;

        info!(id = %unit.id, "Income processed successfully");
        Ok(unit)
    }

    /// Draw `entry.quantity` from the matching record
    ///
    /// Fails with `NotFound` when no record matches, and with
    /// `InsufficientStock` unless the record holds strictly more than
    /// requested (depleting to zero is rejected). Nothing changes on failure.
    ///
    /// Income never merges records, so several may share the attributes.
    /// The oldest one is always drawn from, even when it is exhausted and a
    /// newer one still holds stock.
    pub fn outcome(&mut self, entry: &StockEntry) -> Result<UnitRecord> {
        info!(
            category = %entry.category,
            composition_ratio = entry.composition_ratio,
            quantity = entry.quantity,
            lookup = %self.outcome_lookup,
            "Processing outcome"
        );

        let key = self.outcome_lookup.key(entry);
        let id = self.store.find_one(&key)?.ok_or_else(|| {
            error!(category = %entry.category, "No unit matches outcome request");
            StockError::not_found(format!(
                "No unit with category '{}' and composition ratio {} found",
                entry.category, entry.composition_ratio
            ))
        })?;

        let requested = entry.quantity;
        let unit = self
            .store
            .update(&id, |unit| {
                if unit.quantity > requested {
                    unit.quantity -= requested;
                    Ok(())
                } else {
                    Err(StockError::InsufficientStock {
                        requested,
                        available: unit.quantity,
                    })
                }
            })
            .inspect_err(|e| error!(id = %id, error = %e, "Error processing outcome"))?;

        info!(id = %unit.id, remaining = unit.quantity, "Outcome processed successfully");
        Ok(unit)
    }

    /// Overwrite category and quantity of one record
    ///
    /// The composition ratio is left as it is. This is a direct overwrite,
    /// not a delta.
    pub fn update(&mut self, id: &UnitId, category: String, quantity: u32) -> Result<UnitRecord> {
        info!(id = %id, "Updating unit");

        let unit = self
            .store
            .update(id, move |unit| {
                unit.category = category;
                unit.quantity = quantity;
                Ok(())
            })
            .inspect_err(|_| error!(id = %id, "Unit not found for update"))?;

        info!(id = %unit.id, category = %unit.category, quantity = unit.quantity, "Unit updated successfully");
        Ok(unit)
    }

    pub fn get(&self, id: &UnitId) -> Result<UnitRecord> {
        self.store
            .get(id)?
            .ok_or_else(|| StockError::not_found(format!("Unit with ID {} not found", id)))
    }

    /// Filtered and sorted listing
    pub fn list(&self, params: &QueryParams) -> Result<Vec<UnitRecord>> {
        info!(?params, "Getting filtered and sorted units");

        let query = UnitQuery::compile(params)?;
        let units = self.store.query(&query)?;

        info!(count = units.len(), "Filtered and sorted units retrieved");
        Ok(units)
    }

    /// Total quantity over records passing the filters
    ///
    /// Category matches case-insensitively here. The comparison applies only
    /// when both operator and ratio are given, and only then is the operator
    /// validated.
    pub fn count(
        &self,
        category: Option<&str>,
        operator: Option<&str>,
        composition_ratio: Option<f64>,
    ) -> Result<u64> {
        info!(?category, ?operator, ?composition_ratio, "Getting units count");

        let comparison = match (operator, composition_ratio) {
            (Some(op), Some(target)) => Some((op.parse::<ComparisonOperator>()?, target)),
            _ => None,
        };
        let category = category.map(str::to_lowercase);

        let total = self
            .store
            .list_all()?
            .iter()
            .filter(|unit| {
                category
                    .as_ref()
                    .map_or(true, |c| unit.category.to_lowercase() == *c)
            })
            .filter(|unit| {
                comparison.map_or(true, |(op, target)| op.holds(unit.composition_ratio, target))
            })
            .map(|unit| u64::from(unit.quantity))
            .sum();

        info!(total, "Total units count");
        Ok(total)
    }

    /// Bulk import from delimited text, all lines or none
    pub fn import_csv(&mut self, input: &[u8]) -> Result<ImportSummary> {
        import::import_csv(&mut self.store, input)
    }
}
