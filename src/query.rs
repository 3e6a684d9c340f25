// 🔎 Query Compiler - optional filters + one sort key compiled into a single read
//
// Every supplied filter must hold (logical AND). Absent filters do not constrain.
// The same compiled query renders to SQL for SqliteStore and evaluates
// in memory for any other store.

use crate::db::UnitRecord;
use crate::error::{Result, StockError};
use rusqlite::types::Value;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

// ============================================================================
// RAW PARAMETERS
// ============================================================================

/// Filter and sort parameters exactly as a caller supplies them
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryParams {
    #[serde(default, alias = "color")]
    pub category: Option<String>,

    #[serde(default, alias = "operation")]
    pub comparison_operator: Option<String>,

    #[serde(default, alias = "cottonPart")]
    pub composition_ratio: Option<f64>,

    #[serde(default, alias = "cottonPartMin")]
    pub composition_ratio_min: Option<f64>,

    #[serde(default, alias = "cottonPartMax")]
    pub composition_ratio_max: Option<f64>,

    #[serde(default, alias = "sortBy")]
    pub sort_key: Option<String>,
}

// ============================================================================
// COMPARISON OPERATOR
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOperator {
    MoreThan,
    LessThan,
    Equal,
}

impl ComparisonOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComparisonOperator::MoreThan => "moreThan",
            ComparisonOperator::LessThan => "lessThan",
            ComparisonOperator::Equal => "equal",
        }
    }

    /// Does `value <op> target` hold
    pub fn holds(&self, value: f64, target: f64) -> bool {
        match self {
            ComparisonOperator::MoreThan => value > target,
            ComparisonOperator::LessThan => value < target,
            ComparisonOperator::Equal => value == target,
        }
    }

    fn sql(&self) -> &'static str {
        match self {
            ComparisonOperator::MoreThan => ">",
            ComparisonOperator::LessThan => "<",
            ComparisonOperator::Equal => "=",
        }
    }
}

impl FromStr for ComparisonOperator {
    type Err = StockError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "moreThan" => Ok(ComparisonOperator::MoreThan),
            "lessThan" => Ok(ComparisonOperator::LessThan),
            "equal" => Ok(ComparisonOperator::Equal),
            other => Err(StockError::invalid(format!("Incorrect operation: {}", other))),
        }
    }
}

impl fmt::Display for ComparisonOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SORT KEY
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
    #[default]
    Category,
    CompositionRatio,
}

impl SortKey {
    /// Accepted spellings, matched case-insensitively
    pub const ALLOWED: [(&'static str, SortKey); 4] = [
        ("category", SortKey::Category),
        ("color", SortKey::Category),
        ("compositionRatio", SortKey::CompositionRatio),
        ("cottonPart", SortKey::CompositionRatio),
    ];

    /// Resolve a raw sort parameter
    ///
    /// Absent or unrecognized values fall back to `Category`; this never fails.
    pub fn resolve(raw: Option<&str>) -> SortKey {
        let Some(raw) = raw else {
            return SortKey::default();
        };

        match Self::ALLOWED
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(raw.trim()))
        {
            Some((_, key)) => *key,
            None => {
                debug!(sort_key = raw, "Unrecognized sort key, falling back to category");
                SortKey::default()
            }
        }
    }

    pub fn column(&self) -> &'static str {
        match self {
            SortKey::Category => "category",
            SortKey::CompositionRatio => "composition_ratio",
        }
    }

    pub fn compare(&self, a: &UnitRecord, b: &UnitRecord) -> Ordering {
        match self {
            SortKey::Category => a.category.cmp(&b.category),
            // -0.0 and 0.0 tie, as they do in SQLite
            SortKey::CompositionRatio => a
                .composition_ratio
                .partial_cmp(&b.composition_ratio)
                .unwrap_or(Ordering::Equal),
        }
    }
}

// ============================================================================
// COMPILED QUERY
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RatioComparison {
    pub operator: ComparisonOperator,
    pub target: f64,
}

/// Validated, typed form of `QueryParams`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UnitQuery {
    category: Option<String>,
    comparison: Option<RatioComparison>,
    ratio_min: Option<f64>,
    ratio_max: Option<f64>,
    sort_key: SortKey,
}

impl UnitQuery {
    /// Query with no filters, sorted by category
    pub fn all() -> Self {
        Self::default()
    }

    /// Compile raw parameters
    ///
    /// An operator token outside `moreThan`/`lessThan`/`equal` fails with
    /// `InvalidArgument`. A valid operator without a ratio (or a ratio
    /// without an operator) adds no constraint.
    pub fn compile(params: &QueryParams) -> Result<Self> {
        let operator = params
            .comparison_operator
            .as_deref()
            .map(str::parse::<ComparisonOperator>)
            .transpose()?;

        let comparison = match (operator, params.composition_ratio) {
            (Some(operator), Some(target)) => Some(RatioComparison { operator, target }),
            _ => None,
        };

        Ok(UnitQuery {
            category: params.category.clone(),
            comparison,
            ratio_min: params.composition_ratio_min,
            ratio_max: params.composition_ratio_max,
            sort_key: SortKey::resolve(params.sort_key.as_deref()),
        })
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_comparison(mut self, operator: ComparisonOperator, target: f64) -> Self {
        self.comparison = Some(RatioComparison { operator, target });
        self
    }

    pub fn with_ratio_range(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.ratio_min = min;
        self.ratio_max = max;
        self
    }

    pub fn sort_key(&self) -> SortKey {
        self.sort_key
    }

    pub fn comparison(&self) -> Option<RatioComparison> {
        self.comparison
    }

    /// True when `unit` satisfies every supplied filter
    pub fn matches(&self, unit: &UnitRecord) -> bool {
        let ratio = unit.composition_ratio;

        self.category.as_ref().map_or(true, |c| unit.category == *c)
            && self
                .comparison
                .map_or(true, |cmp| cmp.operator.holds(ratio, cmp.target))
            && self.ratio_min.map_or(true, |min| ratio >= min)
            && self.ratio_max.map_or(true, |max| ratio <= max)
    }

    /// Stable ascending sort; ties keep their incoming order
    pub fn sort(&self, units: &mut [UnitRecord]) {
        units.sort_by(|a, b| self.sort_key.compare(a, b));
    }

    /// SQL `WHERE` clause (with leading space, or empty) and its bound values
    pub fn where_clause(&self) -> (String, Vec<Value>) {
        let mut conditions = Vec::new();
        let mut values = Vec::new();

        if let Some(category) = &self.category {
            values.push(Value::Text(category.clone()));
            conditions.push(format!("category = ?{}", values.len()));
        }

        if let Some(cmp) = self.comparison {
            values.push(Value::Real(cmp.target));
            conditions.push(format!("composition_ratio {} ?{}", cmp.operator.sql(), values.len()));
        }

        if let Some(min) = self.ratio_min {
            values.push(Value::Real(min));
            conditions.push(format!("composition_ratio >= ?{}", values.len()));
        }

        if let Some(max) = self.ratio_max {
            values.push(Value::Real(max));
            conditions.push(format!("composition_ratio <= ?{}", values.len()));
        }

        if conditions.is_empty() {
            (String::new(), values)
        } else {
            (format!(" WHERE {}", conditions.join(" AND ")), values)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{MemoryStore, SqliteStore, StockEntry, StockStore};

    fn seed<S: StockStore>(store: &mut S) {
        for (category, ratio, quantity) in [
            ("Red", 50.0, 10),
            ("Blue", 30.0, 20),
            ("red", 70.0, 30),
            ("Green", 30.0, 40),
            ("Blue", 90.0, 50),
            ("Amber", 50.0, 60),
        ] {
            store.create(StockEntry::new(category, ratio, quantity)).unwrap();
        }
    }

    fn params() -> QueryParams {
        QueryParams::default()
    }

    fn quantities(units: &[UnitRecord]) -> Vec<u32> {
        units.iter().map(|u| u.quantity).collect()
    }

    #[test]
    fn test_no_filters_returns_everything_sorted_by_category() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        seed(&mut store);

        let units = store.query(&UnitQuery::compile(&params()).unwrap()).unwrap();

        assert_eq!(units.len(), 6);
        let categories: Vec<&str> = units.iter().map(|u| u.category.as_str()).collect();
        assert_eq!(categories, vec!["Amber", "Blue", "Blue", "Green", "Red", "red"]);
        // Equal keys keep creation order
        assert_eq!(quantities(&units[1..3]), vec![20, 50]);
    }

    #[test]
    fn test_category_filter_is_case_sensitive() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        seed(&mut store);

        let query = UnitQuery::compile(&QueryParams {
            category: Some("Red".to_string()),
            ..params()
        })
        .unwrap();

        assert_eq!(quantities(&store.query(&query).unwrap()), vec![10]);
    }

    #[test]
    fn test_comparison_operators() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        seed(&mut store);

        for (op, expected) in [
            ("moreThan", vec![30, 50]),
            ("lessThan", vec![20, 40]),
            ("equal", vec![60, 10]),
        ] {
            let query = UnitQuery::compile(&QueryParams {
                comparison_operator: Some(op.to_string()),
                composition_ratio: Some(50.0),
                ..params()
            })
            .unwrap();

            let mut got = quantities(&store.query(&query).unwrap());
            let mut want = expected.clone();
            got.sort();
            want.sort();
            assert_eq!(got, want, "operator {op}");
        }
    }

    #[test]
    fn test_range_combines_with_comparison() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        seed(&mut store);

        let query = UnitQuery::compile(&QueryParams {
            comparison_operator: Some("moreThan".to_string()),
            composition_ratio: Some(30.0),
            composition_ratio_min: Some(40.0),
            composition_ratio_max: Some(70.0),
            sort_key: Some("compositionRatio".to_string()),
            ..params()
        })
        .unwrap();

        let units = store.query(&query).unwrap();
        assert_eq!(quantities(&units), vec![10, 60, 30]);
        for unit in &units {
            assert!(query.matches(unit));
        }
    }

    #[test]
    fn test_unrecognized_operator_is_invalid_argument() {
        let result = UnitQuery::compile(&QueryParams {
            comparison_operator: Some("notAnOp".to_string()),
            composition_ratio: Some(10.0),
            ..params()
        });

        match result {
            Err(StockError::InvalidArgument(msg)) => assert_eq!(msg, "Incorrect operation: notAnOp"),
            other => panic!("expected InvalidArgument, got {:?}", other),
        }
    }

    #[test]
    fn test_operator_without_ratio_has_no_effect() {
        let only_operator = UnitQuery::compile(&QueryParams {
            comparison_operator: Some("lessThan".to_string()),
            ..params()
        })
        .unwrap();
        let only_ratio = UnitQuery::compile(&QueryParams {
            composition_ratio: Some(0.0),
            ..params()
        })
        .unwrap();

        assert_eq!(only_operator.comparison(), None);
        assert_eq!(only_ratio.comparison(), None);
        assert_eq!(only_operator, UnitQuery::all());
    }

    #[test]
    fn test_sort_by_composition_ratio_is_non_decreasing() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        seed(&mut store);

        let query = UnitQuery::compile(&QueryParams {
            sort_key: Some("COMPOSITIONRATIO".to_string()),
            ..params()
        })
        .unwrap();
        let units = store.query(&query).unwrap();

        assert!(units
            .windows(2)
            .all(|w| w[0].composition_ratio <= w[1].composition_ratio));
        // 30.0 ties: Blue(20) was created before Green(40)
        assert_eq!(quantities(&units[0..2]), vec![20, 40]);
    }

    #[test]
    fn test_sort_key_fallback() {
        assert_eq!(SortKey::resolve(None), SortKey::Category);
        assert_eq!(SortKey::resolve(Some("quantity")), SortKey::Category);
        assert_eq!(SortKey::resolve(Some("cottonPart")), SortKey::CompositionRatio);
        assert_eq!(SortKey::resolve(Some("Color")), SortKey::Category);
    }

    #[test]
    fn test_sqlite_and_memory_agree() {
        let mut sqlite = SqliteStore::open_in_memory().unwrap();
        let mut memory = MemoryStore::new();
        seed(&mut sqlite);
        seed(&mut memory);

        let cases = vec![
            params(),
            QueryParams {
                category: Some("Blue".to_string()),
                ..params()
            },
            QueryParams {
                comparison_operator: Some("equal".to_string()),
                composition_ratio: Some(30.0),
                sort_key: Some("compositionRatio".to_string()),
                ..params()
            },
            QueryParams {
                composition_ratio_min: Some(50.0),
                sort_key: Some("bogus".to_string()),
                ..params()
            },
            QueryParams {
                composition_ratio_max: Some(50.0),
                sort_key: Some("compositionRatio".to_string()),
                ..params()
            },
        ];

        for case in cases {
            let query = UnitQuery::compile(&case).unwrap();
            assert_eq!(
                quantities(&sqlite.query(&query).unwrap()),
                quantities(&memory.query(&query).unwrap()),
                "params {:?}",
                case
            );
        }

        // Signed zeros tie and keep creation order in both backends
        seed_signed_zeros(&mut sqlite);
        seed_signed_zeros(&mut memory);
        let zeros = UnitQuery::compile(&QueryParams {
            composition_ratio_max: Some(0.0),
            sort_key: Some("compositionRatio".to_string()),
            ..params()
        })
        .unwrap();
        assert_eq!(quantities(&sqlite.query(&zeros).unwrap()), vec![1, 2]);
        assert_eq!(quantities(&memory.query(&zeros).unwrap()), vec![1, 2]);
    }

    fn seed_signed_zeros<S: StockStore>(store: &mut S) {
        for (ratio, quantity) in [(0.0, 1), (-0.0, 2)] {
            store
                .create(StockEntry {
                    category: "Zero".to_string(),
                    composition_ratio: ratio,
                    quantity,
                })
                .unwrap();
        }
    }

    #[test]
    fn test_where_clause_numbers_parameters_in_order() {
        let query = UnitQuery::all()
            .with_category("Red")
            .with_comparison(ComparisonOperator::LessThan, 80.0)
            .with_ratio_range(None, Some(60.0));

        let (sql, values) = query.where_clause();

        assert_eq!(
            sql,
            " WHERE category = ?1 AND composition_ratio < ?2 AND composition_ratio <= ?3"
        );
        assert_eq!(values.len(), 3);
        assert_eq!(UnitQuery::all().where_clause().0, "");
    }

    #[test]
    fn test_params_accept_legacy_names() {
        let params: QueryParams = serde_json::from_str(
            r#"{"color":"Red","operation":"moreThan","cottonPart":10,"sortBy":"cottonPart"}"#,
        )
        .unwrap();

        let query = UnitQuery::compile(&params).unwrap();
        assert_eq!(query.sort_key(), SortKey::CompositionRatio);
        assert_eq!(
            query.comparison(),
            Some(RatioComparison {
                operator: ComparisonOperator::MoreThan,
                target: 10.0
            })
        );
    }
}
