// 📥 Batch Importer - delimited text → validated entries → one all-or-nothing commit
//
// Two phases, never interleaved:
// 1. read + validate every line independently, collecting every problem
// 2. a single decision point: commit all entries, or fail with every message

use crate::db::{StockEntry, StockStore, UnitRecord};
use crate::error::{Result, StockError};
use csv::{ReaderBuilder, Trim};
use serde::Serialize;
use std::fmt;
use tracing::{error, info, warn};

/// Header spellings skipped when they appear as the first line
pub const HEADER_TOKENS: [[&str; 3]; 2] = [
    ["category", "compositionRatio", "quantity"],
    ["color", "cottonPart", "quantity"],
];

const EMPTY_INPUT: &str = "File is empty. Please load a correct file";

// ============================================================================
// LINE ERRORS
// ============================================================================

/// The rule a single line broke
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineRule {
    EmptyCategory,
    MalformedRatio,
    RatioOutOfRange,
    MalformedQuantity,
    QuantityNotPositive,
}

impl fmt::Display for LineRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            LineRule::EmptyCategory => "Category cannot be empty.",
            LineRule::MalformedRatio => "Incorrect composition ratio.",
            LineRule::RatioOutOfRange => "Composition ratio must be between 0 and 100.",
            LineRule::MalformedQuantity => "Incorrect quantity.",
            LineRule::QuantityNotPositive => "Quantity must be greater than 0.",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineError {
    /// 1-based line in the input
    pub line: u64,
    pub rule: LineRule,
}

impl fmt::Display for LineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Line {}: {}", self.line, self.rule)
    }
}

// ============================================================================
// PHASE 1: READ + VALIDATE
// ============================================================================

/// One input line split into trimmed fields
#[derive(Debug, Clone, PartialEq)]
pub struct RawRow {
    pub line: u64,
    pub fields: Vec<String>,
}

impl RawRow {
    fn field(&self, index: usize) -> &str {
        self.fields.get(index).map(String::as_str).unwrap_or("")
    }

    fn is_header(&self) -> bool {
        HEADER_TOKENS.iter().any(|tokens| {
            tokens
                .iter()
                .enumerate()
                .all(|(i, token)| self.field(i).eq_ignore_ascii_case(token))
        })
    }
}

/// 1-based line of the record the reader reports at `offset`
///
/// The reader positions a record where the previous one ended, before any
/// blank lines it skips, so those are stepped over first.
fn line_at(input: &[u8], offset: u64) -> u64 {
    let mut start = usize::try_from(offset).unwrap_or(input.len()).min(input.len());
    while matches!(input.get(start), Some(b'\n' | b'\r')) {
        start += 1;
    }
    1 + input[..start].iter().filter(|b| **b == b'\n').count() as u64
}

/// Split input into rows, keeping each row's line number
///
/// Reader failures (e.g. invalid UTF-8) are processing failures, not line errors.
pub fn read_rows(input: &[u8]) -> Result<Vec<RawRow>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(input);

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result.map_err(|e| StockError::ProcessingFailure(e.to_string()))?;
        let line = line_at(input, record.position().map_or(0, |p| p.byte()));

        rows.push(RawRow {
            line,
            fields: record.iter().map(str::to_string).collect(),
        });
    }

    Ok(rows)
}

/// Validate one row; every broken rule is reported, not only the first
pub fn validate_row(row: &RawRow) -> std::result::Result<StockEntry, Vec<LineError>> {
    let mut errors = Vec::new();
    let mut fail = |rule| errors.push(LineError { line: row.line, rule });

    let category = row.field(0);
    if category.is_empty() {
        fail(LineRule::EmptyCategory);
    }

    let ratio = match row.field(1).parse::<f64>() {
        Ok(ratio) if (0.0..=100.0).contains(&ratio) => Some(ratio),
        Ok(_) => {
            fail(LineRule::RatioOutOfRange);
            None
        }
        Err(_) => {
            fail(LineRule::MalformedRatio);
            None
        }
    };

    let quantity = match row.field(2).parse::<i64>() {
        Ok(q) if q <= 0 => {
            fail(LineRule::QuantityNotPositive);
            None
        }
        Ok(q) => match u32::try_from(q) {
            Ok(q) => Some(q),
            Err(_) => {
                fail(LineRule::MalformedQuantity);
                None
            }
        },
        Err(_) => {
            fail(LineRule::MalformedQuantity);
            None
        }
    };

    match (ratio, quantity) {
        (Some(ratio), Some(quantity)) if errors.is_empty() => {
            Ok(StockEntry::new(category, ratio, quantity))
        }
        _ => Err(errors),
    }
}

// ============================================================================
// PHASE 2: DECIDE + COMMIT
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct ImportSummary {
    pub header_skipped: bool,
    pub imported: Vec<UnitRecord>,
}

impl ImportSummary {
    pub fn count(&self) -> usize {
        self.imported.len()
    }

    pub fn message(&self) -> String {
        "File successfully loaded.".to_string()
    }
}

/// Import every line of `input` as a new record, or none of them
///
/// Fails with `InvalidArgument` on empty input or when any line is invalid
/// (the message lists every line error in line order), and with
/// `ProcessingFailure` when the input cannot be read at all.
pub fn import_csv<S: StockStore>(store: &mut S, input: &[u8]) -> Result<ImportSummary> {
    info!(bytes = input.len(), "Processing CSV upload");

    if input.iter().all(u8::is_ascii_whitespace) {
        error!("Uploaded file is empty");
        return Err(StockError::invalid(EMPTY_INPUT));
    }

    let mut rows = read_rows(input).inspect_err(|e| error!(error = %e, "Error reading CSV file"))?;

    // Only the very first input line may be a header
    let header_skipped = rows.first().is_some_and(|row| row.line == 1 && row.is_header());
    if header_skipped {
        info!("Skipping header row in CSV file");
        rows.remove(0);
    }

    let outcomes: Vec<_> = rows.iter().map(validate_row).collect();

    let mut entries = Vec::with_capacity(outcomes.len());
    let mut messages = Vec::new();
    for outcome in outcomes {
        match outcome {
            Ok(entry) => entries.push(entry),
            Err(line_errors) => {
                for line_error in line_errors {
                    warn!(line = line_error.line, "Error processing line: {}", line_error.rule);
                    messages.push(line_error.to_string());
                }
            }
        }
    }

    if !messages.is_empty() {
        let joined = messages.join("\n");
        error!("Errors occurred while reading CSV file:\n{}", joined);
        return Err(StockError::invalid(format!("Errors in file:\n{}", joined)));
    }

    let imported = store.create_all(entries)?;
    info!(count = imported.len(), "CSV file processed successfully");

    Ok(ImportSummary {
        header_skipped,
        imported,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{MemoryStore, SqliteStore};

    fn row(line: u64, fields: &[&str]) -> RawRow {
        RawRow {
            line,
            fields: fields.iter().map(|f| f.to_string()).collect(),
        }
    }

    #[test]
    fn test_import_with_header() {
        let mut store = SqliteStore::open_in_memory().unwrap();

        let summary = import_csv(
            &mut store,
            b"category,compositionRatio,quantity\nRed,50,100\nBlue,60,150",
        )
        .unwrap();

        assert!(summary.header_skipped);
        assert_eq!(summary.count(), 2);

        let units = store.list_all().unwrap();
        assert_eq!(units, summary.imported);
        assert_eq!(
            (units[0].category.as_str(), units[0].composition_ratio, units[0].quantity),
            ("Red", 50.0, 100)
        );
        assert_eq!(
            (units[1].category.as_str(), units[1].composition_ratio, units[1].quantity),
            ("Blue", 60.0, 150)
        );

        println!("✅ Import round-trip test PASSED");
    }

    #[test]
    fn test_legacy_header_is_case_insensitive() {
        let mut store = MemoryStore::new();

        let summary = import_csv(&mut store, b"COLOR,CottonPart,Quantity\nred,50,100").unwrap();

        assert!(summary.header_skipped);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_import_without_header() {
        let mut store = MemoryStore::new();

        let summary = import_csv(&mut store, b"Red,50,100\n").unwrap();

        assert!(!summary.header_skipped);
        assert_eq!(summary.count(), 1);
    }

    #[test]
    fn test_invalid_line_aborts_whole_import() {
        let mut store = SqliteStore::open_in_memory().unwrap();

        let err = import_csv(&mut store, b"Red,150,100\nBlue,60,150").unwrap_err();

        match err {
            StockError::InvalidArgument(msg) => assert_eq!(
                msg,
                "Errors in file:\nLine 1: Composition ratio must be between 0 and 100."
            ),
            other => panic!("expected InvalidArgument, got {:?}", other),
        }
        assert_eq!(store.verify_count().unwrap(), 0);
    }

    #[test]
    fn test_every_bad_line_is_reported_in_order() {
        let mut store = MemoryStore::new();
        let input = "category,compositionRatio,quantity\n\
                     Red,50,100\n\
                     ,50,10\n\
                     Blue,abc,10\n\
                     Green,20,0\n\
                     White,20,ten\n\
                     Black,-1,-1\n";

        let err = import_csv(&mut store, input.as_bytes()).unwrap_err();

        let StockError::InvalidArgument(msg) = err else {
            panic!("expected InvalidArgument");
        };
        let lines: Vec<&str> = msg.lines().collect();
        assert_eq!(
            lines,
            vec![
                "Errors in file:",
                "Line 3: Category cannot be empty.",
                "Line 4: Incorrect composition ratio.",
                "Line 5: Quantity must be greater than 0.",
                "Line 6: Incorrect quantity.",
                "Line 7: Composition ratio must be between 0 and 100.",
                "Line 7: Quantity must be greater than 0.",
            ]
        );
        assert!(store.is_empty());
    }

    #[test]
    fn test_empty_input_is_invalid_argument() {
        let mut store = MemoryStore::new();

        for input in [&b""[..], &b"  \n\n"[..]] {
            match import_csv(&mut store, input) {
                Err(StockError::InvalidArgument(msg)) => assert_eq!(msg, EMPTY_INPUT),
                other => panic!("expected InvalidArgument, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_unreadable_input_is_processing_failure() {
        let mut store = MemoryStore::new();

        let result = import_csv(&mut store, b"Red,50,100\n\xff\xfe,10,10\n");

        assert!(matches!(result, Err(StockError::ProcessingFailure(_))));
        assert!(store.is_empty());
    }

    #[test]
    fn test_header_only_imports_nothing() {
        let mut store = MemoryStore::new();

        let summary = import_csv(&mut store, b"category,compositionRatio,quantity\n").unwrap();

        assert!(summary.header_skipped);
        assert_eq!(summary.count(), 0);
        assert!(store.is_empty());
    }

    #[test]
    fn test_validate_row_trims_and_accepts_bounds() {
        let rows = read_rows(&b"  Red  , 0 , 1\nBlue,100,4294967295\n"[..]).unwrap();

        assert_eq!(validate_row(&rows[0]), Ok(StockEntry::new("Red", 0.0, 1)));
        assert_eq!(
            validate_row(&rows[1]),
            Ok(StockEntry::new("Blue", 100.0, u32::MAX))
        );
    }

    #[test]
    fn test_validate_row_missing_and_oversized_fields() {
        assert_eq!(
            validate_row(&row(9, &["Red"])),
            Err(vec![
                LineError { line: 9, rule: LineRule::MalformedRatio },
                LineError { line: 9, rule: LineRule::MalformedQuantity },
            ])
        );
        assert_eq!(
            validate_row(&row(2, &["Red", "NaN", "4294967296"])),
            Err(vec![
                LineError { line: 2, rule: LineRule::RatioOutOfRange },
                LineError { line: 2, rule: LineRule::MalformedQuantity },
            ])
        );
    }

    #[test]
    fn test_line_numbers_follow_input_lines() {
        let rows = read_rows(&b"Red,1,1\n\nBlue,2,2\n"[..]).unwrap();

        let lines: Vec<u64> = rows.iter().map(|r| r.line).collect();
        assert_eq!(lines, vec![1, 3]);

        let rows = read_rows(&b"\r\n\r\nRed,1,1\r\n\r\n\r\nBlue,2,2"[..]).unwrap();
        let lines: Vec<u64> = rows.iter().map(|r| r.line).collect();
        assert_eq!(lines, vec![3, 6]);
    }

    #[test]
    fn test_error_after_blank_line_names_its_own_line() {
        let mut store = MemoryStore::new();

        let err = import_csv(&mut store, b"Red,1,1\n\nBlue,150,2\n").unwrap_err();

        match err {
            StockError::InvalidArgument(msg) => assert_eq!(
                msg,
                "Errors in file:\nLine 3: Composition ratio must be between 0 and 100."
            ),
            other => panic!("expected InvalidArgument, got {:?}", other),
        }
        assert!(store.is_empty());

        println!("✅ Line numbering test PASSED");
    }

    #[test]
    fn test_header_after_first_line_is_data() {
        let mut store = MemoryStore::new();

        let err = import_csv(&mut store, b"\ncategory,compositionRatio,quantity\nRed,50,1\n")
            .unwrap_err();
        let StockError::InvalidArgument(msg) = err else {
            panic!("expected InvalidArgument");
        };
        assert_eq!(
            msg,
            "Errors in file:\nLine 2: Incorrect composition ratio.\nLine 2: Incorrect quantity."
        );

        let err = import_csv(&mut store, b"Red,50,1\n\ncolor,cottonPart,quantity\n").unwrap_err();
        let StockError::InvalidArgument(msg) = err else {
            panic!("expected InvalidArgument");
        };
        assert_eq!(
            msg,
            "Errors in file:\nLine 3: Incorrect composition ratio.\nLine 3: Incorrect quantity."
        );

        assert!(store.is_empty());
    }
}
