// Stockroom - Command-line client
// Runs one ledger operation against the local database and prints JSON lines

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use stockroom::{
    validate_category, validate_quantity, Config, OutcomeLookup, QueryParams, SqliteStore,
    StockLedger, UnitId, UnitPayload,
};
use tracing_subscriber::{fmt, EnvFilter};

/// Stockroom CLI
#[derive(Parser, Debug)]
#[command(name = "stockroom")]
#[command(about = "Stock ledger for categorized units")]
#[command(version)]
struct Args {
    /// SQLite database file
    #[arg(long, env = "STOCKROOM_DB", default_value = "./stockroom.db")]
    db: PathBuf,

    /// Outcome lookup policy: attributes | exact
    #[arg(long, env = "STOCKROOM_OUTCOME_LOOKUP", default_value = "attributes")]
    outcome_lookup: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Register incoming stock as a new record
    Income {
        category: String,

        /// Composition ratio in percent
        #[arg(allow_negative_numbers = true)]
        ratio: f64,

        #[arg(allow_negative_numbers = true)]
        quantity: i64,
    },

    /// Take stock out of a matching record
    Outcome {
        category: String,

        #[arg(allow_negative_numbers = true)]
        ratio: f64,

        #[arg(allow_negative_numbers = true)]
        quantity: i64,
    },

    /// Overwrite category and quantity of one record
    Update {
        id: UnitId,

        category: String,

        #[arg(allow_negative_numbers = true)]
        quantity: i64,
    },

    /// Show one record
    Get { id: UnitId },

    /// List records matching the filters
    List {
        #[arg(long)]
        category: Option<String>,

        /// moreThan | lessThan | equal
        #[arg(long)]
        operator: Option<String>,

        #[arg(long, allow_negative_numbers = true)]
        ratio: Option<f64>,

        #[arg(long, allow_negative_numbers = true)]
        ratio_min: Option<f64>,

        #[arg(long, allow_negative_numbers = true)]
        ratio_max: Option<f64>,

        /// category | compositionRatio
        #[arg(long)]
        sort_key: Option<String>,
    },

    /// Sum quantities over matching records
    Count {
        #[arg(long)]
        category: Option<String>,

        #[arg(long)]
        operator: Option<String>,

        #[arg(long, allow_negative_numbers = true)]
        ratio: Option<f64>,
    },

    /// Import a CSV file (category,compositionRatio,quantity), all lines or none
    Import { file: PathBuf },
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,stockroom=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let outcome_lookup: OutcomeLookup = args.outcome_lookup.parse()?;
    let config = Config::builder()
        .database_path(&args.db)
        .outcome_lookup(outcome_lookup)
        .build();

    let mut ledger = config
        .open_ledger()
        .with_context(|| format!("Failed to open database {}", config.database_path.display()))?;

    run(&mut ledger, args.command)
}

fn run(ledger: &mut StockLedger<SqliteStore>, command: Commands) -> Result<()> {
    match command {
        Commands::Income { category, ratio, quantity } => {
            let entry = payload(category, ratio, quantity).validate()?;
            print_json(&ledger.income(entry)?)?;
        }
        Commands::Outcome { category, ratio, quantity } => {
            let entry = payload(category, ratio, quantity).validate()?;
            print_json(&ledger.outcome(&entry)?)?;
        }
        Commands::Update { id, category, quantity } => {
            let category = validate_category(&category)?;
            let quantity = validate_quantity(quantity)?;
            print_json(&ledger.update(&id, category, quantity)?)?;
        }
        Commands::Get { id } => {
            print_json(&ledger.get(&id)?)?;
        }
        Commands::List { category, operator, ratio, ratio_min, ratio_max, sort_key } => {
            let params = QueryParams {
                category,
                comparison_operator: operator,
                composition_ratio: ratio,
                composition_ratio_min: ratio_min,
                composition_ratio_max: ratio_max,
                sort_key,
            };
            for unit in ledger.list(&params)? {
                print_json(&unit)?;
            }
        }
        Commands::Count { category, operator, ratio } => {
            let total = ledger.count(category.as_deref(), operator.as_deref(), ratio)?;
            println!("{}", total);
        }
        Commands::Import { file } => {
            let input = std::fs::read(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let summary = ledger.import_csv(&input)?;
            println!("{} ({} units)", summary.message(), summary.count());
        }
    }

    Ok(())
}

fn payload(category: String, composition_ratio: f64, quantity: i64) -> UnitPayload {
    UnitPayload {
        category,
        composition_ratio,
        quantity,
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}
