use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use serde_json::json;
use tracing_subscriber::EnvFilter;

use finqa_core::{canned_dataset, FinancialRecord, CANNED_DATASET_LEN};
use finqa_rag::{render_answer, FinqaConfig, FinqaServices};

const VERSION: &str = env!("CARGO_PKG_VERSION");
const VERSION_LONG: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (features: ",
    env!("FINQA_FEATURES"),
    ")"
);

#[derive(Parser, Debug)]
#[command(name = "finqa", version = VERSION, long_version = VERSION_LONG, about = "Financial question answering over indexed P&L records")]
struct Cli {
    /// Config file; defaults to $FINQA_CONFIG or ./finqa.toml.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Overrides `index.path` for the sqlite backend.
    #[arg(long = "index-path", global = true)]
    index_path: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Index the built-in quarterly dataset.
    Seed,
    /// Extract a PDF, summarise it and write the profit/loss CSV.
    Ingest {
        input: PathBuf,
        /// Also upsert the extracted table rows into the index.
        #[arg(long, action = ArgAction::SetTrue)]
        index: bool,
        /// First record id; derived from the document contents when omitted.
        #[arg(long = "id-base")]
        id_base: Option<u64>,
        #[arg(long = "csv-out")]
        csv_out: Option<PathBuf>,
    },
    /// Answer a question from the indexed records.
    Ask {
        question: String,
        #[arg(long = "top-k")]
        top_k: Option<usize>,
        /// Print the answer with its retrieved context as JSON.
        #[arg(long, action = ArgAction::SetTrue)]
        json: bool,
    },
    /// Print the built-in dataset.
    Records {
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long, action = ArgAction::SetTrue)]
        json: bool,
    },
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let load_config = || -> Result<FinqaConfig> {
        let mut config = FinqaConfig::load(cli.config.as_deref())?;
        if let Some(path) = &cli.index_path {
            config.index.path = path.clone();
        }
        Ok(config)
    };

    match &cli.command {
        Commands::Seed => {
            let services = FinqaServices::from_config(load_config()?)?;
            let records = services.seed()?;
            println!(
                "indexed {} records into '{}'",
                records.len(),
                services.config().index.name
            );
        }
        Commands::Ingest {
            input,
            index,
            id_base,
            csv_out,
        } => {
            let mut config = load_config()?;
            if let Some(path) = csv_out {
                config.ingest.csv_path = path.clone();
            }
            let services = FinqaServices::from_config(config)?;
            let outcome = services
                .ingest(input, *index, *id_base)
                .with_context(|| format!("failed to ingest {}", input.display()))?;
            println!(
                "pages: {}, tables: {}, profit/loss rows: {}",
                outcome.extraction.pages.len(),
                outcome.extraction.tables.len(),
                outcome.table.rows().len()
            );
            if let Some(path) = &outcome.csv_path {
                println!("csv: {}", path.display());
            }
            if *index {
                println!("indexed {} records", outcome.records.len());
            }
            if !outcome.summary.is_empty() {
                println!("insights: {}", outcome.summary);
            }
        }
        Commands::Ask {
            question,
            top_k,
            json,
        } => {
            let services = FinqaServices::from_config(load_config()?)?;
            let synthesizer = services.synthesizer();
            let result = match top_k {
                Some(k) => synthesizer.answer_with_top_k(question, *k),
                None => synthesizer.answer(question),
            };
            if *json {
                let value = match result {
                    Ok(answer) => serde_json::to_value(&answer)?,
                    Err(err) => json!({ "query": question, "error": err.to_string() }),
                };
                println!("{}", serde_json::to_string_pretty(&value)?);
            } else {
                println!("{}", render_answer(result));
            }
        }
        Commands::Records { limit, json } => {
            let records = dataset_view(*limit);
            if *json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else {
                print_records(&records)?;
            }
        }
    }
    Ok(())
}

/// The built-in dataset; needs neither config nor index.
fn dataset_view(limit: Option<usize>) -> Vec<FinancialRecord> {
    let mut records = canned_dataset(CANNED_DATASET_LEN);
    if let Some(limit) = limit {
        records.truncate(limit);
    }
    records
}

fn print_records(records: &[FinancialRecord]) -> Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    writeln!(
        out,
        "{:>5}  {:<8} {:>10} {:>10} {:>10} {:>10} {:>10}",
        "id", "quarter", "revenue", "opex", "net", "gross", "ebt"
    )?;
    for record in records {
        let fields = record.fields();
        writeln!(
            out,
            "{:>5}  {:<8} {:>10} {:>10} {:>10} {:>10} {:>10}",
            record.id(),
            fields.quarter,
            fields.revenue.to_string(),
            fields.operating_expenses.to_string(),
            fields.net_income.to_string(),
            fields.gross_profit.to_string(),
            fields.ebt.to_string()
        )?;
    }
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}
