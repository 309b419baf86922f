use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::Parser;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::prelude::*;

use spend_coverage::config::parse_max_subset_items;
use spend_coverage::{
    load_transactions, CoverageConfig, CoverageReport, DayWindow, Reconciler, RefinementMode,
    Refiner, ResponseFileProvider, Transaction,
};

#[derive(Parser)]
#[command(author, version, about = "Daily spend coverage report", long_about = None)]
struct Cli {
    /// Transactions file (.csv or .json)
    #[arg(short, long, value_name = "FILE")]
    input: PathBuf,

    /// Only reconcile this calendar day (YYYY-MM-DD)
    #[arg(short, long)]
    date: Option<NaiveDate>,

    /// Offset from UTC used for the day boundaries
    #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
    utc_offset_minutes: i32,

    /// Cap on how many transactions one exact grouping may combine
    #[arg(long, value_parser = parse_max_subset_items)]
    max_subset_items: Option<usize>,

    /// Captured refinement response to validate against the day
    #[arg(long, value_name = "FILE")]
    refinement_response: Option<PathBuf>,

    /// off, uncovered or always
    #[arg(long)]
    refinement: Option<RefinementMode>,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let mut config = CoverageConfig::from_env()?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    if let Some(max) = cli.max_subset_items {
        config.max_subset_items = max;
    }
    if let Some(mode) = cli.refinement {
        config.refinement.mode = mode;
    }

    let all = load_transactions(&cli.input)
        .with_context(|| format!("Failed to load {}", cli.input.display()))?;

    let transactions = match cli.date {
        Some(date) => {
            let window = DayWindow::with_offset(date, cli.utc_offset_minutes)?;
            let selected = window.select(&all);
            debug!(
                date = %date,
                start = window.start,
                end = window.end,
                selected = selected.len(),
                total = all.len(),
                "applied day window"
            );
            selected
        }
        None => all,
    };

    let mut reconciler = Reconciler::from_config(&config);
    if let Some(path) = &cli.refinement_response {
        let refiner = Refiner::new(Box::new(ResponseFileProvider::new(path)), &config.refinement)?;
        reconciler = reconciler.with_refiner(refiner);
    }

    let report = reconciler.reconcile(&transactions)?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&cli, &transactions, &report);
    }

    Ok(())
}

fn print_report(cli: &Cli, transactions: &[Transaction], report: &CoverageReport) {
    let descriptions: HashMap<&str, &str> = transactions
        .iter()
        .map(|tx| (tx.id.as_str(), tx.description.as_str()))
        .collect();
    let label = |id: &str| -> String {
        match descriptions.get(id) {
            Some(d) if !d.is_empty() => format!("{} ({})", id, d),
            _ => id.to_string(),
        }
    };

    println!("📊 Spend coverage for {}", cli.input.display());
    if let Some(date) = cli.date {
        println!("   Day: {}", date);
    }
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("Total spends:   {}", money(report.totals.spend_total as i64));
    println!("Total earnings: {}", money(report.totals.earn_total as i64));
    println!("Net:            {}", money(report.totals.net));

    println!("\nSpends ({})", report.spends.len());
    for spend in &report.spends {
        let icon = if spend.covered { "✅" } else { "❌" };
        let amount = spend.covered_cents + spend.uncovered_cents;
        println!("{} {} {}", icon, money(amount as i64), label(&spend.tx_id));

        if !spend.sources.is_empty() {
            let parts: Vec<String> = spend
                .sources
                .iter()
                .map(|s| format!("{} from {}", money(s.amount_cents as i64), label(&s.tx_id)))
                .collect();
            println!("   Covered by: {}", parts.join("; "));
        }
        if !spend.covered {
            println!("   Uncovered: {}", money(spend.uncovered_cents as i64));
        }
    }

    println!("\nRemaining earnings");
    for (id, left) in &report.remaining_earnings {
        println!("💰 {} {}", money(*left as i64), label(id));
    }

    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("✓ {}", report.summary());
    println!("✓ Allocation: {:?}", report.allocation_source);
}

fn money(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{}{}.{:02}", sign, abs / 100, abs % 100)
}
