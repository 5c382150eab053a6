use anyhow::{bail, Context, Result};
use chrono::Utc;
use rusqlite::Connection;
use std::env;
use std::path::Path;

use property_flip::{
    get_property, insert_sales, insert_valuation, latest_analysis, latest_valuation,
    load_properties_csv, load_sales_csv, save_property, setup_database, AnalysisConfig, Analyzer,
    PropertyOutcome, StaticSource, ValuationFact,
};

const DEFAULT_DB_PATH: &str = "property_flip.db";

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    if let Err(e) = property_flip::logging::init_logging() {
        eprintln!("⚠️  {}", e);
    }

    match args.get(1).map(String::as_str) {
        Some("import-properties") => run_import_properties(arg(&args, 2, "<csv>")?),
        Some("import-sales") => run_import_sales(arg(&args, 2, "<csv>")?),
        Some("add-valuation") => run_add_valuation(
            arg(&args, 2, "<address>")?,
            arg(&args, 3, "<rv|->")?,
            arg(&args, 4, "<cv|->")?,
        ),
        Some("analyze") => run_analyze(&args[2..]),
        Some("show") => run_show(arg(&args, 2, "<address>")?),
        _ => {
            print_usage();
            Ok(())
        }
    }
}

fn arg<'a>(args: &'a [String], index: usize, name: &str) -> Result<&'a str> {
    match args.get(index) {
        Some(value) => Ok(value.as_str()),
        None => {
            print_usage();
            bail!("missing argument {}", name)
        }
    }
}

fn print_usage() {
    println!("🏠 Property Flip Analyzer v{}", property_flip::VERSION);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("Usage:");
    println!("  property-flip import-properties <csv>");
    println!("  property-flip import-sales <csv>");
    println!("  property-flip add-valuation <address> <rv|-> <cv|->");
    println!("  property-flip analyze [address...]");
    println!("  property-flip show <address>");
    println!();
    println!("Database: $DATABASE_PATH (default {})", DEFAULT_DB_PATH);
}

fn open_database() -> Result<Connection> {
    dotenvy::dotenv().ok();
    let db_path = env::var("DATABASE_PATH").unwrap_or_else(|_| DEFAULT_DB_PATH.to_string());

    let conn = Connection::open(Path::new(&db_path))
        .with_context(|| format!("Failed to open database at {}", db_path))?;
    setup_database(&conn)?;
    Ok(conn)
}

fn run_import_properties(csv_path: &str) -> Result<()> {
    println!("📂 Loading properties from {}...", csv_path);
    let properties = load_properties_csv(Path::new(csv_path))?;
    println!("✓ Loaded {} properties from CSV", properties.len());

    let conn = open_database()?;
    for property in &properties {
        save_property(&conn, property)?;
    }
    println!("✓ Saved {} properties", properties.len());

    Ok(())
}

fn run_import_sales(csv_path: &str) -> Result<()> {
    println!("📂 Loading sales from {}...", csv_path);
    let sales = load_sales_csv(Path::new(csv_path), Utc::now())?;
    println!("✓ Loaded {} sales from CSV", sales.len());

    let conn = open_database()?;
    let import = insert_sales(&conn, &sales)?;
    println!("✓ New sales: {}", import.inserted);
    println!("✓ Already known (refreshed): {}", import.refreshed);

    Ok(())
}

fn parse_amount(value: &str, name: &str) -> Result<Option<f64>> {
    if value == "-" {
        return Ok(None);
    }
    let amount: f64 = value
        .parse()
        .with_context(|| format!("{} must be a number or '-', got {:?}", name, value))?;
    Ok(Some(amount))
}

fn run_add_valuation(address: &str, rv: &str, cv: &str) -> Result<()> {
    let rateable_value = parse_amount(rv, "rv")?;
    let capital_value = parse_amount(cv, "cv")?;

    let conn = open_database()?;
    if get_property(&conn, address)?.is_none() {
        bail!("Unknown property: {} (import it first)", address);
    }

    let fact = ValuationFact::new(rateable_value, capital_value, "manual", Utc::now());
    insert_valuation(&conn, address, &fact)?;
    println!("✓ Valuation recorded for {}", address);

    Ok(())
}

fn run_analyze(addresses: &[String]) -> Result<()> {
    let config = AnalysisConfig::from_env()?;
    let conn = open_database()?;

    // No live collaborators: stale facts are not refreshed
    let source = StaticSource::new();
    let analyzer = Analyzer::with_source(&conn, config, &source);

    let now = Utc::now();
    let outcomes = if addresses.is_empty() {
        analyzer.analyze_all(now)?
    } else {
        analyzer.analyze_addresses(addresses, now)
    };

    println!("📊 Analysis");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let mut viable = 0;
    let mut failed = 0;
    for outcome in &outcomes {
        match outcome {
            PropertyOutcome::Analyzed(result) => {
                if result.is_viable {
                    viable += 1;
                }
                println!("✓ {}", result.summary());
            }
            PropertyOutcome::Failed { address, reason } => {
                failed += 1;
                println!("❌ {}: {}", address, reason);
            }
        }
    }

    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!(
        "{} analyzed, {} viable, {} failed",
        outcomes.len() - failed,
        viable,
        failed
    );

    Ok(())
}

fn run_show(address: &str) -> Result<()> {
    let conn = open_database()?;

    let Some(property) = get_property(&conn, address)? else {
        bail!("Unknown property: {}", address);
    };

    println!("🏠 {}", property.address);
    println!(
        "   Suburb: {}  Bedrooms: {}  Floor area: {}",
        property.suburb.as_deref().unwrap_or("-"),
        property.bedrooms.map(|b| b.to_string()).unwrap_or_else(|| "-".to_string()),
        property.floor_area.map(|a| format!("{:.0} m²", a)).unwrap_or_else(|| "-".to_string()),
    );

    match latest_valuation(&conn, address)? {
        Some(fact) => println!(
            "   Valuation: RV {:?}  CV {:?}  ({}, observed {})",
            fact.rateable_value,
            fact.capital_value,
            fact.source,
            fact.observed_at.map(|t| t.to_rfc3339()).unwrap_or_else(|| "never".to_string()),
        ),
        None => println!("   Valuation: none"),
    }

    match latest_analysis(&conn, address)? {
        Some(result) => {
            println!("   Last analysis ({}):", result.analyzed_at.to_rfc3339());
            println!("   {}", serde_json::to_string_pretty(&result)?);
        }
        None => println!("   No analysis yet"),
    }

    Ok(())
}
