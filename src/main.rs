// FuelEU Compliance Ledger - CLI
// init / routes / bank / pool subcommands over the local SQLite database.

use std::env;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use fueleu_ledger::{
    BankingEngine, BankingOutcome, BankingRequest, EngineConfig, PoolEngine, PoolOutcome,
    PoolRequest, ProcessConfig, Route, RouteStore, SqliteStore,
};

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    let config = ProcessConfig::from_env();

    match args.get(1).map(String::as_str) {
        Some("init") => run_init(&config, args.get(2).map(Path::new)),
        Some("routes") => run_routes(&config),
        Some("bank") => run_bank(&config, &args[2..]),
        Some("pool") => run_pool(&config, &args[2..]),
        _ => {
            print_usage();
            Ok(())
        }
    }
}

fn print_usage() {
    println!("FuelEU Compliance Ledger v{}", fueleu_ledger::VERSION);
    println!();
    println!("Usage:");
    println!("  fueleu-ledger init [readings.csv]   Create the database, seed demo routes,");
    println!("                                      optionally import intensity readings");
    println!("  fueleu-ledger routes                List routes");
    println!("  fueleu-ledger bank <routeId> <fuel> <actual> <amount> <period>");
    println!("                                      Bank surplus for a route/period");
    println!("  fueleu-ledger pool <poolId> <name> <period> <routeId> [routeId...]");
    println!("                                      Form a compliance pool");
    println!();
    println!("Database path comes from COMPLIANCE_DB (default: compliance.db)");
}

fn run_init(config: &ProcessConfig, csv_path: Option<&Path>) -> Result<()> {
    println!("Initializing database at {}", config.db_path.display());

    let store = SqliteStore::open(&config.db_path)?;
    println!("✓ Schema ready (WAL mode)");

    let demo_routes = [
        Route {
            id: "R-ROT-SIN".to_string(),
            origin: "Rotterdam".to_string(),
            destination: "Singapore".to_string(),
            distance_km: Some(15_800.0),
        },
        Route {
            id: "R-HAM-NYC".to_string(),
            origin: "Hamburg".to_string(),
            destination: "New York".to_string(),
            distance_km: Some(6_600.0),
        },
        Route {
            id: "R-ALG-SHA".to_string(),
            origin: "Algeciras".to_string(),
            destination: "Shanghai".to_string(),
            distance_km: Some(17_200.0),
        },
    ];
    for route in &demo_routes {
        store.upsert_route(route)?;
    }
    println!("✓ Seeded {} demo routes", demo_routes.len());

    if let Some(path) = csv_path {
        let imported = store.import_readings_csv(path)?;
        println!("✓ Imported {} intensity readings from {}", imported, path.display());
        println!("✓ Database contains {} readings", store.reading_count()?);
    }

    Ok(())
}

fn run_routes(config: &ProcessConfig) -> Result<()> {
    let store = SqliteStore::open(&config.db_path)?;
    let routes = store.all_routes()?;

    if routes.is_empty() {
        println!("No routes found. Run: fueleu-ledger init");
        return Ok(());
    }

    println!("{} routes:", routes.len());
    for route in routes {
        match route.distance_km {
            Some(km) => println!(
                "  {}  {} → {}  ({:.0} km)",
                route.id, route.origin, route.destination, km
            ),
            None => println!("  {}  {} → {}", route.id, route.origin, route.destination),
        }
    }

    Ok(())
}

fn run_bank(config: &ProcessConfig, args: &[String]) -> Result<()> {
    if args.len() != 5 {
        print_usage();
        anyhow::bail!("bank requires: <routeId> <fuel> <actual> <amount> <period>");
    }

    let request = BankingRequest {
        route_id: args[0].clone(),
        fuel_consumption: args[1].parse().context("fuel must be a number")?,
        actual_intensity: args[2].parse().context("actual must be a number")?,
        amount_to_bank: args[3].parse().context("amount must be a number")?,
        target: None,
        period: args[4].clone(),
    };

    let store = Arc::new(SqliteStore::open(&config.db_path)?);
    let engine = BankingEngine::new(EngineConfig::default(), store);

    match engine.bank_surplus(&request)? {
        BankingOutcome::Accepted {
            compliance_balance,
            energy_in_scope,
            amount_banked,
        } => {
            println!("✓ Banked {amount_banked} for route {}", request.route_id);
            println!("  compliance balance: {compliance_balance}");
            println!("  energy in scope:    {energy_in_scope}");
        }
        BankingOutcome::Rejected { reason, .. } => {
            println!("✗ Rejected: {reason}");
        }
    }

    Ok(())
}

fn run_pool(config: &ProcessConfig, args: &[String]) -> Result<()> {
    if args.len() < 4 {
        print_usage();
        anyhow::bail!("pool requires: <poolId> <name> <period> <routeId> [routeId...]");
    }

    let request = PoolRequest {
        pool_id: args[0].clone(),
        pool_name: args[1].clone(),
        period: args[2].clone(),
        route_ids: args[3..].to_vec(),
    };

    let store = Arc::new(SqliteStore::open(&config.db_path)?);
    let engine = PoolEngine::new(EngineConfig::default(), store.clone(), store);

    match engine.create_pool(&request)? {
        PoolOutcome::Accepted { total_cb, members } => {
            println!("✓ Pool {} created (aggregate CB = {total_cb})", request.pool_id);
            for m in members {
                println!(
                    "  {}  before: {:>12.4}  after: {:>12.4}",
                    m.route_id, m.before_cb, m.after_cb
                );
            }
        }
        PoolOutcome::Rejected { reason } => {
            println!("✗ Rejected: {reason}");
        }
    }

    Ok(())
}
