//! Fit ellipsoids to edgels read from JSON.
//!
//! The targets file is a list of
//! `{ "id": u64, "expected_center": [x, y, z], "edgels": [Edgel, ...] }`;
//! the results are written to stdout as `{ "<id>": EllipsoidParams }`.

use ellipsofit::{Edgel, EllipsoidParams, FitConfig, FitDriver, FitTarget, SpotTable};
use std::collections::BTreeMap;
use std::error::Error;
use std::path::Path;
use std::sync::RwLock;

#[derive(serde::Deserialize)]
struct TargetRecord {
    id: u64,
    expected_center: [f64; 3],
    edgels: Vec<Edgel>,
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <targets.json> [config.json]", args[0]);
        std::process::exit(2);
    }

    let records: Vec<TargetRecord> = serde_json::from_str(&std::fs::read_to_string(&args[1])?)?;
    let config = match args.get(2) {
        Some(path) => FitConfig::from_json_file(Path::new(path))?,
        None => FitConfig::default(),
    };

    let targets: Vec<FitTarget<Vec<Edgel>>> = records
        .into_iter()
        .map(|r| FitTarget::new(r.id, r.expected_center, r.edgels))
        .collect();

    let driver = FitDriver::new(config)?;
    let store = RwLock::new(SpotTable::new());
    let report = driver.run(&targets, &store)?;
    let table = store.into_inner().map_err(|_| "ellipsoid store poisoned")?;

    let out: BTreeMap<String, EllipsoidParams> = table
        .iter()
        .map(|(id, p)| (id.to_string(), *p))
        .collect();
    println!("{}", serde_json::to_string_pretty(&out)?);
    eprintln!("{}", report);
    Ok(())
}
