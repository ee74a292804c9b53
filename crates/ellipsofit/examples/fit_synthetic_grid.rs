use ellipsofit::synthetic::{grid_scene, GridConfig};
use ellipsofit::{Ellipsoid, FitConfig, FitDriver, SpotTable};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::error::Error;
use std::sync::RwLock;

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let columns: usize = match args.get(1) {
        Some(s) => s.parse()?,
        None => 4,
    };
    let threads: Option<usize> = args.get(2).map(|s| s.parse()).transpose()?;

    let grid = GridConfig {
        columns,
        ..GridConfig::default()
    };
    let mut rng = StdRng::seed_from_u64(1);
    let scene = grid_scene(&grid, &mut rng)?;

    let mut config = FitConfig::default();
    config.driver.num_threads = threads;
    config.driver.progress_every = 16;
    let driver = FitDriver::new(config)?;

    let store = RwLock::new(SpotTable::new());
    let report = driver.run(&scene.targets, &store)?;
    let table = store.into_inner().map_err(|_| "ellipsoid store poisoned")?;

    println!("{}", report);
    for (code, n) in report.failure_counts() {
        println!("  {}: {}", code, n);
    }

    let mut center_err = Vec::new();
    for (id, params) in table.iter() {
        let fitted = Ellipsoid::try_from(params)?;
        let truth = &scene.truths[id as usize];
        center_err.push((fitted.center() - truth.center()).norm());
        if id < 3 {
            println!("target {} fitted:\n{}\ntruth:\n{}\n", id, fitted, truth);
        }
    }
    if !center_err.is_empty() {
        let mean = center_err.iter().sum::<f64>() / center_err.len() as f64;
        let max = center_err.iter().cloned().fold(0.0, f64::max);
        println!("center error: mean {:.3}, max {:.3}", mean, max);
    }
    Ok(())
}
