#![cfg(not(tarpaulin_include))]

use log::{error, info};
use port_inventory::importer::import_rows;
use port_inventory::loader;
use port_inventory::store::{FileStore, PortStore};
use std::env;
use std::process;
use std::time::Instant;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = env::args().collect();
    if args.len() != 3 {
        eprintln!("Usage: {} <snapshot.bin.gz> <workbook.xlsx>", args[0]);
        process::exit(2);
    }

    if let Err(e) = run(&args[1], &args[2]) {
        error!("Import failed: {}", e);
        process::exit(1);
    }
}

fn run(snapshot: &str, workbook: &str) -> Result<(), Box<dyn std::error::Error>> {
    let started = Instant::now();
    let store = FileStore::open(snapshot)?;
    let rows = loader::from_path(workbook)?;

    let summary = import_rows(&store, &rows)?;
    info!(
        "{} ({} agent rows) in {:.2?}",
        summary.message(),
        summary.agents,
        started.elapsed()
    );

    for port in store.list()? {
        println!(
            "{:<20} {:>4} agents {:>8} containers",
            port.city,
            port.agents.len(),
            port.total_containers()
        );
    }

    Ok(())
}
