//! Operator tool for the persistent trading lock.
//!
//!   lock_ctl status
//!   lock_ctl create "reason text"
//!   lock_ctl clear
//!
//! Talks to the safety store directly, so it works while the engine is
//! down. Run it against the same store path the engine uses
//! (TRENDA_SAFETY__STORE_PATH or the default).

use std::env;
use std::sync::Arc;

use trenda_execution_rs::config::Settings;
use trenda_execution_rs::context::system_clock;
use trenda_execution_rs::persistence::redb_store::RedbStore;
use trenda_execution_rs::safety::lock::{LockStatus, TradingLock};

fn usage() -> ! {
    eprintln!("usage: lock_ctl <status|create <reason>|clear>");
    std::process::exit(2);
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();
    let settings = Settings::new().unwrap_or_default();

    let args: Vec<String> = env::args().collect();
    let command = match args.get(1) {
        Some(c) => c.as_str(),
        None => usage(),
    };

    let store = Arc::new(RedbStore::new(&settings.safety.store_path)?);
    let lock = TradingLock::new(store, system_clock());

    match command {
        "status" => match lock.status() {
            LockStatus::Clear => println!("CLEAR: trading is allowed"),
            LockStatus::Engaged(record) => {
                println!("ENGAGED since {}", record.timestamp.to_rfc3339());
                println!("  by:     {}", record.locked_by);
                println!("  reason: {}", record.reason);
            }
        },
        "create" => {
            let reason = match args.get(2) {
                Some(r) if !r.trim().is_empty() => r.clone(),
                _ => usage(),
            };
            let record = lock.engage(&reason, "lock_ctl")?;
            println!("ENGAGED at {}: {}", record.timestamp.to_rfc3339(), record.reason);
        }
        "clear" => {
            if !lock.status().is_engaged() {
                println!("Lock is already clear");
                return Ok(());
            }
            lock.clear("lock_ctl")?;
            println!("CLEARED");
        }
        _ => usage(),
    }

    Ok(())
}
