use actix_web::{web, App, HttpServer};
use std::sync::Arc;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use trenda_execution_rs::admission::AdmissionGuard;
use trenda_execution_rs::api;
use trenda_execution_rs::broker::session::BrokerSession;
use trenda_execution_rs::broker::terminal::TerminalGateway;
use trenda_execution_rs::closer::PositionCloser;
use trenda_execution_rs::config::Settings;
use trenda_execution_rs::context::system_clock;
use trenda_execution_rs::cooldown::CooldownTracker;
use trenda_execution_rs::engine::ExecutionEngine;
use trenda_execution_rs::executor::OrderExecutor;
use trenda_execution_rs::metrics;
use trenda_execution_rs::nats_engine;
use trenda_execution_rs::persistence::redb_store::RedbStore;
use trenda_execution_rs::safety::critical::{CriticalFailureHandler, SystemExit};
use trenda_execution_rs::safety::lock::TradingLock;
use trenda_execution_rs::verifier::PositionVerifier;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .expect("setting default subscriber failed");

    info!("╔═══════════════════════════════════════════════════════════════╗");
    info!("║               TRENDA EXECUTION RS                             ║");
    info!("║               Trade Execution Safety Engine                   ║");
    info!("╚═══════════════════════════════════════════════════════════════╝");

    dotenv::dotenv().ok();
    let settings = Settings::new().unwrap_or_else(|e| {
        error!("Config load failed ({}), using defaults", e);
        Settings::default()
    });

    // Safety store first. If it cannot open, we must not trade.
    let store = match RedbStore::new(&settings.safety.store_path) {
        Ok(s) => Arc::new(s),
        Err(e) => {
            error!("❌ Cannot open safety store {}: {}", settings.safety.store_path, e);
            std::process::exit(1);
        }
    };
    let clock = system_clock();

    let lock = TradingLock::new(store.clone(), clock.clone());
    let cooldown = CooldownTracker::new(store, clock, settings.safety.cooldown_minutes);
    metrics::set_trading_locked(lock.status().is_engaged());
    if lock.status().is_engaged() {
        info!("⚠️ Starting with trading lock ENGAGED; intents will be denied");
    }

    let gateway = match TerminalGateway::new(&settings.broker) {
        Ok(g) => Arc::new(g),
        Err(e) => {
            error!("❌ Cannot build terminal gateway: {}", e);
            std::process::exit(1);
        }
    };
    let session = Arc::new(BrokerSession::new(gateway));

    let critical = CriticalFailureHandler::new(lock.clone(), Arc::new(SystemExit));
    let engine = Arc::new(ExecutionEngine::new(
        session,
        AdmissionGuard::new(
            lock.clone(),
            cooldown.clone(),
            settings.broker.magic,
            settings.safety.max_active_trades,
        ),
        OrderExecutor::new(critical.clone(), settings.safety.submit_retry_attempts),
        PositionVerifier::new(settings.safety.verify_tolerance_points),
        PositionCloser::new(
            critical,
            cooldown,
            settings.safety.close_retry_attempts,
            settings.safety.close_retry_delay_ms,
            settings.broker.deviation_points,
        ),
    ));
    info!("✅ Core components initialized");

    info!("Connecting to NATS at {}", settings.service.nats_url);
    let client = match async_nats::connect(&settings.service.nats_url).await {
        Ok(c) => {
            info!("✅ Connected to NATS");
            c
        }
        Err(e) => {
            error!("❌ Failed to connect to NATS: {}", e);
            std::process::exit(1);
        }
    };

    let nats_handle = nats_engine::start_nats_engine(client, engine).await?;

    let bind_address = format!("0.0.0.0:{}", settings.service.port);
    info!("🚀 Starting API server on {}", bind_address);

    let lock_for_api = lock.clone();
    HttpServer::new(move || {
        let cors = actix_cors::Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header();

        App::new()
            .wrap(cors)
            .app_data(web::Data::new(lock_for_api.clone()))
            .configure(api::config)
    })
    .bind(&bind_address)?
    .run()
    .await?;

    let _ = nats_handle.await;

    Ok(())
}
