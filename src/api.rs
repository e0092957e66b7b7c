//! Operator HTTP surface: health, trading status, manual lock control.
//!
//! Lock control is deliberately manual. The engine only ever engages the
//! lock; clearing it requires a human calling DELETE /lock (or the lock_ctl
//! binary) after inspecting the account.

use actix_web::{web, HttpResponse, Responder};
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};

use crate::metrics;
use crate::safety::lock::{LockStatus, TradingLock};

#[derive(Serialize)]
pub struct HealthResponse {
    status: String,
    version: String,
}

#[derive(Serialize)]
pub struct TradingStatusResponse {
    locked: bool,
    reason: Option<String>,
    locked_by: Option<String>,
    locked_at: Option<String>,
}

#[derive(Deserialize)]
pub struct LockRequest {
    reason: String,
    #[serde(default = "default_locked_by")]
    locked_by: String,
}

fn default_locked_by() -> String {
    "api".to_string()
}

pub async fn health_check() -> impl Responder {
    HttpResponse::Ok().json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

pub async fn trading_status(lock: web::Data<TradingLock>) -> impl Responder {
    match lock.status() {
        LockStatus::Clear => {
            metrics::set_trading_locked(false);
            HttpResponse::Ok().json(TradingStatusResponse {
                locked: false,
                reason: None,
                locked_by: None,
                locked_at: None,
            })
        }
        LockStatus::Engaged(record) => {
            metrics::set_trading_locked(true);
            HttpResponse::Ok().json(TradingStatusResponse {
                locked: true,
                reason: Some(record.reason),
                locked_by: Some(record.locked_by),
                locked_at: Some(record.timestamp.to_rfc3339()),
            })
        }
    }
}

pub async fn engage_lock(
    lock: web::Data<TradingLock>,
    body: web::Json<LockRequest>,
) -> impl Responder {
    match lock.engage(&body.reason, &body.locked_by) {
        Ok(record) => {
            metrics::set_trading_locked(true);
            HttpResponse::Ok().json(record)
        }
        Err(e) => HttpResponse::InternalServerError()
            .json(serde_json::json!({ "error": e.to_string() })),
    }
}

pub async fn clear_lock(lock: web::Data<TradingLock>) -> impl Responder {
    match lock.clear("api") {
        Ok(()) => {
            metrics::set_trading_locked(false);
            HttpResponse::Ok().json(serde_json::json!({ "cleared": true }))
        }
        Err(e) => HttpResponse::InternalServerError()
            .json(serde_json::json!({ "error": e.to_string() })),
    }
}

pub async fn metrics_endpoint() -> impl Responder {
    let encoder = TextEncoder::new();
    let families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&families, &mut buffer) {
        return HttpResponse::InternalServerError().body(e.to_string());
    }
    HttpResponse::Ok()
        .content_type(encoder.format_type())
        .body(buffer)
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/health").route(web::get().to(health_check)))
        .service(web::resource("/trading-status").route(web::get().to(trading_status)))
        .service(
            web::resource("/lock")
                .route(web::post().to(engage_lock))
                .route(web::delete().to(clear_lock)),
        )
        .service(web::resource("/metrics").route(web::get().to(metrics_endpoint)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::SimulatedTimeProvider;
    use crate::persistence::store::MemoryStore;
    use actix_web::{test, App};
    use std::sync::Arc;

    fn lock() -> TradingLock {
        TradingLock::new(
            Arc::new(MemoryStore::new()),
            Arc::new(SimulatedTimeProvider::new(1_700_000_000_000)),
        )
    }

    #[actix_web::test]
    async fn lock_lifecycle_over_http() {
        let lock = lock();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(lock.clone()))
                .configure(config),
        )
        .await;

        let resp = test::call_service(
            &app,
            test::TestRequest::get().uri("/trading-status").to_request(),
        )
        .await;
        assert!(resp.status().is_success());

        let resp = test::call_service(
            &app,
            test::TestRequest::post()
                .uri("/lock")
                .set_json(serde_json::json!({ "reason": "maintenance window" }))
                .to_request(),
        )
        .await;
        assert!(resp.status().is_success());
        assert!(lock.status().is_engaged());

        let resp = test::call_service(
            &app,
            test::TestRequest::delete().uri("/lock").to_request(),
        )
        .await;
        assert!(resp.status().is_success());
        assert!(!lock.status().is_engaged());
    }
}
