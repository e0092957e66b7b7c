use once_cell::sync::Lazy;
use prometheus::{
    register_int_counter, register_int_counter_vec, register_int_gauge, IntCounter, IntCounterVec,
    IntGauge,
};

pub static ORDERS_SUBMITTED: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "trenda_execution_orders_submitted_total",
        "Order requests sent to the broker",
        &["symbol"]
    )
    .expect("orders_submitted counter")
});

pub static ORDERS_FILLED: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "trenda_execution_orders_filled_total",
        "Orders confirmed filled with a ticket",
        &["symbol"]
    )
    .expect("orders_filled counter")
});

pub static SUBMIT_RETRIES: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "trenda_execution_submit_retries_total",
        "Placement retries on the requote retcode family",
        &["symbol"]
    )
    .expect("submit_retries counter")
});

pub static ADMISSION_DENIALS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "trenda_execution_admission_denials_total",
        "Intents refused before touching the broker",
        &["cause"]
    )
    .expect("admission_denials counter")
});

pub static VERIFY_MISMATCHES: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "trenda_execution_verify_mismatches_total",
        "Live positions that drifted from their intent",
        &["field"]
    )
    .expect("verify_mismatches counter")
});

pub static CLOSE_RETRIES: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "trenda_execution_close_retries_total",
        "Defensive close attempts beyond the first"
    )
    .expect("close_retries counter")
});

pub static CRITICAL_FAILURES: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "trenda_execution_critical_failures_total",
        "Escalations that engaged the trading lock",
        &["source"]
    )
    .expect("critical_failures counter")
});

pub static TRADING_LOCKED: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "trenda_execution_trading_locked",
        "1 when the persistent trading lock is engaged"
    )
    .expect("trading_locked gauge")
});

pub fn record_order_submitted(symbol: &str) {
    ORDERS_SUBMITTED.with_label_values(&[symbol]).inc();
}

pub fn record_order_filled(symbol: &str) {
    ORDERS_FILLED.with_label_values(&[symbol]).inc();
}

pub fn record_submit_retry(symbol: &str) {
    SUBMIT_RETRIES.with_label_values(&[symbol]).inc();
}

pub fn record_admission_denial(cause: &str) {
    ADMISSION_DENIALS.with_label_values(&[cause]).inc();
}

pub fn record_verify_mismatch(field: &str) {
    VERIFY_MISMATCHES.with_label_values(&[field]).inc();
}

pub fn record_close_retry() {
    CLOSE_RETRIES.inc();
}

pub fn record_critical_failure(source: &str) {
    CRITICAL_FAILURES.with_label_values(&[source]).inc();
}

pub fn set_trading_locked(locked: bool) {
    TRADING_LOCKED.set(if locked { 1 } else { 0 });
}
