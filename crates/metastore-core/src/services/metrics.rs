//! Process-wide Prometheus metrics (`spec.md` §4.H, §4.I, §6).
//!
//! Registered lazily against the global default registry, the way
//! `estuary-flow`'s `dekaf` metrics server does it — `metastore-server`'s
//! `/metrics` handler just encodes `prometheus::default_registry()`.

use once_cell::sync::Lazy;
use prometheus::{register_int_counter_vec, register_int_gauge_vec, IntCounterVec, IntGaugeVec};

pub static SCHEMA_CACHE_HITS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!("schema_cache_hits_total", "Schema cache lookups served from cache, by kind", &["kind"])
        .expect("schema_cache_hits_total registration")
});

pub static SCHEMA_CACHE_MISSES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "schema_cache_misses_total",
        "Schema cache lookups that required a load, by reason",
        &["reason"]
    )
    .expect("schema_cache_misses_total registration")
});

pub static NAMESPACE_RECORDS: Lazy<IntGaugeVec> = Lazy::new(|| {
    register_int_gauge_vec!("namespace_records", "Live record count per namespace", &["namespace"])
        .expect("namespace_records registration")
});

pub static NAMESPACE_DELETED_RECORDS: Lazy<IntGaugeVec> = Lazy::new(|| {
    register_int_gauge_vec!("namespace_deleted_records", "Deleted record count per namespace", &["namespace"])
        .expect("namespace_deleted_records registration")
});
