use anyhow::Result;
use once_cell::sync::Lazy;
use prometheus::{
    opts, register_int_counter, register_int_counter_vec, Encoder, IntCounter, IntCounterVec,
    TextEncoder,
};

pub static TOKENS_ISSUED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(opts!(
        "murmur_tokens_issued_total",
        "Total number of submission tokens issued"
    ))
    .unwrap()
});

pub static MESSAGES_ACCEPTED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(opts!(
        "murmur_messages_accepted_total",
        "Total number of messages stored"
    ))
    .unwrap()
});

pub static MESSAGES_DELETED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(opts!(
        "murmur_messages_deleted_total",
        "Total number of messages deleted"
    ))
    .unwrap()
});

pub static REJECTIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        opts!(
            "murmur_rejections_total",
            "Submissions and deletions refused, by reason"
        ),
        &["reason"]
    )
    .unwrap()
});

pub static NOTIFICATION_FAILURES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(opts!(
        "murmur_notification_failures_total",
        "Operator notifications that could not be delivered"
    ))
    .unwrap()
});

pub static USED_TOKENS_PRUNED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(opts!(
        "murmur_used_tokens_pruned_total",
        "Expired entries removed from the used-token registry"
    ))
    .unwrap()
});

pub fn gather_metrics() -> Result<String> {
    let mut buffer = vec![];
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder.encode(&metric_families, &mut buffer)?;

    Ok(String::from_utf8(buffer)?)
}
