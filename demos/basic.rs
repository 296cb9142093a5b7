//! Basic usage: drive a breaker against a flaky dependency and watch it shed
//! load, then recover.
//!
//! Run with `RUST_LOG=debug cargo run --example basic` to see rejections.

use adaptive_circuit_breaker::{BreakerConfig, CircuitBreaker, Promise};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Pretend dependency: fails while `outage` is set.
fn call_inventory(outage: bool) -> Result<u32, String> {
    if outage {
        Err("connection refused: 10.0.0.7:5432".to_string())
    } else {
        Ok(42)
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = BreakerConfig::builder()
        .name("inventory")
        .window(Duration::from_secs(2))
        .buckets(20)
        .build()?;
    let breaker = CircuitBreaker::new(config)?;

    // ── Healthy phase ────────────────────────────────────────────────────────
    for _ in 0..50 {
        breaker.run(|| call_inventory(false))?;
    }
    println!("healthy:  {:?}", breaker.stats());

    // ── Outage: wrapped calls with a cached fallback ─────────────────────────
    let mut shed = 0;
    for _ in 0..200 {
        let _ = breaker.run_with_fallback(
            || call_inventory(true),
            |_unavailable| {
                shed += 1;
                Ok(0)
            },
        );
    }
    let stats = breaker.stats();
    println!("outage:   status={} drop_ratio={:.2} shed={shed}", stats.status, stats.drop_ratio);
    for reason in &stats.recent_errors {
        println!("          {reason}");
    }

    // ── Manual mode: admission now, report later ─────────────────────────────
    match breaker.allow() {
        Ok(promise) => match call_inventory(true) {
            Ok(_) => promise.accept(),
            Err(e) => promise.reject(&e),
        },
        Err(unavailable) => println!("manual:   {unavailable}"),
    }

    // ── Recovery: once the window rolls past the outage, traffic flows ───────
    std::thread::sleep(Duration::from_millis(2100));
    breaker.run(|| call_inventory(false))?;
    println!("recovered: {:?}", breaker.stats().status);

    Ok(())
}
