//! Inbound frame handling benchmark suite.
//!
//! Benchmarks the hot path of the connection loop:
//! - Classifying inbound frames (response vs event)
//! - Fanning events out to subscriber counts of 1, 16, 128
//!
//! Run with: cargo bench --bench dispatch
//! Results saved to: target/criterion/

use std::hint::black_box;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use gateway_client::protocol::InboundFrame;
use gateway_client::{EventDispatcher, EventFrame, StreamFilter};
use serde_json::json;

// ============================================================================
// Benchmark Parameters
// ============================================================================

const SUBSCRIBER_COUNTS: &[usize] = &[1, 16, 128];

const RESPONSE_FRAME: &str =
    r#"{"id":"r42","result":{"sessions":[{"key":"main","active":true}]}}"#;

const EVENT_FRAME: &str = r#"{"stream":"chat","sessionKey":"main","runId":"run-7","ts":1735689600000,"data":{"state":"delta","text":"hello"}}"#;

// ============================================================================
// Benchmark: Frame Classification
// ============================================================================

fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse");

    group.bench_function("response", |b| {
        b.iter(|| InboundFrame::parse(black_box(RESPONSE_FRAME)))
    });
    group.bench_function("event", |b| {
        b.iter(|| InboundFrame::parse(black_box(EVENT_FRAME)))
    });

    group.finish();
}

// ============================================================================
// Benchmark: Event Fan-out
// ============================================================================

fn bench_dispatch(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch");
    let event = sample_event();

    for &count in SUBSCRIBER_COUNTS {
        let counter = Arc::new(AtomicU64::new(0));
        let dispatcher = EventDispatcher::new();

        for i in 0..count {
            let counter = Arc::clone(&counter);
            // Half the subscribers listen to a stream the event is not on.
            let filter = if i % 2 == 0 {
                StreamFilter::All
            } else {
                StreamFilter::from("tool")
            };
            dispatcher.subscribe(
                filter,
                Arc::new(move |_: &EventFrame| {
                    counter.fetch_add(1, Ordering::Relaxed);
                }),
            );
        }

        group.bench_with_input(BenchmarkId::new("subscribers", count), &count, |b, _| {
            b.iter(|| dispatcher.dispatch(black_box(&event)))
        });
    }

    group.finish();
}

// ============================================================================
// Helper Functions
// ============================================================================

fn sample_event() -> EventFrame {
    EventFrame {
        stream: "chat".to_string(),
        session_key: Some("main".to_string()),
        run_id: Some("run-7".to_string()),
        ts: 1_735_689_600_000,
        data: json!({"state": "delta", "text": "hello"}),
    }
}

// ============================================================================
// Criterion Setup
// ============================================================================

criterion_group!(benches, bench_parse, bench_dispatch);
criterion_main!(benches);
