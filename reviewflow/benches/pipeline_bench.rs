//! Benchmarks for status classification and envelope unwrapping.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use serde_json::json;

use reviewflow::client::classify;
use reviewflow::envelope::unwrap_str;
use reviewflow::pipeline::unwrap_output;

fn status_body(status: &str) -> String {
    let inner = json!({
        "status": status,
        "output": {"result": {"successful_posts": 12, "failed_posts": 1}},
        "startDate": "2025-05-01T12:00:00Z",
        "stopDate": "2025-05-01T12:04:10Z",
    });
    json!({"statusCode": 200, "body": inner.to_string()}).to_string()
}

fn classify_benchmark(c: &mut Criterion) {
    let succeeded = status_body("SUCCEEDED");
    let running = status_body("RUNNING");

    c.bench_function("classify_succeeded", |b| {
        b.iter(|| classify(black_box(&succeeded)))
    });
    c.bench_function("classify_running", |b| b.iter(|| classify(black_box(&running))));
    c.bench_function("classify_malformed", |b| {
        b.iter(|| classify(black_box("<html>502 Bad Gateway</html>")))
    });
}

fn envelope_benchmark(c: &mut Criterion) {
    let reviews: Vec<_> = (0..50)
        .map(|i| json!({"path": format!("src/file_{i}.rs"), "line": i, "body": "Consider extracting this"}))
        .collect();
    let inner = json!({"reviews": reviews});
    let raw = json!({"statusCode": 200, "body": inner.to_string()});
    let raw_str = raw.to_string();

    c.bench_function("unwrap_str", |b| b.iter(|| unwrap_str(black_box(&raw_str))));
    c.bench_function("unwrap_stage_output", |b| {
        b.iter(|| unwrap_output(black_box(&raw)))
    });
}

criterion_group!(benches, classify_benchmark, envelope_benchmark);
criterion_main!(benches);
