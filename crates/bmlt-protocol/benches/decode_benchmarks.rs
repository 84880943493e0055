//! Decoding benchmarks for the payloads a session handles most
//!
//! Run with:
//! ```bash
//! cargo bench -p bmlt-protocol --bench decode_benchmarks
//! ```

use bmlt_protocol::{
    AvailableKeys, DistanceUnits, IdFilter, ResultExtent, SearchCriteria, SearchDimension,
    ServiceBody, ServiceBodyTree, TextSearch, Weekday, decode_formats, decode_meetings,
};
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use serde_json::{Value, json};
use std::hint::black_box;

fn formats() -> Value {
    let rows: Vec<Value> = (1..=60)
        .map(|i| {
            json!({
                "id": i.to_string(),
                "key_string": format!("F{i}"),
                "name_string": format!("Format {i}"),
                "description_string": "",
                "lang": "en"
            })
        })
        .collect();
    Value::Array(rows)
}

fn meetings(count: usize) -> Value {
    let rows: Vec<Value> = (0..count)
        .map(|i| {
            json!({
                "id_bigint": (i + 1).to_string(),
                "service_body_bigint": (i % 40 + 1).to_string(),
                "weekday_tinyint": (i % 7 + 1).to_string(),
                "start_time": "19:30:00",
                "duration_time": "01:30:00",
                "meeting_name": format!("Meeting {i}"),
                "formats": "F1,F7,F12",
                "location_text": "Community Hall",
                "location_street": "1 Main St",
                "location_municipality": "Springfield",
                "latitude": "34.2",
                "longitude": "-118.5",
                "comments": "Use the side door"
            })
        })
        .collect();
    Value::Array(rows)
}

/// Decode search results of growing size
fn bench_meeting_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("meeting_decode");
    let keys = AvailableKeys::standard();
    let catalog = decode_formats(&formats()).unwrap();

    for count in [10, 100, 1_000] {
        let payload = meetings(count);
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &payload, |b, payload| {
            b.iter(|| {
                let decoded = decode_meetings(payload, &keys, catalog.as_slice()).unwrap();
                black_box(decoded);
            });
        });
    }

    group.finish();
}

/// Build the service body arena from a shuffled flat list
fn bench_tree_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("service_body_tree");

    for count in [50, 500, 5_000] {
        // children listed before parents
        let bodies: Vec<ServiceBody> = (1..=count as u64)
            .rev()
            .map(|id| ServiceBody {
                id,
                parent_id: (id > 1).then_some(id / 2),
                name: format!("Body {id}"),
                description: String::new(),
                body_type: "AS".to_string(),
            })
            .collect();

        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &bodies, |b, bodies| {
            b.iter(|| {
                let tree = ServiceBodyTree::build(bodies.clone()).unwrap();
                black_box(tree);
            });
        });
    }

    group.finish();
}

/// Encode a typical criteria set
fn bench_criteria_encode(c: &mut Criterion) {
    let criteria = SearchCriteria::new()
        .with(SearchDimension::Text(TextSearch::new("hall")))
        .with(SearchDimension::Weekdays(IdFilter::including([
            Weekday::Monday,
            Weekday::Friday,
        ])))
        .with(SearchDimension::ServiceBodies(IdFilter::including(1..=25)))
        .with(SearchDimension::MinDuration(60));

    c.bench_function("criteria_to_params", |b| {
        b.iter(|| {
            let params = criteria.to_params(DistanceUnits::Mi, ResultExtent::MeetingsAndFormats, false);
            black_box(params);
        });
    });
}

criterion_group!(benches, bench_meeting_decode, bench_tree_build, bench_criteria_encode);
criterion_main!(benches);
