//! Performance benchmarks for imsg over a generated message history.
//!
//! Run with: `cargo bench --bench label_perf`

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use std::sync::OnceLock;
use std::time::Duration;

use imsg::analysis::{Report, ReportOptions};
use imsg::{
    ContactDirectory, ContactRow, LabelOptions, LabeledMessage, MalformedPolicy, MessageTime,
    RawMessage, label_messages, load_contacts, normalize, table,
};

const CONTACTS: usize = 500;
const GROUP_CHATS: usize = 12;

struct PerfCorpus {
    contact_rows: Vec<ContactRow>,
    messages: Vec<RawMessage>,
}

fn phone(i: usize) -> String {
    format!("+1 (555) {:03}-{:04}", i % 1000, i)
}

fn build_corpus(messages: usize) -> PerfCorpus {
    let contact_rows = (0..CONTACTS)
        .map(|i| {
            let mut row = ContactRow::new(phone(i), format!("Contact {i}"));
            row.location = format!("record {}", i + 1);
            row
        })
        .collect();

    let start = DateTime::<Utc>::from_timestamp(1_609_459_200, 0).unwrap_or_default();
    let messages = (0..messages)
        .map(|i| {
            let utc = start + ChronoDuration::minutes(i64::try_from(i * 7).unwrap_or_default());
            // Every fifth message is in a group chat; a tenth of senders are unknown.
            let group = i % 5 == 0;
            let sender = if i % 10 == 3 {
                format!("+1555999{:04}", i % 10_000)
            } else {
                format!("+1555{:03}{:04}", (i % CONTACTS) % 1000, i % CONTACTS)
            };
            RawMessage {
                timestamp: MessageTime::new(utc, utc.naive_utc()),
                sender_identifier: sender.clone(),
                sender_id: Some((i % CONTACTS).to_string()),
                text: format!("message {i}"),
                chat_identifier: group.then(|| format!("chat{}", i % GROUP_CHATS)),
                chat_display_name: group.then(|| format!("Group {}", i % GROUP_CHATS)),
                contact_identifier: Some(sender),
                is_from_me: i % 3 == 0,
            }
        })
        .collect();

    PerfCorpus {
        contact_rows,
        messages,
    }
}

fn corpus() -> &'static PerfCorpus {
    static CORPUS: OnceLock<PerfCorpus> = OnceLock::new();
    CORPUS.get_or_init(|| build_corpus(50_000))
}

fn directory() -> Option<ContactDirectory> {
    match load_contacts(
        corpus().contact_rows.clone(),
        "bench",
        MalformedPolicy::Abort,
    ) {
        Ok(directory) => Some(directory),
        Err(err) => {
            eprintln!("directory setup failed: {err}");
            None
        }
    }
}

fn labeled() -> &'static [LabeledMessage] {
    static LABELED: OnceLock<Vec<LabeledMessage>> = OnceLock::new();
    LABELED.get_or_init(|| {
        directory().map_or_else(Vec::new, |directory| {
            label_messages(&corpus().messages, &directory, &LabelOptions::default())
        })
    })
}

fn bench_normalize(c: &mut Criterion) {
    let inputs = [
        "+1 (555) 123-4567",
        "555-123-4567",
        "15551234567",
        "Friend@Example.com",
        "  +44 20 7946 0958 ",
    ];

    let mut group = c.benchmark_group("normalize");
    group.throughput(Throughput::Elements(inputs.len() as u64));
    group.bench_function("mixed", |b| {
        b.iter(|| {
            for input in &inputs {
                black_box(normalize(black_box(input)));
            }
        });
    });
    group.finish();
}

fn bench_load_contacts(c: &mut Criterion) {
    let rows = &corpus().contact_rows;

    let mut group = c.benchmark_group("load_contacts");
    group.throughput(Throughput::Elements(rows.len() as u64));
    group.bench_function("directory", |b| {
        b.iter(|| {
            if let Ok(directory) = load_contacts(rows.clone(), "bench", MalformedPolicy::Abort) {
                black_box(directory);
            }
        });
    });
    group.finish();
}

fn bench_label_messages(c: &mut Criterion) {
    let Some(directory) = directory() else {
        return;
    };
    let options = LabelOptions::default();

    let mut group = c.benchmark_group("label_messages");
    group.measurement_time(Duration::from_secs(8));
    for size in [1_000usize, 10_000, 50_000] {
        let messages = &corpus().messages[..size];
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), messages, |b, messages| {
            b.iter(|| black_box(label_messages(messages, &directory, &options)));
        });
    }
    group.finish();
}

fn bench_table_io(c: &mut Criterion) {
    let messages = &corpus().messages[..10_000];
    let mut encoded = Vec::new();
    if let Err(err) = table::write_messages_to(&mut encoded, messages) {
        eprintln!("bench_table_io setup failed: {err}");
        return;
    }

    let mut group = c.benchmark_group("message_table");
    group.throughput(Throughput::Bytes(encoded.len() as u64));
    group.bench_function("write", |b| {
        b.iter(|| {
            let mut out = Vec::with_capacity(encoded.len());
            if table::write_messages_to(&mut out, messages).is_ok() {
                black_box(out);
            }
        });
    });
    group.bench_function("read", |b| {
        b.iter(|| {
            if let Ok(rows) = table::read_messages_from(encoded.as_slice(), "bench") {
                black_box(rows);
            }
        });
    });
    group.finish();
}

fn bench_report(c: &mut Criterion) {
    let labeled = labeled();
    let options = ReportOptions::default();

    let mut group = c.benchmark_group("report");
    group.measurement_time(Duration::from_secs(8));
    group.throughput(Throughput::Elements(labeled.len() as u64));
    group.bench_function("compute", |b| {
        b.iter(|| {
            if let Ok(report) = Report::compute(labeled, &options) {
                black_box(report);
            }
        });
    });
    group.finish();
}

criterion_group!(
    name = label_benches;
    config = Criterion::default().significance_level(0.05).noise_threshold(0.02);
    targets =
        bench_normalize,
        bench_load_contacts,
        bench_label_messages
);

criterion_group!(
    name = table_benches;
    config = Criterion::default().significance_level(0.05);
    targets = bench_table_io
);

criterion_group!(
    name = report_benches;
    config = Criterion::default().significance_level(0.05);
    targets = bench_report
);

criterion_main!(label_benches, table_benches, report_benches);
