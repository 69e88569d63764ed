//! Performance benchmarks for recording and fan-out.

use activity_streams::{
    ActivityDraft, Engine, EngineConfig, EntityRef, Propagation, StreamOwner, SubscriberId,
    Trackable, TrackingProfile,
};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

struct Ticket {
    id: u64,
    status: String,
}

impl Trackable for Ticket {
    fn kind(&self) -> &str {
        "ticket"
    }

    fn entity_id(&self) -> Option<u64> {
        Some(self.id)
    }

    fn display_name(&self) -> String {
        format!("#{}", self.id)
    }
}

impl StreamOwner for Ticket {}

fn create_engine() -> Engine {
    let engine = Engine::in_memory(EngineConfig {
        max_fanout: usize::MAX,
        ..Default::default()
    });
    engine.tracking().enable(TrackingProfile::new("ticket"));
    engine
}

/// Subscribe `count` followers of ticket 1 to its change signature.
fn populate(engine: &Engine, count: u64) {
    let ticket = EntityRef::new("ticket", 1);
    engine
        .transaction(|s| {
            for i in 0..count {
                let subscriber = SubscriberId(1000 + i);
                s.follow(&ticket, subscriber)?;
                s.subscribe(subscriber, "ticket-changed", false)?;
            }
            Ok::<_, activity_streams::EngineError>(())
        })
        .unwrap();
}

/// Benchmark a tracked save with varying numbers of subscribed followers
fn bench_change_fanout(c: &mut Criterion) {
    let mut group = c.benchmark_group("change_fanout");

    for followers in [1u64, 10, 100, 1000] {
        group.bench_with_input(
            BenchmarkId::new("followers", followers),
            &followers,
            |b, &count| {
                let engine = create_engine();
                populate(&engine, count);
                let mut ticket = engine
                    .attach(Ticket {
                        id: 1,
                        status: "open".into(),
                    })
                    .unwrap();
                let mut flip = false;

                b.iter(|| {
                    flip = !flip;
                    let next = if flip { "closed" } else { "open" };
                    ticket.set("status", |t| &mut t.status, next.to_string());
                    black_box(engine.transaction(|s| s.save(&mut ticket)).unwrap());
                });
            },
        );
    }

    group.finish();
}

/// Benchmark one-hop propagation across linked streams
fn bench_linked_record(c: &mut Criterion) {
    let mut group = c.benchmark_group("linked_record");

    for links in [1u64, 10, 100] {
        group.bench_with_input(BenchmarkId::new("links", links), &links, |b, &count| {
            let engine = create_engine();
            let origin = EntityRef::new("ticket", 1);
            let stream = engine
                .transaction(|s| {
                    for i in 0..count {
                        s.link(&origin, &EntityRef::new("project", 100 + i))?;
                    }
                    s.stream_for(&origin)
                })
                .unwrap()
                .unwrap();

            b.iter(|| {
                let activity = engine
                    .transaction(|s| {
                        s.record(
                            ActivityDraft::new("note", "bench"),
                            &[stream.id],
                            Propagation::Linked,
                        )
                    })
                    .unwrap();
                black_box(activity.streams.len());
            });
        });
    }

    group.finish();
}

/// Benchmark notification listing for a busy subscriber
fn bench_unread_listing(c: &mut Criterion) {
    let engine = create_engine();
    let subscriber = SubscriberId(1000);
    populate(&engine, 1);

    let mut ticket = engine
        .attach(Ticket {
            id: 1,
            status: "open".into(),
        })
        .unwrap();
    for i in 0..500 {
        ticket.set("status", |t| &mut t.status, format!("s{}", i));
        engine.transaction(|s| s.save(&mut ticket)).unwrap();
    }

    c.bench_function("unread_for_500", |b| {
        b.iter(|| black_box(engine.unread_for(subscriber).unwrap().len()));
    });
}

criterion_group!(
    benches,
    bench_change_fanout,
    bench_linked_record,
    bench_unread_listing
);
criterion_main!(benches);
