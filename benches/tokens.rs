use std::sync::Arc;

use chrono::Utc;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use kanbanflow::identity::{
    ClaimSet, CredentialCodec, Flavor, Identity, IdentityStore, MemoryIdentityStore, SecretScheme, SystemClock,
    TokenService, TokenTtls,
};
use kanbanflow::server::events::DomainEvent;
use kanbanflow::server::hub::{BroadcastHub, ChannelSink};
use kanbanflow::tickets::TicketResponse;

fn bench_codec(c: &mut Criterion) {
    let codec = CredentialCodec::new(b"bench-secret");
    let now = Utc::now().timestamp();
    let claims = ClaimSet {
        id: "7f1c2a".into(),
        email: "bench@example.com".into(),
        exp: now + 3600,
        iat: now,
        jti: "0d9f".into(),
    };
    let token = codec.sign(&claims).unwrap();

    let mut group = c.benchmark_group("codec");
    group.bench_function("sign", |b| b.iter(|| criterion::black_box(codec.sign(&claims).unwrap())));
    group.bench_function("verify", |b| b.iter(|| criterion::black_box(codec.verify(&token).unwrap())));
    group.finish();
}

fn bench_validate(c: &mut Criterion) {
    let store = Arc::new(MemoryIdentityStore::new());
    let ident = store
        .insert(Identity::new("Bench", "User", "bench@example.com", "x".into(), Utc::now()))
        .unwrap();
    let secrets = SecretScheme::Hmac { root: "bench-root".into() }.derive().unwrap();
    let svc = TokenService::new(&secrets, TokenTtls::default(), store, Arc::new(SystemClock));
    let token = svc.issue_access_token(&ident).unwrap();
    c.bench_function("token_validate_access", |b| {
        b.iter(|| criterion::black_box(svc.validate(&token, Flavor::Access).unwrap()))
    });
}

fn bench_broadcast(c: &mut Criterion) {
    let mut group = c.benchmark_group("hub_broadcast");
    for &n in &[1usize, 64, 512] {
        let hub = BroadcastHub::new();
        let mut queues = Vec::with_capacity(n);
        for _ in 0..n {
            let (sink, rx) = ChannelSink::bounded(1024);
            hub.registry().register(Arc::new(sink));
            queues.push(rx);
        }
        let event = DomainEvent::created(TicketResponse { title: "bench".into(), ..Default::default() });
        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::new("publish", n), &n, |b, _| {
            b.iter(|| {
                let report = hub.publish(&event);
                for rx in queues.iter_mut() {
                    while rx.try_recv().is_ok() {}
                }
                criterion::black_box(report)
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_codec, bench_validate, bench_broadcast);
criterion_main!(benches);
