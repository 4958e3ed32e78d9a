use ap_admission::acl::{AclCache, AclVerdict, CachedDecision, PskCandidate, RadiusStaInfo};
use ap_admission::timer::TimerQueue;
use ap_admission::{AclPolicy, MacAcl, MacAddr};
use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use radius_proto::{Code, Packet, calculate_response_authenticator, verify_response};
use std::time::{Duration, Instant};

fn mac(n: u32) -> MacAddr {
    let b = n.to_be_bytes();
    MacAddr::new([0x02, 0x00, b[0], b[1], b[2], b[3]])
}

fn bench_static_acl(c: &mut Criterion) {
    let mut group = c.benchmark_group("static_acl_check");

    for size in [10u32, 100, 1000, 10000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let mut acl = MacAcl::new(AclPolicy::DenyUnlessAccepted);
            for n in 0..size {
                acl.allow(mac(n), None);
            }
            let hit = mac(size / 2);
            let miss = mac(size + 1);
            b.iter(|| {
                black_box(acl.check(black_box(hit)));
                black_box(acl.check(black_box(miss)));
            });
        });
    }

    group.finish();
}

fn bench_cache_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("acl_cache_lookup");
    let now = Instant::now();

    for size in [100u32, 1000, 10000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let mut cache = AclCache::new(Duration::from_secs(30));
            for n in 0..size {
                cache.insert(
                    mac(n),
                    CachedDecision {
                        created: now,
                        verdict: AclVerdict::Accept,
                        info: RadiusStaInfo::default(),
                    },
                );
            }
            let addr = mac(size / 2);
            b.iter(|| black_box(cache.get(black_box(addr), now).is_some()));
        });
    }

    group.finish();
}

fn bench_cache_sweep(c: &mut Criterion) {
    let now = Instant::now();

    c.bench_function("acl_cache_sweep_1000", |b| {
        b.iter_batched(
            || {
                let mut cache = AclCache::new(Duration::from_secs(30));
                for n in 0..1000 {
                    let created = now + Duration::from_secs(u64::from(n % 60));
                    cache.insert(
                        mac(n),
                        CachedDecision {
                            created,
                            verdict: AclVerdict::Reject,
                            info: RadiusStaInfo::default(),
                        },
                    );
                }
                cache
            },
            |mut cache| black_box(cache.sweep(now + Duration::from_secs(60)).len()),
            criterion::BatchSize::SmallInput,
        );
    });
}

fn bench_timer_queue(c: &mut Criterion) {
    let now = Instant::now();

    c.bench_function("timer_schedule_cancel_pop_1000", |b| {
        b.iter(|| {
            let mut timers = TimerQueue::new();
            let ids: Vec<_> = (0..1000u64)
                .map(|n| timers.schedule(now + Duration::from_millis(n * 7 % 997), n))
                .collect();
            for id in ids.iter().step_by(3) {
                timers.cancel(*id);
            }
            let mut fired = 0;
            while timers.pop_expired(now + Duration::from_secs(1)).is_some() {
                fired += 1;
            }
            black_box(fired)
        });
    });
}

fn bench_reply_verification(c: &mut Criterion) {
    let secret = b"testing123";
    let request = Packet::new(Code::AccessRequest, 7, [0x5a; 16]);
    let mut response = Packet::new(Code::AccessAccept, 7, [0u8; 16]);
    response.authenticator = calculate_response_authenticator(&response, &request.authenticator, secret);

    c.bench_function("verify_response", |b| {
        b.iter(|| black_box(verify_response(black_box(&response), &request, secret)));
    });
}

fn bench_psk_derivation(c: &mut Criterion) {
    c.bench_function("psk_passphrase_pmk", |b| {
        b.iter_batched(
            || PskCandidate::from_tunnel_password(b"correct horse battery").ok(),
            |candidate| candidate.map(|c| c.pmk(b"corp-wifi")),
            criterion::BatchSize::SmallInput,
        );
    });
}

criterion_group!(
    benches,
    bench_static_acl,
    bench_cache_lookup,
    bench_cache_sweep,
    bench_timer_queue,
    bench_reply_verification,
    bench_psk_derivation
);
criterion_main!(benches);
