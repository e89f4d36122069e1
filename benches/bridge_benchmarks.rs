//! 桥接层性能基准测试
//!
//! 测试方法名驻留、句柄解析和脚本侧方法调用的开销

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use glam::Vec2;
use lou::bridge::{atom, intern, Atom, Handle, Store, Tag};
use lou::config::HostConfig;
use lou::core::Host;
use lou::natives::Rect;
use std::hint::black_box;

// ============================================================================
// 方法名驻留
// ============================================================================

fn bench_intern(c: &mut Criterion) {
    atom::install();
    let mut group = c.benchmark_group("intern");

    for name in ["x", "render_rotated", "no_such_method"] {
        group.bench_with_input(BenchmarkId::from_parameter(name), name, |b, name| {
            b.iter(|| black_box(intern(black_box(name))))
        });
    }

    group.bench_function("all_names", |b| {
        b.iter(|| {
            for atom in Atom::ALL {
                black_box(intern(atom.name()));
            }
        })
    });

    group.finish();
}

// ============================================================================
// 句柄解析
// ============================================================================

fn bench_resolve(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolve");

    let store = Store::new();
    let keys: Vec<_> = (0..1024)
        .map(|i| store.insert(Rect::new(i as f32, 0.0, 1.0, 1.0)))
        .collect();
    let handle = Handle::owning(Tag::Rect, keys[512].key());

    group.bench_function("typed_key", |b| {
        b.iter(|| {
            let native = store.typed(black_box(keys[512])).unwrap();
            black_box(native.borrow().unwrap().x)
        })
    });

    group.bench_function("handle", |b| {
        b.iter(|| {
            let native = store.resolve::<Rect>(black_box(handle)).unwrap();
            black_box(native.borrow().unwrap().x)
        })
    });

    group.bench_function("type_mismatch", |b| {
        b.iter(|| black_box(store.resolve::<Vec2>(black_box(handle)).is_err()))
    });

    group.finish();
}

// ============================================================================
// 脚本侧调用
// ============================================================================

fn bench_script_calls(c: &mut Criterion) {
    let mut config = HostConfig::default();
    config.console.echo = false;
    let (host, _probe) = Host::headless(config).unwrap();
    let mut group = c.benchmark_group("script");

    group.bench_function("vec2_add_1000", |b| {
        b.iter(|| {
            host.eval(
                "let v = Vec2(0, 0); const d = Vec2(1, 1); for (let i = 0; i < 1000; i++) { v = v.add(d); }",
                "bench",
            )
        })
    });

    group.bench_function("field_read_1000", |b| {
        b.iter(|| {
            host.eval(
                "const r = Rect(1, 2, 3, 4); let s = 0; for (let i = 0; i < 1000; i++) { s += r.x; }",
                "bench",
            )
        })
    });

    group.finish();
}

criterion_group!(benches, bench_intern, bench_resolve, bench_script_calls);
criterion_main!(benches);
