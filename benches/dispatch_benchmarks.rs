//! Benchmarks for native call dispatch.
//!
//! Measures the binding layer's per-call overhead:
//! - Free functions and static functions
//! - Methods through member lookup
//! - Attribute reads and writes
//! - Callbacks into script functions
//! - Dotted-path table access
//!
//! ## Profiling with Puffin
//!
//! Run with the `profile-with-puffin` feature to collect scope timings:
//!
//! ```bash
//! cargo bench --features profile-with-puffin -- --profile-time 5
//! ```

use std::hint::black_box;

use criterion::{Criterion, criterion_group, criterion_main};
use lunabind::{BindResult, Callback, FromStack, ModuleBuilder, Table, UserData, register_module};
use lunabind_core::{Function, State, Value};

#[cfg(feature = "profile-with-puffin")]
use std::collections::HashMap;

#[cfg(feature = "profile-with-puffin")]
static FRAME_VIEW: std::sync::OnceLock<puffin::GlobalFrameView> = std::sync::OnceLock::new();

#[cfg(feature = "profile-with-puffin")]
fn setup_profiler() {
    puffin::set_scopes_on(true);
    FRAME_VIEW.get_or_init(puffin::GlobalFrameView::default);
}

#[cfg(not(feature = "profile-with-puffin"))]
fn setup_profiler() {}

#[cfg(feature = "profile-with-puffin")]
fn end_profiling_frame() {
    puffin::GlobalProfiler::lock().new_frame();
}

#[cfg(not(feature = "profile-with-puffin"))]
fn end_profiling_frame() {}

/// Print accumulated time per top-level scope.
#[cfg(feature = "profile-with-puffin")]
fn print_profiling_stats() {
    use puffin::Reader;

    let Some(frame_view) = FRAME_VIEW.get() else {
        println!("Profiler not initialized");
        return;
    };

    let view = frame_view.lock();
    let scope_collection = view.scope_collection();
    let mut scope_timings: HashMap<String, i64> = HashMap::new();
    let mut frame_count = 0i64;

    for frame in view.recent_frames() {
        frame_count += 1;
        let Ok(unpacked) = frame.unpacked() else {
            continue;
        };
        for (_thread_info, stream_info) in unpacked.thread_streams.iter() {
            let reader = Reader::from_start(&stream_info.stream);
            let Ok(scopes) = reader.read_top_scopes() else {
                continue;
            };
            for scope in scopes {
                if let Some(details) = scope_collection.fetch_by_id(&scope.id) {
                    *scope_timings
                        .entry(details.name().to_string())
                        .or_insert(0) += scope.record.duration_ns;
                }
            }
        }
    }

    println!("\n=== Dispatch Profile ({frame_count} frames) ===");
    let mut entries: Vec<_> = scope_timings.into_iter().collect();
    entries.sort_by(|a, b| b.1.cmp(&a.1));
    for (name, ns) in entries {
        let avg = if frame_count > 0 { ns / frame_count } else { ns };
        println!(
            "  {:40} {:>10.2?} avg",
            name,
            std::time::Duration::from_nanos(avg as u64)
        );
    }
    println!("=====================================\n");
}

#[cfg(not(feature = "profile-with-puffin"))]
fn print_profiling_stats() {}

struct Vector {
    x: f64,
    y: f64,
}

impl UserData for Vector {}

impl Vector {
    fn new(x: f64, y: f64) -> Self {
        Vector { x, y }
    }

    fn length(&self) -> f64 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    fn scale(&mut self, factor: f64) {
        self.x *= factor;
        self.y *= factor;
    }
}

fn open_bench(module: &mut ModuleBuilder) -> BindResult<()> {
    module
        .function("add", |a: i64, b: i64| a + b)
        .function("invoke", |f: Callback<(i64,), i64>, x: i64| f.call((x,)).unwrap_or(0));
    module
        .class::<Vector>("Vector")
        .constructor(Vector::new)
        .method("length", Vector::length)
        .method("scale", Vector::scale)
        .attribute("x", |v: &Vector| &v.x, |v: &mut Vector| &mut v.x)
        .static_function("dot", |ax: f64, ay: f64, bx: f64, by: f64| ax * bx + ay * by)
        .register()
}

fn setup() -> (State, Value) {
    let state = State::new();
    register_module(&state, "Bench", open_bench);
    let module = state.require("Bench").unwrap();
    (state, module)
}

fn field(state: &State, target: &Value, key: &str) -> Value {
    state.index_value(target, Value::from(key)).unwrap()
}

fn function_benchmarks(c: &mut Criterion) {
    setup_profiler();
    let (state, module) = setup();
    let add = field(&state, &module, "add");
    let class = field(&state, &module, "Vector");
    let dot = field(&state, &class, "dot");

    let mut group = c.benchmark_group("dispatch/functions");

    group.bench_function("free_function", |b| {
        b.iter(|| {
            let args = [Value::Nil, Value::Integer(2), Value::Integer(40)];
            let result = state.call_function(add.clone(), black_box(args), 1).unwrap();
            end_profiling_frame();
            black_box(result)
        });
    });

    group.bench_function("static_function", |b| {
        b.iter(|| {
            let args = [1.0, 2.0, 3.0, 4.0].map(Value::Number);
            black_box(state.call_function(dot.clone(), black_box(args), 1).unwrap())
        });
    });

    group.bench_function("constructor", |b| {
        b.iter(|| {
            let args = [Value::Number(3.0), Value::Number(4.0)];
            let object = state.call_function(class.clone(), black_box(args), 1).unwrap();
            state.collect_garbage();
            black_box(object)
        });
    });

    group.finish();
    print_profiling_stats();
}

fn method_benchmarks(c: &mut Criterion) {
    let (state, module) = setup();
    let class = field(&state, &module, "Vector");
    let vector = state
        .call_function(class, [Value::Number(3.0), Value::Number(4.0)], 1)
        .unwrap()
        .remove(0);

    let mut group = c.benchmark_group("dispatch/methods");

    group.bench_function("lookup_and_call", |b| {
        b.iter(|| {
            let length = field(&state, &vector, "length");
            black_box(state.call_function(length, [vector.clone()], 1).unwrap())
        });
    });

    let scale = field(&state, &vector, "scale");
    group.bench_function("cached_exclusive_call", |b| {
        b.iter(|| {
            let args = [vector.clone(), Value::Number(1.0)];
            black_box(state.call_function(scale.clone(), black_box(args), 1).unwrap())
        });
    });

    group.bench_function("attribute_read", |b| {
        b.iter(|| black_box(field(&state, &vector, "x")));
    });

    group.bench_function("attribute_write", |b| {
        b.iter(|| {
            state
                .assign_value(&vector, Value::from("x"), black_box(Value::Number(3.0)))
                .unwrap()
        });
    });

    group.finish();
}

fn callback_benchmarks(c: &mut Criterion) {
    let (state, module) = setup();
    let invoke = field(&state, &module, "invoke");
    let square = Value::Function(Function::new("square", |state| {
        let x = state.to_integer(2);
        state.push_integer(x * x);
        Ok(1)
    }));

    let mut group = c.benchmark_group("dispatch/callbacks");

    group.bench_function("script_to_native_to_script", |b| {
        b.iter(|| {
            let args = [Value::Nil, square.clone(), Value::Integer(7)];
            black_box(state.call_function(invoke.clone(), black_box(args), 1).unwrap())
        });
    });

    state.push_value(square.clone());
    let callback = Callback::<(i64,), i64>::from_stack(&state, state.get_top()).unwrap();
    state.pop(1);
    group.bench_function("native_to_script", |b| {
        b.iter(|| black_box(callback.call(black_box((7,))).unwrap()));
    });

    group.finish();
}

fn table_benchmarks(c: &mut Criterion) {
    let state = State::new();
    let config = Table::global(&state, "config").unwrap();
    config.set("window.size.width", 640).unwrap();

    let mut group = c.benchmark_group("dispatch/tables");

    group.bench_function("path_get", |b| {
        b.iter(|| black_box(config.get::<i32>(black_box("window.size.width")).unwrap()));
    });

    group.bench_function("path_set", |b| {
        b.iter(|| config.set(black_box("window.size.height"), 480).unwrap());
    });

    group.bench_function("index_set_get", |b| {
        b.iter(|| {
            config.set_index(1, 10).unwrap();
            black_box(config.get_index::<i32>(1).unwrap())
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    function_benchmarks,
    method_benchmarks,
    callback_benchmarks,
    table_benchmarks
);
criterion_main!(benches);
