//! Flush Throughput
//!
//! Measures settling batches of various shapes: many dirty viewmodels,
//! many queued views, and chains of model-update tasks.

use std::cell::Cell;
use std::rc::Rc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::json;

use ripple_core::{ChangeMap, Keypath, Scheduler, View, Viewmodel, ViewmodelId};

struct Model {
    id: ViewmodelId,
}

impl Viewmodel for Model {
    fn id(&self) -> ViewmodelId {
        self.id
    }

    fn apply_changes(&self, _scheduler: &Scheduler) -> Option<ChangeMap> {
        let mut changes = ChangeMap::new();
        changes.insert(Keypath::from("value"), json!(self.id.raw()));
        Some(changes)
    }

    fn fire_change(&self, changes: &ChangeMap) {
        black_box(changes);
    }
}

struct Counter(Cell<u64>);

impl View for Counter {
    fn update(&self, _scheduler: &Scheduler) {
        self.0.set(self.0.get() + 1);
    }
}

fn bench_viewmodels(c: &mut Criterion) {
    let mut group = c.benchmark_group("flush_viewmodels");
    for count in [1usize, 16, 256] {
        let models: Vec<Rc<dyn Viewmodel>> = (0..count)
            .map(|_| Rc::new(Model { id: ViewmodelId::new() }) as Rc<dyn Viewmodel>)
            .collect();
        let scheduler = Scheduler::new();

        group.bench_with_input(BenchmarkId::from_parameter(count), &models, |b, models| {
            b.iter(|| {
                scheduler.start(None, None);
                for model in models {
                    scheduler.add_viewmodel(model.clone());
                }
                scheduler.end().unwrap();
            })
        });
    }
    group.finish();
}

fn bench_views(c: &mut Criterion) {
    let scheduler = Scheduler::new();
    let view: Rc<dyn View> = Rc::new(Counter(Cell::new(0)));

    c.bench_function("flush_views_256", |b| {
        b.iter(|| {
            scheduler.start(None, None);
            for _ in 0..256 {
                scheduler.add_view(view.clone());
            }
            scheduler.end().unwrap();
        })
    });
}

fn bench_task_chain(c: &mut Criterion) {
    fn chain(scheduler: &Scheduler, remaining: u32) {
        if remaining > 0 {
            scheduler.after_model_update(move |scheduler| chain(scheduler, remaining - 1));
        }
    }

    let scheduler = Scheduler::new();
    c.bench_function("flush_task_chain_64", |b| {
        b.iter(|| {
            scheduler.start(None, None);
            chain(&scheduler, 64);
            scheduler.end().unwrap();
        })
    });
}

criterion_group!(benches, bench_viewmodels, bench_views, bench_task_chain);
criterion_main!(benches);
