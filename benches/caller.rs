use criterion::{criterion_group, criterion_main, Criterion};
use tombola::engine::caller::NumberCaller;
use tombola::engine::card::CardEngine;
use tombola::engine::win::{PatternSet, WinEvaluator};

fn bench_full_draw_sequence(c: &mut Criterion) {
    c.bench_function("draw_75", |b| {
        b.iter(|| {
            let mut caller = NumberCaller::new();
            while caller.draw().is_ok() {}
            caller.called().len()
        })
    });
}

fn bench_win_check(c: &mut Criterion) {
    let mut rng = rand::thread_rng();
    let card = CardEngine::generate(&mut rng);
    let mut caller = NumberCaller::new();
    for _ in 0..40 {
        let _ = caller.draw();
    }
    let evaluator = WinEvaluator::new(PatternSet::extended());

    c.bench_function("check_win_40_calls", |b| {
        b.iter(|| evaluator.check_win(&card, caller.called_set()).is_some())
    });
}

criterion_group!(benches, bench_full_draw_sequence, bench_win_check);
criterion_main!(benches);
