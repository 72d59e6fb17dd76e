use bevy_chatbot::{Message, StylePreset, assemble, assemble_with};
use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;

fn long_log(n: usize) -> Vec<Message> {
    (0..n)
        .map(|i| {
            let text = format!("message {i}: {}", "lorem ipsum ".repeat(20));
            if i % 2 == 0 { Message::user(text) } else { Message::assistant(text) }
        })
        .collect()
}

fn bench_assemble(c: &mut Criterion) {
    let short = long_log(4);
    let long = long_log(2_000);

    c.bench_function("assemble_short_log", |b| {
        b.iter(|| assemble_with(black_box(&short), black_box("next"), StylePreset::Concise))
    });
    // window keeps this flat regardless of log length
    c.bench_function("assemble_long_log", |b| {
        b.iter(|| assemble_with(black_box(&long), black_box("next"), StylePreset::Concise))
    });
    c.bench_function("assemble_by_key", |b| {
        b.iter(|| assemble(black_box(&long), black_box("next"), black_box("Teacher")))
    });
}

criterion_group!(benches, bench_assemble);
criterion_main!(benches);
