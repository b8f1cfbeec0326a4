use criterion::{black_box, criterion_group, criterion_main, Criterion};
use obstack::Obstack;

fn bench_grow_finish(c: &mut Criterion) {
    c.bench_function("copy_64_bytes", |b| {
        let mut stack = Obstack::new();
        let mark = stack.finish();
        let payload = [0x42u8; 64];
        b.iter(|| {
            let obj = stack.copy(black_box(&payload));
            black_box(obj);
            stack.free(mark);
        });
    });

    c.bench_function("grow1_symbol_of_8", |b| {
        let mut stack = Obstack::new();
        let mark = stack.finish();
        b.iter(|| {
            for byte in b"asymbol8" {
                stack.grow1(black_box(*byte));
            }
            black_box(stack.finish());
            stack.free(mark);
        });
    });

    c.bench_function("reserved_room_of_8", |b| {
        let mut stack = Obstack::new();
        let mark = stack.finish();
        b.iter(|| {
            let mut room = stack.reserve(8);
            for byte in b"asymbol8" {
                room.push(black_box(*byte));
            }
            black_box(room.finish());
            stack.free(mark);
        });
    });
}

fn bench_promotion(c: &mut Criterion) {
    c.bench_function("spill_512_into_new_chunk", |b| {
        let payload = [0x7Fu8; 512];
        b.iter(|| {
            let mut stack = Obstack::begin(64);
            black_box(stack.copy(black_box(&payload)));
        });
    });
}

fn bench_unwind(c: &mut Criterion) {
    c.bench_function("free_across_four_chunks", |b| {
        b.iter(|| {
            let mut stack = Obstack::begin(64);
            let mark = stack.copy(b"anchor");
            for len in [100usize, 400, 1600, 6400] {
                stack.blank(len);
                stack.finish();
            }
            stack.free(black_box(mark));
            black_box(stack.memory_used());
        });
    });
}

criterion_group!(benches, bench_grow_finish, bench_promotion, bench_unwind);
criterion_main!(benches);
