use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tm_engine::{AudioEngineContext, EngineConfig, Interpolation};
use tm_ir::{Cell, Instrument, LoopType, PatternCompressor, PatternGrid, Sample, SampleData, Song};

/// Eight channels of looping saw with vibrato and volume slides.
fn busy_song() -> Song {
    let channels = 8;
    let mut grid = PatternGrid::new(64, channels);
    for row in (0..64).step_by(4) {
        for ch in 0..channels {
            *grid.cell_mut(row, ch) = Cell {
                command: 0x04,
                parameter: 0x46,
                ..Cell::note(37 + ch * 3 + (row % 12) as u8, 1)
            };
            *grid.cell_mut(row + 1, ch) = Cell { command: 0x0A, parameter: 0x01, ..Cell::empty() };
        }
    }
    let mut song = Song::with_patterns("bench", channels, vec![PatternCompressor::compress(&grid)]);
    song.order = vec![0];

    let saw: Vec<i16> = (0..256).map(|i| ((i as i32 - 128) * 200) as i16).collect();
    let mut sample = Sample::new("saw");
    sample.data = SampleData::Pcm16(Arc::from(saw));
    sample.loop_type = LoopType::Forward;
    sample.loop_end = 256;
    sample.volume = 48;
    let mut instrument = Instrument::new("saw");
    instrument.samples.push(sample);
    instrument.set_single_sample(0);
    song.instruments.push(instrument);
    song
}

fn bench_render(c: &mut Criterion) {
    for (name, interpolation) in [("render_1s_linear", Interpolation::Linear), ("render_1s_nearest", Interpolation::Nearest)] {
        c.bench_function(name, |b| {
            let mut ctx = AudioEngineContext::new(EngineConfig { interpolation, ..EngineConfig::default() });
            ctx.load_song(busy_song()).ok();
            let mut out = vec![0i16; 1024];
            b.iter(|| {
                ctx.play(true, 0);
                for _ in 0..(44100 / 512 + 1) {
                    black_box(ctx.fill_buffer_interleaved(&mut out));
                }
            });
        });
    }
}

criterion_group!(benches, bench_render);
criterion_main!(benches);
