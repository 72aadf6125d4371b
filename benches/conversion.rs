// Copyright (C) 2025 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use audiosys::audio::codec::Codecs;
use audiosys::audio::resample::{resample, RateConversion};
use audiosys::audio::tone::{ToneGenerator, Waveform};
use audiosys::engine::AudioEngine;
use audiosys::{AudioFormat, SampleFormat};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

fn generate_test_audio(format: SampleFormat, channels: u16, frames: usize) -> Vec<u8> {
    let mut tone = ToneGenerator::new(Waveform::Sine, 440.0, 0.5);
    let mut data = vec![0u8; frames * channels as usize * format.bytes_per_sample()];
    tone.fill(&mut data, format, 48000, channels, frames);
    data
}

fn benchmark_format_conversion(c: &mut Criterion) {
    let mut group = c.benchmark_group("format_conversion");
    let codecs = Codecs::new();
    let samples = 4096 * 2;

    for format in [
        SampleFormat::U8,
        SampleFormat::S16,
        SampleFormat::S24,
        SampleFormat::S32,
    ] {
        let input = generate_test_audio(format, 2, 4096);
        let mut floats = vec![0u8; samples * 4];
        group.bench_function(BenchmarkId::new("to_f32", format), |b| {
            b.iter(|| {
                codecs
                    .convert(samples, format, SampleFormat::F32, black_box(&input), &mut floats)
                    .unwrap();
            })
        });

        let mut output = vec![0u8; samples * format.bytes_per_sample()];
        group.bench_function(BenchmarkId::new("from_f32", format), |b| {
            b.iter(|| {
                codecs
                    .convert(samples, SampleFormat::F32, format, black_box(&floats), &mut output)
                    .unwrap();
            })
        });
    }

    group.finish();
}

fn benchmark_interleaving(c: &mut Criterion) {
    let mut group = c.benchmark_group("interleaving");
    let codecs = Codecs::new();
    let frames = 4096;

    // S24 takes the byte-copy path, S16 and F32 the typed one.
    for format in [SampleFormat::S16, SampleFormat::S24, SampleFormat::F32] {
        let input = generate_test_audio(format, 8, frames);
        let mut planar = vec![vec![0u8; frames * format.bytes_per_sample()]; 8];
        group.bench_function(BenchmarkId::new("deinterleave_8ch", format), |b| {
            b.iter(|| {
                let mut channels: Vec<&mut [u8]> =
                    planar.iter_mut().map(|c| c.as_mut_slice()).collect();
                codecs
                    .deinterleave(frames, format, black_box(&input), &mut channels)
                    .unwrap();
            })
        });
    }

    group.finish();
}

fn benchmark_resampling(c: &mut Criterion) {
    let mut group = c.benchmark_group("resampling");

    let test_cases = vec![
        ("48kHz_passthrough", 48000, 48000),
        ("24kHz_to_48kHz", 24000, 48000),
        ("12kHz_to_48kHz", 12000, 48000),
        ("96kHz_to_48kHz", 96000, 48000),
    ];

    for (name, source_rate, target_rate) in test_cases {
        let conversion = RateConversion::select(source_rate, target_rate).unwrap();
        let input = generate_test_audio(SampleFormat::S16, 2, 16384);
        let mut output = vec![0.0f32; 4096 * 2];

        group.bench_function(name, |b| {
            b.iter(|| {
                black_box(resample(
                    conversion,
                    SampleFormat::S16,
                    2,
                    black_box(&input),
                    16384,
                    4096,
                    4096,
                    1.0,
                    &mut output,
                ))
            })
        });
    }

    group.finish();
}

fn benchmark_render(c: &mut Criterion) {
    let mut group = c.benchmark_group("render");

    for voices in [1usize, 4, 16] {
        let format = AudioFormat::new(2, 48000, SampleFormat::S16).unwrap();
        let (engine, mut writer) = AudioEngine::init(format).unwrap();
        let mut tone = ToneGenerator::new(Waveform::Sine, 440.0, 0.1);
        let source = engine.generate_source(&mut tone, 2, 48000, 48000).unwrap();
        for _ in 0..voices {
            engine.play_source(&source, true).unwrap();
        }

        let mut out = vec![0u8; 512 * format.frame_size()];
        group.bench_function(BenchmarkId::new("write_512_frames", voices), |b| {
            b.iter(|| writer.write_frames(512, black_box(&mut out)).unwrap())
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    benchmark_format_conversion,
    benchmark_interleaving,
    benchmark_resampling,
    benchmark_render
);
criterion_main!(benches);
