//! # Controller Tick Benchmark

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use steer_lib::steer_ctrl::{
    ChannelLayout, Controller, ErrorInputs, ErrorTracker, Feature, LearnedLaw,
    NetworkPredictor, PdLaw, SpeedSource, TelemetryRecorder
};

/// Two layer network on the three angular features, with a speed output.
const NETWORK: &str = r#"{
    "layers": [
        {
            "weights": [
                [-0.02, -0.01, 0.0],
                [0.01, -0.03, 0.005],
                [-0.005, 0.0, 0.01],
                [0.0, 0.02, -0.01]
            ],
            "bias": [0.0, 0.1, -0.1, 0.0],
            "activation": "tanh"
        },
        {
            "weights": [
                [1.0, -0.5, 0.25, 0.5],
                [0.0, 0.0, 0.0, 0.0]
            ],
            "bias": [0.0, 60.0]
        }
    ]
}"#;

fn tick_benchmark(c: &mut Criterion) {
    // ---- Build the error sequence ----

    let mut tracker = ErrorTracker::new();
    let inputs: Vec<ErrorInputs> = (0..1000)
        .map(|i| {
            let e = 45.0 * (i as f64 * 0.05).sin();
            ErrorInputs::single(tracker.update(e).unwrap())
        })
        .collect();

    // ---- Bench the PD law ----

    c.bench_function("Controller::tick::pd", |b| {
        let mut ctrl = Controller::from_parts(
            ChannelLayout::Single,
            Box::new(PdLaw::new(0.025, 0.025, 60.0)),
            None
        );
        let mut i = 0;
        b.iter(|| {
            i = (i + 1) % inputs.len();
            ctrl.tick(black_box(inputs[i])).unwrap()
        })
    });

    // ---- Bench the learned law ----

    let build_learned = || {
        Box::new(LearnedLaw::new(
            Box::new(NetworkPredictor::from_json(NETWORK).unwrap()),
            vec![
                Feature::AngularError,
                Feature::AngularDeltaError,
                Feature::AngularDeltaError2
            ],
            SpeedSource::SecondOutput,
            ChannelLayout::Single
        ).unwrap())
    };

    c.bench_function("Controller::tick::learned", |b| {
        let mut ctrl = Controller::from_parts(ChannelLayout::Single, build_learned(), None);
        let mut i = 0;
        b.iter(|| {
            i = (i + 1) % inputs.len();
            ctrl.tick(black_box(inputs[i])).unwrap()
        })
    });

    // Recording only buffers in memory, the recorder is never closed here so
    // it's dropped (and flushed) into a temporary directory.
    let dir = tempfile::tempdir().unwrap();
    c.bench_function("Controller::tick::learned_recorded", |b| {
        let mut ctrl = Controller::from_parts(
            ChannelLayout::Single,
            build_learned(),
            Some(TelemetryRecorder::new(dir.path().join("data.csv"), ChannelLayout::Single))
        );
        let mut i = 0;
        b.iter(|| {
            i = (i + 1) % inputs.len();
            ctrl.tick(black_box(inputs[i])).unwrap()
        })
    });
}

criterion_group!(benches, tick_benchmark);
criterion_main!(benches);
