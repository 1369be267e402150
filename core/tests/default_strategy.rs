use std::sync::{Arc, Mutex};
use std::thread;

use rficore::buffers::Image2D;
use rficore::data::{
    ArtifactSet, Baseline, BaselineData, BaselineSource, MemoryBaselineSource, TimeFrequencyData,
    TimeFrequencyMetadata,
};
use rficore::prelude::NullProgressListener;
use rficore::strategy::{build_baseline_strategy, StrategyOptions};
use rficore::telemetry::MetricsRecorder;
use rficore::{Flagger, ImageSet, StrategyFlags, TelescopeId};

const SIZE: usize = 16;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Unit real part, zero imaginary part and a strong spike at `(x, y)` in the
/// first image.
fn spiked_images(flagger: &Flagger, count: usize, x: usize, y: usize) -> ImageSet {
    let mut images = flagger.make_image_set(SIZE, SIZE, count).unwrap();
    let stride = images.horizontal_stride();
    for index in (0..count).step_by(if count == 1 { 1 } else { 2 }) {
        let buffer = images.image_buffer_mut(index).unwrap();
        for row in 0..SIZE {
            buffer[row * stride..row * stride + SIZE].fill(1.0);
        }
    }
    images.image_buffer_mut(0).unwrap()[y * stride + x] = 1000.0;
    images
}

fn flagged_positions(mask: &rficore::FlagMask) -> Vec<(usize, usize)> {
    let mut positions = Vec::new();
    for y in 0..mask.height() {
        for x in 0..mask.width() {
            if mask.buffer()[y * mask.horizontal_stride() + x] {
                positions.push((x, y));
            }
        }
    }
    positions
}

#[test]
fn image_set_counts() {
    let flagger = Flagger::new();
    for count in [1, 2, 4, 8] {
        let set = flagger.make_image_set(10, 7, count).unwrap();
        assert_eq!(set.image_count(), count);
        assert_eq!((set.width(), set.height()), (10, 7));
    }
    for count in [0, 3, 6, 9] {
        assert!(flagger.make_image_set(10, 7, count).is_err());
    }
}

#[test]
fn zero_images_yield_no_flags() {
    init_logging();
    let flagger = Flagger::new();
    let strategy = flagger.make_strategy(TelescopeId::Generic, StrategyFlags::NONE, 0.0, 0.0, 0.0);
    for count in [1, 2, 4, 8] {
        let images = flagger.make_image_set(SIZE, 24, count).unwrap();
        let mask = flagger.run(&strategy, &images).unwrap();
        assert!(mask.mask().is_clear(), "{count} images produced flags");
    }
}

#[test]
fn isolated_spike_is_the_only_flag() {
    init_logging();
    let flagger = Flagger::new();
    let strategy = flagger.make_strategy(TelescopeId::Generic, StrategyFlags::NONE, 0.0, 0.0, 0.0);
    for count in [1, 2, 4, 8] {
        let images = spiked_images(&flagger, count, 7, 9);
        let mask = flagger.run(&strategy, &images).unwrap();
        assert_eq!(flagged_positions(&mask), vec![(7, 9)], "{count} images");
    }
}

#[test]
fn robust_and_mwa_variants_flag_the_spike() {
    let flagger = Flagger::new();
    let images = spiked_images(&flagger, 2, 3, 12);
    for (telescope, flags) in [
        (TelescopeId::Generic, StrategyFlags::ROBUST),
        (TelescopeId::Lofar, StrategyFlags::TRANSIENTS),
        (TelescopeId::Wsrt, StrategyFlags::SENSITIVE | StrategyFlags::FAST),
    ] {
        let strategy = flagger.make_strategy(telescope, flags, 150e6, 1.0, 10e3);
        let mask = flagger.run(&strategy, &images).unwrap();
        assert!(mask.mask().value(3, 12), "{telescope:?} {flags:?}");
    }
}

#[test]
fn one_strategy_serves_concurrent_runs() {
    let flagger = Flagger::new();
    let strategy = Arc::new(flagger.make_strategy(
        TelescopeId::Generic,
        StrategyFlags::NONE,
        0.0,
        0.0,
        0.0,
    ));
    let results: Vec<Vec<(usize, usize)>> = thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let strategy = Arc::clone(&strategy);
                let flagger = flagger.clone();
                scope.spawn(move || {
                    let images = spiked_images(&flagger, 2, 2 + i, 3 + 2 * i);
                    flagged_positions(&flagger.run(&strategy, &images).unwrap())
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });
    for (i, positions) in results.into_iter().enumerate() {
        assert_eq!(positions, vec![(2 + i, 3 + 2 * i)]);
    }
}

#[test]
fn saved_strategy_flags_like_the_original() {
    let flagger = Flagger::new();
    let strategy = flagger.make_strategy(TelescopeId::Mwa, StrategyFlags::NONE, 0.0, 0.0, 0.0);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mwa.json");
    flagger.save_strategy(&strategy, &path).unwrap();
    let loaded = flagger.load_strategy(&path).unwrap();
    assert_eq!(loaded, strategy);

    let images = spiked_images(&flagger, 1, 11, 4);
    assert_eq!(
        flagger.run(&loaded, &images).unwrap(),
        flagger.run(&strategy, &images).unwrap()
    );
}

#[test]
fn listener_sees_balanced_tasks() {
    let flagger = Flagger::new();
    let strategy = flagger.make_strategy(TelescopeId::Generic, StrategyFlags::NONE, 0.0, 0.0, 0.0);
    let images = spiked_images(&flagger, 2, 1, 1);
    let recorder = MetricsRecorder::new();
    flagger.run_with(&strategy, &images, None, &recorder).unwrap();
    let metrics = recorder.snapshot();
    assert!(metrics.started > 0);
    assert_eq!(metrics.started, metrics.finished);
    assert_eq!(metrics.progress_updates, 2);
}

#[test]
fn baseline_strategy_writes_flags_for_every_baseline() {
    init_logging();
    let baselines: Vec<BaselineData> = (0..3)
        .map(|antenna| {
            let mut image = Image2D::with_value(SIZE, SIZE, 1.0);
            image.set_value(antenna + 4, 6, 500.0);
            BaselineData {
                data: TimeFrequencyData::from_image_count(vec![Arc::new(image)]).unwrap(),
                metadata: TimeFrequencyMetadata {
                    baseline: Some(Baseline::new(antenna, 5)),
                    ..Default::default()
                },
            }
        })
        .collect();
    let source = Arc::new(MemoryBaselineSource::new(baselines));
    let placeholder =
        TimeFrequencyData::from_image_count(vec![Arc::new(Image2D::new(1, 1))]).unwrap();
    let mut artifacts = ArtifactSet::new(placeholder, Arc::new(Mutex::new(())))
        .with_baseline_source(Arc::clone(&source) as Arc<dyn BaselineSource>);

    let strategy = build_baseline_strategy(&StrategyOptions::default());
    strategy.perform(&mut artifacts, &NullProgressListener).unwrap();

    let written = source.take_flags().unwrap();
    assert_eq!(written.len(), 3);
    for (antenna, (baseline, mask)) in written.iter().enumerate() {
        assert_eq!(*baseline, Baseline::new(antenna, 5));
        assert_eq!(mask.count_flagged(), 1);
        assert!(mask.value(antenna + 4, 6));
    }
}

#[test]
fn statistics_merge_in_any_order() {
    let flagger = Flagger::new();
    let times: Vec<f64> = (0..4).map(|t| 100.0 + t as f64).collect();
    let frequencies: Vec<f64> = (0..3).map(|c| 140e6 + c as f64 * 1e6).collect();
    let mut rfi = flagger.make_flag_mask(4, 3);
    let stride = rfi.horizontal_stride();
    rfi.buffer_mut()[stride + 2] = true;
    let correlator = flagger.make_flag_mask(4, 3);

    let inputs: Vec<(ImageSet, usize, usize)> = (0..3)
        .map(|b| {
            let mut images = flagger.make_image_set(4, 3, 4).unwrap();
            for index in 0..4 {
                let buffer = images.image_buffer_mut(index).unwrap();
                for (i, v) in buffer.iter_mut().enumerate() {
                    *v = ((i * (index + 1) + b) % 7) as f32 - 3.0;
                }
            }
            (images, b, b + 1)
        })
        .collect();

    let collect = |parts: &[usize]| {
        let mut stats = flagger.make_quality_statistics(&times, &frequencies, 2);
        for &i in parts {
            let (images, a1, a2) = &inputs[i];
            flagger
                .collect_statistics(&mut stats, images, &rfi, &correlator, *a1, *a2)
                .unwrap();
        }
        stats
    };

    let all = collect(&[0, 1, 2]);
    let (a, b, c) = (collect(&[0]), collect(&[1]), collect(&[2]));

    let mut left = a.clone();
    left += &b;
    left += &c;
    let mut bc = b.clone();
    bc += &c;
    let mut right = a.clone();
    right += bc;
    let mut reversed = c.clone();
    reversed += &b;
    reversed += a;

    assert_eq!(left.collection(), all.collection());
    assert_eq!(right.collection(), all.collection());
    assert_eq!(reversed.collection(), all.collection());

    let dir = tempfile::tempdir().unwrap();
    flagger
        .write_statistics(&all, dir.path().join("quality.json"))
        .unwrap();
}
