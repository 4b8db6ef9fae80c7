use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use regiongen::outline::is_valid_ring;
use regiongen::{
    BarrierStrategy, FnSampler, GenerationCallback, GenerationError, GeneratorConfig,
    GridTopology, NoiseSampler, Point, Progress, Region, RegionGenerator, RegionKind, Sample,
    SampleError, Sampler, Stage,
};

fn config(radius: i32) -> GeneratorConfig {
    GeneratorConfig {
        radius,
        sample_spacing: 8,
        min_region_cells: 1,
        max_region_cells: 100,
        ..GeneratorConfig::default()
    }
}

fn plains() -> FnSampler<impl Fn(i32, i32) -> Result<Sample, SampleError> + Send + Sync + 'static>
{
    FnSampler(|_, _| Ok(Sample::new(64, "plains")))
}

fn bbox(points: &[Point]) -> (f64, f64, f64, f64) {
    points.iter().fold(
        (f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
        |(a, b, c, d), p| (a.min(p.x), b.min(p.z), c.max(p.x), d.max(p.z)),
    )
}

async fn run(
    config: GeneratorConfig,
    sampler: impl Sampler,
) -> Result<Vec<Region>, GenerationError> {
    RegionGenerator::new(config)
        .expect("valid config")
        .run(sampler, |_| {})
        .await
}

#[tokio::test]
async fn flat_field_is_a_single_region() {
    let config = GeneratorConfig {
        chaikin_iterations: 0,
        ..config(8)
    };
    let regions = run(config, plains()).await.unwrap();

    assert_eq!(regions.len(), 1);
    let region = &regions[0];
    assert_eq!(region.cells, 9);
    assert_eq!(region.kind, RegionKind::Land);
    assert_eq!(region.dominant_category.as_str(), "plains");
    assert!((region.area_blocks - 9.0 * 64.0).abs() < 1e-9);
    assert_eq!(bbox(&region.outline), (-8.0, -8.0, 8.0, 8.0));
    assert_eq!(region.outline.len(), 4);
}

#[tokio::test]
async fn water_row_splits_land_and_collapses_into_bulk() {
    let config = GeneratorConfig {
        coast_buffer_distance: 0,
        ..config(24)
    };
    let sampler = FnSampler(|_, z: i32| {
        if z == 0 {
            Ok(Sample::new(40, "ocean"))
        } else {
            Ok(Sample::new(64, "plains"))
        }
    });
    let regions = run(config, sampler).await.unwrap();

    let land: Vec<&Region> = regions.iter().filter(|r| r.kind == RegionKind::Land).collect();
    let bulk: Vec<&Region> = regions.iter().filter(|r| r.kind == RegionKind::Bulk).collect();
    assert_eq!(land.len(), 2);
    assert_eq!(bulk.len(), 1);
    assert!(regions.iter().all(|r| r.kind != RegionKind::Coastal));

    assert!(land.iter().all(|r| r.cells == 21));
    assert_eq!(bulk[0].cells, 7);
    assert_eq!(bulk[0].dominant_category.as_str(), "ocean");
    assert_eq!(bbox(&bulk[0].outline), (-28.0, -4.0, 28.0, 4.0));
}

#[tokio::test]
async fn coast_buffer_turns_near_water_into_coastal_regions() {
    let config = GeneratorConfig {
        coast_buffer_distance: 2,
        ..config(24)
    };
    let sampler = FnSampler(|_, z: i32| {
        if z <= 0 {
            Ok(Sample::new(40, "ocean"))
        } else {
            Ok(Sample::new(64, "plains"))
        }
    });
    let regions = run(config, sampler).await.unwrap();

    let coastal: Vec<&Region> = regions.iter().filter(|r| r.kind == RegionKind::Coastal).collect();
    assert_eq!(coastal.len(), 1);
    assert_eq!(coastal[0].cells, 14);
    assert!(is_valid_ring(&coastal[0].outline));
    let bulk = regions.iter().find(|r| r.kind == RegionKind::Bulk).unwrap();
    assert_eq!(bulk.cells, 14);
    assert_eq!(regions.iter().map(|r| r.cells).sum::<usize>(), 49);
}

#[tokio::test]
async fn failed_samples_do_not_abort_the_run() {
    let config = GeneratorConfig {
        min_region_cells: 4,
        ..config(24)
    };
    let sampler = FnSampler(|x: i32, z: i32| {
        if x == 0 && z == 0 {
            Err(SampleError::Failed("chunk not generated".to_string()))
        } else {
            Ok(Sample::new(64, "plains"))
        }
    });
    let regions = run(config, sampler).await.unwrap();
    assert_eq!(regions.len(), 1);
    assert_eq!(regions[0].cells, 49);
}

struct SlowCenter;

impl Sampler for SlowCenter {
    fn sample(&self, x: i32, z: i32) -> impl Future<Output = Result<Sample, SampleError>> + Send {
        async move {
            if x == 0 && z == 0 {
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
            Ok(Sample::new(64, "plains"))
        }
    }
}

#[tokio::test]
async fn timed_out_sample_keeps_default_cell() {
    let config = GeneratorConfig {
        per_sample_timeout_seconds: 1,
        min_region_cells: 4,
        ..config(16)
    };
    let regions = run(config, SlowCenter).await.unwrap();
    assert_eq!(regions.iter().map(|r| r.cells).sum::<usize>(), 25);
}

#[tokio::test]
async fn unavailable_sampler_fails_the_run() {
    let sampler = FnSampler(|_, _| Err(SampleError::Unavailable("server stopping".to_string())));
    let err = run(config(64), sampler).await.unwrap_err();
    assert!(matches!(err, GenerationError::SamplerUnavailable(_)));
}

#[tokio::test]
async fn progress_is_monotonic_and_ends_with_done() {
    let generator = RegionGenerator::new(config(160)).unwrap();
    let mut generation = generator.generate(plains());

    let mut events = Vec::new();
    while let Some(progress) = generation.next_progress().await {
        events.push(progress);
    }
    let regions = generation.wait().await.unwrap();
    assert!(!regions.is_empty());

    let percents: Vec<u8> = events
        .iter()
        .filter_map(|p| match p {
            Progress::Sampling(percent) => Some(*percent),
            Progress::Stage(_) => None,
        })
        .collect();
    assert!(percents.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(percents.last(), Some(&100));
    assert_eq!(events.first(), Some(&Progress::Stage(Stage::Sampling)));
    assert_eq!(events.last(), Some(&Progress::Stage(Stage::Done)));
}

#[derive(Default)]
struct Recorded {
    percents: Vec<u8>,
    finished: Vec<usize>,
    errors: Vec<String>,
}

struct Recorder(Arc<Mutex<Recorded>>);

impl GenerationCallback for Recorder {
    fn on_progress(&mut self, percent: u8) {
        self.0.lock().unwrap().percents.push(percent);
    }

    fn on_finished(&mut self, regions: Vec<Region>) {
        self.0.lock().unwrap().finished.push(regions.len());
    }

    fn on_error(&mut self, error: GenerationError) {
        self.0.lock().unwrap().errors.push(error.to_string());
    }
}

#[tokio::test]
async fn callback_receives_progress_and_one_result() {
    let recorded = Arc::new(Mutex::new(Recorded::default()));
    let generator = RegionGenerator::new(config(64)).unwrap();
    generator
        .generate_with_callback(plains(), Recorder(Arc::clone(&recorded)))
        .await
        .unwrap();

    let recorded = recorded.lock().unwrap();
    assert_eq!(recorded.finished.len(), 1);
    assert!(recorded.errors.is_empty());
    assert_eq!(recorded.percents.last(), Some(&100));
}

#[tokio::test]
async fn callback_receives_one_error() {
    let recorded = Arc::new(Mutex::new(Recorded::default()));
    let generator = RegionGenerator::new(config(64)).unwrap();
    let sampler = FnSampler(|_, _| Err(SampleError::Unavailable("gone".to_string())));
    generator
        .generate_with_callback(sampler, Recorder(Arc::clone(&recorded)))
        .await
        .unwrap();

    let recorded = recorded.lock().unwrap();
    assert!(recorded.finished.is_empty());
    assert_eq!(recorded.errors.len(), 1);
}

fn noise_config(topology: GridTopology, strategy: BarrierStrategy) -> GeneratorConfig {
    GeneratorConfig {
        radius: 1024,
        sample_spacing: 16,
        min_region_cells: 20,
        max_region_cells: 300,
        grid_topology: topology,
        barrier_strategy: strategy,
        seed: 5,
        ..GeneratorConfig::default()
    }
}

#[tokio::test]
async fn noise_terrain_outlines_are_valid_for_every_strategy() {
    for topology in [GridTopology::Square, GridTopology::Hex] {
        for strategy in [BarrierStrategy::LocalThreshold, BarrierStrategy::WatershedRidge] {
            let config = noise_config(topology, strategy);
            let generator = RegionGenerator::new(config).unwrap();
            let total = generator.domain().cell_count();
            let regions = generator
                .run(NoiseSampler::new(5, 320), |_| {})
                .await
                .unwrap();

            assert!(!regions.is_empty());
            assert!(regions.iter().map(|r| r.cells).sum::<usize>() <= total);
            assert!(regions.iter().filter(|r| r.kind == RegionKind::Bulk).count() <= 1);
            for region in regions.iter().filter(|r| r.kind != RegionKind::Bulk) {
                assert!(is_valid_ring(&region.outline), "{topology:?}/{strategy:?}");
            }
        }
    }
}

#[tokio::test]
async fn same_seed_gives_identical_regions() {
    let config = noise_config(GridTopology::Square, BarrierStrategy::LocalThreshold);
    let a = run(config.clone(), NoiseSampler::new(5, 320)).await.unwrap();
    let b = run(config, NoiseSampler::new(5, 320)).await.unwrap();
    assert_eq!(a, b);
}
