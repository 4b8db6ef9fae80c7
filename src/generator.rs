// src/generator.rs
//! Точка входа: прогон генерации от выборки до полигонов.
//!
//! ## Этапы
//!
//! `Idle → Sampling → DetectingBarriers → Growing → Normalizing → Tracing → Done`,
//! либо `Failed` с любого этапа. Каждый прогон одноразовый и строит собственную сетку.
//!
//! Выборка асинхронная и параллельная, растровые этапы идут последовательно
//! в `spawn_blocking`, чтобы не занимать потоки рантайма.
//!
//! ## Пример
//! ```rust,no_run
//! use regiongen::{GeneratorConfig, NoiseSampler, RegionGenerator};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let generator = RegionGenerator::new(GeneratorConfig::default())?;
//! let mut generation = generator.generate(NoiseSampler::new(42, 320));
//! while let Some(progress) = generation.next_progress().await {
//!     println!("{progress:?}");
//! }
//! let regions = generation.wait().await?;
//! println!("{} regions", regions.len());
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::barrier::detector_for;
use crate::category::CategoryRules;
use crate::config::GeneratorConfig;
use crate::error::{ConfigError, GenerationError};
use crate::grid::{Grid, SamplingOptions, available_cpus, compute_concurrency, sample_grid};
use crate::region::grow::{absorb_barrier_cells, grow_regions};
use crate::region::normalize::normalize;
use crate::region::ocean::{distance_to_land, split_water};
use crate::region::{Partition, Region, build_regions};
use crate::sampler::Sampler;
use crate::topology::Domain;

/// Этап прогона.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Idle,
    Sampling,
    DetectingBarriers,
    Growing,
    Normalizing,
    Tracing,
    Done,
    Failed,
}

/// Событие прогресса: проценты выборки или вход в этап.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    Sampling(u8),
    Stage(Stage),
}

/// Получатель результатов для прогона без ожидания.
///
/// Все методы вызываются из задачи прогона; `on_finished` или `on_error` — ровно один раз.
pub trait GenerationCallback: Send + 'static {
    fn on_progress(&mut self, _percent: u8) {}
    fn on_finished(&mut self, regions: Vec<Region>);
    fn on_error(&mut self, error: GenerationError);
}

/// Запущенный прогон: поток прогресса и итог.
pub struct Generation {
    progress: UnboundedReceiver<Progress>,
    handle: JoinHandle<Result<Vec<Region>, GenerationError>>,
}

impl Generation {
    /// Следующее событие; `None`, когда прогон закончился.
    pub async fn next_progress(&mut self) -> Option<Progress> {
        self.progress.recv().await
    }

    /// Ждёт окончания прогона. Непрочитанные события прогресса отбрасываются.
    pub async fn wait(self) -> Result<Vec<Region>, GenerationError> {
        match self.handle.await {
            Ok(result) => result,
            Err(err) => Err(err.into()),
        }
    }
}

/// Генератор регионов с проверенной конфигурацией.
#[derive(Debug, Clone)]
pub struct RegionGenerator {
    config: Arc<GeneratorConfig>,
    rules: Arc<CategoryRules>,
}

impl RegionGenerator {
    /// Проверяет конфигурацию до любой работы.
    pub fn new(config: GeneratorConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let rules = CategoryRules::from_config(&config)?;
        Ok(Self {
            config: Arc::new(config),
            rules: Arc::new(rules),
        })
    }

    #[must_use]
    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Область выборки, заданная конфигурацией.
    #[must_use]
    pub fn domain(&self) -> Domain {
        Domain::new(
            self.config.grid_topology,
            self.config.radius,
            self.config.sample_spacing,
        )
    }

    /// Запускает прогон в фоне и сразу возвращает управление.
    ///
    /// # Panics
    /// Вне tokio-рантайма.
    pub fn generate<S: Sampler>(&self, sampler: S) -> Generation {
        let (tx, rx) = mpsc::unbounded_channel();
        let generator = self.clone();
        let handle = tokio::spawn(async move {
            generator
                .run(sampler, move |progress| {
                    // получатель мог уйти — прогон от этого не зависит
                    let _ = tx.send(progress);
                })
                .await
        });
        Generation {
            progress: rx,
            handle,
        }
    }

    /// Прогон в фоне с результатом через [`GenerationCallback`].
    ///
    /// # Panics
    /// Вне tokio-рантайма.
    pub fn generate_with_callback<S, C>(&self, sampler: S, mut callback: C) -> JoinHandle<()>
    where
        S: Sampler,
        C: GenerationCallback,
    {
        let generator = self.clone();
        tokio::spawn(async move {
            let result = generator
                .run(sampler, |progress| {
                    if let Progress::Sampling(percent) = progress {
                        callback.on_progress(percent);
                    }
                })
                .await;
            match result {
                Ok(regions) => callback.on_finished(regions),
                Err(err) => callback.on_error(err),
            }
        })
    }

    /// Полный прогон в текущей задаче.
    pub async fn run<S: Sampler>(
        &self,
        sampler: S,
        mut progress: impl FnMut(Progress) + Send,
    ) -> Result<Vec<Region>, GenerationError> {
        let started = Instant::now();
        progress(Progress::Stage(Stage::Sampling));

        let sampled = self
            .sample(sampler, |percent| progress(Progress::Sampling(percent)))
            .await;
        let result = match sampled {
            Ok(grid) => partition_grid(grid, &self.config, &mut progress).await,
            Err(err) => Err(err),
        };

        match &result {
            Ok(regions) => {
                progress(Progress::Stage(Stage::Done));
                info!(
                    regions = regions.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "region generation finished"
                );
            }
            Err(err) => {
                progress(Progress::Stage(Stage::Failed));
                error!(error = %err, "region generation failed");
            }
        }
        result
    }

    /// Только этап выборки: сетка высот и категорий.
    pub async fn sample<S: Sampler>(
        &self,
        sampler: S,
        progress: impl FnMut(u8),
    ) -> Result<Grid, GenerationError> {
        let domain = self.domain();
        let options = SamplingOptions {
            concurrency: compute_concurrency(self.config.max_parallel_samples, available_cpus()),
            timeout: self.config.per_sample_timeout(),
            max_height: self.config.max_height,
        };
        info!(
            cells = domain.cell_count(),
            topology = ?domain.topology,
            concurrency = options.concurrency,
            "sampling started"
        );
        let started = Instant::now();
        let grid = sample_grid(domain, Arc::new(sampler), &self.rules, options, progress).await?;
        info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            "sampling finished"
        );
        Ok(grid)
    }
}

/// Растровая половина прогона для готовой сетки: барьеры, рост, нормализация, контуры.
///
/// Этапы выполняются в `spawn_blocking`; `observer` получает `Progress::Stage` при входе в каждый.
pub async fn partition_grid(
    grid: Grid,
    config: &GeneratorConfig,
    mut observer: impl FnMut(Progress),
) -> Result<Vec<Region>, GenerationError> {
    let rules = CategoryRules::from_config(config)?;
    let config = config.clone();
    let (tx, mut rx) = mpsc::unbounded_channel();

    let worker = tokio::task::spawn_blocking(move || {
        raster_pipeline(&grid, &rules, &config, |stage| {
            let _ = tx.send(stage);
        })
    });
    while let Some(stage) = rx.recv().await {
        observer(Progress::Stage(stage));
    }
    worker.await?
}

fn raster_pipeline(
    grid: &Grid,
    rules: &CategoryRules,
    config: &GeneratorConfig,
    mut enter: impl FnMut(Stage),
) -> Result<Vec<Region>, GenerationError> {
    let domain = &grid.domain;

    enter(Stage::DetectingBarriers);
    let started = Instant::now();
    let mask = detector_for(config).detect(grid, rules);
    info!(
        strategy = ?config.barrier_strategy,
        barrier_edges = mask.barrier_edge_count(),
        barrier_cells = mask.barrier_cell_count(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "barriers detected"
    );

    enter(Stage::Growing);
    let started = Instant::now();
    let mut land = grow_regions(grid, &mask);
    let absorbed = absorb_barrier_cells(grid, &mask, &mut land);
    let distances = distance_to_land(grid);
    let water = split_water(grid, &distances, config.coast_buffer_distance);
    info!(
        land_regions = land.len(),
        coastal_regions = water.coastal.len(),
        bulk_cells = water.bulk.len(),
        absorbed,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "regions grown"
    );

    enter(Stage::Normalizing);
    let started = Instant::now();
    let mut coastal = water.coastal;
    let land_stats = normalize(&mut land, domain, config);
    let coastal_stats = normalize(&mut coastal, domain, config);
    let partition = Partition {
        land,
        coastal,
        bulk: water.bulk,
        distances,
    };
    let covered = partition.covered_cells();
    if covered != domain.cell_count() {
        return Err(GenerationError::Pipeline(format!(
            "partition covers {covered} of {} cells",
            domain.cell_count()
        )));
    }
    info!(
        land_regions = partition.land.len(),
        coastal_regions = partition.coastal.len(),
        merged = land_stats.merged + coastal_stats.merged,
        split = land_stats.split + coastal_stats.split,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "regions normalized"
    );

    enter(Stage::Tracing);
    let started = Instant::now();
    let regions = build_regions(grid, &partition, rules, config);
    info!(
        regions = regions.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "outlines traced"
    );
    debug!(cells = covered, "partition complete");
    Ok(regions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampler::{FnSampler, Sample};

    fn small_config() -> GeneratorConfig {
        GeneratorConfig {
            radius: 64,
            sample_spacing: 8,
            min_region_cells: 4,
            max_region_cells: 400,
            ..GeneratorConfig::default()
        }
    }

    #[tokio::test]
    async fn stages_are_reported_in_order() {
        let generator = RegionGenerator::new(small_config()).unwrap();
        let sampler = FnSampler(|_, _| Ok(Sample::new(64, "plains")));
        let mut stages = Vec::new();
        generator
            .run(sampler, |p| {
                if let Progress::Stage(stage) = p {
                    stages.push(stage);
                }
            })
            .await
            .unwrap();
        assert_eq!(
            stages,
            vec![
                Stage::Sampling,
                Stage::DetectingBarriers,
                Stage::Growing,
                Stage::Normalizing,
                Stage::Tracing,
                Stage::Done,
            ]
        );
    }

    #[tokio::test]
    async fn partition_covers_every_cell() {
        let generator = RegionGenerator::new(small_config()).unwrap();
        let sampler = FnSampler(|x: i32, z: i32| {
            let category = if x < -30 { "ocean" } else { "plains" };
            Ok(Sample::new(60 + (x + z).abs() / 4, category))
        });
        let grid = generator.sample(sampler, |_| {}).await.unwrap();
        let total = grid.domain.cell_count();
        let regions = partition_grid(grid, generator.config(), |_| {}).await.unwrap();
        assert_eq!(regions.iter().map(|r| r.cells).sum::<usize>(), total);
    }

    #[test]
    fn invalid_config_is_rejected_up_front() {
        let config = GeneratorConfig {
            sample_spacing: 0,
            ..GeneratorConfig::default()
        };
        assert!(RegionGenerator::new(config).is_err());
    }
}
