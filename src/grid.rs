// src/grid.rs
//! Плотная сетка выборок и её асинхронное построение.
//!
//! ## Архитектура
//!
//! 1. Производитель идёт по ячейкам области в построчном порядке, берёт разрешение
//!    семафора и запускает задачу выборки. В полёте не больше `concurrency` запросов.
//! 2. Каждая задача возвращает `(ячейка, результат)` через канал и освобождает разрешение.
//! 3. Сборщик — единственный, кто пишет в [`Grid`], поэтому задачи ничего не делят.
//!
//! Таймаут или ошибка одной выборки не прерывает прогон: ячейка остаётся со значением
//! по умолчанию. Только [`SampleError::Unavailable`] останавливает генерацию.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use image::{ImageBuffer, Luma};
#[cfg(feature = "parallel")]
use rayon::prelude::*;
use tokio::sync::{Semaphore, mpsc};
use tracing::{debug, warn};

use crate::category::{Category, CategoryRules};
use crate::error::{GenerationError, SampleError};
use crate::sampler::{Sample, Sampler};
use crate::topology::Domain;

/// Насколько вода «выше» мира: береговая линия никогда не выглядит ровной сушей.
pub(crate) const WATER_SENTINEL_OFFSET: i32 = 100;

/// Эффективный лимит параллельных выборок.
///
/// `configured <= 0` означает «вдвое больше доступных процессоров».
#[must_use]
pub fn compute_concurrency(configured: i32, cpus: usize) -> usize {
    let base = if configured > 0 {
        configured as usize
    } else {
        cpus.saturating_mul(2)
    };
    base.max(1)
}

/// Число доступных процессоров (1, если узнать не удалось).
#[must_use]
pub fn available_cpus() -> usize {
    std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get)
}

/// Сетка высот и категорий, неизменяемая после построения.
#[derive(Debug, Clone)]
pub struct Grid {
    pub domain: Domain,
    pub elevation: Vec<i32>,
    pub category: Vec<Category>,
    /// Водная категория — безусловный барьер
    pub water: Vec<bool>,
}

impl Grid {
    /// Пустая сетка: нулевые высоты, категория `unknown`.
    #[must_use]
    pub fn new(domain: Domain) -> Self {
        let len = domain.len();
        Self {
            domain,
            elevation: vec![0; len],
            category: vec![Category::default(); len],
            water: vec![false; len],
        }
    }

    /// Синхронное построение: вызывает `sample` для каждой ячейки области.
    pub fn from_fn(
        domain: Domain,
        rules: &CategoryRules,
        max_height: i32,
        mut sample: impl FnMut(i32, i32) -> Sample,
    ) -> Self {
        let mut grid = Self::new(domain);
        let cells: Vec<usize> = grid.domain.cells().collect();
        for idx in cells {
            let (x, z) = grid.domain.sample_coords(idx);
            grid.set_sample(idx, sample(x, z), rules, max_height);
        }
        grid
    }

    pub fn set_sample(&mut self, idx: usize, sample: Sample, rules: &CategoryRules, max_height: i32) {
        if rules.is_water(&sample.category) {
            self.elevation[idx] = max_height + WATER_SENTINEL_OFFSET;
            self.water[idx] = true;
        } else {
            self.elevation[idx] = sample.elevation;
            self.water[idx] = false;
        }
        self.category[idx] = sample.category;
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.domain.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.domain.is_empty()
    }

    /// Высоты суши в оттенках серого; вода и ячейки вне области — чёрные.
    #[must_use]
    pub fn to_grayscale_image(&self) -> Vec<u8> {
        let max = self
            .domain
            .cells()
            .filter(|&idx| !self.water[idx])
            .map(|idx| self.elevation[idx])
            .max()
            .unwrap_or(1)
            .max(1) as f32;
        let shade = |idx: usize| -> u8 {
            if !self.domain.contains(idx) || self.water[idx] {
                0
            } else {
                ((self.elevation[idx] as f32 / max).clamp(0.0, 1.0) * 255.0) as u8
            }
        };

        #[cfg(feature = "parallel")]
        let pixels = (0..self.len()).into_par_iter().map(shade).collect();
        #[cfg(not(feature = "parallel"))]
        let pixels = (0..self.len()).map(shade).collect();
        pixels
    }

    pub fn save_elevation_png(&self, path: &str) -> Result<(), Box<dyn std::error::Error>> {
        let img: ImageBuffer<Luma<u8>, Vec<u8>> = ImageBuffer::from_raw(
            self.domain.width as u32,
            self.domain.height as u32,
            self.to_grayscale_image(),
        )
        .ok_or("Failed to create image buffer")?;
        img.save(path)?;
        Ok(())
    }
}

/// Параметры этапа выборки.
#[derive(Debug, Clone, Copy)]
pub struct SamplingOptions {
    pub concurrency: usize,
    pub timeout: Duration,
    pub max_height: i32,
}

/// Счётчик прогресса с шагом ~5 %.
struct ProgressTracker {
    done: usize,
    total: usize,
    step: usize,
    last: Option<u8>,
}

impl ProgressTracker {
    fn new(total: usize) -> Self {
        Self {
            done: 0,
            total,
            step: (total / 20).max(1),
            last: None,
        }
    }

    /// Отмечает завершённую выборку; возвращает процент, если пора сообщить.
    fn complete_one(&mut self) -> Option<u8> {
        self.done += 1;
        if self.done % self.step != 0 {
            return None;
        }
        let percent = (self.done * 100 / self.total.max(1)).min(100) as u8;
        self.emit(percent)
    }

    fn finish(&mut self) -> Option<u8> {
        self.emit(100)
    }

    fn emit(&mut self, percent: u8) -> Option<u8> {
        if self.last.is_some_and(|last| percent <= last) {
            return None;
        }
        self.last = Some(percent);
        Some(percent)
    }
}

/// Опрашивает `sampler` во всех ячейках области с ограниченным параллелизмом.
///
/// `progress` получает строго возрастающие проценты и ровно один финальный `100`.
pub async fn sample_grid<S: Sampler>(
    domain: Domain,
    sampler: Arc<S>,
    rules: &CategoryRules,
    options: SamplingOptions,
    mut progress: impl FnMut(u8),
) -> Result<Grid, GenerationError> {
    let cells: Vec<(usize, i32, i32)> = domain
        .cells()
        .map(|idx| {
            let (x, z) = domain.sample_coords(idx);
            (idx, x, z)
        })
        .collect();
    let mut tracker = ProgressTracker::new(cells.len());
    let mut grid = Grid::new(domain);

    let semaphore = Arc::new(Semaphore::new(options.concurrency.max(1)));
    let stop = Arc::new(AtomicBool::new(false));
    let (tx, mut rx) = mpsc::unbounded_channel();

    let producer = {
        let stop = Arc::clone(&stop);
        let timeout = options.timeout;
        tokio::spawn(async move {
            for (idx, x, z) in cells {
                if stop.load(Ordering::Acquire) {
                    break;
                }
                let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                    break;
                };
                let sampler = Arc::clone(&sampler);
                let tx = tx.clone();
                tokio::spawn(async move {
                    let outcome = match tokio::time::timeout(timeout, sampler.sample(x, z)).await {
                        Ok(result) => result,
                        Err(_) => Err(SampleError::Timeout),
                    };
                    drop(permit);
                    // Сборщик мог уже завершиться — тогда результат никому не нужен
                    let _ = tx.send((idx, x, z, outcome));
                });
            }
        })
    };

    let mut failed = 0usize;
    let mut unavailable: Option<String> = None;
    while let Some((idx, x, z, outcome)) = rx.recv().await {
        match outcome {
            Ok(sample) => grid.set_sample(idx, sample, rules, options.max_height),
            Err(err) if err.is_recoverable() => {
                failed += 1;
                warn!(x, z, error = %err, "sample failed; cell keeps default value");
            }
            Err(err) => {
                if unavailable.is_none() {
                    warn!(x, z, error = %err, "sampler unavailable; stopping sampling");
                    stop.store(true, Ordering::Release);
                    unavailable = Some(err.to_string());
                }
            }
        }
        if unavailable.is_none() {
            if let Some(percent) = tracker.complete_one() {
                progress(percent);
            }
        }
    }
    producer.await?;

    if let Some(reason) = unavailable {
        return Err(GenerationError::SamplerUnavailable(reason));
    }
    if let Some(percent) = tracker.finish() {
        progress(percent);
    }
    debug!(
        cells = tracker.total,
        failed,
        concurrency = options.concurrency,
        "sampling complete"
    );
    Ok(grid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampler::FnSampler;

    #[test]
    fn concurrency_formula() {
        assert_eq!(compute_concurrency(0, 4), 8);
        assert_eq!(compute_concurrency(5, 8), 5);
        assert_eq!(compute_concurrency(-1, 2), 4);
        assert_eq!(compute_concurrency(0, 0), 1);
    }

    #[test]
    fn progress_is_monotonic_with_single_final_hundred() {
        let mut tracker = ProgressTracker::new(40);
        let mut seen = Vec::new();
        for _ in 0..40 {
            seen.extend(tracker.complete_one());
        }
        seen.extend(tracker.finish());
        assert!(seen.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(seen.iter().filter(|&&p| p == 100).count(), 1);
        assert_eq!(seen.first(), Some(&5));
    }

    #[test]
    fn water_gets_sentinel_height() {
        let rules = CategoryRules::new(&Default::default(), &["ocean".to_string()]).unwrap();
        let grid = Grid::from_fn(Domain::square(8, 8), &rules, 320, |x, _| {
            if x < 0 {
                Sample::new(40, "ocean")
            } else {
                Sample::new(70, "plains")
            }
        });
        assert!(grid.water[0]);
        assert_eq!(grid.elevation[0], 420);
        assert!(!grid.water[2]);
        assert_eq!(grid.elevation[2], 70);
    }

    #[tokio::test]
    async fn unavailable_sampler_stops_sampling() {
        let rules = CategoryRules::default();
        let sampler = Arc::new(FnSampler(|x: i32, _| {
            if x > 0 {
                Err(SampleError::Unavailable("server stopping".to_string()))
            } else {
                Ok(Sample::new(12, "plains"))
            }
        }));
        let options = SamplingOptions {
            concurrency: 1,
            timeout: Duration::from_secs(5),
            max_height: 320,
        };
        let mut percents = Vec::new();
        let err = sample_grid(Domain::square(8, 8), sampler, &rules, options, |p| {
            percents.push(p);
        })
        .await
        .unwrap_err();
        let GenerationError::SamplerUnavailable(reason) = &err else {
            panic!("unexpected error: {err}");
        };
        assert!(reason.contains("server stopping"));
        assert!(!percents.contains(&100));
    }

    #[tokio::test]
    async fn failed_samples_keep_defaults() {
        let rules = CategoryRules::default();
        let sampler = Arc::new(FnSampler(|x: i32, z: i32| {
            if x == 0 && z == 0 {
                Err(SampleError::Failed("boom".to_string()))
            } else {
                Ok(Sample::new(12, "plains"))
            }
        }));
        let options = SamplingOptions {
            concurrency: 2,
            timeout: Duration::from_secs(5),
            max_height: 320,
        };
        let mut percents = Vec::new();
        let grid = sample_grid(Domain::square(8, 8), sampler, &rules, options, |p| {
            percents.push(p);
        })
        .await
        .unwrap();
        assert_eq!(grid.elevation[4], 0);
        assert_eq!(grid.category[4], Category::default());
        assert_eq!(grid.elevation[0], 12);
        assert_eq!(percents.last(), Some(&100));
    }
}
