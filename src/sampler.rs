// src/sampler.rs
//! Адаптер выборки: «какая высота и категория в точке (x, z)?»
//!
//! Движок не знает, откуда берутся данные — из загрузки чанков, базы или шума.
//! Он видит только трейт [`Sampler`]. В крейте есть две реализации:
//! - [`FnSampler`] — оборачивает синхронное замыкание (тесты, готовые массивы);
//! - [`NoiseSampler`] — процедурный рельеф на `fastnoise-lite` для CLI и демонстраций.

use std::future::Future;

use fastnoise_lite::{FastNoiseLite, FractalType, NoiseType};

use crate::category::Category;
use crate::error::SampleError;

/// Результат одной выборки.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    pub elevation: i32,
    pub category: Category,
}

impl Sample {
    pub fn new(elevation: i32, category: impl Into<Category>) -> Self {
        Self {
            elevation,
            category: category.into(),
        }
    }
}

/// Асинхронный источник высот и категорий.
pub trait Sampler: Send + Sync + 'static {
    fn sample(&self, x: i32, z: i32) -> impl Future<Output = Result<Sample, SampleError>> + Send;
}

/// Синхронное замыкание как [`Sampler`].
pub struct FnSampler<F>(pub F);

impl<F> Sampler for FnSampler<F>
where
    F: Fn(i32, i32) -> Result<Sample, SampleError> + Send + Sync + 'static,
{
    fn sample(&self, x: i32, z: i32) -> impl Future<Output = Result<Sample, SampleError>> + Send {
        std::future::ready((self.0)(x, z))
    }
}

/// Процедурный мир: континентальный шум задаёт высоту, второй шум — влажность.
pub struct NoiseSampler {
    elevation: FastNoiseLite,
    moisture: FastNoiseLite,
    sea_level: i32,
    max_height: i32,
}

impl NoiseSampler {
    #[must_use]
    pub fn new(seed: u64, max_height: i32) -> Self {
        let mut elevation = FastNoiseLite::new();
        elevation.set_seed(Some(seed as i32));
        elevation.set_noise_type(Some(NoiseType::OpenSimplex2));
        elevation.set_fractal_type(Some(FractalType::FBm));
        elevation.set_fractal_octaves(Some(5));
        elevation.set_frequency(Some(0.0015));

        let mut moisture = FastNoiseLite::new();
        moisture.set_seed(Some(seed.wrapping_add(2_000_000) as i32));
        moisture.set_noise_type(Some(NoiseType::OpenSimplex2));
        moisture.set_frequency(Some(0.004));

        Self {
            elevation,
            moisture,
            sea_level: max_height / 5,
            max_height,
        }
    }

    /// Синхронная версия выборки, удобна для превью.
    #[must_use]
    pub fn sample_at(&self, x: i32, z: i32) -> Sample {
        let (fx, fz) = (x as f32, z as f32);
        // Шум в [-1, 1] → [0, 1]
        let h = (self.elevation.get_noise_2d(fx, fz) + 1.0) * 0.5;
        let wet = (self.moisture.get_noise_2d(fx, fz) + 1.0) * 0.5;
        let elevation = (h * 0.6 * self.max_height as f32) as i32;

        let category = if elevation < self.sea_level - 12 {
            "deep_ocean"
        } else if elevation < self.sea_level {
            "ocean"
        } else if elevation < self.sea_level + 2 {
            "beach"
        } else if elevation > self.sea_level + 110 {
            "snowy_peaks"
        } else if elevation > self.sea_level + 70 {
            "mountains"
        } else if wet > 0.6 {
            "forest"
        } else if wet < 0.3 {
            "savanna"
        } else {
            "plains"
        };

        Sample::new(elevation, category)
    }
}

impl Sampler for NoiseSampler {
    fn sample(&self, x: i32, z: i32) -> impl Future<Output = Result<Sample, SampleError>> + Send {
        std::future::ready(Ok(self.sample_at(x, z)))
    }
}
