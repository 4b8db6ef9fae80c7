// src/config.rs
//! Конфигурация генератора регионов
//!
//! Этот модуль определяет все параметры, управляющие разбиением мира на регионы:
//! - Размер области и шаг сетки выборки
//! - Топология сетки (квадратная или гексагональная)
//! - Стратегия поиска барьеров и пороги склонов
//! - Границы размеров регионов и способ разделения крупных
//! - Сглаживание контуров и буфер побережья
//!
//! Все структуры поддерживают сериализацию в TOML/JSON для удобной настройки через конфигурационные файлы.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::category::CategoryRules;
use crate::error::ConfigError;
use crate::grid::WATER_SENTINEL_OFFSET;

/// Топология сетки выборки
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub enum GridTopology {
    /// Квадратная сетка, 4 соседа по рёбрам
    #[default]
    Square,
    /// Гексагональная сетка в осевых координатах, 6 соседей
    Hex,
}

/// Стратегия построения барьерной маски
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub enum BarrierStrategy {
    /// Адаптивный порог склона + группы похожих категорий
    #[default]
    LocalThreshold,
    /// Водоразделы: бассейны по наискорейшему спуску, утончённые гребни
    WatershedRidge,
}

/// Статистика перепадов высот, от которой считается порог склона
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub enum SlopeStatistic {
    #[default]
    Average,
    Median,
}

/// Способ разделения слишком крупных регионов
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub enum SplitStrategy {
    /// k-средних по координатам ячеек (компактные фрагменты)
    #[default]
    KMeans,
    /// Сортировка по диагонали и деление списка пополам
    Bisect,
}

/// Основные параметры генерации регионов
///
/// Полная конфигурация одного прогона. Поддерживает загрузку из TOML-файлов.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeneratorConfig {
    /// Полуширина области в блоках (по умолчанию 5000)
    #[serde(default = "default_radius")]
    pub radius: i32,

    /// Шаг сетки выборки в блоках (по умолчанию 8)
    #[serde(default = "default_sample_spacing")]
    pub sample_spacing: i32,

    /// Регионы меньше этого числа ячеек сливаются с соседом
    #[serde(default = "default_min_region_cells")]
    pub min_region_cells: usize,

    /// Регионы больше этого числа ячеек делятся
    #[serde(default = "default_max_region_cells")]
    pub max_region_cells: usize,

    /// Минимальный перепад высот, который всегда считается крутым склоном
    #[serde(default = "default_steep_slope_threshold")]
    pub steep_slope_threshold: i32,

    /// Добавка к статистике перепадов при расчёте порога
    #[serde(default = "default_slope_extra")]
    pub slope_extra: i32,

    /// Множитель статистики перепадов:
    /// - `1.0` — порог равен средней/медиане (плюс добавка),
    /// - `>1.0` — барьеров меньше.
    #[serde(default = "default_slope_factor")]
    pub slope_factor: f64,

    #[serde(default)]
    pub slope_statistic: SlopeStatistic,

    /// Число итераций скругления Chaikin (0 = без скругления)
    #[serde(default = "default_chaikin_iterations")]
    pub chaikin_iterations: usize,

    /// Сколько выборок одновременно в полёте (`0` или меньше = 2 × CPU)
    #[serde(default)]
    pub max_parallel_samples: i32,

    /// Таймаут одной выборки в секундах
    #[serde(default = "default_per_sample_timeout_seconds")]
    pub per_sample_timeout_seconds: u64,

    /// Вода дальше этого расстояния (в ячейках) от суши уходит в общий океанский регион
    #[serde(default = "default_coast_buffer_distance")]
    pub coast_buffer_distance: u32,

    /// Группы «похожих» категорий: категория → ключ группы
    #[serde(default)]
    pub similar_category_groups: BTreeMap<String, String>,

    /// Подстроки, по которым категория считается водной
    #[serde(default = "default_water_categories")]
    pub water_categories: Vec<String>,

    /// Максимальная высота мира; вода получает `max_height + 100`
    #[serde(default = "default_max_height")]
    pub max_height: i32,

    #[serde(default)]
    pub grid_topology: GridTopology,

    #[serde(default)]
    pub barrier_strategy: BarrierStrategy,

    #[serde(default)]
    pub split_strategy: SplitStrategy,

    /// Число итераций k-средних при разделении
    #[serde(default = "default_kmeans_iterations")]
    pub kmeans_iterations: usize,

    /// Сид генератора случайных чисел (k-средние и идентификаторы регионов)
    #[serde(default)]
    pub seed: u64,
}

fn default_radius() -> i32 {
    5_000
}
fn default_sample_spacing() -> i32 {
    8
}
fn default_min_region_cells() -> usize {
    400
}
fn default_max_region_cells() -> usize {
    3_000
}
fn default_steep_slope_threshold() -> i32 {
    10
}
fn default_slope_extra() -> i32 {
    2
}
fn default_slope_factor() -> f64 {
    1.0
}
fn default_chaikin_iterations() -> usize {
    2
}
fn default_per_sample_timeout_seconds() -> u64 {
    30
}
fn default_coast_buffer_distance() -> u32 {
    2
}
fn default_water_categories() -> Vec<String> {
    ["ocean", "river", "swamp", "beach"]
        .iter()
        .map(ToString::to_string)
        .collect()
}
fn default_max_height() -> i32 {
    320
}
fn default_kmeans_iterations() -> usize {
    5
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            radius: 5_000,
            sample_spacing: 8,
            min_region_cells: 400,
            max_region_cells: 3_000,
            steep_slope_threshold: 10,
            slope_extra: 2,
            slope_factor: 1.0,
            slope_statistic: SlopeStatistic::Average,
            chaikin_iterations: 2,
            max_parallel_samples: 0,
            per_sample_timeout_seconds: 30,
            coast_buffer_distance: 2,
            similar_category_groups: BTreeMap::new(),
            water_categories: default_water_categories(),
            max_height: 320,
            grid_topology: GridTopology::Square,
            barrier_strategy: BarrierStrategy::LocalThreshold,
            split_strategy: SplitStrategy::KMeans,
            kmeans_iterations: 5,
            seed: 0,
        }
    }
}

impl GeneratorConfig {
    /// Загружает параметры из TOML-файла и сразу проверяет их
    ///
    /// # Пример
    /// ```toml
    /// # regions.toml
    /// radius = 2000
    /// sample_spacing = 16
    /// grid_topology = "Hex"
    /// barrier_strategy = "WatershedRidge"
    ///
    /// [similar_category_groups]
    /// plains = "flat"
    /// meadow = "flat"
    /// ```
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Проверяет границы параметров и разрешимость категорий.
    ///
    /// Ошибка здесь останавливает прогон до выборки, а не даёт пустой результат.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.radius < 0 {
            return Err(ConfigError::invalid("radius", "must not be negative"));
        }
        if self.sample_spacing <= 0 {
            return Err(ConfigError::invalid("sample_spacing", "must be positive"));
        }
        if self.max_region_cells == 0 {
            return Err(ConfigError::invalid("max_region_cells", "must be positive"));
        }
        if self.min_region_cells > self.max_region_cells {
            return Err(ConfigError::invalid(
                "min_region_cells",
                format!(
                    "{} exceeds max_region_cells {}",
                    self.min_region_cells, self.max_region_cells
                ),
            ));
        }
        if self.per_sample_timeout_seconds == 0 {
            return Err(ConfigError::invalid(
                "per_sample_timeout_seconds",
                "must be positive",
            ));
        }
        if self.max_height > i32::MAX - WATER_SENTINEL_OFFSET {
            return Err(ConfigError::invalid(
                "max_height",
                format!("must not exceed {}", i32::MAX - WATER_SENTINEL_OFFSET),
            ));
        }
        if !self.slope_factor.is_finite() || self.slope_factor < 0.0 {
            return Err(ConfigError::invalid(
                "slope_factor",
                "must be a finite non-negative number",
            ));
        }
        CategoryRules::from_config(self)?;
        Ok(())
    }

    #[must_use]
    pub fn per_sample_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.per_sample_timeout_seconds)
    }
}
