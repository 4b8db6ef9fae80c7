// src/barrier/threshold.rs
//! Локальный порог: крутой склон или смена группы категорий.

use tracing::debug;

use crate::category::CategoryRules;
use crate::config::{GeneratorConfig, SlopeStatistic};
use crate::grid::Grid;

use super::{BarrierDetector, BarrierMask, edges, mark_water};

/// Порог `max(minimum, round(статистика × factor) + extra)` по перепадам высот.
#[derive(Debug, Clone, Copy)]
pub struct LocalThreshold {
    pub minimum: i32,
    pub extra: i32,
    pub factor: f64,
    pub statistic: SlopeStatistic,
}

impl LocalThreshold {
    #[must_use]
    pub fn from_config(config: &GeneratorConfig) -> Self {
        Self {
            minimum: config.steep_slope_threshold,
            extra: config.slope_extra,
            factor: config.slope_factor,
            statistic: config.slope_statistic,
        }
    }

    /// Порог по всем парам соседей-суши. Вода в статистику не входит.
    #[must_use]
    pub fn slope_threshold(&self, grid: &Grid) -> i32 {
        let mut slopes: Vec<i32> = edges(&grid.domain)
            .filter(|&(a, _, b)| !grid.water[a] && !grid.water[b])
            .map(|(a, _, b)| (grid.elevation[a] - grid.elevation[b]).abs())
            .collect();

        let statistic = if slopes.is_empty() {
            0.0
        } else {
            match self.statistic {
                SlopeStatistic::Average => {
                    slopes.iter().map(|&s| f64::from(s)).sum::<f64>() / slopes.len() as f64
                }
                SlopeStatistic::Median => {
                    slopes.sort_unstable();
                    f64::from(slopes[slopes.len() / 2])
                }
            }
        };

        self.minimum
            .max((statistic * self.factor).round() as i32 + self.extra)
    }
}

impl BarrierDetector for LocalThreshold {
    fn detect(&self, grid: &Grid, rules: &CategoryRules) -> BarrierMask {
        let domain = &grid.domain;
        let mut mask = BarrierMask::new(domain);
        mark_water(grid, &mut mask);

        let threshold = self.slope_threshold(grid);
        for (a, d, b) in edges(domain) {
            if grid.water[a] || grid.water[b] {
                continue;
            }
            let steep = (grid.elevation[a] - grid.elevation[b]).abs() >= threshold;
            if steep || !rules.similar(&grid.category[a], &grid.category[b]) {
                mask.block_edge(domain, a, d);
            }
        }

        debug!(
            threshold,
            barrier_edges = mask.barrier_edge_count(),
            barrier_cells = mask.barrier_cell_count(),
            "local-threshold barriers built"
        );
        mask
    }
}
