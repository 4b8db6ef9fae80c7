// src/barrier/mod.rs
//! Барьерная маска: где рост регионов должен остановиться.
//!
//! Барьер — это ребро между соседними ячейками (крутой склон, смена группы
//! категорий, граница бассейнов) либо целая ячейка (вода, гребень водораздела).
//! Отношение симметрично: если A отгорожена от B, то и B отгорожена от A.

pub mod threshold;
pub mod watershed;

use crate::category::CategoryRules;
use crate::config::{BarrierStrategy, GeneratorConfig};
use crate::grid::Grid;
use crate::topology::Domain;

pub use threshold::LocalThreshold;
pub use watershed::WatershedRidge;

/// Стратегия поиска барьеров.
pub trait BarrierDetector: Send + Sync {
    fn detect(&self, grid: &Grid, rules: &CategoryRules) -> BarrierMask;
}

/// Детектор, выбранный конфигурацией.
#[must_use]
pub fn detector_for(config: &GeneratorConfig) -> Box<dyn BarrierDetector> {
    match config.barrier_strategy {
        BarrierStrategy::LocalThreshold => Box::new(LocalThreshold::from_config(config)),
        BarrierStrategy::WatershedRidge => Box::new(WatershedRidge),
    }
}

#[derive(Debug, Clone)]
pub struct BarrierMask {
    /// Ячейка-барьер: никогда не становится зерном региона
    pub cell: Vec<bool>,
    /// Ячейка касается хотя бы одного барьерного ребра
    pub adjacent: Vec<bool>,
    /// Бит `d` — ребро в направлении `directions()[d]` непроходимо
    edges: Vec<u8>,
}

impl BarrierMask {
    #[must_use]
    pub fn new(domain: &Domain) -> Self {
        let len = domain.len();
        Self {
            cell: vec![false; len],
            adjacent: vec![false; len],
            edges: vec![0; len],
        }
    }

    /// Закрывает ребро `a → directions[d]` с обеих сторон.
    pub fn block_edge(&mut self, domain: &Domain, a: usize, d: usize) {
        let directions = domain.topology.directions();
        let Some(b) = domain.offset(a, directions[d]) else {
            return;
        };
        let opposite = (d + directions.len() / 2) % directions.len();
        self.edges[a] |= 1 << d;
        self.edges[b] |= 1 << opposite;
        self.adjacent[a] = true;
        self.adjacent[b] = true;
    }

    #[must_use]
    pub fn is_edge_blocked(&self, a: usize, d: usize) -> bool {
        self.edges[a] & (1 << d) != 0
    }

    /// Разделены ли соседние ячейки `a` и `b` (ребром или барьерной ячейкой).
    #[must_use]
    pub fn blocks(&self, domain: &Domain, a: usize, b: usize) -> bool {
        if self.cell[a] || self.cell[b] {
            return true;
        }
        domain
            .topology
            .directions()
            .iter()
            .position(|&d| domain.offset(a, d) == Some(b))
            .is_some_and(|d| self.is_edge_blocked(a, d))
    }

    #[must_use]
    pub fn barrier_edge_count(&self) -> usize {
        // каждое ребро записано с двух сторон
        self.edges.iter().map(|e| e.count_ones() as usize).sum::<usize>() / 2
    }

    #[must_use]
    pub fn barrier_cell_count(&self) -> usize {
        self.cell.iter().filter(|&&c| c).count()
    }
}

/// Обходит каждое ребро области ровно один раз: `(a, d, b)`.
pub(crate) fn edges(domain: &Domain) -> impl Iterator<Item = (usize, usize, usize)> + '_ {
    let directions = domain.topology.directions();
    let forward = directions.len() / 2;
    domain.cells().flat_map(move |a| {
        (0..forward).filter_map(move |d| domain.offset(a, directions[d]).map(|b| (a, d, b)))
    })
}

/// Вода — безусловный барьер: сама ячейка и все её рёбра.
pub(crate) fn mark_water(grid: &Grid, mask: &mut BarrierMask) {
    let domain = &grid.domain;
    let n = domain.topology.directions().len();
    for idx in domain.cells() {
        if !grid.water[idx] {
            continue;
        }
        mask.cell[idx] = true;
        for d in 0..n {
            mask.block_edge(domain, idx, d);
        }
    }
}
