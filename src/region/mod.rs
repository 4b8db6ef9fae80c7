// src/region/mod.rs
//! Регионы: промежуточное разбиение сетки и итоговые полигоны.
//!
//! Растровые этапы работают с [`RegionSet`] (номер региона → ячейки и обратно),
//! наружу отдаются неизменяемые [`Region`] с UUID, контуром и площадью.

pub mod grow;
pub mod normalize;
pub mod ocean;
pub mod png;

use std::collections::BTreeMap;

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::category::{Category, CategoryRules};
use crate::config::GeneratorConfig;
use crate::grid::Grid;
use crate::outline::{self, Point};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RegionKind {
    /// Суша, выращенная между барьерами
    Land,
    /// Вода в пределах буфера от берега
    Coastal,
    /// Единый регион всей дальней воды
    Bulk,
}

/// Итоговый регион.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub id: Uuid,
    /// Замкнутое кольцо: последняя точка неявно соединена с первой
    pub outline: Vec<Point>,
    pub area_blocks: f64,
    pub dominant_category: Category,
    pub cells: usize,
    pub kind: RegionKind,
}

/// Изменяемое разбиение ячеек на регионы с целочисленными номерами.
#[derive(Debug, Clone, Default)]
pub struct RegionSet {
    labels: Vec<Option<u32>>,
    members: BTreeMap<u32, Vec<usize>>,
    next_id: u32,
}

impl RegionSet {
    #[must_use]
    pub fn new(len: usize) -> Self {
        Self {
            labels: vec![None; len],
            members: BTreeMap::new(),
            next_id: 0,
        }
    }

    /// Новый регион из ячеек; номер — следующий свободный.
    pub fn create(&mut self, cells: Vec<usize>) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        for &idx in &cells {
            self.labels[idx] = Some(id);
        }
        self.members.insert(id, cells);
        id
    }

    #[must_use]
    pub fn label(&self, idx: usize) -> Option<u32> {
        self.labels.get(idx).copied().flatten()
    }

    #[must_use]
    pub fn cells(&self, id: u32) -> &[usize] {
        self.members.get(&id).map_or(&[], Vec::as_slice)
    }

    #[must_use]
    pub fn size(&self, id: u32) -> usize {
        self.cells(id).len()
    }

    /// Номера регионов по возрастанию.
    #[must_use]
    pub fn ids(&self) -> Vec<u32> {
        self.members.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &[usize])> {
        self.members.iter().map(|(&id, cells)| (id, cells.as_slice()))
    }

    /// Число регионов.
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    #[must_use]
    pub fn total_cells(&self) -> usize {
        self.members.values().map(Vec::len).sum()
    }

    pub fn add_cell(&mut self, id: u32, idx: usize) {
        if let Some(cells) = self.members.get_mut(&id) {
            cells.push(idx);
            self.labels[idx] = Some(id);
        }
    }

    /// Переносит все ячейки `source` в `target`, `source` исчезает.
    pub fn absorb(&mut self, target: u32, source: u32) {
        if target == source || !self.members.contains_key(&target) {
            return;
        }
        let Some(moved) = self.members.remove(&source) else {
            return;
        };
        for &idx in &moved {
            self.labels[idx] = Some(target);
        }
        if let Some(cells) = self.members.get_mut(&target) {
            cells.extend(moved);
        }
    }

    /// Заменяет регион фрагментами: первый сохраняет номер, остальные получают новые.
    pub fn split(&mut self, id: u32, fragments: Vec<Vec<usize>>) -> Vec<u32> {
        let mut fragments = fragments.into_iter().filter(|f| !f.is_empty());
        let Some(first) = fragments.next() else {
            return Vec::new();
        };
        for &idx in &first {
            self.labels[idx] = Some(id);
        }
        self.members.insert(id, first);
        let mut ids = vec![id];
        ids.extend(fragments.map(|fragment| self.create(fragment)));
        ids
    }
}

/// Результат растровых этапов до построения контуров.
#[derive(Debug, Clone)]
pub struct Partition {
    pub land: RegionSet,
    pub coastal: RegionSet,
    /// Вода дальше буфера от суши
    pub bulk: Vec<usize>,
    /// Расстояние от каждой ячейки до ближайшей суши в шагах сетки
    pub distances: Vec<u32>,
}

impl Partition {
    /// Сколько ячеек области покрыто (каждая считается один раз).
    #[must_use]
    pub fn covered_cells(&self) -> usize {
        self.land.total_cells() + self.coastal.total_cells() + self.bulk.len()
    }
}

/// Самая частая категория; при равенстве — наименьшая по порядку.
#[must_use]
pub fn dominant_category(grid: &Grid, cells: &[usize]) -> Category {
    let mut counts: BTreeMap<&Category, usize> = BTreeMap::new();
    for &idx in cells {
        *counts.entry(&grid.category[idx]).or_default() += 1;
    }
    counts
        .into_iter()
        .max_by(|a, b| a.1.cmp(&b.1).then(b.0.cmp(a.0)))
        .map(|(category, _)| category.clone())
        .unwrap_or_default()
}

/// Строит итоговые регионы: суша, прибрежная вода, затем единый регион дальней воды.
///
/// UUID детерминированы: их байты берутся из `ChaCha8Rng`, засеянного `config.seed`.
#[must_use]
pub fn build_regions(
    grid: &Grid,
    partition: &Partition,
    rules: &CategoryRules,
    config: &GeneratorConfig,
) -> Vec<Region> {
    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    let cell_area = grid.domain.cell_area();
    let mut out = Vec::new();
    let mut dropped = 0usize;

    let traced = [
        (&partition.land, RegionKind::Land),
        (&partition.coastal, RegionKind::Coastal),
    ];
    for (set, kind) in traced {
        for (_, cells) in set.iter() {
            let dominant = dominant_category(grid, cells);
            if rules.is_water(&dominant)
                && !ocean::is_near_land(cells, &partition.distances, config.coast_buffer_distance)
            {
                dropped += 1;
                continue;
            }
            let ring = outline::trace_boundary(cells, &grid.domain);
            let smoothed = outline::smooth(&ring, config.chaikin_iterations);
            if !outline::is_valid_ring(&smoothed) {
                dropped += 1;
                continue;
            }
            out.push(Region {
                id: next_uuid(&mut rng),
                outline: smoothed,
                area_blocks: cells.len() as f64 * cell_area,
                dominant_category: dominant,
                cells: cells.len(),
                kind,
            });
        }
    }

    if !partition.bulk.is_empty() {
        out.push(Region {
            id: next_uuid(&mut rng),
            outline: ocean::bulk_outline(&grid.domain, &partition.bulk),
            area_blocks: partition.bulk.len() as f64 * cell_area,
            dominant_category: dominant_category(grid, &partition.bulk),
            cells: partition.bulk.len(),
            kind: RegionKind::Bulk,
        });
    }

    debug!(emitted = out.len(), dropped, "regions built");
    out
}

fn next_uuid(rng: &mut ChaCha8Rng) -> Uuid {
    let mut bytes = [0u8; 16];
    rng.fill_bytes(&mut bytes);
    uuid::Builder::from_random_bytes(bytes).into_uuid()
}
