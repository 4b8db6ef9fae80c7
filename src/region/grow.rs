// src/region/grow.rs
//! Рост регионов заливкой между барьерами.

use std::collections::{BTreeMap, VecDeque};

use tracing::debug;

use crate::barrier::BarrierMask;
use crate::grid::Grid;
use crate::topology::Domain;

use super::RegionSet;

/// Заливка связных компонент через проходимые рёбра.
///
/// Зерно — первая непосещённая ячейка в построчном порядке, которая не является барьером.
#[must_use]
pub fn grow_regions(grid: &Grid, mask: &BarrierMask) -> RegionSet {
    let domain = &grid.domain;
    let directions = domain.topology.directions();
    let mut set = RegionSet::new(domain.len());
    let mut visited = vec![false; domain.len()];

    for seed in domain.cells() {
        if visited[seed] || mask.cell[seed] {
            continue;
        }
        let mut cells = Vec::new();
        let mut queue = VecDeque::new();
        visited[seed] = true;
        queue.push_back(seed);

        while let Some(current) = queue.pop_front() {
            cells.push(current);
            for (d, &dir) in directions.iter().enumerate() {
                let Some(next) = domain.offset(current, dir) else {
                    continue;
                };
                if visited[next] || mask.cell[next] || mask.is_edge_blocked(current, d) {
                    continue;
                }
                visited[next] = true;
                queue.push_back(next);
            }
        }
        set.create(cells);
    }

    debug!(regions = set.len(), "flood fill complete");
    set
}

/// Раздаёт барьерные ячейки суши (гребни) соседним регионам.
///
/// Каждая ячейка уходит региону, с которым у неё больше всего общих соседей
/// (при равенстве — с меньшим номером). Раунды повторяются, пока что-то меняется.
/// Гребни, не касающиеся ни одного региона, собираются в собственные регионы.
pub fn absorb_barrier_cells(grid: &Grid, mask: &BarrierMask, set: &mut RegionSet) -> usize {
    let domain = &grid.domain;
    let mut pending: Vec<usize> = domain
        .cells()
        .filter(|&idx| mask.cell[idx] && !grid.water[idx] && set.label(idx).is_none())
        .collect();
    let mut absorbed = 0;

    loop {
        let assignments: Vec<(usize, u32)> = pending
            .iter()
            .filter_map(|&idx| strongest_neighbor(domain, set, idx).map(|id| (idx, id)))
            .collect();
        if assignments.is_empty() {
            break;
        }
        for &(idx, id) in &assignments {
            set.add_cell(id, idx);
        }
        absorbed += assignments.len();
        pending.retain(|&idx| set.label(idx).is_none());
    }

    // изолированные гребни: по компоненте на регион
    let mut orphan = vec![false; domain.len()];
    for &idx in &pending {
        orphan[idx] = true;
    }
    for &start in &pending {
        if !orphan[start] {
            continue;
        }
        orphan[start] = false;
        let mut cells = vec![start];
        let mut queue = VecDeque::from([start]);
        while let Some(current) = queue.pop_front() {
            for next in domain.neighbors(current) {
                if orphan[next] {
                    orphan[next] = false;
                    cells.push(next);
                    queue.push_back(next);
                }
            }
        }
        set.create(cells);
    }

    if absorbed > 0 {
        debug!(absorbed, "ridge cells absorbed into regions");
    }
    absorbed
}

fn strongest_neighbor(domain: &Domain, set: &RegionSet, idx: usize) -> Option<u32> {
    let mut tally: BTreeMap<u32, usize> = BTreeMap::new();
    for n in domain.neighbors(idx) {
        if let Some(id) = set.label(n) {
            *tally.entry(id).or_default() += 1;
        }
    }
    tally
        .into_iter()
        .max_by(|a, b| a.1.cmp(&b.1).then(b.0.cmp(&a.0)))
        .map(|(id, _)| id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::barrier::test_support::{grid_9x9, rules};
    use crate::barrier::{BarrierDetector, LocalThreshold, WatershedRidge};
    use crate::config::GeneratorConfig;
    use crate::sampler::Sample;

    #[test]
    fn flat_field_is_one_region() {
        let grid = grid_9x9(|_, _| Sample::new(64, "plains"));
        let mask = LocalThreshold::from_config(&GeneratorConfig::default()).detect(&grid, &rules());
        let set = grow_regions(&grid, &mask);
        assert_eq!(set.len(), 1);
        assert_eq!(set.total_cells(), 81);
    }

    #[test]
    fn cliff_separates_regions_and_water_is_skipped() {
        let grid = grid_9x9(|i, j| {
            if j == 8 {
                Sample::new(30, "ocean")
            } else {
                Sample::new(if i < 4 { 60 } else { 120 }, "plains")
            }
        });
        let mask = LocalThreshold::from_config(&GeneratorConfig::default()).detect(&grid, &rules());
        let set = grow_regions(&grid, &mask);
        assert_eq!(set.len(), 2);
        assert_eq!(set.size(0), 4 * 8);
        assert_eq!(set.size(1), 5 * 8);
        let domain = &grid.domain;
        assert_eq!(set.label(domain.index(0, 8)), None);
    }

    #[test]
    fn ridge_cells_join_the_region_they_touch_most() {
        let grid = grid_9x9(|_, _| Sample::new(64, "plains"));
        let domain = grid.domain.clone();
        let mut mask = WatershedRidge.detect(&grid, &rules());
        // вертикальный гребень по столбцу 4
        for j in 0..9 {
            mask.cell[domain.index(4, j)] = true;
            mask.block_edge(&domain, domain.index(3, j), 0);
        }
        let mut set = grow_regions(&grid, &mask);
        assert_eq!(set.len(), 2);
        assert_eq!(set.total_cells(), 72);

        let absorbed = absorb_barrier_cells(&grid, &mask, &mut set);
        assert_eq!(absorbed, 9);
        assert_eq!(set.total_cells(), 81);
        // по одному соседу слева и справа: побеждает меньший номер
        assert_eq!(set.label(domain.index(4, 0)), Some(0));
    }

    #[test]
    fn isolated_ridge_forms_its_own_region() {
        let grid = grid_9x9(|_, _| Sample::new(64, "plains"));
        let mut mask = LocalThreshold::from_config(&GeneratorConfig::default()).detect(&grid, &rules());
        for idx in grid.domain.cells() {
            mask.cell[idx] = true;
        }
        let mut set = grow_regions(&grid, &mask);
        assert!(set.is_empty());
        assert_eq!(absorb_barrier_cells(&grid, &mask, &mut set), 0);
        assert_eq!(set.len(), 1);
        assert_eq!(set.total_cells(), 81);
    }
}
