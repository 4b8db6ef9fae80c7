// src/barrier/watershed.rs
//! Барьеры по водоразделам.
//!
//! 1. Каждая ячейка суши спускается к самому низкому соседу, пока он строго ниже
//!    по ключу `(высота, индекс)`. Индекс в ключе разрешает плато.
//! 2. Ячейки, у которых больше одного соседа из чужого бассейна, — гребень.
//! 3. Гребень утончается до линии в одну ячейку: на квадратной сетке по Zhang–Suen
//!    в 8-окрестности, на гексагональной последовательным удалением простых точек
//!    в кольце из шести соседей.
//! 4. Рёбра между бассейнами и между непохожими категориями закрываются.

use tracing::debug;

use crate::category::CategoryRules;
use crate::config::GridTopology;
use crate::grid::Grid;
use crate::topology::Domain;

use super::{BarrierDetector, BarrierMask, edges, mark_water};

const NO_BASIN: u32 = u32::MAX;

/// Окрестность P2..P9 по часовой стрелке, начиная с севера.
const THINNING_RING: [(i32, i32); 8] = [
    (0, -1),
    (1, -1),
    (1, 0),
    (1, 1),
    (0, 1),
    (-1, 1),
    (-1, 0),
    (-1, -1),
];

#[derive(Debug, Clone, Copy, Default)]
pub struct WatershedRidge;

impl BarrierDetector for WatershedRidge {
    fn detect(&self, grid: &Grid, rules: &CategoryRules) -> BarrierMask {
        let domain = &grid.domain;
        let mut mask = BarrierMask::new(domain);
        mark_water(grid, &mut mask);

        let basins = assign_basins(grid);
        let mut ridge = find_ridges(grid, &basins);
        thin(domain, &mut ridge);

        for (a, d, b) in edges(domain) {
            if grid.water[a] || grid.water[b] {
                continue;
            }
            if basins[a] != basins[b] || !rules.similar(&grid.category[a], &grid.category[b]) {
                mask.block_edge(domain, a, d);
            }
        }
        for idx in domain.cells() {
            if ridge[idx] {
                mask.cell[idx] = true;
            }
        }

        debug!(
            basins = basins.iter().filter(|&&b| b != NO_BASIN).max().map_or(0, |&b| b + 1),
            ridge_cells = ridge.iter().filter(|&&r| r).count(),
            barrier_edges = mask.barrier_edge_count(),
            "watershed barriers built"
        );
        mask
    }
}

/// Номер бассейна для каждой ячейки суши; вода и ячейки вне области — `NO_BASIN`.
fn assign_basins(grid: &Grid) -> Vec<u32> {
    let domain = &grid.domain;
    let key = |idx: usize| (grid.elevation[idx], idx);

    let mut basin = vec![NO_BASIN; domain.len()];
    let mut next = 0u32;
    let mut path = Vec::new();

    for start in domain.cells() {
        if grid.water[start] || basin[start] != NO_BASIN {
            continue;
        }
        path.clear();
        let mut current = start;
        let id = loop {
            if basin[current] != NO_BASIN {
                break basin[current];
            }
            path.push(current);
            let lowest = domain
                .neighbors(current)
                .filter(|&n| !grid.water[n])
                .min_by_key(|&n| key(n));
            match lowest {
                Some(n) if key(n) < key(current) => current = n,
                _ => {
                    let id = next;
                    next += 1;
                    break id;
                }
            }
        };
        for &idx in &path {
            basin[idx] = id;
        }
    }
    basin
}

fn find_ridges(grid: &Grid, basins: &[u32]) -> Vec<bool> {
    let domain = &grid.domain;
    let mut ridge = vec![false; domain.len()];
    for idx in domain.cells() {
        if grid.water[idx] {
            continue;
        }
        let foreign = domain
            .neighbors(idx)
            .filter(|&n| !grid.water[n] && basins[n] != basins[idx])
            .count();
        ridge[idx] = foreign > 1;
    }
    ridge
}

/// Утончение гребня до неподвижной точки. Ячейки вне области считаются нулями.
fn thin(domain: &Domain, ridge: &mut [bool]) {
    match domain.topology {
        GridTopology::Square => loop {
            let first = thinning_pass(domain, ridge, true);
            let second = thinning_pass(domain, ridge, false);
            if first + second == 0 {
                break;
            }
        },
        GridTopology::Hex => while hex_thinning_pass(domain, ridge) > 0 {},
    }
}

/// Соседи ячейки по кольцу `ring`; за краем области — `false`.
fn ring_values(domain: &Domain, ridge: &[bool], idx: usize, ring: &[(i32, i32)]) -> Vec<bool> {
    ring.iter()
        .map(|&d| domain.offset(idx, d).is_some_and(|n| ridge[n]))
        .collect()
}

/// Число переходов 0→1 при обходе кольца по кругу.
fn transitions(p: &[bool]) -> usize {
    let n = p.len();
    (0..n).filter(|&k| !p[k] && p[(k + 1) % n]).count()
}

/// Один проход по гексам: удаляет ячейку сразу, если её соседи-гребни образуют одну дугу
/// из 2..=5 ячеек. Соседние гексы в кольце смежны друг с другом, поэтому такая дуга
/// остаётся связной и без центра.
fn hex_thinning_pass(domain: &Domain, ridge: &mut [bool]) -> usize {
    let ring = domain.topology.directions();
    let mut removed = 0;
    for idx in domain.cells() {
        if !ridge[idx] {
            continue;
        }
        let p = ring_values(domain, ridge, idx, ring);
        let filled = p.iter().filter(|&&v| v).count();
        if (2..=5).contains(&filled) && transitions(&p) == 1 {
            ridge[idx] = false;
            removed += 1;
        }
    }
    removed
}

/// Подшаг Zhang–Suen по растру `(i, j)` с 8-окрестностью.
fn thinning_pass(domain: &Domain, ridge: &mut [bool], first: bool) -> usize {
    let mut remove = Vec::new();
    for idx in domain.cells() {
        if !ridge[idx] {
            continue;
        }
        let p = ring_values(domain, ridge, idx, &THINNING_RING);
        let filled = p.iter().filter(|&&v| v).count();
        if !(2..=6).contains(&filled) || transitions(&p) != 1 {
            continue;
        }
        // p[0]=P2 (север), p[2]=P4 (восток), p[4]=P6 (юг), p[6]=P8 (запад)
        let (n, e, s, w) = (p[0], p[2], p[4], p[6]);
        let removable = if first {
            !(n && e && s) && !(e && s && w)
        } else {
            !(n && e && w) && !(n && s && w)
        };
        if removable {
            remove.push(idx);
        }
    }
    for &idx in &remove {
        ridge[idx] = false;
    }
    remove.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::barrier::test_support::{assert_symmetric, grid_9x9, rules};
    use crate::sampler::{NoiseSampler, Sample};

    #[test]
    fn flat_field_is_one_basin() {
        let grid = grid_9x9(|_, _| Sample::new(64, "plains"));
        let basins = assign_basins(&grid);
        assert!(basins.iter().all(|&b| b == 0));
        let mask = WatershedRidge.detect(&grid, &rules());
        assert_eq!(mask.barrier_edge_count(), 0);
        assert_eq!(mask.barrier_cell_count(), 0);
    }

    #[test]
    fn ridge_splits_two_valleys() {
        // гребень по столбцу 4, долины у краёв
        let grid = grid_9x9(|i, _| Sample::new(40 - (i as i32 - 4).abs() * 10, "plains"));
        let domain = &grid.domain;
        let basins = assign_basins(&grid);
        let west = basins[domain.index(0, 0)];
        let east = basins[domain.index(8, 0)];
        assert_ne!(west, east);
        for j in 0..9 {
            for i in 0..=4 {
                assert_eq!(basins[domain.index(i, j)], west);
            }
            for i in 5..9 {
                assert_eq!(basins[domain.index(i, j)], east);
            }
        }

        let mask = WatershedRidge.detect(&grid, &rules());
        for j in 0..9 {
            assert!(mask.blocks(domain, domain.index(4, j), domain.index(5, j)));
            assert!(!mask.blocks(domain, domain.index(3, j), domain.index(4, j)));
        }
        assert_eq!(mask.barrier_edge_count(), 9);
        assert_symmetric(&grid, &mask);
    }

    #[test]
    fn thick_ridge_thins_to_a_line() {
        let domain = Domain::square(32, 8);
        let mut ridge = vec![false; domain.len()];
        for j in 3..=5 {
            for i in 0..9 {
                ridge[domain.index(i, j)] = true;
            }
        }
        thin(&domain, &mut ridge);

        let kept: Vec<usize> = (0..domain.len()).filter(|&idx| ridge[idx]).collect();
        assert!(kept.len() >= 5);
        assert!(kept.iter().all(|&idx| domain.coords(idx).1 == 4));
    }

    #[test]
    fn hex_band_thins_over_six_neighbours() {
        let domain = Domain::hex(80, 8);
        // три ряда гексов: r = -1, 0, 1 (центры на z = -6, 0, 6)
        let band: Vec<usize> = domain
            .cells()
            .filter(|&idx| domain.world(idx).z.abs() <= 6.0 + 1e-9)
            .collect();
        let mut ridge = vec![false; domain.len()];
        for &idx in &band {
            ridge[idx] = true;
        }
        thin(&domain, &mut ridge);

        let kept: Vec<usize> = domain.cells().filter(|&idx| ridge[idx]).collect();
        assert!(!kept.is_empty());
        assert!(kept.len() * 2 < band.len());
        assert!(kept.iter().all(|idx| band.contains(idx)));
        // ни одна оставшаяся ячейка не окружена гребнем со всех сторон
        for &idx in &kept {
            assert!(domain.neighbors(idx).filter(|&n| ridge[n]).count() < 6);
        }

        // утончение сохраняет связность
        let mut seen = vec![false; domain.len()];
        let mut stack = vec![kept[0]];
        seen[kept[0]] = true;
        let mut reached = 0;
        while let Some(idx) = stack.pop() {
            reached += 1;
            for n in domain.neighbors(idx) {
                if ridge[n] && !seen[n] {
                    seen[n] = true;
                    stack.push(n);
                }
            }
        }
        assert_eq!(reached, kept.len());
    }

    #[test]
    fn noise_terrain_mask_is_symmetric() {
        let sampler = NoiseSampler::new(3, 320);
        let domain = Domain::square(512, 16);
        let rules = rules();
        let grid = Grid::from_fn(domain, &rules, 320, |x, z| sampler.sample_at(x, z));
        let mask = WatershedRidge.detect(&grid, &rules);
        assert_symmetric(&grid, &mask);
        for idx in grid.domain.cells() {
            if grid.water[idx] {
                assert!(mask.cell[idx]);
            }
        }
    }
}
