// src/region/ocean.rs
//! Разделение воды на прибрежную и дальнюю.
//!
//! Расстояние до суши считается BFS сразу от всех ячеек суши. Вода в пределах
//! буфера собирается в связные прибрежные регионы, вся остальная вода —
//! в один общий регион с прямоугольным контуром.

use std::collections::VecDeque;

use tracing::debug;

use crate::grid::Grid;
use crate::outline::{self, Point};
use crate::topology::Domain;

use super::RegionSet;

/// Расстояние для воды, до которой суша недостижима.
pub const UNREACHABLE: u32 = u32::MAX;

/// Расстояние от каждой ячейки до ближайшей суши в шагах сетки (суша — 0).
#[must_use]
pub fn distance_to_land(grid: &Grid) -> Vec<u32> {
    let domain = &grid.domain;
    let mut distance = vec![UNREACHABLE; domain.len()];
    let mut queue = VecDeque::new();

    for idx in domain.cells() {
        if !grid.water[idx] {
            distance[idx] = 0;
            queue.push_back(idx);
        }
    }

    while let Some(current) = queue.pop_front() {
        let next_distance = distance[current] + 1;
        for next in domain.neighbors(current) {
            if distance[next] == UNREACHABLE {
                distance[next] = next_distance;
                queue.push_back(next);
            }
        }
    }
    distance
}

/// Хотя бы одна ячейка не дальше `buffer` от суши.
#[must_use]
pub fn is_near_land(cells: &[usize], distances: &[u32], buffer: u32) -> bool {
    cells.iter().any(|&idx| distances[idx] <= buffer)
}

/// Прибрежные регионы и ячейки дальней воды.
#[derive(Debug, Clone)]
pub struct WaterSplit {
    pub coastal: RegionSet,
    pub bulk: Vec<usize>,
}

#[must_use]
pub fn split_water(grid: &Grid, distances: &[u32], buffer: u32) -> WaterSplit {
    let domain = &grid.domain;
    let coastal_cell = |idx: usize| grid.water[idx] && distances[idx] <= buffer;

    let mut coastal = RegionSet::new(domain.len());
    let mut visited = vec![false; domain.len()];
    let mut bulk = Vec::new();

    for start in domain.cells() {
        if !grid.water[start] {
            continue;
        }
        if !coastal_cell(start) {
            bulk.push(start);
            continue;
        }
        if visited[start] {
            continue;
        }
        visited[start] = true;
        let mut cells = Vec::new();
        let mut queue = VecDeque::from([start]);
        while let Some(current) = queue.pop_front() {
            cells.push(current);
            for next in domain.neighbors(current) {
                if !visited[next] && coastal_cell(next) {
                    visited[next] = true;
                    queue.push_back(next);
                }
            }
        }
        coastal.create(cells);
    }

    debug!(
        coastal_regions = coastal.len(),
        bulk_cells = bulk.len(),
        buffer,
        "water split"
    );
    WaterSplit { coastal, bulk }
}

/// Контур дальней воды: охватывающий прямоугольник с отступом в полшага сетки.
#[must_use]
pub fn bulk_outline(domain: &Domain, cells: &[usize]) -> Vec<Point> {
    let centers: Vec<Point> = cells.iter().map(|&idx| domain.world(idx)).collect();
    outline::bounding_rectangle(&centers, f64::from(domain.spacing) / 2.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::barrier::test_support::grid_9x9;
    use crate::sampler::Sample;

    /// Остров 3×3 в центре океана 9×9.
    fn island() -> Grid {
        grid_9x9(|i, j| {
            if (3..=5).contains(&i) && (3..=5).contains(&j) {
                Sample::new(70, "plains")
            } else {
                Sample::new(40, "ocean")
            }
        })
    }

    #[test]
    fn distance_field_grows_away_from_land() {
        let grid = island();
        let domain = &grid.domain;
        let distances = distance_to_land(&grid);
        assert_eq!(distances[domain.index(4, 4)], 0);
        assert_eq!(distances[domain.index(2, 4)], 1);
        assert_eq!(distances[domain.index(0, 4)], 3);
        // манхэттенское расстояние до угла острова
        assert_eq!(distances[domain.index(0, 0)], 6);
    }

    #[test]
    fn all_water_is_unreachable() {
        let grid = grid_9x9(|_, _| Sample::new(10, "ocean"));
        let distances = distance_to_land(&grid);
        assert!(distances.iter().all(|&d| d == UNREACHABLE));
        let split = split_water(&grid, &distances, 2);
        assert!(split.coastal.is_empty());
        assert_eq!(split.bulk.len(), 81);
    }

    #[test]
    fn buffer_cells_become_coastal_regions() {
        let grid = island();
        let distances = distance_to_land(&grid);
        let split = split_water(&grid, &distances, 1);
        // по три ячейки вдоль каждой стороны острова; углы на расстоянии 2 их не связывают
        assert_eq!(split.coastal.len(), 4);
        assert_eq!(split.coastal.total_cells(), 12);
        assert_eq!(split.bulk.len(), 81 - 9 - 12);
        assert!(is_near_land(split.coastal.cells(0), &distances, 1));
    }

    #[test]
    fn zero_buffer_sends_all_water_to_bulk() {
        let grid = island();
        let distances = distance_to_land(&grid);
        let split = split_water(&grid, &distances, 0);
        assert!(split.coastal.is_empty());
        assert_eq!(split.bulk.len(), 72);

        let rect = bulk_outline(&grid.domain, &split.bulk);
        assert_eq!(rect[0], Point::new(-36.0, -36.0));
        assert_eq!(rect[2], Point::new(36.0, 36.0));
    }
}
