// src/region/normalize.rs
//! Нормализация размеров: слияние мелких регионов и деление крупных.
//!
//! Границы мягкие: регион без соседей остаётся мелким, а регион,
//! который не удалось разделить хотя бы на два фрагмента, остаётся крупным.
//! Обе операции сохраняют связность регионов по рёбрам сетки (4 или 6 соседей).

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};

use petgraph::graphmap::UnGraphMap;
use rand::SeedableRng;
use rand::seq::index;
use rand_chacha::ChaCha8Rng;
use tracing::debug;

use crate::config::{GeneratorConfig, SplitStrategy};
use crate::outline::Point;
use crate::topology::Domain;

use super::RegionSet;

/// Сколько регионов слито и разделено за один проход нормализации.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NormalizeStats {
    pub merged: usize,
    pub split: usize,
}

/// Слияние, затем деление.
pub fn normalize(set: &mut RegionSet, domain: &Domain, config: &GeneratorConfig) -> NormalizeStats {
    let merged = merge_small(set, domain, config.min_region_cells);
    let split = split_large(
        set,
        domain,
        config.max_region_cells,
        config.split_strategy,
        config.kmeans_iterations,
        config.seed,
    );
    let stats = NormalizeStats { merged, split };
    debug!(?stats, regions = set.len(), "size normalization complete");
    stats
}

/// Граф соседства регионов: вес ребра — число пар соседних ячеек через границу.
fn border_graph(set: &RegionSet, domain: &Domain) -> UnGraphMap<u32, usize> {
    let mut graph = UnGraphMap::new();
    for id in set.ids() {
        graph.add_node(id);
    }
    for (id, cells) in set.iter() {
        for &idx in cells {
            for n in domain.ring(idx) {
                // каждую пару считаем один раз
                if n < idx {
                    continue;
                }
                match set.label(n) {
                    Some(other) if other != id => {
                        if let Some(weight) = graph.edge_weight_mut(id, other) {
                            *weight += 1;
                        } else {
                            graph.add_edge(id, other, 1);
                        }
                    }
                    _ => {}
                }
            }
        }
    }
    graph
}

/// Регионы, с которыми у `id` есть хотя бы одно общее ребро сетки.
fn edge_neighbors(set: &RegionSet, domain: &Domain, id: u32) -> BTreeSet<u32> {
    set.cells(id)
        .iter()
        .flat_map(|&idx| domain.neighbors(idx))
        .filter_map(|n| set.label(n))
        .filter(|&other| other != id)
        .collect()
}

/// Сливает регионы меньше `min_cells` с соседом по самой длинной общей границе.
///
/// Регионы просматриваются по возрастанию номера; при равных границах выигрывает
/// сосед с меньшим номером. Длина границы считается по кольцу (8 или 6 соседей),
/// но кандидатом может быть только регион с общим ребром: касание углом
/// дало бы несвязный регион. Граф границ строится один раз и обновляется после каждого слияния.
pub fn merge_small(set: &mut RegionSet, domain: &Domain, min_cells: usize) -> usize {
    let mut graph = border_graph(set, domain);
    let mut merged = 0;

    loop {
        let candidate = set.ids().into_iter().find_map(|id| {
            if set.size(id) >= min_cells {
                return None;
            }
            let touching = edge_neighbors(set, domain, id);
            graph
                .edges(id)
                .filter(|(_, target, _)| touching.contains(target))
                .max_by(|a, b| a.2.cmp(b.2).then(b.1.cmp(&a.1)))
                .map(|(_, target, _)| (id, target))
        });
        let Some((small, target)) = candidate else {
            break;
        };

        let borders: Vec<(u32, usize)> = graph
            .edges(small)
            .map(|(_, other, &weight)| (other, weight))
            .collect();
        graph.remove_node(small);
        for (other, weight) in borders {
            if other == target {
                continue;
            }
            if let Some(existing) = graph.edge_weight_mut(target, other) {
                *existing += weight;
            } else {
                graph.add_edge(target, other, weight);
            }
        }

        set.absorb(target, small);
        merged += 1;
    }

    if merged > 0 {
        debug!(merged, regions = set.len(), "small regions merged");
    }
    merged
}

/// Делит регионы больше `max_cells` на `ceil(size / max_cells)` частей.
pub fn split_large(
    set: &mut RegionSet,
    domain: &Domain,
    max_cells: usize,
    strategy: SplitStrategy,
    kmeans_iterations: usize,
    seed: u64,
) -> usize {
    let max_cells = max_cells.max(1);
    let mut unsplittable = HashSet::new();
    let mut split = 0;

    loop {
        let candidate = set
            .ids()
            .into_iter()
            .find(|&id| set.size(id) > max_cells && !unsplittable.contains(&id));
        let Some(id) = candidate else {
            break;
        };

        let cells = set.cells(id).to_vec();
        let fragments = match strategy {
            SplitStrategy::KMeans => {
                let k = cells.len().div_ceil(max_cells);
                kmeans(domain, &cells, k, kmeans_iterations, seed.wrapping_add(u64::from(id)))
            }
            SplitStrategy::Bisect => bisect(domain, &cells),
        };
        let fragments = connected_fragments(domain, fragments);
        if fragments.len() < 2 {
            unsplittable.insert(id);
            continue;
        }
        set.split(id, fragments);
        split += 1;
    }

    if split > 0 {
        debug!(split, regions = set.len(), "large regions split");
    }
    split
}

/// Связные компоненты множества ячеек по рёбрам сетки, в порядке первой ячейки.
fn components(domain: &Domain, cells: &[usize]) -> Vec<Vec<usize>> {
    let members: HashSet<usize> = cells.iter().copied().collect();
    let mut seen = HashSet::with_capacity(cells.len());
    let mut out = Vec::new();
    for &start in cells {
        if !seen.insert(start) {
            continue;
        }
        let mut component = Vec::new();
        let mut queue = VecDeque::from([start]);
        while let Some(current) = queue.pop_front() {
            component.push(current);
            for next in domain.neighbors(current) {
                if members.contains(&next) && seen.insert(next) {
                    queue.push_back(next);
                }
            }
        }
        out.push(component);
    }
    out
}

/// Делает фрагменты разделения связными.
///
/// От каждого фрагмента остаётся его крупнейшая компонента. Остальные компоненты
/// раундами отходят к оставленной компоненте, с которой у них больше всего общих рёбер
/// (при равенстве — к более ранней). Компонента без таких соседей становится фрагментом сама.
fn connected_fragments(domain: &Domain, fragments: Vec<Vec<usize>>) -> Vec<Vec<usize>> {
    let mut pieces: Vec<Vec<usize>> = Vec::new();
    let mut kept: Vec<bool> = Vec::new();
    let mut owner: HashMap<usize, usize> = HashMap::new();

    for fragment in fragments {
        let mut parts = components(domain, &fragment);
        // устойчивая сортировка: при равных размерах остаётся более ранняя компонента
        parts.sort_by_key(|part| std::cmp::Reverse(part.len()));
        for (k, part) in parts.into_iter().enumerate() {
            let piece = pieces.len();
            for &idx in &part {
                owner.insert(idx, piece);
            }
            pieces.push(part);
            kept.push(k == 0);
        }
    }

    loop {
        let moves: Vec<(usize, usize)> = (0..pieces.len())
            .filter(|&p| !kept[p] && !pieces[p].is_empty())
            .filter_map(|p| {
                let mut tally: BTreeMap<usize, usize> = BTreeMap::new();
                for &idx in &pieces[p] {
                    for n in domain.neighbors(idx) {
                        if let Some(&q) = owner.get(&n) {
                            if kept[q] {
                                *tally.entry(q).or_default() += 1;
                            }
                        }
                    }
                }
                tally
                    .into_iter()
                    .max_by(|a, b| a.1.cmp(&b.1).then(b.0.cmp(&a.0)))
                    .map(|(q, _)| (p, q))
            })
            .collect();
        if moves.is_empty() {
            break;
        }
        for (p, q) in moves {
            let cells = std::mem::take(&mut pieces[p]);
            for &idx in &cells {
                owner.insert(idx, q);
            }
            pieces[q].extend(cells);
        }
    }

    pieces.retain(|piece| !piece.is_empty());
    pieces
}

/// k-means по мировым координатам центров ячеек. Пустые кластеры отбрасываются.
///
/// Кластеры могут быть несвязными; [`split_large`] чинит это после разбиения.
#[must_use]
pub fn kmeans(
    domain: &Domain,
    cells: &[usize],
    k: usize,
    iterations: usize,
    seed: u64,
) -> Vec<Vec<usize>> {
    let k = k.min(cells.len());
    if k < 2 {
        return vec![cells.to_vec()];
    }
    let points: Vec<Point> = cells.iter().map(|&idx| domain.world(idx)).collect();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut centers: Vec<Point> = index::sample(&mut rng, points.len(), k)
        .into_iter()
        .map(|i| points[i])
        .collect();

    let mut assignment = vec![0usize; points.len()];
    for _ in 0..iterations.max(1) {
        assign(&points, &centers, &mut assignment);
        let mut sums = vec![(0.0, 0.0, 0usize); k];
        for (p, &c) in points.iter().zip(&assignment) {
            sums[c].0 += p.x;
            sums[c].1 += p.z;
            sums[c].2 += 1;
        }
        for (center, (sx, sz, n)) in centers.iter_mut().zip(sums) {
            if n > 0 {
                *center = Point::new(sx / n as f64, sz / n as f64);
            }
        }
    }
    assign(&points, &centers, &mut assignment);

    let mut clusters = vec![Vec::new(); k];
    for (&idx, &c) in cells.iter().zip(&assignment) {
        clusters[c].push(idx);
    }
    clusters.retain(|c| !c.is_empty());
    clusters
}

fn assign(points: &[Point], centers: &[Point], assignment: &mut [usize]) {
    for (p, slot) in points.iter().zip(assignment.iter_mut()) {
        let mut best = 0;
        let mut best_dist = f64::INFINITY;
        for (c, center) in centers.iter().enumerate() {
            let (dx, dz) = (p.x - center.x, p.z - center.z);
            let dist = dx * dx + dz * dz;
            if dist < best_dist {
                best = c;
                best_dist = dist;
            }
        }
        *slot = best;
    }
}

/// Деление пополам по диагонали `i + j`.
#[must_use]
pub fn bisect(domain: &Domain, cells: &[usize]) -> Vec<Vec<usize>> {
    let mut sorted = cells.to_vec();
    sorted.sort_by_key(|&idx| {
        let (i, j) = domain.coords(idx);
        (i + j, idx)
    });
    let second = sorted.split_off(sorted.len() / 2);
    [sorted, second].into_iter().filter(|c| !c.is_empty()).collect()
}
