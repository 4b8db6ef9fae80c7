// src/outline.rs
//! Контуры регионов: обход границы маски ячеек и сглаживание.
//!
//! 1. [`trace_boundary`] — обход Мура по центрам граничных ячеек.
//! 2. [`chaikin`] — срезание углов (каждое ребро → точки на 25 % и 75 %).
//! 3. [`dedup`] и [`remove_collinear`] — чистка вырожденных вершин.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::topology::Domain;

/// Бюджет шагов обхода на одну ячейку (защита от зацикливания).
const TRACE_STEP_FACTOR: usize = 20;

/// Допуск векторного произведения при проверке коллинеарности.
const COLLINEAR_EPSILON: f64 = 1e-6;

/// Точка на плоскости мира `(x, z)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub z: f64,
}

impl Point {
    #[must_use]
    pub const fn new(x: f64, z: f64) -> Self {
        Self { x, z }
    }

    #[must_use]
    fn lerp(self, other: Point, t: f64) -> Point {
        Point::new(
            self.x * (1.0 - t) + other.x * t,
            self.z * (1.0 - t) + other.z * t,
        )
    }
}

/// Обходит границу множества ячеек и возвращает замкнутое кольцо центров.
///
/// Старт — ячейка с наименьшим ключом `(i + j, i)`. На каждом шаге направления
/// перебираются от «на один поворот раньше текущего» по кругу; точка текущей ячейки
/// записывается до перехода. Обход заканчивается, когда очередной ход `(ячейка, направление)`
/// уже был сделан (в том числе первый ход из старта, критерий Джейкоба), если идти некуда,
/// или по бюджету шагов. Старт, через который граница проходит дважды, попадает в кольцо
/// дважды, и остальные «лепестки» не теряются.
#[must_use]
pub fn trace_boundary(cells: &[usize], domain: &Domain) -> Vec<Point> {
    let Some(&start) = cells.iter().min_by_key(|&&idx| {
        let (i, j) = domain.coords(idx);
        (i + j, i)
    }) else {
        return Vec::new();
    };

    let members: HashSet<usize> = cells.iter().copied().collect();
    let directions = domain.topology.directions();
    let n = directions.len();
    let max_steps = cells.len() * TRACE_STEP_FACTOR;

    let mut ring = Vec::new();
    let mut moves = HashSet::new();
    let mut current = start;
    let mut dir = 0;

    for _ in 0..max_steps {
        let next = (0..n).map(|turn| (dir + n - 1 + turn) % n).find_map(|d| {
            domain
                .offset(current, directions[d])
                .filter(|nidx| members.contains(nidx))
                .map(|nidx| (d, nidx))
        });
        let Some((d, nidx)) = next else {
            // одиночная ячейка
            ring.push(domain.world(current));
            break;
        };
        if !moves.insert((current, d)) {
            break;
        }
        ring.push(domain.world(current));

        dir = d;
        current = nidx;
    }
    ring
}

/// Одна итерация Chaikin для замкнутого кольца.
#[must_use]
pub fn chaikin(points: &[Point]) -> Vec<Point> {
    if points.len() < 3 {
        return points.to_vec();
    }
    let n = points.len();
    let mut out = Vec::with_capacity(n * 2);
    for i in 0..n {
        let p0 = points[i];
        let p1 = points[(i + 1) % n];
        out.push(p0.lerp(p1, 0.25));
        out.push(p0.lerp(p1, 0.75));
    }
    out
}

/// Убирает подряд идущие одинаковые точки.
#[must_use]
pub fn dedup(points: &[Point]) -> Vec<Point> {
    let mut out: Vec<Point> = Vec::with_capacity(points.len());
    for &p in points {
        if out.last() != Some(&p) {
            out.push(p);
        }
    }
    out
}

fn is_collinear(a: Point, b: Point, c: Point) -> bool {
    let (abx, abz) = (b.x - a.x, b.z - a.z);
    let (bcx, bcz) = (c.x - b.x, c.z - b.z);
    (abx * bcz - abz * bcx).abs() < COLLINEAR_EPSILON
}

/// Удаляет вершины, лежащие на прямой с обоими соседями, до неподвижной точки.
///
/// Если после чистки остаётся меньше трёх точек, возвращается исходное кольцо.
#[must_use]
pub fn remove_collinear(points: &[Point]) -> Vec<Point> {
    if points.len() < 3 {
        return points.to_vec();
    }
    let mut current = points.to_vec();
    loop {
        let n = current.len();
        let kept: Vec<Point> = (0..n)
            .filter(|&i| !is_collinear(current[(i + n - 1) % n], current[i], current[(i + 1) % n]))
            .map(|i| current[i])
            .collect();
        if kept.len() < 3 {
            return points.to_vec();
        }
        if kept.len() == n {
            return kept;
        }
        current = kept;
    }
}

/// Полный цикл сглаживания: Chaikin × `iterations`, затем чистка.
#[must_use]
pub fn smooth(ring: &[Point], iterations: usize) -> Vec<Point> {
    let mut points = ring.to_vec();
    for _ in 0..iterations {
        points = chaikin(&points);
    }
    remove_collinear(&dedup(&points))
}

/// Прямоугольник, охватывающий точки с отступом `margin` со всех сторон.
#[must_use]
pub fn bounding_rectangle(points: &[Point], margin: f64) -> Vec<Point> {
    if points.is_empty() {
        return Vec::new();
    }
    let (mut min_x, mut min_z) = (f64::INFINITY, f64::INFINITY);
    let (mut max_x, mut max_z) = (f64::NEG_INFINITY, f64::NEG_INFINITY);
    for p in points {
        min_x = min_x.min(p.x);
        min_z = min_z.min(p.z);
        max_x = max_x.max(p.x);
        max_z = max_z.max(p.z);
    }
    vec![
        Point::new(min_x - margin, min_z - margin),
        Point::new(max_x + margin, min_z - margin),
        Point::new(max_x + margin, max_z + margin),
        Point::new(min_x - margin, max_z + margin),
    ]
}

/// Проверка кольца: не меньше трёх точек и никаких трёх подряд на одной прямой.
#[must_use]
pub fn is_valid_ring(points: &[Point]) -> bool {
    let n = points.len();
    n >= 3 && (0..n).all(|i| !is_collinear(points[(i + n - 1) % n], points[i], points[(i + 1) % n]))
}
