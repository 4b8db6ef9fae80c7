// src/topology.rs
//! Геометрия сетки выборки.
//!
//! [`Domain`] описывает, какие ячейки входят в область и где они лежат в мире:
//! - квадратная сетка — линейное масштабирование `(index - offset) * spacing`;
//! - гексагональная — осевые координаты `(q, r)`, центры по формулам для «острых» шестиугольников.
//!
//! Одно и то же отображение используется и при выборке, и при построении контуров.

use crate::config::GridTopology;
use crate::outline::Point;

/// Соседи по рёбрам квадратной сетки, по кругу.
const SQUARE_DIRECTIONS: [(i32, i32); 4] = [(1, 0), (0, 1), (-1, 0), (0, -1)];

/// Полная окрестность Мура для подсчёта общих границ.
const SQUARE_RING: [(i32, i32); 8] = [
    (-1, -1),
    (0, -1),
    (1, -1),
    (-1, 0),
    (1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];

/// Шесть осевых направлений, по кругу.
const HEX_DIRECTIONS: [(i32, i32); 6] = [(1, 0), (1, -1), (0, -1), (-1, 0), (-1, 1), (0, 1)];

impl GridTopology {
    /// Направления к соседям по рёбрам, упорядоченные по вращению.
    #[must_use]
    pub fn directions(self) -> &'static [(i32, i32)] {
        match self {
            GridTopology::Square => &SQUARE_DIRECTIONS,
            GridTopology::Hex => &HEX_DIRECTIONS,
        }
    }

    /// Окрестность для подсчёта границ при слиянии: 8 соседей или шестиугольное кольцо.
    #[must_use]
    pub fn ring(self) -> &'static [(i32, i32)] {
        match self {
            GridTopology::Square => &SQUARE_RING,
            GridTopology::Hex => &HEX_DIRECTIONS,
        }
    }
}

/// Область выборки: размеры массива, маска принадлежности и отображение в мир.
#[derive(Debug, Clone)]
pub struct Domain {
    pub topology: GridTopology,
    pub width: usize,
    pub height: usize,
    pub spacing: i32,
    /// Квадрат: `-offset` по обеим осям. Гексы: минимальные осевые `(q, r)`.
    origin: (i32, i32),
    hex_size: f64,
    inside: Vec<bool>,
}

impl Domain {
    #[must_use]
    pub fn new(topology: GridTopology, radius: i32, spacing: i32) -> Self {
        match topology {
            GridTopology::Square => Self::square(radius, spacing),
            GridTopology::Hex => Self::hex(radius, spacing),
        }
    }

    /// Квадрат со стороной `radius / spacing * 2 + 1` ячеек, центр в начале координат.
    #[must_use]
    pub fn square(radius: i32, spacing: i32) -> Self {
        let spacing = spacing.max(1);
        let size = (radius.max(0) / spacing * 2 + 1) as usize;
        let offset = (size / 2) as i32;
        Self {
            topology: GridTopology::Square,
            width: size,
            height: size,
            spacing,
            origin: (-offset, -offset),
            hex_size: 0.0,
            inside: vec![true; size * size],
        }
    }

    /// Все гексы, центры которых лежат в круге радиуса `radius`.
    #[must_use]
    pub fn hex(radius: i32, spacing: i32) -> Self {
        let spacing = spacing.max(1);
        let radius = f64::from(radius.max(0));
        let hex_size = f64::from(spacing) / 2.0;
        let range = (radius as i32 / spacing) * 2 + 2;

        let mut centers = Vec::new();
        let (mut q_min, mut q_max) = (i32::MAX, i32::MIN);
        let (mut r_min, mut r_max) = (i32::MAX, i32::MIN);
        for q in -range..=range {
            for r in -range..=range {
                let (wx, wz) = axial_to_world(q, r, hex_size);
                if wx.hypot(wz) <= radius {
                    centers.push((q, r));
                    q_min = q_min.min(q);
                    q_max = q_max.max(q);
                    r_min = r_min.min(r);
                    r_max = r_max.max(r);
                }
            }
        }

        let width = (q_max - q_min + 1) as usize;
        let height = (r_max - r_min + 1) as usize;
        let mut inside = vec![false; width * height];
        for (q, r) in centers {
            let i = (q - q_min) as usize;
            let j = (r - r_min) as usize;
            inside[j * width + i] = true;
        }

        Self {
            topology: GridTopology::Hex,
            width,
            height,
            spacing,
            origin: (q_min, r_min),
            hex_size,
            inside,
        }
    }

    /// Размер массива, включая ячейки вне области.
    #[must_use]
    pub fn len(&self) -> usize {
        self.width * self.height
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Число ячеек, действительно входящих в область.
    #[must_use]
    pub fn cell_count(&self) -> usize {
        self.inside.iter().filter(|&&v| v).count()
    }

    #[must_use]
    pub fn contains(&self, idx: usize) -> bool {
        self.inside.get(idx).copied().unwrap_or(false)
    }

    #[must_use]
    pub fn index(&self, i: usize, j: usize) -> usize {
        j * self.width + i
    }

    #[must_use]
    pub fn coords(&self, idx: usize) -> (usize, usize) {
        (idx % self.width, idx / self.width)
    }

    /// Сосед по смещению, если он внутри области.
    #[must_use]
    pub fn offset(&self, idx: usize, (di, dj): (i32, i32)) -> Option<usize> {
        let (i, j) = self.coords(idx);
        let ni = i as i64 + i64::from(di);
        let nj = j as i64 + i64::from(dj);
        if ni < 0 || nj < 0 || ni >= self.width as i64 || nj >= self.height as i64 {
            return None;
        }
        let nidx = self.index(ni as usize, nj as usize);
        self.contains(nidx).then_some(nidx)
    }

    /// Соседи по рёбрам (4 или 6), только внутри области.
    pub fn neighbors(&self, idx: usize) -> impl Iterator<Item = usize> + '_ {
        self.topology
            .directions()
            .iter()
            .filter_map(move |&d| self.offset(idx, d))
    }

    /// Соседи для подсчёта общих границ (8 или 6), только внутри области.
    pub fn ring(&self, idx: usize) -> impl Iterator<Item = usize> + '_ {
        self.topology
            .ring()
            .iter()
            .filter_map(move |&d| self.offset(idx, d))
    }

    /// Индексы всех ячеек области в построчном порядке.
    pub fn cells(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.len()).filter(|&idx| self.inside[idx])
    }

    /// Мировые координаты центра ячейки.
    #[must_use]
    pub fn world(&self, idx: usize) -> Point {
        let (i, j) = self.coords(idx);
        let a = i as i32 + self.origin.0;
        let b = j as i32 + self.origin.1;
        match self.topology {
            GridTopology::Square => Point::new(
                f64::from(a * self.spacing),
                f64::from(b * self.spacing),
            ),
            GridTopology::Hex => {
                let (x, z) = axial_to_world(a, b, self.hex_size);
                Point::new(x, z)
            }
        }
    }

    /// Целочисленная точка мира, в которой берётся выборка для ячейки.
    #[must_use]
    pub fn sample_coords(&self, idx: usize) -> (i32, i32) {
        let p = self.world(idx);
        (p.x.floor() as i32, p.z.floor() as i32)
    }

    /// Площадь одной ячейки в блоках.
    #[must_use]
    pub fn cell_area(&self) -> f64 {
        match self.topology {
            GridTopology::Square => f64::from(self.spacing) * f64::from(self.spacing),
            GridTopology::Hex => 3.0 * 3f64.sqrt() / 2.0 * self.hex_size * self.hex_size,
        }
    }
}

fn axial_to_world(q: i32, r: i32, hex_size: f64) -> (f64, f64) {
    let x = 3f64.sqrt() * hex_size * (f64::from(q) + f64::from(r) / 2.0);
    let z = 1.5 * hex_size * f64::from(r);
    (x, z)
}
