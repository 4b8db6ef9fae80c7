// src/region/png.rs
//! Превью регионов в PNG: заливка полигонов и тёмные контуры.
//!
//! Цвет региона выводится из его UUID, поэтому одинаковые прогоны дают одинаковые картинки.
//! Дальняя вода рисуется первой, поверх неё — прибрежные регионы и суша.

use image::{ImageBuffer, Rgba, RgbaImage};
use imageproc::drawing::{draw_line_segment_mut, draw_polygon_mut};
use imageproc::point::Point as PixelPoint;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::outline::Point;
use crate::region::{Region, RegionKind};
use crate::topology::Domain;

const BACKGROUND: Rgba<u8> = Rgba([20, 20, 60, 255]);
const BULK_COLOR: Rgba<u8> = Rgba([25, 40, 90, 255]);
const OUTLINE_COLOR: Rgba<u8> = Rgba([10, 10, 10, 255]);

/// Отображение мировых координат области в пиксели.
#[derive(Debug, Clone, Copy)]
pub struct RegionCanvas {
    pub width: u32,
    pub height: u32,
    min_x: f64,
    min_z: f64,
    scale: f64,
}

impl RegionCanvas {
    /// Холст, покрывающий область с запасом в полшага; `pixels_per_cell` пикселей на шаг сетки.
    #[must_use]
    pub fn new(domain: &Domain, pixels_per_cell: u32) -> Self {
        let half = f64::from(domain.spacing) / 2.0;
        let (mut min_x, mut min_z) = (f64::INFINITY, f64::INFINITY);
        let (mut max_x, mut max_z) = (f64::NEG_INFINITY, f64::NEG_INFINITY);
        for idx in domain.cells() {
            let p = domain.world(idx);
            min_x = min_x.min(p.x - half);
            min_z = min_z.min(p.z - half);
            max_x = max_x.max(p.x + half);
            max_z = max_z.max(p.z + half);
        }
        if !min_x.is_finite() {
            (min_x, min_z, max_x, max_z) = (0.0, 0.0, 1.0, 1.0);
        }
        let scale = f64::from(pixels_per_cell.max(1)) / f64::from(domain.spacing);
        Self {
            width: ((max_x - min_x) * scale).ceil().max(1.0) as u32,
            height: ((max_z - min_z) * scale).ceil().max(1.0) as u32,
            min_x,
            min_z,
            scale,
        }
    }

    #[must_use]
    pub fn to_pixel(&self, p: Point) -> (f32, f32) {
        (
            ((p.x - self.min_x) * self.scale) as f32,
            ((p.z - self.min_z) * self.scale) as f32,
        )
    }

    /// Рисует все регионы на новом изображении.
    #[must_use]
    pub fn render(&self, regions: &[Region]) -> RgbaImage {
        let mut img = ImageBuffer::from_pixel(self.width, self.height, BACKGROUND);

        let mut ordered: Vec<&Region> = regions.iter().collect();
        ordered.sort_by_key(|r| r.kind != RegionKind::Bulk);

        for region in &ordered {
            let polygon = self.pixel_polygon(&region.outline);
            if polygon.len() >= 3 {
                draw_polygon_mut(&mut img, &polygon, region_color(region));
            }
        }
        for region in &ordered {
            let n = region.outline.len();
            for k in 0..n {
                let a = self.to_pixel(region.outline[k]);
                let b = self.to_pixel(region.outline[(k + 1) % n]);
                draw_line_segment_mut(&mut img, a, b, OUTLINE_COLOR);
            }
        }
        img
    }

    pub fn save_as_png(
        &self,
        regions: &[Region],
        path: &str,
    ) -> Result<(), Box<dyn std::error::Error>> {
        self.render(regions).save(path)?;
        Ok(())
    }

    /// Целочисленный полигон без повторов и без замыкающей точки.
    fn pixel_polygon(&self, outline: &[Point]) -> Vec<PixelPoint<i32>> {
        let mut poly: Vec<PixelPoint<i32>> = Vec::with_capacity(outline.len());
        for &p in outline {
            let (x, y) = self.to_pixel(p);
            let pixel = PixelPoint::new(x.round() as i32, y.round() as i32);
            if poly.last() != Some(&pixel) {
                poly.push(pixel);
            }
        }
        while poly.len() > 1 && poly.first() == poly.last() {
            poly.pop();
        }
        poly
    }
}

/// Суша — в зелёных тонах, прибрежная вода — в синих.
#[must_use]
pub fn region_color(region: &Region) -> Rgba<u8> {
    let mut rng = ChaCha8Rng::seed_from_u64(region.id.as_u128() as u64);
    match region.kind {
        RegionKind::Land => Rgba([
            rng.gen_range(100..220),
            rng.gen_range(120..255),
            rng.gen_range(50..100),
            255,
        ]),
        RegionKind::Coastal => Rgba([30, 60, rng.gen_range(120..220), 255]),
        RegionKind::Bulk => BULK_COLOR,
    }
}
