//! Field Generator
//!
//! Procedural color grid players stand on. Generation is a pure function of
//! the random stream: the same RNG state always yields the same field.
//!
//! ## Algorithm
//!
//! 1. Fill with color 0.
//! 2. Three small discs (radius 2..=4) per palette color, in index order.
//! 3. 8..=19 large blobs (radius 4..=11, `dist <= 0.8 * r`) of random colors.
//! 4. Repair: every absent color gets one random cell.
//! 5. Noise: `w * h / 20` random cells get a random color.
//! 6. Repair again, drawing only from colors that have cells to spare.

use serde::{Serialize, Deserialize};

use crate::core::rng::DeterministicRng;

/// Small discs painted per color.
const SEED_BLOBS_PER_COLOR: usize = 3;
/// Large blob count range (inclusive).
const LARGE_BLOBS: (i32, i32) = (8, 19);
/// Small disc radius range (inclusive).
const SEED_RADIUS: (i32, i32) = (2, 4);
/// Large blob radius range (inclusive).
const LARGE_RADIUS: (i32, i32) = (4, 11);
/// Large blobs only keep cells within this share of their radius.
const LARGE_BLOB_SHAPE: f64 = 0.8;
/// One noise cell per this many cells.
const NOISE_DIVISOR: usize = 20;

/// Colored grid, row-major, one palette index per cell.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    width: usize,
    height: usize,
    cells: Vec<u8>,
}

impl Field {
    /// Field with every cell set to `color`.
    pub fn filled(width: usize, height: usize, color: u8) -> Self {
        Self {
            width,
            height,
            cells: vec![color; width * height],
        }
    }

    /// Build from raw row-major cells.
    ///
    /// Returns `None` when `cells.len() != width * height`.
    pub fn from_cells(width: usize, height: usize, cells: Vec<u8>) -> Option<Self> {
        if cells.len() != width * height {
            return None;
        }
        Some(Self { width, height, cells })
    }

    /// Generate a new field over a palette of `colors` entries.
    pub fn generate(rng: &mut DeterministicRng, width: usize, height: usize, colors: u8) -> Self {
        let mut field = Self::filled(width, height, 0);
        if width == 0 || height == 0 || colors == 0 {
            return field;
        }

        for color in 0..colors {
            for _ in 0..SEED_BLOBS_PER_COLOR {
                let (cx, cy) = field.random_cell(rng);
                let radius = rng.next_int_range(SEED_RADIUS.0, SEED_RADIUS.1);
                field.paint_disc(cx, cy, radius, radius as f64, color);
            }
        }

        let blobs = rng.next_int_range(LARGE_BLOBS.0, LARGE_BLOBS.1);
        for _ in 0..blobs {
            let (cx, cy) = field.random_cell(rng);
            let radius = rng.next_int_range(LARGE_RADIUS.0, LARGE_RADIUS.1);
            let color = rng.next_int(colors as u32) as u8;
            field.paint_disc(cx, cy, radius, radius as f64 * LARGE_BLOB_SHAPE, color);
        }

        field.repair(rng, colors);

        let noise = width * height / NOISE_DIVISOR;
        for _ in 0..noise {
            let idx = rng.next_index(field.cells.len());
            field.cells[idx] = rng.next_int(colors as u32) as u8;
        }

        field.repair(rng, colors);
        field
    }

    /// Width in cells.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Height in cells.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Row-major cells.
    pub fn cells(&self) -> &[u8] {
        &self.cells
    }

    /// Color index of a grid cell.
    pub fn get(&self, gx: usize, gy: usize) -> Option<u8> {
        if gx >= self.width || gy >= self.height {
            return None;
        }
        Some(self.cells[gy * self.width + gx])
    }

    /// Set a grid cell; out-of-grid writes are ignored.
    pub fn set(&mut self, gx: usize, gy: usize, color: u8) {
        if gx < self.width && gy < self.height {
            self.cells[gy * self.width + gx] = color;
        }
    }

    /// Color under a world position.
    ///
    /// World coordinates map to cells by truncating division by `cell_size`,
    /// clamped onto the grid.
    pub fn color_at(&self, x: f64, y: f64, cell_size: f64) -> Option<u8> {
        if self.cells.is_empty() {
            return None;
        }
        let gx = world_to_cell(x, cell_size, self.width);
        let gy = world_to_cell(y, cell_size, self.height);
        self.get(gx, gy)
    }

    /// Number of cells per color index.
    pub fn histogram(&self, colors: u8) -> Vec<usize> {
        let mut counts = vec![0usize; colors as usize];
        for &c in &self.cells {
            if let Some(slot) = counts.get_mut(c as usize) {
                *slot += 1;
            }
        }
        counts
    }

    /// True if every color in `0..colors` has at least one cell.
    pub fn has_every_color(&self, colors: u8) -> bool {
        self.histogram(colors).iter().all(|&n| n > 0)
    }

    fn random_cell(&self, rng: &mut DeterministicRng) -> (i32, i32) {
        (
            rng.next_int(self.width as u32) as i32,
            rng.next_int(self.height as u32) as i32,
        )
    }

    fn paint_disc(&mut self, cx: i32, cy: i32, radius: i32, reach: f64, color: u8) {
        for dy in -radius..=radius {
            for dx in -radius..=radius {
                let (nx, ny) = (cx + dx, cy + dy);
                if nx < 0 || ny < 0 || nx as usize >= self.width || ny as usize >= self.height {
                    continue;
                }
                let dist = ((dx * dx + dy * dy) as f64).sqrt();
                if dist <= reach {
                    self.cells[ny as usize * self.width + nx as usize] = color;
                }
            }
        }
    }

    /// Give every missing color one cell taken from a color with cells to spare.
    fn repair(&mut self, rng: &mut DeterministicRng, colors: u8) {
        let mut counts = self.histogram(colors);
        if self.cells.len() < colors as usize {
            return;
        }

        for color in 0..colors {
            if counts[color as usize] > 0 {
                continue;
            }

            let idx = self.spare_cell(rng, &counts);
            let previous = self.cells[idx] as usize;
            if let Some(n) = counts.get_mut(previous) {
                *n -= 1;
            }
            self.cells[idx] = color;
            counts[color as usize] += 1;
        }
    }

    fn spare_cell(&self, rng: &mut DeterministicRng, counts: &[usize]) -> usize {
        let spare = |c: u8| counts.get(c as usize).map_or(true, |&n| n > 1);

        for _ in 0..self.cells.len() {
            let idx = rng.next_index(self.cells.len());
            if spare(self.cells[idx]) {
                return idx;
            }
        }
        // Pigeonhole: with more cells than colors some color has two.
        self.cells.iter().position(|&c| spare(c)).unwrap_or(0)
    }
}

fn world_to_cell(v: f64, cell_size: f64, cells: usize) -> usize {
    let max = cells.saturating_sub(1);
    if !v.is_finite() || cell_size <= 0.0 {
        return if v == f64::INFINITY { max } else { 0 };
    }
    let g = (v / cell_size).trunc();
    if g <= 0.0 {
        0
    } else {
        (g as usize).min(max)
    }
}

// =============================================================================
// TESTS
// =============================================================================
