//! Terrain subsystem: TerrainSource trait, the per-world height grid and
//! the versioned `hmap.dat` codec.
//!
//! ## File layout (little-endian)
//!
//! ```text
//! i32 version                       (must be 1)
//! i32 cell_x, i32 cell_y            (must match the world)
//! f64 height coefficient            (informational)
//! i32 stored cell count             (informational)
//! per cell, x outer / y inner:
//!     u8 skip                       (non-zero: no samples follow)
//!     16 x 16 blocks (i, j), each 32 x 32 u16 samples (x, y)
//! ```

use crate::error::HeightmapError;
use crate::types::{Vec3, HEIGHT_SAMPLES_PER_CELL, HEIGHT_SAMPLE_SPACING};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

pub const HEIGHTMAP_VERSION: i32 = 1;

const BLOCKS_PER_CELL: usize = 16;
const SAMPLES_PER_BLOCK: usize = 32;
const BLOCK_BYTES: usize = SAMPLES_PER_BLOCK * SAMPLES_PER_BLOCK * 2;

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Anything that can provide a terrain height and surface normal.
///
/// Implementations never fail: missing data reads as height 0.
pub trait TerrainSource: Send + Sync {
    fn height_at(&self, x: f32, y: f32) -> f32;
    fn normal_at(&self, x: f32, y: f32) -> Vec3;
}

// ---------------------------------------------------------------------------
// Height grid
// ---------------------------------------------------------------------------

/// Quantized terrain heights for one world, one `u16` every
/// [`HEIGHT_SAMPLE_SPACING`] world units.
#[derive(Debug, Clone, PartialEq)]
pub struct HeightGrid {
    cell_x: i32,
    cell_y: i32,
    width: usize,
    height: usize,
    samples: Vec<u16>,
    /// `u16::MAX / (max_height / 4)`; divides a raw sample into world units.
    coefficient: f64,
}

impl HeightGrid {
    /// An all-zero grid sized for `cell_x` x `cell_y` cells.
    pub fn new(cell_x: i32, cell_y: i32, max_height: f64) -> Self {
        let width = cell_x.max(0) as usize * HEIGHT_SAMPLES_PER_CELL;
        let height = cell_y.max(0) as usize * HEIGHT_SAMPLES_PER_CELL;
        Self {
            cell_x,
            cell_y,
            width,
            height,
            samples: vec![0; width * height],
            coefficient: u16::MAX as f64 / (max_height / 4.0),
        }
    }

    pub fn cell_x(&self) -> i32 {
        self.cell_x
    }

    pub fn cell_y(&self) -> i32 {
        self.cell_y
    }

    /// Samples along x.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Samples along y.
    pub fn height(&self) -> usize {
        self.height
    }

    pub fn coefficient(&self) -> f64 {
        self.coefficient
    }

    fn index(&self, sx: usize, sy: usize) -> Option<usize> {
        (sx < self.width && sy < self.height).then(|| sx * self.height + sy)
    }

    pub fn sample(&self, sx: usize, sy: usize) -> Option<u16> {
        self.index(sx, sy).map(|i| self.samples[i])
    }

    pub fn set_sample(&mut self, sx: usize, sy: usize, value: u16) -> bool {
        match self.index(sx, sy) {
            Some(i) => {
                self.samples[i] = value;
                true
            }
            None => false,
        }
    }

    /// Height in world units at a world-space point, `None` outside the grid
    /// or when the coefficient is unusable.
    pub fn sample_height(&self, x: f32, y: f32) -> Option<f32> {
        if !(self.coefficient.is_finite() && self.coefficient > 0.0) {
            return None;
        }
        if !(x.is_finite() && y.is_finite()) || x < 0.0 || y < 0.0 {
            return None;
        }
        let sx = (x / HEIGHT_SAMPLE_SPACING) as usize;
        let sy = (y / HEIGHT_SAMPLE_SPACING) as usize;
        self.sample(sx, sy)
            .map(|raw| (raw as f64 / self.coefficient) as f32)
    }

    fn cell_is_empty(&self, cx: usize, cy: usize) -> bool {
        let x0 = cx * HEIGHT_SAMPLES_PER_CELL;
        let y0 = cy * HEIGHT_SAMPLES_PER_CELL;
        (x0..x0 + HEIGHT_SAMPLES_PER_CELL).all(|sx| {
            let start = sx * self.height + y0;
            self.samples[start..start + HEIGHT_SAMPLES_PER_CELL]
                .iter()
                .all(|&s| s == 0)
        })
    }

    // -----------------------------------------------------------------------
    // Codec
    // -----------------------------------------------------------------------

    /// Open and decode `path` for a world of `cell_x` x `cell_y` cells.
    pub fn load(
        path: &Path,
        cell_x: i32,
        cell_y: i32,
        max_height: f64,
    ) -> Result<Self, HeightmapError> {
        let file = File::open(path)?;
        Self::decode(
            BufReader::with_capacity(2 << 20, file),
            cell_x,
            cell_y,
            max_height,
        )
    }

    /// Decode a heightmap stream into a fresh grid.
    ///
    /// Any error leaves nothing half-written: the caller keeps whatever grid
    /// it had before.
    pub fn decode<R: Read>(
        mut reader: R,
        cell_x: i32,
        cell_y: i32,
        max_height: f64,
    ) -> Result<Self, HeightmapError> {
        let version = read_i32(&mut reader)?;
        if version != HEIGHTMAP_VERSION {
            return Err(HeightmapError::UnsupportedVersion(version));
        }

        let found_x = read_i32(&mut reader)?;
        let found_y = read_i32(&mut reader)?;
        let _coefficient = read_f64(&mut reader)?;
        let _count = read_i32(&mut reader)?;

        if found_x != cell_x || found_y != cell_y {
            return Err(HeightmapError::DimensionMismatch {
                expected_x: cell_x,
                expected_y: cell_y,
                found_x,
                found_y,
            });
        }

        let mut grid = Self::new(cell_x, cell_y, max_height);
        let mut block = [0u8; BLOCK_BYTES];

        for cx in 0..cell_x.max(0) as usize {
            for cy in 0..cell_y.max(0) as usize {
                if read_u8(&mut reader)? != 0 {
                    continue;
                }
                for i in 0..BLOCKS_PER_CELL {
                    for j in 0..BLOCKS_PER_CELL {
                        reader.read_exact(&mut block)?;
                        grid.write_block(cx, cy, i, j, &block);
                    }
                }
            }
        }

        Ok(grid)
    }

    fn write_block(&mut self, cx: usize, cy: usize, i: usize, j: usize, block: &[u8]) {
        let bx = cx * HEIGHT_SAMPLES_PER_CELL + i * SAMPLES_PER_BLOCK;
        let by = cy * HEIGHT_SAMPLES_PER_CELL + j * SAMPLES_PER_BLOCK;
        for x in 0..SAMPLES_PER_BLOCK {
            for y in 0..SAMPLES_PER_BLOCK {
                let k = (x * SAMPLES_PER_BLOCK + y) * 2;
                let value = u16::from_le_bytes([block[k], block[k + 1]]);
                self.set_sample(bx + x, by + y, value);
            }
        }
    }

    /// Write the grid in the `hmap.dat` format. All-zero cells are stored
    /// as skipped.
    pub fn encode<W: Write>(&self, writer: W) -> Result<(), HeightmapError> {
        let mut out = BufWriter::new(writer);
        let cells_x = self.cell_x.max(0) as usize;
        let cells_y = self.cell_y.max(0) as usize;

        let stored = (0..cells_x)
            .flat_map(|cx| (0..cells_y).map(move |cy| (cx, cy)))
            .filter(|&(cx, cy)| !self.cell_is_empty(cx, cy))
            .count();

        out.write_all(&HEIGHTMAP_VERSION.to_le_bytes())?;
        out.write_all(&self.cell_x.to_le_bytes())?;
        out.write_all(&self.cell_y.to_le_bytes())?;
        out.write_all(&self.coefficient.to_le_bytes())?;
        out.write_all(&(stored as i32).to_le_bytes())?;

        for cx in 0..cells_x {
            for cy in 0..cells_y {
                if self.cell_is_empty(cx, cy) {
                    out.write_all(&[1])?;
                    continue;
                }
                out.write_all(&[0])?;
                for i in 0..BLOCKS_PER_CELL {
                    for j in 0..BLOCKS_PER_CELL {
                        let bx = cx * HEIGHT_SAMPLES_PER_CELL + i * SAMPLES_PER_BLOCK;
                        let by = cy * HEIGHT_SAMPLES_PER_CELL + j * SAMPLES_PER_BLOCK;
                        for x in 0..SAMPLES_PER_BLOCK {
                            for y in 0..SAMPLES_PER_BLOCK {
                                let value = self.sample(bx + x, by + y).unwrap_or(0);
                                out.write_all(&value.to_le_bytes())?;
                            }
                        }
                    }
                }
            }
        }

        out.flush()?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// TerrainSource impl
// ---------------------------------------------------------------------------

impl TerrainSource for HeightGrid {
    fn height_at(&self, x: f32, y: f32) -> f32 {
        self.sample_height(x, y).unwrap_or(0.0)
    }

    fn normal_at(&self, x: f32, y: f32) -> Vec3 {
        // Finite differences one sample apart.
        let eps = HEIGHT_SAMPLE_SPACING;
        let h_l = self.height_at(x - eps, y);
        let h_r = self.height_at(x + eps, y);
        let h_d = self.height_at(x, y - eps);
        let h_u = self.height_at(x, y + eps);
        Vec3::new(h_l - h_r, h_d - h_u, 2.0 * eps)
    }
}

// ---------------------------------------------------------------------------
// Primitive readers
// ---------------------------------------------------------------------------

fn read_u8<R: Read>(reader: &mut R) -> std::io::Result<u8> {
    let mut buf = [0u8; 1];
    reader.read_exact(&mut buf)?;
    Ok(buf[0])
}

fn read_i32<R: Read>(reader: &mut R) -> std::io::Result<i32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(i32::from_le_bytes(buf))
}

fn read_f64<R: Read>(reader: &mut R) -> std::io::Result<f64> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(f64::from_le_bytes(buf))
}
