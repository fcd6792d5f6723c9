//! Tiled executor for a lowered [`LoopNest`].
//!
//! The output is cut into bands of `tile_height` rows; each band into tiles
//! of `tile_width` columns. A tile that would run past the extent is shifted
//! inwards so it ends at the extent; the pixels it shares with its neighbour
//! are recomputed, and only the pixels the tile owns are written.

use log::trace;

#[cfg(feature = "rayon")]
use rayon::prelude::*;

use super::lanes::{self, Taps};
use super::Buffer;
use crate::lower::{LoopNest, Storage};
use crate::source::Source;
use crate::{Error, Result};

/// Materialized `blur_x` values over a rectangle.
struct Plane {
    x0: i32,
    y0: i32,
    width: usize,
    data: Vec<i32>,
}

impl Plane {
    fn compute(
        input: &dyn Source,
        x0: i32,
        y0: i32,
        width: usize,
        height: usize,
        lane_width: usize,
    ) -> Self {
        let mut data = vec![0; width * height];
        let mut taps = Taps::new(lane_width);
        for (y, row) in (y0..).zip(data.chunks_exact_mut(width)) {
            for (start, len) in lanes::chunks(width, lane_width) {
                taps.blur_x(input, x0 + start as i32, y, &mut row[start..start + len]);
            }
        }
        Self {
            x0,
            y0,
            width,
            data,
        }
    }

    /// `len` values starting at `(x, y)`.
    #[inline]
    fn span(&self, x: i32, y: i32, len: usize) -> &[i32] {
        let row = (y - self.y0) as usize;
        let col = (x - self.x0) as usize;
        let start = row * self.width + col;
        &self.data[start..start + len]
    }
}

/// Owned pixels of one tile, row-major.
struct TileOut {
    x: usize,
    width: usize,
    data: Vec<i32>,
}

struct Exec<'a> {
    input: &'a dyn Source,
    nest: &'a LoopNest,
    width: usize,
    height: usize,
    tile_width: usize,
    tile_height: usize,
    root: Option<Plane>,
}

impl Exec<'_> {
    fn band(&self, ty: usize, band: &mut [i32]) {
        let y = ty * self.tile_height;
        let rows = band.len() / self.width;
        let count = self.width.div_ceil(self.tile_width);

        #[cfg(feature = "rayon")]
        let tiles: Vec<TileOut> = if self.nest.parallel_tiles {
            (0..count)
                .into_par_iter()
                .map(|tx| self.tile(tx, y, rows))
                .collect()
        } else {
            (0..count).map(|tx| self.tile(tx, y, rows)).collect()
        };
        #[cfg(not(feature = "rayon"))]
        let tiles: Vec<TileOut> = (0..count).map(|tx| self.tile(tx, y, rows)).collect();

        for tile in tiles {
            for (dst, src) in band
                .chunks_exact_mut(self.width)
                .zip(tile.data.chunks_exact(tile.width))
            {
                dst[tile.x..tile.x + tile.width].copy_from_slice(src);
            }
        }
    }

    /// Compute tile `tx` of the band starting at row `y`, `rows` rows owned.
    fn tile(&self, tx: usize, y: usize, rows: usize) -> TileOut {
        let x = tx * self.tile_width;
        let owned = self.tile_width.min(self.width - x);

        // shifted-in origin of the full tile
        let x0 = x.min(self.width - self.tile_width) as i32;
        let y0 = y.min(self.height - self.tile_height) as i32;

        let local;
        let plane = match self.nest.producer {
            Storage::Root => self.root.as_ref(),
            Storage::PerTile => {
                local = Plane::compute(
                    self.input,
                    x0,
                    y0 - 1,
                    self.tile_width,
                    self.tile_height + 2,
                    self.nest.producer_lanes,
                );
                Some(&local)
            }
            Storage::Inline => None,
        };

        let lane_width = self.nest.lanes;
        let mut data = vec![0; owned * rows];
        let mut taps = Taps::new(lane_width);
        let mut above = vec![0; lane_width];
        let mut mid = vec![0; lane_width];
        let mut below = vec![0; lane_width];

        for (yy, row) in (y as i32..).zip(data.chunks_exact_mut(owned)) {
            for (start, len) in lanes::chunks(owned, lane_width) {
                let xx = (x + start) as i32;
                let out = &mut row[start..start + len];
                match plane {
                    Some(p) => lanes::avg3(
                        p.span(xx, yy - 1, len),
                        p.span(xx, yy, len),
                        p.span(xx, yy + 1, len),
                        out,
                    ),
                    None => {
                        taps.blur_x(self.input, xx, yy - 1, &mut above[..len]);
                        taps.blur_x(self.input, xx, yy, &mut mid[..len]);
                        taps.blur_x(self.input, xx, yy + 1, &mut below[..len]);
                        lanes::avg3(&above[..len], &mid[..len], &below[..len], out);
                    }
                }
            }
        }

        TileOut {
            x,
            width: owned,
            data,
        }
    }
}

fn check_extent(axis: &str, extent: usize, tile: usize) -> Result<()> {
    if tile > extent {
        return Err(Error::Execution(format!(
            "split width {tile} exceeds the {axis} extent {extent}"
        )));
    }
    Ok(())
}

/// Realize `blur_y` over `[0, width) x [0, height)` following `nest`.
pub(crate) fn realize(
    input: &dyn Source,
    nest: &LoopNest,
    width: usize,
    height: usize,
) -> Result<Buffer> {
    let mut out = Buffer::alloc(width, height)?;

    let tile_width = nest.tile_width.unwrap_or(width);
    let tile_height = nest.tile_height.unwrap_or(height);
    check_extent("x", width, tile_width)?;
    check_extent("y", height, tile_height)?;

    let root = match nest.producer {
        Storage::Root => Some(Plane::compute(
            input,
            0,
            -1,
            width,
            height + 2,
            nest.producer_lanes,
        )),
        _ => None,
    };

    let exec = Exec {
        input,
        nest,
        width,
        height,
        tile_width,
        tile_height,
        root,
    };
    trace!(
        "realizing {}x{} in {}x{} tiles",
        width,
        height,
        tile_width,
        tile_height
    );

    let band_len = tile_height * width;

    #[cfg(feature = "rayon")]
    {
        if nest.parallel_rows {
            out.data
                .par_chunks_mut(band_len)
                .enumerate()
                .for_each(|(ty, band)| exec.band(ty, band));
        } else {
            out.data
                .chunks_mut(band_len)
                .enumerate()
                .for_each(|(ty, band)| exec.band(ty, band));
        }
    }

    #[cfg(not(feature = "rayon"))]
    {
        out.data
            .chunks_mut(band_len)
            .enumerate()
            .for_each(|(ty, band)| exec.band(ty, band));
    }

    Ok(out)
}
