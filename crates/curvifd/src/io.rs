//! Text export of grid functions and the binary grid format.
//!
//! Text table: a `"<y_extent>, <x_extent>"` header, then one `"<x>, <y>, <z>"`
//! line per node in row-major order.
//!
//! Binary grid: `x_extent` and `y_extent` as native-endian `i64`, followed by
//! native-endian `f64` `(x, y)` pairs for every node in row-major order.
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};

use crate::grid::{Grid, StructuredGrid};
use crate::grid_function::GridFunction;
use crate::matrix::Matrix;

/// Parsed contents of a text table written by [`write_table`].
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub y_extent: usize,
    pub x_extent: usize,
    /// `[x, y, z]` per node, row-major.
    pub rows: Vec<[f64; 3]>,
}

/// Write `gf` as a text table to `path`.
pub fn write_table<P: AsRef<Path>>(gf: &GridFunction, path: P) -> Result<()> {
    let path = path.as_ref();
    log::info!("Writing grid function to {}", path.display());
    let file = File::create(path)
        .with_context(|| format!("Failed to create output file: {}", path.display()))?;
    let mut out = BufWriter::new(file);
    write_table_to(gf, &mut out)
        .and_then(|_| out.flush())
        .with_context(|| format!("Failed to write output file: {}", path.display()))?;
    Ok(())
}

pub fn write_table_to<W: Write>(gf: &GridFunction, out: &mut W) -> std::io::Result<()> {
    let grid = gf.grid();
    writeln!(out, "{}, {}", grid.y_extent(), grid.x_extent())?;

    let xs = grid.flattened_x();
    let ys = grid.flattened_y();
    for ((x, y), z) in xs.iter().zip(ys.iter()).zip(gf.values().as_slice()) {
        writeln!(out, "{}, {}, {}", x, y, z)?;
    }
    Ok(())
}

pub fn read_table<P: AsRef<Path>>(path: P) -> Result<Table> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read table: {}", path.display()))?;
    parse_table(&content).with_context(|| format!("Failed to parse table: {}", path.display()))
}

fn parse_fields<const N: usize>(line: &str, lineno: usize) -> Result<[f64; N]> {
    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    if fields.len() != N {
        bail!("line {}: expected {} fields, found {}", lineno, N, fields.len());
    }
    let mut parsed = [0.0; N];
    for (slot, field) in parsed.iter_mut().zip(fields) {
        *slot = field
            .parse::<f64>()
            .with_context(|| format!("line {}: invalid number '{}'", lineno, field))?;
    }
    Ok(parsed)
}

pub fn parse_table(content: &str) -> Result<Table> {
    let mut lines = content.lines().enumerate().filter(|(_, l)| !l.trim().is_empty());

    let (_, header) = lines.next().ok_or_else(|| anyhow!("empty table"))?;
    let extents: Vec<usize> = header
        .split(',')
        .map(|s| s.trim().parse::<usize>())
        .collect::<std::result::Result<_, _>>()
        .with_context(|| format!("invalid header '{}'", header))?;
    let &[y_extent, x_extent] = extents.as_slice() else {
        bail!("header must hold two extents, found '{}'", header);
    };

    let rows = lines
        .map(|(idx, line)| parse_fields::<3>(line, idx + 1))
        .collect::<Result<Vec<_>>>()?;

    let expected = y_extent
        .checked_add(1)
        .zip(x_extent.checked_add(1))
        .and_then(|(nrows, ncols)| nrows.checked_mul(ncols))
        .ok_or_else(|| anyhow!("table extents {}x{} overflow", x_extent, y_extent))?;
    if rows.len() != expected {
        bail!(
            "table for {}x{} cells needs {} node lines, found {}",
            x_extent,
            y_extent,
            expected,
            rows.len()
        );
    }

    Ok(Table {
        y_extent,
        x_extent,
        rows,
    })
}

/// Write the node coordinates of `grid` in the binary grid format.
pub fn write_grid_binary<P: AsRef<Path>>(grid: &dyn Grid, path: P) -> Result<()> {
    let path = path.as_ref();
    log::info!("Writing binary grid to {}", path.display());
    let file = File::create(path)
        .with_context(|| format!("Failed to create grid file: {}", path.display()))?;
    let mut out = BufWriter::new(file);

    let mut write = || -> std::io::Result<()> {
        out.write_all(&(grid.x_extent() as i64).to_ne_bytes())?;
        out.write_all(&(grid.y_extent() as i64).to_ne_bytes())?;
        for (x, y) in grid.flattened_x().into_iter().zip(grid.flattened_y()) {
            out.write_all(&x.to_ne_bytes())?;
            out.write_all(&y.to_ne_bytes())?;
        }
        out.flush()
    };
    write().with_context(|| format!("Failed to write grid file: {}", path.display()))?;
    Ok(())
}

/// Read a grid written by [`write_grid_binary`].
pub fn read_grid_binary<P: AsRef<Path>>(path: P) -> Result<StructuredGrid> {
    let path = path.as_ref();
    log::info!("Reading binary grid from {}", path.display());
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read grid file: {}", path.display()))?;
    decode_grid(&bytes).with_context(|| format!("Invalid grid file: {}", path.display()))
}

fn decode_grid(bytes: &[u8]) -> Result<StructuredGrid> {
    if bytes.len() < 16 {
        bail!("file holds {} bytes, too short for the header", bytes.len());
    }
    let nx = i64::from_ne_bytes(bytes[0..8].try_into()?);
    let ny = i64::from_ne_bytes(bytes[8..16].try_into()?);
    if nx < 0 || ny < 0 {
        bail!("negative grid extents {}x{}", nx, ny);
    }
    let (nx, ny) = (nx as usize, ny as usize);

    let nodes = (nx + 1)
        .checked_mul(ny + 1)
        .ok_or_else(|| anyhow!("grid extents {}x{} overflow", nx, ny))?;
    let expected = nodes
        .checked_mul(16)
        .and_then(|n| n.checked_add(16))
        .ok_or_else(|| anyhow!("grid extents {}x{} overflow", nx, ny))?;
    if bytes.len() != expected {
        bail!(
            "expected {} bytes for {}x{} cells, found {}",
            expected,
            nx,
            ny,
            bytes.len()
        );
    }

    let mut xs = Vec::with_capacity(nodes);
    let mut ys = Vec::with_capacity(nodes);
    for pair in bytes[16..].chunks_exact(16) {
        xs.push(f64::from_ne_bytes(pair[0..8].try_into()?));
        ys.push(f64::from_ne_bytes(pair[8..16].try_into()?));
    }

    let x = Matrix::from_shape_vec((ny + 1, nx + 1), xs)?;
    let y = Matrix::from_shape_vec((ny + 1, nx + 1), ys)?;
    Ok(StructuredGrid::from_coordinates(x, y)?)
}
