//! Diagram-region detection on a rendered page.
//!
//! A page is reduced to a coarse grid of "ink" cells (dark or strongly
//! coloured pixels). Ink cells are dilated by one cell so that the strokes of
//! one figure join up, then grouped into 8-connected components. A component
//! becomes a crop when it is large enough to be a figure, does not cover
//! almost the whole page, and is either colourful or sparse. Dense grey
//! blocks are usually paragraphs of text.
//!
//! The heuristic never fails the page: callers fall back to the full page
//! when nothing is found or the image is too small to analyse.

use image::{DynamicImage, GenericImageView, Rgb};
use std::collections::VecDeque;
use thiserror::Error;

/// Grid resolution along the longer edge.
const GRID: u32 = 128;
/// Smallest cell edge in pixels.
const MIN_CELL: u32 = 4;
/// Images below this edge length are not analysed.
const MIN_EDGE: u32 = 32;
/// Luma below this counts as ink.
const DARK_LUMA: u8 = 200;
/// Channel spread above this counts as colour.
const SATURATION: u8 = 60;
/// Share of ink pixels that marks a cell.
const CELL_INK_RATIO: f32 = 0.08;
/// Minimum region extent relative to the page, per axis.
const MIN_EXTENT: f32 = 0.12;
/// Maximum region area relative to the page.
const MAX_AREA: f32 = 0.90;
/// Ink cells per bounding-box cell above which a grey region looks like text.
const MAX_GREY_FILL: f32 = 0.6;
/// Share of colourful ink cells that marks a region as colourful.
const COLOUR_SHARE: f32 = 0.2;
/// Regions kept per page.
pub const MAX_REGIONS: usize = 8;

/// A pixel rectangle on the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DetectError {
    #[error("image {width}x{height} is too small for region detection")]
    TooSmall { width: u32, height: u32 },
}

#[derive(Clone, Copy, Default)]
struct Cell {
    ink: bool,
    colour: bool,
}

/// Find diagram-like regions, ordered top-to-bottom then left-to-right.
pub fn detect_regions(img: &DynamicImage) -> Result<Vec<Region>, DetectError> {
    let (width, height) = img.dimensions();
    if width < MIN_EDGE || height < MIN_EDGE {
        return Err(DetectError::TooSmall { width, height });
    }

    let cell = (width.max(height) / GRID).max(MIN_CELL);
    let cols = width.div_ceil(cell) as usize;
    let rows = height.div_ceil(cell) as usize;
    let grid = ink_grid(img, cell, cols, rows);

    // Dilate so that the separate strokes of one figure touch.
    let mut joined = vec![false; cols * rows];
    for r in 0..rows {
        for c in 0..cols {
            if grid[r * cols + c].ink {
                for (nr, nc) in neighbours(r, c, rows, cols).chain(std::iter::once((r, c))) {
                    joined[nr * cols + nc] = true;
                }
            }
        }
    }

    let page_area = width as f32 * height as f32;
    let mut seen = vec![false; cols * rows];
    let mut regions = Vec::new();

    for start in 0..cols * rows {
        if !joined[start] || seen[start] {
            continue;
        }
        seen[start] = true;

        let (mut min_r, mut max_r) = (start / cols, start / cols);
        let (mut min_c, mut max_c) = (start % cols, start % cols);
        let mut ink_cells = 0usize;
        let mut colour_cells = 0usize;
        let mut queue = VecDeque::from([start]);

        while let Some(i) = queue.pop_front() {
            let (r, c) = (i / cols, i % cols);
            min_r = min_r.min(r);
            max_r = max_r.max(r);
            min_c = min_c.min(c);
            max_c = max_c.max(c);
            if grid[i].ink {
                ink_cells += 1;
                if grid[i].colour {
                    colour_cells += 1;
                }
            }
            for (nr, nc) in neighbours(r, c, rows, cols) {
                let j = nr * cols + nc;
                if joined[j] && !seen[j] {
                    seen[j] = true;
                    queue.push_back(j);
                }
            }
        }

        let box_cells = (max_r - min_r + 1) * (max_c - min_c + 1);
        let x = min_c as u32 * cell;
        let y = min_r as u32 * cell;
        let w = ((max_c as u32 + 1) * cell).min(width) - x;
        let h = ((max_r as u32 + 1) * cell).min(height) - y;

        if (w as f32) < MIN_EXTENT * width as f32 || (h as f32) < MIN_EXTENT * height as f32 {
            continue;
        }
        if w as f32 * h as f32 > MAX_AREA * page_area {
            continue;
        }
        let fill = ink_cells as f32 / box_cells as f32;
        let colourful = ink_cells > 0 && colour_cells as f32 / ink_cells as f32 >= COLOUR_SHARE;
        if !colourful && fill > MAX_GREY_FILL {
            continue;
        }

        regions.push(pad(
            Region {
                x,
                y,
                width: w,
                height: h,
            },
            cell,
            width,
            height,
        ));
    }

    regions.sort_by(|a, b| b.area().cmp(&a.area()));
    regions.truncate(MAX_REGIONS);
    regions.sort_by_key(|r| (r.y, r.x));
    Ok(regions)
}

/// Cut `region` out of `img`.
pub fn crop(img: &DynamicImage, region: &Region) -> DynamicImage {
    img.crop_imm(region.x, region.y, region.width, region.height)
}

fn ink_grid(img: &DynamicImage, cell: u32, cols: usize, rows: usize) -> Vec<Cell> {
    let rgb = img.to_rgb8();
    let (width, height) = rgb.dimensions();
    let mut ink = vec![0u32; cols * rows];
    let mut colour = vec![0u32; cols * rows];

    for (px, py, Rgb([r, g, b])) in rgb.enumerate_pixels().map(|(x, y, p)| (x, y, *p)) {
        let i = (py / cell) as usize * cols + (px / cell) as usize;
        let luma = ((r as u32 * 299 + g as u32 * 587 + b as u32 * 114) / 1000) as u8;
        let spread = r.max(g).max(b) - r.min(g).min(b);
        if spread > SATURATION {
            ink[i] += 1;
            colour[i] += 1;
        } else if luma < DARK_LUMA {
            ink[i] += 1;
        }
    }

    let mut grid = vec![Cell::default(); cols * rows];
    for r in 0..rows {
        for c in 0..cols {
            let cw = cell.min(width - c as u32 * cell);
            let ch = cell.min(height - r as u32 * cell);
            let pixels = (cw * ch) as f32;
            let i = r * cols + c;
            grid[i] = Cell {
                ink: ink[i] as f32 / pixels >= CELL_INK_RATIO,
                colour: colour[i] as f32 / pixels >= CELL_INK_RATIO,
            };
        }
    }
    grid
}

fn neighbours(
    r: usize,
    c: usize,
    rows: usize,
    cols: usize,
) -> impl Iterator<Item = (usize, usize)> {
    (-1i64..=1)
        .flat_map(|dr| (-1i64..=1).map(move |dc| (dr, dc)))
        .filter(|&(dr, dc)| dr != 0 || dc != 0)
        .filter_map(move |(dr, dc)| {
            let nr = r as i64 + dr;
            let nc = c as i64 + dc;
            (nr >= 0 && nc >= 0 && (nr as usize) < rows && (nc as usize) < cols)
                .then_some((nr as usize, nc as usize))
        })
}

fn pad(region: Region, by: u32, width: u32, height: u32) -> Region {
    let x = region.x.saturating_sub(by);
    let y = region.y.saturating_sub(by);
    let right = (region.x + region.width + by).min(width);
    let bottom = (region.y + region.height + by).min(height);
    Region {
        x,
        y,
        width: right - x,
        height: bottom - y,
    }
}
