use std::sync::LazyLock;

use crate::common::size_to_log2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanOrder {
    #[default]
    Diagonal = 0,
    Horizontal = 1,
    Vertical = 2,
}

const NUM_SIZES: usize = 6;

/// Scan tables for every (log2 width, log2 height) pair from 2 to 64.
static SCAN_TABLES: LazyLock<Vec<[Vec<u16>; 3]>> = LazyLock::new(|| {
    let mut tables = Vec::with_capacity(NUM_SIZES * NUM_SIZES);
    for log2h in 1..=NUM_SIZES {
        for log2w in 1..=NUM_SIZES {
            let (w, h) = (1usize << log2w, 1usize << log2h);
            tables.push([diagonal_scan(w, h), horizontal_scan(w, h), vertical_scan(w, h)]);
        }
    }
    tables
});

fn diagonal_scan(w: usize, h: usize) -> Vec<u16> {
    let mut scan = Vec::with_capacity(w * h);
    for d in 0..(w + h - 1) {
        // up-right: start at the bottom-most row of the anti-diagonal
        let y_start = d.min(h - 1);
        for y in (0..=y_start).rev() {
            let x = d - y;
            if x >= w {
                break;
            }
            scan.push((y * w + x) as u16);
        }
    }
    scan
}

fn horizontal_scan(w: usize, h: usize) -> Vec<u16> {
    (0..w * h).map(|p| p as u16).collect()
}

fn vertical_scan(w: usize, h: usize) -> Vec<u16> {
    let mut scan = Vec::with_capacity(w * h);
    for x in 0..w {
        for y in 0..h {
            scan.push((y * w + x) as u16);
        }
    }
    scan
}

/// Raster positions (`y * width + x`) in coding order.
pub fn scan_table(order: ScanOrder, width: i32, height: i32) -> &'static [u16] {
    let log2w = size_to_log2(width) as usize - 1;
    let log2h = size_to_log2(height) as usize - 1;
    &SCAN_TABLES[log2h * NUM_SIZES + log2w][order as usize]
}
