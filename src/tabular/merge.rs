use tracing::debug;

use super::grid::Grid;

/// Rectangular merged range, 0-based inclusive grid coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeRegion {
    pub first_row: usize,
    pub first_col: usize,
    pub last_row: usize,
    pub last_col: usize,
}

impl MergeRegion {
    pub fn new(first_row: usize, first_col: usize, last_row: usize, last_col: usize) -> Self {
        Self {
            first_row: first_row.min(last_row),
            first_col: first_col.min(last_col),
            last_row: first_row.max(last_row),
            last_col: first_col.max(last_col),
        }
    }

    pub fn contains(&self, row: usize, col: usize) -> bool {
        (self.first_row..=self.last_row).contains(&row)
            && (self.first_col..=self.last_col).contains(&col)
    }

    pub fn cell_count(&self) -> usize {
        (self.last_row - self.first_row + 1) * (self.last_col - self.first_col + 1)
    }
}

/// Copy each region's top-left value into every member cell.
///
/// A region whose top-left cell is empty fills with the empty string.
/// Regions reaching past the grid grow it. Returns the number of cells
/// written other than the anchors.
pub fn resolve_merges(grid: &mut Grid, regions: &[MergeRegion]) -> usize {
    let mut filled = 0;

    for region in regions {
        grid.ensure_size(region.last_row + 1, region.last_col + 1);
        let value = grid
            .get(region.first_row, region.first_col)
            .unwrap_or_default()
            .to_string();

        for row in region.first_row..=region.last_row {
            for col in region.first_col..=region.last_col {
                if (row, col) != (region.first_row, region.first_col) {
                    grid.set(row, col, value.clone());
                    filled += 1;
                }
            }
        }
    }

    debug!("Resolved {} merge regions ({} cells)", regions.len(), filled);
    filled
}

/// Propagate the last non-empty value downward in each column.
///
/// This approximates merge resolution when the file format carries no merge
/// metadata: it cannot tell a merged cell from a cell that is blank on
/// purpose, and it never fills horizontally. Row 0 is the header and is
/// left alone. Returns the number of cells filled.
pub fn fill_down(grid: &mut Grid) -> usize {
    let mut filled = 0;

    for col in 0..grid.width() {
        let mut last: Option<String> = None;
        for row in 1..grid.height() {
            let cell = grid.get(row, col).unwrap_or_default();
            if !cell.trim().is_empty() {
                last = Some(cell.to_string());
            } else if let Some(value) = &last {
                grid.set(row, col, value.clone());
                filled += 1;
            }
        }
    }

    filled
}
