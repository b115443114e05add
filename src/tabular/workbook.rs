//! Workbook ingestion through calamine.
//!
//! `.xlsx` archives go through the Xlsx reader, the only calamine reader that
//! exposes merged regions. Everything else calamine understands (`.xls`,
//! `.xlsb`, `.ods`) is opened by format detection and reported as having no
//! merge metadata.

use std::io::Cursor;

use calamine::{open_workbook_auto_from_rs, Data, Dimensions, Range, Reader, Xlsx};
use tracing::{debug, info, warn};

use super::grid::{Grid, SheetTable};
use super::merge::{fill_down, resolve_merges, MergeRegion};
use super::NormalizationChanges;
use crate::config::NormalizationMode;
use crate::error::{IngestionContext, StructurerError, StructurerResult};
use crate::logging::PerformanceTimer;

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";

/// One sheet as read from the file, before normalization
#[derive(Debug, Clone)]
pub struct RawSheet {
    pub name: String,
    pub grid: Grid,
    /// `None` when the file format carries no merge metadata
    pub merges: Option<Vec<MergeRegion>>,
}

/// Read every sheet of a workbook, in workbook order
pub fn load_workbook(bytes: &[u8], input: &str) -> StructurerResult<Vec<RawSheet>> {
    if bytes.is_empty() {
        return Err(StructurerError::ingestion(input, "file is empty"));
    }

    if bytes.starts_with(ZIP_MAGIC) {
        match Xlsx::new(Cursor::new(bytes.to_vec())) {
            Ok(mut workbook) => return read_xlsx(&mut workbook, input),
            Err(e) => debug!("{} is not an xlsx archive ({}), trying other readers", input, e),
        }
    }

    read_without_merges(bytes, input)
}

fn read_xlsx(workbook: &mut Xlsx<Cursor<Vec<u8>>>, input: &str) -> StructurerResult<Vec<RawSheet>> {
    workbook
        .load_merged_regions()
        .ingestion_context(input, "Failed to load merged regions")?;

    let mut sheets = Vec::new();
    for name in workbook.sheet_names() {
        let range = workbook
            .worksheet_range(&name)
            .ingestion_context(input, &format!("Failed to read sheet '{}'", name))?;

        let dimensions = workbook
            .worksheet_merge_cells(&name)
            .unwrap_or(Ok(Vec::new()))
            .ingestion_context(input, &format!("Failed to read merges of sheet '{}'", name))?;

        let (grid, merges) = sheet_grid(&range, &dimensions);
        debug!("Sheet '{}': {}x{} cells, {} merges", name, grid.height(), grid.width(), merges.len());
        sheets.push(RawSheet {
            name,
            grid,
            merges: Some(merges),
        });
    }

    Ok(sheets)
}

fn read_without_merges(bytes: &[u8], input: &str) -> StructurerResult<Vec<RawSheet>> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))
        .ingestion_context(input, "Failed to open workbook")?;

    let mut sheets = Vec::new();
    for name in workbook.sheet_names() {
        let range = workbook
            .worksheet_range(&name)
            .ingestion_context(input, &format!("Failed to read sheet '{}'", name))?;

        let (grid, _) = sheet_grid(&range, &[]);
        sheets.push(RawSheet {
            name,
            grid,
            merges: None,
        });
    }

    Ok(sheets)
}

/// Lay the used range and its merges onto one grid.
///
/// The grid origin is the top-left-most of the used range and every merge
/// start, so a merge anchored above or left of the data stays addressable.
fn sheet_grid(range: &Range<Data>, merges: &[Dimensions]) -> (Grid, Vec<MergeRegion>) {
    let origin = range
        .start()
        .into_iter()
        .chain(merges.iter().map(|d| d.start))
        .reduce(|a, b| (a.0.min(b.0), a.1.min(b.1)));

    let Some((origin_row, origin_col)) = origin else {
        return (Grid::new(), Vec::new());
    };

    let mut grid = Grid::new();
    if let Some((start_row, start_col)) = range.start() {
        let row_offset = (start_row - origin_row) as usize;
        let col_offset = (start_col - origin_col) as usize;
        if let Some((end_row, end_col)) = range.end() {
            grid.ensure_size(
                (end_row - origin_row) as usize + 1,
                (end_col - origin_col) as usize + 1,
            );
        }
        for (row, col, value) in range.cells() {
            let text = cell_text(value);
            if !text.is_empty() {
                grid.set(row + row_offset, col + col_offset, text);
            }
        }
    }

    let regions = merges
        .iter()
        .map(|d| {
            MergeRegion::new(
                (d.start.0 - origin_row) as usize,
                (d.start.1 - origin_col) as usize,
                (d.end.0 - origin_row) as usize,
                (d.end.1 - origin_col) as usize,
            )
        })
        .collect();

    (grid, regions)
}

fn cell_text(value: &Data) -> String {
    match value {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        other => other.to_string(),
    }
}

/// Turns raw sheets into populated tables according to the configured mode
pub struct WorkbookNormalizer {
    mode: NormalizationMode,
}

impl WorkbookNormalizer {
    pub fn new(mode: NormalizationMode) -> Self {
        Self { mode }
    }

    pub fn normalize(&self, sheets: Vec<RawSheet>) -> (Vec<SheetTable>, NormalizationChanges) {
        let _timer = PerformanceTimer::start("workbook normalization");
        let mut changes = NormalizationChanges::default();
        let mut tables = Vec::new();

        for sheet in sheets {
            changes.sheets_read += 1;
            let RawSheet { name, mut grid, merges } = sheet;

            let use_fill_down = match (self.mode, &merges) {
                (NormalizationMode::FillDown, _) => true,
                (NormalizationMode::Auto, None) => true,
                _ => false,
            };

            if use_fill_down {
                warn!("Sheet '{}': filling blanks downward, merged cells are approximated", name);
                changes.cells_filled += fill_down(&mut grid);
                changes.fill_down_sheets += 1;
            } else if let Some(regions) = &merges {
                changes.cells_filled += resolve_merges(&mut grid, regions);
                changes.merge_regions_resolved += regions.len();
            }

            let table = SheetTable::from_grid(name, grid);
            if table.is_empty() {
                info!("Dropping empty sheet '{}'", table.name);
                changes.sheets_dropped += 1;
                continue;
            }
            tables.push(table);
        }

        info!("{}", changes.summary());
        (tables, changes)
    }
}
