//! Spreadsheet normalization: merged-cell resolution, header promotion and
//! Markdown table serialization.

pub mod grid;
pub mod merge;
pub mod formatter;
pub mod workbook;

pub use grid::{Grid, SheetTable};
pub use merge::{fill_down, resolve_merges, MergeRegion};
pub use formatter::TableFormatter;
pub use workbook::{load_workbook, RawSheet, WorkbookNormalizer};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct NormalizationChanges {
    pub sheets_read: usize,
    pub sheets_dropped: usize,
    pub merge_regions_resolved: usize,
    pub cells_filled: usize,
    pub fill_down_sheets: usize,
}

impl NormalizationChanges {
    pub fn summary(&self) -> String {
        format!(
            "Read {} sheets: {} dropped as empty. Resolved {} merge regions, filled {} cells ({} sheets by fill-down).",
            self.sheets_read, self.sheets_dropped, self.merge_regions_resolved,
            self.cells_filled, self.fill_down_sheets
        )
    }
}
