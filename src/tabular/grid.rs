use std::collections::HashMap;

/// Rectangular cell grid, row-major, every cell a string
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Grid {
    cells: Vec<Vec<String>>,
    width: usize,
}

impl Grid {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from ragged rows; short rows are padded with empty cells
    pub fn from_rows<R, C>(rows: R) -> Self
    where
        R: IntoIterator<Item = C>,
        C: IntoIterator,
        C::Item: Into<String>,
    {
        let mut cells: Vec<Vec<String>> = rows
            .into_iter()
            .map(|row| row.into_iter().map(Into::into).collect())
            .collect();
        let width = cells.iter().map(Vec::len).max().unwrap_or(0);
        for row in &mut cells {
            row.resize(width, String::new());
        }
        Self { cells, width }
    }

    pub fn height(&self) -> usize {
        self.cells.len()
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn get(&self, row: usize, col: usize) -> Option<&str> {
        self.cells.get(row).and_then(|r| r.get(col)).map(String::as_str)
    }

    pub fn set(&mut self, row: usize, col: usize, value: impl Into<String>) {
        self.ensure_size(row + 1, col + 1);
        self.cells[row][col] = value.into();
    }

    /// Grow to at least `height` x `width`, filling with empty cells
    pub fn ensure_size(&mut self, height: usize, width: usize) {
        if width > self.width {
            for row in &mut self.cells {
                row.resize(width, String::new());
            }
            self.width = width;
        }
        while self.cells.len() < height {
            self.cells.push(vec![String::new(); self.width]);
        }
    }

    pub fn into_rows(self) -> Vec<Vec<String>> {
        self.cells
    }
}

/// A normalized sheet: promoted header plus data rows
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetTable {
    pub name: String,
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl SheetTable {
    /// Promote the first grid row to field names and keep the non-blank rest
    pub fn from_grid(name: impl Into<String>, grid: Grid) -> Self {
        let mut rows = grid.into_rows().into_iter();
        let raw_header = rows.next().unwrap_or_default();
        let header = unique_header(&raw_header);

        let rows = rows
            .filter(|row| row.iter().any(|cell| !cell.trim().is_empty()))
            .collect();

        Self {
            name: name.into(),
            header,
            rows,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column(&self, name: &str) -> Option<Vec<&str>> {
        let index = self.header.iter().position(|h| h == name)?;
        Some(self.rows.iter().map(|row| row[index].as_str()).collect())
    }
}

fn unique_header(raw: &[String]) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    raw.iter()
        .enumerate()
        .map(|(index, cell)| {
            let base = match cell.trim() {
                "" => format!("Unnamed: {}", index),
                name => name.to_string(),
            };
            let count = seen.entry(base.clone()).or_insert(0);
            let name = if *count == 0 { base } else { format!("{}.{}", base, count) };
            *count += 1;
            name
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ragged_rows_padded() {
        let grid = Grid::from_rows(vec![vec!["a", "b", "c"], vec!["1"]]);
        assert_eq!(grid.width(), 3);
        assert_eq!(grid.get(1, 2), Some(""));
    }

    #[test]
    fn test_set_grows_grid() {
        let mut grid = Grid::from_rows(vec![vec!["a"]]);
        grid.set(2, 1, "x");
        assert_eq!(grid.height(), 3);
        assert_eq!(grid.width(), 2);
        assert_eq!(grid.get(2, 1), Some("x"));
        assert_eq!(grid.get(0, 1), Some(""));
    }

    #[test]
    fn test_header_promotion() {
        let grid = Grid::from_rows(vec![
            vec!["Item", "", "Item"],
            vec!["Rent", "1", "x"],
            vec!["", "", ""],
            vec!["Power", "2", "y"],
        ]);
        let table = SheetTable::from_grid("Budget", grid);
        assert_eq!(table.header, vec!["Item", "Unnamed: 1", "Item.1"]);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.column("Item"), Some(vec!["Rent", "Power"]));
    }

    #[test]
    fn test_header_only_sheet_is_empty() {
        let table = SheetTable::from_grid("Notes", Grid::from_rows(vec![vec!["Title"]]));
        assert!(table.is_empty());
        let blank = SheetTable::from_grid("Blank", Grid::new());
        assert!(blank.is_empty());
        assert!(blank.header.is_empty());
    }
}
