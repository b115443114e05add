use super::grid::SheetTable;

/// Serializes a normalized sheet to a Markdown pipe table
pub struct TableFormatter {
    alignment: ColumnAlignment,
}

#[derive(Clone, Copy)]
pub enum ColumnAlignment {
    Left,
    Center,
    Right,
}

impl TableFormatter {
    pub fn new() -> Self {
        Self {
            alignment: ColumnAlignment::Left,
        }
    }

    pub fn with_alignment(mut self, alignment: ColumnAlignment) -> Self {
        self.alignment = alignment;
        self
    }

    pub fn format_table(&self, table: &SheetTable) -> String {
        if table.header.is_empty() {
            return String::new();
        }

        let header: Vec<String> = table.header.iter().map(|c| escape_cell(c)).collect();
        let rows: Vec<Vec<String>> = table
            .rows
            .iter()
            .map(|row| row.iter().map(|c| escape_cell(c)).collect())
            .collect();

        let column_widths = self.calculate_column_widths(&header, &rows);

        let mut formatted = Vec::with_capacity(rows.len() + 2);
        formatted.push(self.format_row(&header, &column_widths));
        formatted.push(self.create_separator(&column_widths));
        for row in &rows {
            formatted.push(self.format_row(row, &column_widths));
        }

        formatted.join("\n")
    }

    fn calculate_column_widths(&self, header: &[String], rows: &[Vec<String>]) -> Vec<usize> {
        // Separator needs at least three dashes
        let mut widths: Vec<usize> = header.iter().map(|c| c.chars().count().max(3)).collect();

        for row in rows {
            for (i, cell) in row.iter().enumerate() {
                if i < widths.len() {
                    widths[i] = widths[i].max(cell.chars().count());
                }
            }
        }

        widths
    }

    fn format_row(&self, cells: &[String], widths: &[usize]) -> String {
        let formatted_cells: Vec<String> = widths
            .iter()
            .enumerate()
            .map(|(i, &width)| {
                let content = cells.get(i).map(String::as_str).unwrap_or("");
                self.pad_content(content, width)
            })
            .collect();

        format!("| {} |", formatted_cells.join(" | "))
    }

    fn pad_content(&self, content: &str, width: usize) -> String {
        match self.alignment {
            ColumnAlignment::Left => format!("{:<width$}", content, width = width),
            ColumnAlignment::Right => format!("{:>width$}", content, width = width),
            ColumnAlignment::Center => format!("{:^width$}", content, width = width),
        }
    }

    fn create_separator(&self, widths: &[usize]) -> String {
        let separators: Vec<String> = widths.iter().map(|&w| "-".repeat(w)).collect();

        format!("| {} |", separators.join(" | "))
    }
}

impl Default for TableFormatter {
    fn default() -> Self {
        Self::new()
    }
}

fn escape_cell(content: &str) -> String {
    content
        .split(['\r', '\n'])
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
        .replace('|', "\\|")
}
