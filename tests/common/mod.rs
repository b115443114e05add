//! Shared fixtures for integration tests.
#![allow(dead_code)]

use std::io::{Cursor, Write};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

pub const QUARTERLY_PAYLOAD: &str = r#"{
  "title": "Quarterly Revenue",
  "summary": "Revenue grew each quarter.",
  "sections": [
    {"heading": "Q1", "content": "Rose 10%."},
    {"heading": "Q2", "content": "Rose 12%."}
  ],
  "key_data_points": [
    {"label": "Q1 growth", "value": "10%"},
    {"label": "Q2 growth", "value": "12%"}
  ]
}"#;

/// One worksheet: name, rows of cell text ("" leaves the cell out), merge refs
pub struct SheetFixture<'a> {
    pub name: &'a str,
    pub rows: Vec<Vec<&'a str>>,
    pub merges: Vec<&'a str>,
}

/// Minimal xlsx archive with inline strings and numeric cells
pub fn build_xlsx(sheets: &[SheetFixture<'_>]) -> Vec<u8> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);

    let mut overrides = String::from(
        r#"<Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/>"#,
    );
    let mut sheet_entries = String::new();
    let mut relationships = String::new();
    for (index, sheet) in sheets.iter().enumerate() {
        let n = index + 1;
        overrides.push_str(&format!(
            r#"<Override PartName="/xl/worksheets/sheet{n}.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>"#
        ));
        sheet_entries.push_str(&format!(
            r#"<sheet name="{}" sheetId="{n}" r:id="rId{n}"/>"#,
            escape(sheet.name)
        ));
        relationships.push_str(&format!(
            r#"<Relationship Id="rId{n}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet{n}.xml"/>"#
        ));
    }

    let parts = [
        (
            "[Content_Types].xml".to_string(),
            format!(
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/>{overrides}</Types>"#
            ),
        ),
        (
            "_rels/.rels".to_string(),
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#.to_string(),
        ),
        (
            "xl/workbook.xml".to_string(),
            format!(
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets>{sheet_entries}</sheets></workbook>"#
            ),
        ),
        (
            "xl/_rels/workbook.xml.rels".to_string(),
            format!(
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">{relationships}</Relationships>"#
            ),
        ),
    ];

    for (name, body) in parts {
        zip.start_file(name, options).expect("start part");
        zip.write_all(body.as_bytes()).expect("write part");
    }

    for (index, sheet) in sheets.iter().enumerate() {
        zip.start_file(format!("xl/worksheets/sheet{}.xml", index + 1), options)
            .expect("start sheet");
        zip.write_all(worksheet_xml(sheet).as_bytes()).expect("write sheet");
    }

    zip.finish().expect("finish archive").into_inner()
}

fn worksheet_xml(sheet: &SheetFixture<'_>) -> String {
    let mut rows = String::new();
    for (r, row) in sheet.rows.iter().enumerate() {
        rows.push_str(&format!(r#"<row r="{}">"#, r + 1));
        for (c, value) in row.iter().enumerate() {
            if value.is_empty() {
                continue;
            }
            let cell_ref = format!("{}{}", column_letters(c), r + 1);
            if value.parse::<f64>().is_ok() {
                rows.push_str(&format!(r#"<c r="{cell_ref}"><v>{value}</v></c>"#));
            } else {
                rows.push_str(&format!(
                    r#"<c r="{cell_ref}" t="inlineStr"><is><t>{}</t></is></c>"#,
                    escape(value)
                ));
            }
        }
        rows.push_str("</row>");
    }

    let merges = if sheet.merges.is_empty() {
        String::new()
    } else {
        let cells: String = sheet
            .merges
            .iter()
            .map(|r| format!(r#"<mergeCell ref="{r}"/>"#))
            .collect();
        format!(r#"<mergeCells count="{}">{cells}</mergeCells>"#, sheet.merges.len())
    };

    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>{rows}</sheetData>{merges}</worksheet>"#
    )
}

fn column_letters(mut index: usize) -> String {
    let mut letters = Vec::new();
    loop {
        letters.push(b'A' + (index % 26) as u8);
        if index < 26 {
            break;
        }
        index = index / 26 - 1;
    }
    letters.reverse();
    String::from_utf8(letters).expect("ascii")
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;").replace('"', "&quot;")
}

/// "Budget" with Fixed Costs merged over A2:A3, plus a plain "Notes" sheet
pub fn budget_workbook() -> Vec<u8> {
    build_xlsx(&[
        SheetFixture {
            name: "Budget",
            rows: vec![
                vec!["Category", "Item", "Amount"],
                vec!["Fixed Costs", "Rent", "1200"],
                vec!["", "Insurance", "300"],
                vec!["Variable", "Travel", "450.5"],
            ],
            merges: vec!["A2:A3"],
        },
        SheetFixture {
            name: "Notes",
            rows: vec![vec!["Topic", "Owner"], vec!["Launch", "Dana"]],
            merges: vec![],
        },
    ])
}
