//! Tabular file codec for roster/score sheets.
//!
//! Workbooks are handled directly as zip archives of worksheet XML: the
//! writer emits inline-string cells, the reader additionally understands
//! shared strings and formula results, which covers files produced by the
//! common spreadsheet tools. Plain CSV is accepted on input too; the two are
//! told apart by the zip signature, not the file extension.

use anyhow::{anyhow, Context};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Header row plus one map per data row, keyed by header text. Cells that
/// were blank in the file are absent from the map.
#[derive(Debug, Clone, Default)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Map<String, Value>>,
}

pub fn read_table(path: &Path) -> anyhow::Result<Table> {
    if is_zip_file(path)? {
        read_xlsx(path)
    } else {
        read_csv(path)
    }
}

fn is_zip_file(path: &Path) -> anyhow::Result<bool> {
    let mut f = File::open(path)
        .with_context(|| format!("failed to open input file {}", path.to_string_lossy()))?;
    let mut sig = [0u8; 4];
    let read = f.read(&mut sig).context("failed to read file signature")?;
    if read < 4 {
        return Ok(false);
    }
    Ok(sig == [0x50, 0x4B, 0x03, 0x04])
}

// --- workbook writer ---

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/></Types>"#;

const ROOT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#;

const WORKBOOK_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/></Relationships>"#;

/// Serialize `rows` under `columns` into a single-sheet workbook at `path`.
pub fn write_xlsx(
    path: &Path,
    sheet_name: &str,
    columns: &[String],
    rows: &[Map<String, Value>],
) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.to_string_lossy()))?;
    }
    let out = File::create(path)
        .with_context(|| format!("failed to create output file {}", path.to_string_lossy()))?;
    let mut zip = ZipWriter::new(out);
    let opts = FileOptions::default().compression_method(CompressionMethod::Deflated);

    zip.start_file("[Content_Types].xml", opts)?;
    zip.write_all(CONTENT_TYPES.as_bytes())?;
    zip.start_file("_rels/.rels", opts)?;
    zip.write_all(ROOT_RELS.as_bytes())?;

    let workbook = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets><sheet name="{}" sheetId="1" r:id="rId1"/></sheets></workbook>"#,
        xml_escape(sheet_name)
    );
    zip.start_file("xl/workbook.xml", opts)?;
    zip.write_all(workbook.as_bytes())?;
    zip.start_file("xl/_rels/workbook.xml.rels", opts)?;
    zip.write_all(WORKBOOK_RELS.as_bytes())?;

    let mut sheet = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>"#,
    );
    sheet.push_str(&format_row(1, &header_cells(columns)));
    for (i, row) in rows.iter().enumerate() {
        let cells: Vec<Value> = columns
            .iter()
            .map(|c| row.get(c).cloned().unwrap_or(Value::Null))
            .collect();
        sheet.push_str(&format_row(i + 2, &cells));
    }
    sheet.push_str("</sheetData></worksheet>");
    zip.start_file("xl/worksheets/sheet1.xml", opts)?;
    zip.write_all(sheet.as_bytes())?;

    zip.finish().context("failed to finalize workbook")?;
    Ok(())
}

fn header_cells(columns: &[String]) -> Vec<Value> {
    columns.iter().map(|c| Value::String(c.clone())).collect()
}

fn format_row(row_num: usize, cells: &[Value]) -> String {
    let mut out = format!("<row r=\"{}\">", row_num);
    for (col, cell) in cells.iter().enumerate() {
        let r = format!("{}{}", col_letters(col), row_num);
        match cell {
            Value::Number(n) => {
                out.push_str(&format!("<c r=\"{}\"><v>{}</v></c>", r, n));
            }
            Value::String(s) => {
                out.push_str(&format!(
                    "<c r=\"{}\" t=\"inlineStr\"><is><t>{}</t></is></c>",
                    r,
                    xml_escape(s)
                ));
            }
            Value::Bool(b) => {
                out.push_str(&format!(
                    "<c r=\"{}\" t=\"b\"><v>{}</v></c>",
                    r,
                    if *b { 1 } else { 0 }
                ));
            }
            _ => {}
        }
    }
    out.push_str("</row>");
    out
}

fn col_letters(mut index: usize) -> String {
    let mut letters = Vec::new();
    loop {
        letters.push(b'A' + (index % 26) as u8);
        if index < 26 {
            break;
        }
        index = index / 26 - 1;
    }
    letters.reverse();
    String::from_utf8(letters).unwrap_or_default()
}

fn letters_to_col(reference: &str) -> Option<usize> {
    let mut col: usize = 0;
    let mut seen = false;
    for b in reference.bytes() {
        if b.is_ascii_uppercase() {
            col = col * 26 + (b - b'A') as usize + 1;
            seen = true;
        } else {
            break;
        }
    }
    if seen {
        Some(col - 1)
    } else {
        None
    }
}

fn row_number(reference: &str) -> Option<usize> {
    let digits: String = reference.chars().filter(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

// --- workbook reader ---

fn read_xlsx(path: &Path) -> anyhow::Result<Table> {
    let file = File::open(path)
        .with_context(|| format!("failed to open workbook {}", path.to_string_lossy()))?;
    let mut archive = ZipArchive::new(file).context("invalid workbook archive")?;

    let shared = match read_archive_entry(&mut archive, "xl/sharedStrings.xml")? {
        Some(xml) => parse_shared_strings(&xml),
        None => Vec::new(),
    };

    let sheet_entry = first_sheet_entry(&mut archive)
        .ok_or_else(|| anyhow!("workbook contains no worksheet"))?;
    let sheet_xml = read_archive_entry(&mut archive, &sheet_entry)?
        .ok_or_else(|| anyhow!("workbook contains no worksheet"))?;

    let grid = parse_sheet_cells(&sheet_xml, &shared)?;
    let Some(header) = grid.get(&1) else {
        return Ok(Table::default());
    };

    // Header text by column position; blank headers are not addressable.
    let mut columns: Vec<(usize, String)> = Vec::new();
    for (&col, value) in header {
        let text = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        if !text.is_empty() {
            columns.push((col, text));
        }
    }
    columns.sort_by_key(|(col, _)| *col);

    let mut rows = Vec::new();
    for (&row_num, cells) in &grid {
        if row_num == 1 {
            continue;
        }
        let mut row = Map::new();
        for (col, name) in &columns {
            if let Some(value) = cells.get(col) {
                row.insert(name.clone(), value.clone());
            }
        }
        if !row.is_empty() {
            rows.push(row);
        }
    }

    Ok(Table {
        columns: columns.into_iter().map(|(_, name)| name).collect(),
        rows,
    })
}

fn read_archive_entry(
    archive: &mut ZipArchive<File>,
    name: &str,
) -> anyhow::Result<Option<String>> {
    match archive.by_name(name) {
        Ok(mut entry) => {
            let mut text = String::new();
            entry
                .read_to_string(&mut text)
                .with_context(|| format!("failed to read archive entry {}", name))?;
            Ok(Some(text))
        }
        Err(zip::result::ZipError::FileNotFound) => Ok(None),
        Err(e) => Err(e).with_context(|| format!("failed to open archive entry {}", name)),
    }
}

fn first_sheet_entry(archive: &mut ZipArchive<File>) -> Option<String> {
    let mut names: Vec<String> = archive
        .file_names()
        .filter(|n| n.starts_with("xl/worksheets/") && n.ends_with(".xml"))
        .map(|n| n.to_string())
        .collect();
    names.sort();
    names.into_iter().next()
}

/// One string per `<si>` item; rich-text runs are concatenated.
fn parse_shared_strings(xml: &str) -> Vec<String> {
    xml.split("</si>")
        .filter(|chunk| chunk.contains("<si"))
        .map(|chunk| collect_tag_text(chunk, "t"))
        .collect()
}

/// Cell grid keyed by (row, column). BTreeMap keeps file order on iteration.
fn parse_sheet_cells(
    xml: &str,
    shared: &[String],
) -> anyhow::Result<BTreeMap<usize, BTreeMap<usize, Value>>> {
    let mut grid: BTreeMap<usize, BTreeMap<usize, Value>> = BTreeMap::new();

    let mut rest = xml;
    while let Some(start) = rest.find("<c ").or_else(|| rest.find("<c>")) {
        rest = &rest[start..];
        let tag_end = rest
            .find('>')
            .ok_or_else(|| anyhow!("unterminated cell tag"))?;
        let tag = &rest[..tag_end + 1];
        let self_closing = tag.ends_with("/>");

        let reference = attr_value(tag, "r").unwrap_or_default();
        let cell_type = attr_value(tag, "t").unwrap_or_default();

        let body = if self_closing {
            ""
        } else {
            let after = &rest[tag_end + 1..];
            let close = after
                .find("</c>")
                .ok_or_else(|| anyhow!("unterminated cell element"))?;
            &after[..close]
        };

        if let (Some(col), Some(row)) = (letters_to_col(&reference), row_number(&reference)) {
            if let Some(value) = cell_value(&cell_type, body, shared) {
                grid.entry(row).or_default().insert(col, value);
            }
        }

        rest = &rest[tag_end + 1..];
    }

    Ok(grid)
}

fn cell_value(cell_type: &str, body: &str, shared: &[String]) -> Option<Value> {
    match cell_type {
        "s" => {
            let idx: usize = collect_tag_text(body, "v").trim().parse().ok()?;
            shared.get(idx).map(|s| Value::String(s.clone()))
        }
        "inlineStr" => Some(Value::String(collect_tag_text(body, "t"))),
        "str" => Some(Value::String(collect_tag_text(body, "v"))),
        "b" => {
            let v = collect_tag_text(body, "v");
            Some(Value::Bool(v.trim() == "1"))
        }
        _ => {
            let text = collect_tag_text(body, "v");
            let trimmed = text.trim();
            if trimmed.is_empty() {
                return None;
            }
            let number: f64 = trimmed.parse().ok()?;
            serde_json::Number::from_f64(number).map(Value::Number)
        }
    }
}

/// Concatenated, unescaped text of every `<tag>` element in `xml`.
fn collect_tag_text(xml: &str, tag: &str) -> String {
    let open_exact = format!("<{}>", tag);
    let open_attr = format!("<{} ", tag);
    let close = format!("</{}>", tag);
    let mut out = String::new();

    let mut rest = xml;
    loop {
        let (start, skip) = match (rest.find(&open_exact), rest.find(&open_attr)) {
            (Some(a), Some(b)) if b < a => (b, 0),
            (Some(a), _) => (a, open_exact.len()),
            (None, Some(b)) => (b, 0),
            (None, None) => break,
        };
        rest = &rest[start..];
        let content_start = if skip > 0 {
            skip
        } else {
            // Attribute form; skip to the end of the opening tag.
            match rest.find('>') {
                Some(i) if rest[..i].ends_with('/') => {
                    rest = &rest[i + 1..];
                    continue;
                }
                Some(i) => i + 1,
                None => break,
            }
        };
        let after = &rest[content_start..];
        let Some(end) = after.find(&close) else {
            break;
        };
        out.push_str(&xml_unescape(&after[..end]));
        rest = &after[end + close.len()..];
    }
    out
}

fn attr_value(tag: &str, attr: &str) -> Option<String> {
    let needle = format!(" {}=\"", attr);
    let start = tag.find(&needle)? + needle.len();
    let end = tag[start..].find('"')? + start;
    Some(xml_unescape(&tag[start..end]))
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn xml_unescape(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

// --- csv ---

fn read_csv(path: &Path) -> anyhow::Result<Table> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read csv {}", path.to_string_lossy()))?;
    let mut lines = text.lines().filter(|l| !l.trim().is_empty());
    let Some(header_line) = lines.next() else {
        return Ok(Table::default());
    };
    let columns = parse_csv_record(header_line);

    let mut rows = Vec::new();
    for line in lines {
        let fields = parse_csv_record(line);
        let mut row = Map::new();
        for (i, field) in fields.iter().enumerate() {
            let Some(name) = columns.get(i) else {
                break;
            };
            if field.is_empty() {
                continue;
            }
            let value = match field.parse::<f64>() {
                Ok(n) => serde_json::Number::from_f64(n)
                    .map(Value::Number)
                    .unwrap_or_else(|| Value::String(field.clone())),
                Err(_) => Value::String(field.clone()),
            };
            row.insert(name.clone(), value);
        }
        if !row.is_empty() {
            rows.push(row);
        }
    }

    Ok(Table { columns, rows })
}

fn parse_csv_record(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' => {
                    if chars.peek() == Some(&'"') {
                        chars.next();
                        field.push('"');
                    } else {
                        in_quotes = false;
                    }
                }
                _ => field.push(c),
            }
        } else {
            match c {
                '"' => in_quotes = true,
                ',' => {
                    fields.push(std::mem::take(&mut field));
                }
                _ => field.push(c),
            }
        }
    }
    fields.push(field);
    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_file(name: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "ldtrack-sheet-{}",
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .expect("clock")
                .as_nanos()
        ));
        std::fs::create_dir_all(&dir).expect("create temp dir");
        dir.join(name)
    }

    #[test]
    fn xlsx_write_read_roundtrip() {
        let path = temp_file("grid.xlsx");
        let columns: Vec<String> = vec![
            "Name".into(),
            "EmpID".into(),
            "Email".into(),
            "Physics (Total: 50)".into(),
        ];
        let rows: Vec<Map<String, Value>> = vec![
            serde_json::from_value(json!({
                "Name": "Asha & Co", "EmpID": "E1",
                "Email": "asha@example.com", "Physics (Total: 50)": 40
            }))
            .unwrap(),
            serde_json::from_value(json!({
                "Name": "Ravi", "EmpID": "E2",
                "Email": "ravi@example.com", "Physics (Total: 50)": 0
            }))
            .unwrap(),
        ];

        write_xlsx(&path, "Performance Grid", &columns, &rows).unwrap();
        let table = read_table(&path).unwrap();

        assert_eq!(table.columns, columns);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(
            table.rows[0].get("Name").and_then(|v| v.as_str()),
            Some("Asha & Co")
        );
        assert_eq!(
            table.rows[0]
                .get("Physics (Total: 50)")
                .and_then(|v| v.as_f64()),
            Some(40.0)
        );
        assert_eq!(
            table.rows[1]
                .get("Physics (Total: 50)")
                .and_then(|v| v.as_f64()),
            Some(0.0)
        );
    }

    #[test]
    fn shared_string_cells_resolve() {
        let shared = vec!["Name".to_string(), "Asha".to_string()];
        let xml = r#"<sheetData>
            <row r="1"><c r="A1" t="s"><v>0</v></c></row>
            <row r="2"><c r="A2" t="s"><v>1</v></c><c r="B2"><v>12.5</v></c><c r="C2"/></row>
        </sheetData>"#;
        let grid = parse_sheet_cells(xml, &shared).unwrap();
        assert_eq!(grid[&1][&0], Value::String("Name".into()));
        assert_eq!(grid[&2][&0], Value::String("Asha".into()));
        assert_eq!(grid[&2][&1].as_f64(), Some(12.5));
        assert!(!grid[&2].contains_key(&2));
    }

    #[test]
    fn shared_strings_concatenate_rich_text_runs() {
        let xml = r#"<sst><si><t>plain</t></si><si><r><t>ri</t></r><r><t xml:space="preserve">ch</t></r></si></sst>"#;
        assert_eq!(parse_shared_strings(xml), vec!["plain", "rich"]);
    }

    #[test]
    fn csv_fallback_parses_quoted_fields_and_numbers() {
        let path = temp_file("roster.csv");
        std::fs::write(
            &path,
            "Name,Email,EmpID,Physics\n\"Shah, Asha\",asha@example.com,E1,40\nRavi,ravi@example.com,E2,\n",
        )
        .unwrap();

        let table = read_table(&path).unwrap();
        assert_eq!(table.columns, vec!["Name", "Email", "EmpID", "Physics"]);
        assert_eq!(
            table.rows[0].get("Name").and_then(|v| v.as_str()),
            Some("Shah, Asha")
        );
        assert_eq!(table.rows[0].get("Physics").and_then(|v| v.as_f64()), Some(40.0));
        // Blank cell stays absent instead of becoming zero.
        assert!(table.rows[1].get("Physics").is_none());
    }

    #[test]
    fn column_letters_roundtrip() {
        for idx in [0usize, 1, 25, 26, 27, 51, 52, 701, 702] {
            let letters = col_letters(idx);
            assert_eq!(letters_to_col(&format!("{}1", letters)), Some(idx));
        }
    }
}
