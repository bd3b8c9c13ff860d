//! Single-sheet `.xlsx` workbooks for the export button and upload intake.
//!
//! Workbooks are written with inline strings so no shared-string table is
//! needed. The reader also understands shared strings, which is what
//! spreadsheet applications produce when they save a file.

use anyhow::{anyhow, Context};
use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Seek, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use super::record::format_number;
use super::{CellValue, Record};

const CONTENT_TYPES_ENTRY: &str = "[Content_Types].xml";
const ROOT_RELS_ENTRY: &str = "_rels/.rels";
const CORE_PROPS_ENTRY: &str = "docProps/core.xml";
const WORKBOOK_ENTRY: &str = "xl/workbook.xml";
const WORKBOOK_RELS_ENTRY: &str = "xl/_rels/workbook.xml.rels";
const STYLES_ENTRY: &str = "xl/styles.xml";
const SHARED_STRINGS_ENTRY: &str = "xl/sharedStrings.xml";
const XLSX_SHEET_ENTRY: &str = "xl/worksheets/sheet1.xml";
const MAX_COLUMNS: usize = 16_384;

const MAX_SHEET_NAME: usize = 31;

#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub path: PathBuf,
    pub sheet_name: String,
    pub rows_exported: usize,
    pub columns: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ImportSummary {
    pub records: Vec<Record>,
    pub unmapped_headers: Vec<String>,
    pub rows_skipped: usize,
}

/// `<ReportName>_Export.xlsx`
pub fn export_file_name(report_name: &str) -> String {
    format!("{}_Export.xlsx", report_name)
}

/// Writes `records` projected through `columns` (field, header) as a
/// one-sheet workbook at `out_path`.
pub fn export_xlsx<'a, I>(
    records: I,
    columns: &[(&str, &str)],
    sheet_name: &str,
    out_path: &Path,
) -> anyhow::Result<ExportSummary>
where
    I: IntoIterator<Item = &'a Record>,
{
    if columns.is_empty() {
        return Err(anyhow!("export needs at least one column"));
    }
    let sheet_name = sanitize_sheet_name(sheet_name);

    if let Some(parent) = out_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create directory {}", parent.to_string_lossy())
            })?;
        }
    }

    let (sheet_xml, rows_exported) = sheet_xml(records, columns);

    let out_file = File::create(out_path).with_context(|| {
        format!(
            "failed to create output file {}",
            out_path.to_string_lossy()
        )
    })?;
    let mut zip = ZipWriter::new(out_file);
    let opts = FileOptions::default().compression_method(CompressionMethod::Deflated);

    let entries: [(&str, String); 7] = [
        (CONTENT_TYPES_ENTRY, content_types_xml()),
        (ROOT_RELS_ENTRY, root_rels_xml()),
        (CORE_PROPS_ENTRY, core_props_xml()),
        (WORKBOOK_ENTRY, workbook_xml(&sheet_name)),
        (WORKBOOK_RELS_ENTRY, workbook_rels_xml()),
        (STYLES_ENTRY, styles_xml()),
        (XLSX_SHEET_ENTRY, sheet_xml),
    ];
    for (name, body) in entries.iter() {
        zip.start_file(*name, opts)
            .with_context(|| format!("failed to start {} entry", name))?;
        zip.write_all(body.as_bytes())
            .with_context(|| format!("failed to write {} entry", name))?;
    }
    zip.finish().context("failed to finalize workbook")?;

    Ok(ExportSummary {
        path: out_path.to_path_buf(),
        sheet_name,
        rows_exported,
        columns: columns.iter().map(|(_, h)| h.to_string()).collect(),
    })
}

/// Reads the first worksheet of `in_path`. The first row is the header row;
/// headers are mapped back to field names through `columns`, unknown headers
/// are reported and their cells dropped. Every other non-empty row becomes a
/// record with a fresh id.
pub fn import_xlsx(in_path: &Path, columns: &[(&str, &str)]) -> anyhow::Result<ImportSummary> {
    let in_file = File::open(in_path)
        .with_context(|| format!("failed to open workbook {}", in_path.to_string_lossy()))?;
    let mut archive = ZipArchive::new(in_file).context("not an xlsx workbook (invalid zip)")?;

    let shared = match read_entry(&mut archive, SHARED_STRINGS_ENTRY)? {
        Some(xml) => parse_shared_strings(&xml),
        None => Vec::new(),
    };
    let sheet_name = first_sheet_entry(&mut archive)
        .ok_or_else(|| anyhow!("workbook has no worksheets"))?;
    let sheet = read_entry(&mut archive, &sheet_name)?
        .ok_or_else(|| anyhow!("workbook missing {}", sheet_name))?;

    let rows = parse_sheet_rows(&sheet, &shared);
    let mut rows = rows.into_iter();
    let Some(header_row) = rows.next() else {
        return Ok(ImportSummary {
            records: Vec::new(),
            unmapped_headers: Vec::new(),
            rows_skipped: 0,
        });
    };

    let by_header: HashMap<String, &str> = columns
        .iter()
        .map(|(field, header)| (header.trim().to_lowercase(), *field))
        .collect();

    let mut field_at: Vec<Option<&str>> = Vec::new();
    let mut unmapped_headers = Vec::new();
    for cell in header_row {
        let header = cell.map(|c| c.display()).unwrap_or_default();
        let field = by_header.get(&header.trim().to_lowercase()).copied();
        if field.is_none() && !header.trim().is_empty() {
            unmapped_headers.push(header);
        }
        field_at.push(field);
    }

    let mut records = Vec::new();
    let mut rows_skipped = 0usize;
    for row in rows {
        let mut record = Record::new(Uuid::new_v4().to_string());
        for (idx, cell) in row.into_iter().enumerate() {
            let (Some(Some(field)), Some(value)) = (field_at.get(idx), cell) else {
                continue;
            };
            if value.is_blank() {
                continue;
            }
            record.set(field, value);
        }
        if record.fields.is_empty() {
            rows_skipped += 1;
            continue;
        }
        records.push(record);
    }

    Ok(ImportSummary {
        records,
        unmapped_headers,
        rows_skipped,
    })
}

fn sanitize_sheet_name(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| match c {
            '[' | ']' | ':' | '*' | '?' | '/' | '\\' => '_',
            c => c,
        })
        .take(MAX_SHEET_NAME)
        .collect();
    let cleaned = cleaned.trim().trim_matches('\'').to_string();
    if cleaned.is_empty() {
        "Sheet1".to_string()
    } else {
        cleaned
    }
}

/// Spreadsheet column letters: 0 -> A, 25 -> Z, 26 -> AA.
fn column_letters(mut idx: usize) -> String {
    let mut out = Vec::new();
    loop {
        out.push(b'A' + (idx % 26) as u8);
        if idx < 26 {
            break;
        }
        idx = idx / 26 - 1;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

/// Zero-based column of a cell reference such as `AB12`. References past the
/// last worksheet column (`XFD`) are treated as missing.
fn column_index(cell_ref: &str) -> Option<usize> {
    let mut n = 0usize;
    let mut seen = false;
    for c in cell_ref.chars().take_while(|c| c.is_ascii_alphabetic()) {
        let digit = (c.to_ascii_uppercase() as u8 - b'A') as usize + 1;
        n = n.checked_mul(26)?.checked_add(digit)?;
        if n > MAX_COLUMNS {
            return None;
        }
        seen = true;
    }
    seen.then(|| n - 1)
}

fn xml_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            // Control characters other than tab/newline are not legal XML 1.0.
            c if (c as u32) < 0x20 && c != '\t' && c != '\n' && c != '\r' => {}
            c => out.push(c),
        }
    }
    out
}

fn xml_unescape(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(pos) = rest.find('&') {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];
        let Some(end) = tail.find(';') else {
            out.push_str(tail);
            return out;
        };
        let entity = &tail[1..end];
        let decoded = match entity {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            e if e.starts_with("#x") || e.starts_with("#X") => {
                u32::from_str_radix(&e[2..], 16).ok().and_then(char::from_u32)
            }
            e if e.starts_with('#') => e[1..].parse::<u32>().ok().and_then(char::from_u32),
            _ => None,
        };
        match decoded {
            Some(c) => out.push(c),
            None => out.push_str(&tail[..=end]),
        }
        rest = &tail[end + 1..];
    }
    out.push_str(rest);
    out
}

fn sheet_xml<'a, I>(records: I, columns: &[(&str, &str)]) -> (String, usize)
where
    I: IntoIterator<Item = &'a Record>,
{
    let mut xml = String::from(
        "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n\
         <worksheet xmlns=\"http://schemas.openxmlformats.org/spreadsheetml/2006/main\"><sheetData>",
    );

    xml.push_str("<row r=\"1\">");
    for (col, (_, header)) in columns.iter().enumerate() {
        push_text_cell(&mut xml, &format!("{}1", column_letters(col)), header);
    }
    xml.push_str("</row>");

    let mut rows = 0usize;
    for record in records {
        rows += 1;
        let row_no = rows + 1;
        xml.push_str(&format!("<row r=\"{}\">", row_no));
        for (col, (field, _)) in columns.iter().enumerate() {
            let cell_ref = format!("{}{}", column_letters(col), row_no);
            match record.get(field) {
                Some(CellValue::Number(v)) if v.is_finite() => {
                    xml.push_str(&format!(
                        "<c r=\"{}\"><v>{}</v></c>",
                        cell_ref,
                        format_number(*v)
                    ));
                }
                Some(other) => push_text_cell(&mut xml, &cell_ref, &other.display()),
                None => {}
            }
        }
        xml.push_str("</row>");
    }
    xml.push_str("</sheetData></worksheet>");
    (xml, rows)
}

fn push_text_cell(xml: &mut String, cell_ref: &str, text: &str) {
    xml.push_str(&format!(
        "<c r=\"{}\" t=\"inlineStr\"><is><t xml:space=\"preserve\">{}</t></is></c>",
        cell_ref,
        xml_escape(text)
    ));
}

fn content_types_xml() -> String {
    concat!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n",
        "<Types xmlns=\"http://schemas.openxmlformats.org/package/2006/content-types\">",
        "<Default Extension=\"rels\" ContentType=\"application/vnd.openxmlformats-package.relationships+xml\"/>",
        "<Default Extension=\"xml\" ContentType=\"application/xml\"/>",
        "<Override PartName=\"/xl/workbook.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml\"/>",
        "<Override PartName=\"/xl/worksheets/sheet1.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml\"/>",
        "<Override PartName=\"/xl/styles.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml\"/>",
        "<Override PartName=\"/docProps/core.xml\" ContentType=\"application/vnd.openxmlformats-package.core-properties+xml\"/>",
        "</Types>"
    )
    .to_string()
}

fn root_rels_xml() -> String {
    concat!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n",
        "<Relationships xmlns=\"http://schemas.openxmlformats.org/package/2006/relationships\">",
        "<Relationship Id=\"rId1\" Type=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument\" Target=\"xl/workbook.xml\"/>",
        "<Relationship Id=\"rId2\" Type=\"http://schemas.openxmlformats.org/package/2006/relationships/metadata/core-properties\" Target=\"docProps/core.xml\"/>",
        "</Relationships>"
    )
    .to_string()
}

fn core_props_xml() -> String {
    let created = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n\
         <cp:coreProperties xmlns:cp=\"http://schemas.openxmlformats.org/package/2006/metadata/core-properties\" \
         xmlns:dc=\"http://purl.org/dc/elements/1.1/\" xmlns:dcterms=\"http://purl.org/dc/terms/\" \
         xmlns:xsi=\"http://www.w3.org/2001/XMLSchema-instance\">\
         <dc:creator>reassessd {}</dc:creator>\
         <dcterms:created xsi:type=\"dcterms:W3CDTF\">{}</dcterms:created>\
         </cp:coreProperties>",
        env!("CARGO_PKG_VERSION"),
        created
    )
}

fn workbook_xml(sheet_name: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n\
         <workbook xmlns=\"http://schemas.openxmlformats.org/spreadsheetml/2006/main\" \
         xmlns:r=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships\">\
         <sheets><sheet name=\"{}\" sheetId=\"1\" r:id=\"rId1\"/></sheets></workbook>",
        xml_escape(sheet_name)
    )
}

fn workbook_rels_xml() -> String {
    concat!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n",
        "<Relationships xmlns=\"http://schemas.openxmlformats.org/package/2006/relationships\">",
        "<Relationship Id=\"rId1\" Type=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet\" Target=\"worksheets/sheet1.xml\"/>",
        "<Relationship Id=\"rId2\" Type=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles\" Target=\"styles.xml\"/>",
        "</Relationships>"
    )
    .to_string()
}

fn styles_xml() -> String {
    concat!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n",
        "<styleSheet xmlns=\"http://schemas.openxmlformats.org/spreadsheetml/2006/main\">",
        "<fonts count=\"1\"><font><sz val=\"11\"/><name val=\"Calibri\"/></font></fonts>",
        "<fills count=\"2\"><fill><patternFill patternType=\"none\"/></fill><fill><patternFill patternType=\"gray125\"/></fill></fills>",
        "<borders count=\"1\"><border><left/><right/><top/><bottom/><diagonal/></border></borders>",
        "<cellStyleXfs count=\"1\"><xf numFmtId=\"0\" fontId=\"0\" fillId=\"0\" borderId=\"0\"/></cellStyleXfs>",
        "<cellXfs count=\"1\"><xf numFmtId=\"0\" fontId=\"0\" fillId=\"0\" borderId=\"0\" xfId=\"0\"/></cellXfs>",
        "</styleSheet>"
    )
    .to_string()
}

fn read_entry<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
) -> anyhow::Result<Option<String>> {
    let mut f = match archive.by_name(name) {
        Ok(f) => f,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("failed to open {}", name)),
    };
    let mut text = String::new();
    f.read_to_string(&mut text)
        .with_context(|| format!("failed to read {}", name))?;
    Ok(Some(text))
}

/// Conventional first sheet, else the lexically first worksheet part.
fn first_sheet_entry<R: Read + Seek>(archive: &mut ZipArchive<R>) -> Option<String> {
    let mut sheets: Vec<String> = archive
        .file_names()
        .filter(|n| n.starts_with("xl/worksheets/") && n.ends_with(".xml"))
        .map(|n| n.to_string())
        .collect();
    if sheets.iter().any(|n| n == XLSX_SHEET_ENTRY) {
        return Some(XLSX_SHEET_ENTRY.to_string());
    }
    sheets.sort();
    sheets.into_iter().next()
}

struct Element<'a> {
    attrs: &'a str,
    inner: Option<&'a str>,
}

/// Non-nesting scan for `<tag ...>inner</tag>` and `<tag .../>`.
fn elements<'a>(xml: &'a str, tag: &str) -> Vec<Element<'a>> {
    let open = format!("<{}", tag);
    let close = format!("</{}>", tag);
    let mut out = Vec::new();
    let mut pos = 0usize;
    while let Some(found) = xml[pos..].find(&open) {
        let start = pos + found;
        let after = start + open.len();
        match xml[after..].chars().next() {
            Some(c) if c == '>' || c == '/' || c.is_whitespace() => {}
            _ => {
                pos = after;
                continue;
            }
        }
        let Some(gt) = xml[after..].find('>') else {
            break;
        };
        let tag_end = after + gt;
        if xml[..tag_end].ends_with('/') {
            out.push(Element {
                attrs: &xml[after..tag_end - 1],
                inner: None,
            });
            pos = tag_end + 1;
            continue;
        }
        let body_start = tag_end + 1;
        let Some(end) = xml[body_start..].find(&close) else {
            break;
        };
        out.push(Element {
            attrs: &xml[after..tag_end],
            inner: Some(&xml[body_start..body_start + end]),
        });
        pos = body_start + end + close.len();
    }
    out
}

fn attr<'a>(attrs: &'a str, name: &str) -> Option<&'a str> {
    let needle = format!("{}=\"", name);
    let mut pos = 0usize;
    while let Some(found) = attrs[pos..].find(&needle) {
        let start = pos + found;
        let boundary = start == 0
            || attrs[..start]
                .chars()
                .last()
                .map(|c| c.is_whitespace())
                .unwrap_or(true);
        let value_start = start + needle.len();
        if boundary {
            let end = attrs[value_start..].find('"')?;
            return Some(&attrs[value_start..value_start + end]);
        }
        pos = value_start;
    }
    None
}

/// Concatenated `<t>` runs, covering both plain and rich-text strings.
fn text_runs(xml: &str) -> String {
    elements(xml, "t")
        .into_iter()
        .filter_map(|e| e.inner)
        .map(xml_unescape)
        .collect()
}

fn parse_shared_strings(xml: &str) -> Vec<String> {
    elements(xml, "si")
        .into_iter()
        .map(|e| e.inner.map(text_runs).unwrap_or_default())
        .collect()
}

fn parse_sheet_rows(xml: &str, shared: &[String]) -> Vec<Vec<Option<CellValue>>> {
    let mut rows = Vec::new();
    for row in elements(xml, "row") {
        let Some(body) = row.inner else {
            rows.push(Vec::new());
            continue;
        };
        let mut cells: Vec<Option<CellValue>> = Vec::new();
        for cell in elements(body, "c") {
            let idx = attr(cell.attrs, "r")
                .and_then(column_index)
                .unwrap_or(cells.len());
            let value = cell.inner.and_then(|inner| cell_value(cell.attrs, inner, shared));
            if cells.len() <= idx {
                cells.resize(idx + 1, None);
            }
            cells[idx] = value;
        }
        rows.push(cells);
    }
    rows
}

fn cell_value(attrs: &str, inner: &str, shared: &[String]) -> Option<CellValue> {
    let raw_v = || {
        elements(inner, "v")
            .into_iter()
            .next()
            .and_then(|e| e.inner)
            .map(xml_unescape)
    };
    match attr(attrs, "t") {
        Some("inlineStr") => Some(CellValue::Text(
            elements(inner, "is")
                .into_iter()
                .next()
                .and_then(|e| e.inner)
                .map(text_runs)
                .unwrap_or_default(),
        )),
        Some("s") => {
            let idx = raw_v()?.trim().parse::<usize>().ok()?;
            shared.get(idx).cloned().map(CellValue::Text)
        }
        Some("str") | Some("b") | Some("e") => raw_v().map(CellValue::Text),
        _ => {
            let v = raw_v()?;
            match v.trim().parse::<f64>() {
                Ok(n) => Some(CellValue::Number(n)),
                Err(_) => Some(CellValue::Text(v)),
            }
        }
    }
}
