//! Minimal Office Open XML writer.
//!
//! An `.xlsx` file is a zip of XML parts. We emit only what a spreadsheet
//! application needs to open the file: content types, package and workbook
//! relationships, a one-style stylesheet, the workbook and one worksheet per
//! [`Sheet`]. Every cell is an inline string so no shared-string table is
//! required, and values stay exactly as the model printed them.

use super::{Sheet, Workbook};
use crate::error::Pdf2XlsxError;
use once_cell::sync::Lazy;
use quick_xml::escape::escape;
use regex::Regex;
use std::fmt::Write as _;
use std::io::{Cursor, Seek, Write};
use std::path::Path;
use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Excel refuses cells longer than this.
const MAX_CELL_CHARS: usize = 32_767;

const XML_DECL: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#;
const NS_MAIN: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
const NS_REL: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const NS_PKG_REL: &str = "http://schemas.openxmlformats.org/package/2006/relationships";

/// Control characters XML 1.0 cannot carry, even escaped.
static ILLEGAL_XML_CHARS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[\x00-\x08\x0B\x0C\x0E-\x1F\x{FFFE}\x{FFFF}]").expect("valid xml-char regex")
});

impl Workbook {
    /// Encode into any seekable sink.
    pub fn write_to<W: Write + Seek>(&self, sink: W) -> Result<W, Pdf2XlsxError> {
        if self.sheets.is_empty() {
            return Err(Pdf2XlsxError::EmptyWorkbook);
        }

        let mut zip = ZipWriter::new(sink);
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        add_part(&mut zip, options, "[Content_Types].xml", &content_types(self.sheets.len()))?;
        add_part(&mut zip, options, "_rels/.rels", &package_rels())?;
        add_part(&mut zip, options, "xl/workbook.xml", &workbook_xml(&self.sheets))?;
        add_part(
            &mut zip,
            options,
            "xl/_rels/workbook.xml.rels",
            &workbook_rels(self.sheets.len()),
        )?;
        add_part(&mut zip, options, "xl/styles.xml", STYLES_XML)?;
        for (i, sheet) in self.sheets.iter().enumerate() {
            let name = format!("xl/worksheets/sheet{}.xml", i + 1);
            add_part(&mut zip, options, &name, &worksheet_xml(sheet))?;
        }

        zip.finish().map_err(|e| Pdf2XlsxError::WorkbookEncoding(e.to_string()))
    }

    /// Encode into a byte buffer.
    pub fn to_bytes(&self) -> Result<Vec<u8>, Pdf2XlsxError> {
        Ok(self.write_to(Cursor::new(Vec::new()))?.into_inner())
    }

    /// Write to `path`, creating parent directories.
    ///
    /// The bytes go to a sibling temp file first and are renamed into place,
    /// so a failed run never leaves a truncated workbook behind.
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<(), Pdf2XlsxError> {
        let path = path.as_ref();
        let bytes = self.to_bytes()?;
        let write_err = |source| Pdf2XlsxError::OutputWriteFailed {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
        }

        let tmp_path = path.with_extension("xlsx.tmp");
        let written = match tokio::fs::write(&tmp_path, &bytes).await {
            Ok(()) => tokio::fs::rename(&tmp_path, path).await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(write_err(e));
        }

        debug!("Wrote {} bytes to {}", bytes.len(), path.display());
        Ok(())
    }
}

fn add_part<W: Write + Seek>(
    zip: &mut ZipWriter<W>,
    options: SimpleFileOptions,
    name: &str,
    body: &str,
) -> Result<(), Pdf2XlsxError> {
    zip.start_file(name, options)
        .map_err(|e| Pdf2XlsxError::WorkbookEncoding(format!("{name}: {e}")))?;
    zip.write_all(body.as_bytes())
        .map_err(|e| Pdf2XlsxError::WorkbookEncoding(format!("{name}: {e}")))
}

fn content_types(sheet_count: usize) -> String {
    let mut xml = String::new();
    xml.push_str(XML_DECL);
    xml.push_str(
        r#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">"#,
    );
    xml.push_str(
        r#"<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>"#,
    );
    xml.push_str(r#"<Default Extension="xml" ContentType="application/xml"/>"#);
    xml.push_str(
        r#"<Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/>"#,
    );
    xml.push_str(
        r#"<Override PartName="/xl/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml"/>"#,
    );
    for i in 1..=sheet_count {
        let _ = write!(
            xml,
            r#"<Override PartName="/xl/worksheets/sheet{i}.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>"#
        );
    }
    xml.push_str("</Types>");
    xml
}

fn package_rels() -> String {
    format!(
        r#"{XML_DECL}<Relationships xmlns="{NS_PKG_REL}"><Relationship Id="rId1" Type="{NS_REL}/officeDocument" Target="xl/workbook.xml"/></Relationships>"#
    )
}

fn workbook_xml(sheets: &[Sheet]) -> String {
    let mut xml = format!(r#"{XML_DECL}<workbook xmlns="{NS_MAIN}" xmlns:r="{NS_REL}"><sheets>"#);
    for (i, sheet) in sheets.iter().enumerate() {
        let _ = write!(
            xml,
            r#"<sheet name="{}" sheetId="{}" r:id="rId{}"/>"#,
            xml_text(&sheet.name),
            i + 1,
            i + 1
        );
    }
    xml.push_str("</sheets></workbook>");
    xml
}

/// Worksheets are `rId1..=rIdN`; the stylesheet follows them.
fn workbook_rels(sheet_count: usize) -> String {
    let mut xml = format!(r#"{XML_DECL}<Relationships xmlns="{NS_PKG_REL}">"#);
    for i in 1..=sheet_count {
        let _ = write!(
            xml,
            r#"<Relationship Id="rId{i}" Type="{NS_REL}/worksheet" Target="worksheets/sheet{i}.xml"/>"#
        );
    }
    let _ = write!(
        xml,
        r#"<Relationship Id="rId{}" Type="{NS_REL}/styles" Target="styles.xml"/>"#,
        sheet_count + 1
    );
    xml.push_str("</Relationships>");
    xml
}

const STYLES_XML: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
    r#"<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">"#,
    r#"<fonts count="1"><font><sz val="11"/><name val="Calibri"/></font></fonts>"#,
    r#"<fills count="2"><fill><patternFill patternType="none"/></fill><fill><patternFill patternType="gray125"/></fill></fills>"#,
    r#"<borders count="1"><border><left/><right/><top/><bottom/><diagonal/></border></borders>"#,
    r#"<cellStyleXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0"/></cellStyleXfs>"#,
    r#"<cellXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0" xfId="0"/></cellXfs>"#,
    r#"<cellStyles count="1"><cellStyle name="Normal" xfId="0" builtinId="0"/></cellStyles>"#,
    r#"</styleSheet>"#
);

fn worksheet_xml(sheet: &Sheet) -> String {
    let mut xml = format!(r#"{XML_DECL}<worksheet xmlns="{NS_MAIN}">"#);

    if !sheet.column_widths.is_empty() {
        xml.push_str("<cols>");
        for (i, width) in sheet.column_widths.iter().enumerate() {
            let _ = write!(
                xml,
                r#"<col min="{n}" max="{n}" width="{width}" customWidth="1"/>"#,
                n = i + 1
            );
        }
        xml.push_str("</cols>");
    }

    xml.push_str("<sheetData>");
    push_row(&mut xml, 1, &sheet.columns);
    for (i, row) in sheet.rows.iter().enumerate() {
        push_row(&mut xml, i + 2, row);
    }
    xml.push_str("</sheetData></worksheet>");
    xml
}

fn push_row(xml: &mut String, row_num: usize, values: &[String]) {
    let _ = write!(xml, r#"<row r="{row_num}">"#);
    for (col, value) in values.iter().enumerate() {
        // Absent cells read back as blank; no need to store them.
        if value.is_empty() {
            continue;
        }
        let text = xml_text(value);
        let space = if text.trim() != text { r#" xml:space="preserve""# } else { "" };
        let _ = write!(
            xml,
            r#"<c r="{}{row_num}" t="inlineStr"><is><t{space}>{text}</t></is></c>"#,
            column_letters(col)
        );
    }
    xml.push_str("</row>");
}

/// Escaped text with XML-illegal characters removed and Excel's cell
/// length limit applied.
fn xml_text(value: &str) -> String {
    let legal = ILLEGAL_XML_CHARS.replace_all(value, "");
    let capped: String = if legal.chars().count() > MAX_CELL_CHARS {
        legal.chars().take(MAX_CELL_CHARS).collect()
    } else {
        legal.into_owned()
    };
    escape(capped.as_str()).into_owned()
}

/// Zero-based column index → `A`, `B`, … `Z`, `AA`, …
fn column_letters(index: usize) -> String {
    let mut n = index + 1;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push(b'A' + rem as u8);
        n = (n - 1) / 26;
    }
    letters.reverse();
    String::from_utf8_lossy(&letters).into_owned()
}
