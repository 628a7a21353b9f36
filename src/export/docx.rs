//! Word export by filling a `.docx` template.
//!
//! Template syntax, written as plain text in the document:
//!
//! - `{buyer.name}` is replaced by the value (dotted paths reach nested fields),
//! - `{#items}` … `{/items}` repeats the enclosing table row (or paragraph) once per
//!   element of the `items` list,
//! - `{%qr_code}` on its own run is replaced by an embedded PNG.
//!
//! Word often splits typed text over several runs, so every paragraph that contains a
//! `{` is first collapsed into a single run. Braces inside substituted values are kept
//! out of later passes and restored once the document is filled.

use std::collections::BTreeMap;
use std::io::{Cursor, Read, Write};
use std::path::Path;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use super::qr::PngImage;
use crate::error::{Error, Result};

const DOCUMENT_PART: &str = "word/document.xml";
const DOCUMENT_RELS_PART: &str = "word/_rels/document.xml.rels";
const CONTENT_TYPES_PART: &str = "[Content_Types].xml";

const IMAGE_REL_TYPE: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/image";
const NS_R: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const NS_WP: &str = "http://schemas.openxmlformats.org/drawingml/2006/wordprocessingDrawing";

// Stand-ins for braces coming from data, restored after the last pass.
const GUARDED_OPEN: char = '\u{E000}';
const GUARDED_CLOSE: char = '\u{E001}';

/// Printed width of embedded images: 3 cm in EMU.
const IMAGE_WIDTH_EMU: u64 = 1_080_000;

const DEFAULT_CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/></Types>"#;

const DEFAULT_PACKAGE_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/></Relationships>"#;

const DEFAULT_DOCUMENT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"></Relationships>"#;

static PARAGRAPH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<w:p(?:\s[^>]*)?>.*?</w:p>").expect("static regex"));
static TEXT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<w:t(?:\s[^>]*)?>(.*?)</w:t>").expect("static regex"));
static LOOP_OPEN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{#([\w.]+)\}").expect("static regex"));
static IMAGE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{%([\w.]+)\}").expect("static regex"));
static FIELD_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{([\w.]+)\}").expect("static regex"));

/// Values a template can reference, flattened from any serializable view-model.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TemplateData {
    pub fields: BTreeMap<String, String>,
    pub loops: BTreeMap<String, Vec<BTreeMap<String, String>>>,
    pub images: BTreeMap<String, PngImage>,
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn flatten_into(prefix: &str, value: &Value, fields: &mut BTreeMap<String, String>) {
    match value {
        Value::Object(map) => {
            for (key, inner) in map {
                let path = if prefix.is_empty() { key.clone() } else { format!("{prefix}.{key}") };
                flatten_into(&path, inner, fields);
            }
        }
        Value::Array(_) => {}
        scalar => {
            fields.insert(prefix.to_string(), scalar_text(scalar));
        }
    }
}

fn collect_loops(prefix: &str, value: &Value, loops: &mut BTreeMap<String, Vec<BTreeMap<String, String>>>) {
    match value {
        Value::Object(map) => {
            for (key, inner) in map {
                let path = if prefix.is_empty() { key.clone() } else { format!("{prefix}.{key}") };
                collect_loops(&path, inner, loops);
            }
        }
        Value::Array(elements) => {
            let rows = elements
                .iter()
                .map(|element| {
                    let mut row = BTreeMap::new();
                    match element {
                        Value::Object(_) => flatten_into("", element, &mut row),
                        scalar => {
                            row.insert("value".to_string(), scalar_text(scalar));
                        }
                    }
                    row
                })
                .collect();
            loops.insert(prefix.to_string(), rows);
        }
        _ => {}
    }
}

impl TemplateData {
    pub fn from_serialize<T: Serialize>(data: &T) -> Result<Self> {
        let value = serde_json::to_value(data)?;
        let mut fields = BTreeMap::new();
        let mut loops = BTreeMap::new();
        flatten_into("", &value, &mut fields);
        collect_loops("", &value, &mut loops);
        Ok(Self { fields, loops, images: BTreeMap::new() })
    }

    pub fn with_image(mut self, name: &str, image: PngImage) -> Self {
        self.images.insert(name.to_string(), image);
        self
    }
}

pub fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}

/// Escapes a value for insertion so that no later pass reads it as template syntax.
fn guard_value(text: &str) -> String {
    escape_xml(text).replace('{', &GUARDED_OPEN.to_string()).replace('}', &GUARDED_CLOSE.to_string())
}

fn restore_braces(xml: &str) -> String {
    xml.replace(GUARDED_OPEN, "{").replace(GUARDED_CLOSE, "}")
}

fn unescape_xml(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Collapses the text of each placeholder-bearing paragraph into its first `<w:t>`.
fn merge_split_runs(xml: &str) -> String {
    PARAGRAPH_RE
        .replace_all(xml, |caps: &Captures| {
            let paragraph = &caps[0];
            let texts: Vec<String> = TEXT_RE.captures_iter(paragraph).map(|c| unescape_xml(&c[1])).collect();
            let joined: String = texts.concat();
            if texts.len() < 2 || !joined.contains('{') {
                return paragraph.to_string();
            }
            let mut first = true;
            TEXT_RE
                .replace_all(paragraph, |_: &Captures| {
                    if first {
                        first = false;
                        format!(r#"<w:t xml:space="preserve">{}</w:t>"#, escape_xml(&joined))
                    } else {
                        "<w:t></w:t>".to_string()
                    }
                })
                .into_owned()
        })
        .into_owned()
}

/// Start of the innermost still-open `tag` element before `pos`.
fn open_element_start(xml: &str, pos: usize, tag: &str) -> Option<usize> {
    let head = &xml[..pos];
    let plain = head.rfind(&format!("<{tag}>"));
    let with_attrs = head.rfind(&format!("<{tag} "));
    let start = plain.max(with_attrs)?;
    let closed_between = xml[start..pos].contains(&format!("</{tag}>"));
    (!closed_between).then_some(start)
}

fn element_end(xml: &str, pos: usize, tag: &str) -> Option<usize> {
    let close = format!("</{tag}>");
    xml[pos..].find(&close).map(|i| pos + i + close.len())
}

fn substitute_fields(xml: &str, primary: &BTreeMap<String, String>, fallback: &BTreeMap<String, String>) -> String {
    FIELD_RE
        .replace_all(xml, |caps: &Captures| {
            let key = &caps[1];
            let value = primary.get(key).or_else(|| fallback.get(key));
            if value.is_none() {
                debug!(placeholder = key, "No value for placeholder");
            }
            guard_value(value.map(String::as_str).unwrap_or(""))
        })
        .into_owned()
}

fn expand_loops(xml: &str, data: &TemplateData) -> Result<String> {
    let mut xml = xml.to_string();
    while let Some(caps) = LOOP_OPEN_RE.captures(&xml) {
        let whole = caps.get(0).map(|m| (m.start(), m.end())).unwrap_or_default();
        let name = caps[1].to_string();
        let close_tag = format!("{{/{name}}}");
        let close_pos = xml[whole.1..]
            .find(&close_tag)
            .map(|i| whole.1 + i)
            .ok_or_else(|| Error::validation(format!("Template loop {{#{name}}} is never closed")))?;

        let (start, end) = match open_element_start(&xml, whole.0, "w:tr") {
            Some(start) => (start, element_end(&xml, close_pos, "w:tr")),
            None => (
                open_element_start(&xml, whole.0, "w:p").unwrap_or(whole.0),
                element_end(&xml, close_pos, "w:p"),
            ),
        };
        let end = end.unwrap_or(close_pos + close_tag.len());

        let body = xml[start..end]
            .replacen(&format!("{{#{name}}}"), "", 1)
            .replacen(&close_tag, "", 1);
        let rows = data.loops.get(&name).map(Vec::as_slice).unwrap_or(&[]);
        let expanded: String = rows
            .iter()
            .map(|row| substitute_fields(&body, row, &data.fields))
            .collect();
        debug!(loop_name = %name, rows = rows.len(), "Expanded template loop");
        xml.replace_range(start..end, &expanded);
    }
    Ok(xml)
}

struct EmbeddedImage {
    rel_id: String,
    target: String,
    bytes: Vec<u8>,
}

fn drawing_run(rel_id: &str, name: &str, doc_pr_id: usize, image: &PngImage) -> String {
    let cx = IMAGE_WIDTH_EMU;
    let cy = if image.width == 0 { cx } else { cx * u64::from(image.height) / u64::from(image.width) };
    format!(
        concat!(
            r#"<w:r><w:drawing><wp:inline distT="0" distB="0" distL="0" distR="0">"#,
            r#"<wp:extent cx="{cx}" cy="{cy}"/><wp:docPr id="{id}" name="{name}"/>"#,
            r#"<a:graphic xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main">"#,
            r#"<a:graphicData uri="http://schemas.openxmlformats.org/drawingml/2006/picture">"#,
            r#"<pic:pic xmlns:pic="http://schemas.openxmlformats.org/drawingml/2006/picture">"#,
            r#"<pic:nvPicPr><pic:cNvPr id="0" name="{name}.png"/><pic:cNvPicPr/></pic:nvPicPr>"#,
            r#"<pic:blipFill><a:blip r:embed="{rel}"/><a:stretch><a:fillRect/></a:stretch></pic:blipFill>"#,
            r#"<pic:spPr><a:xfrm><a:off x="0" y="0"/><a:ext cx="{cx}" cy="{cy}"/></a:xfrm>"#,
            r#"<a:prstGeom prst="rect"><a:avLst/></a:prstGeom></pic:spPr></pic:pic>"#,
            r#"</a:graphicData></a:graphic></wp:inline></w:drawing></w:r>"#
        ),
        cx = cx,
        cy = cy,
        id = doc_pr_id,
        name = escape_xml(name),
        rel = rel_id,
    )
}

fn embed_images(xml: &str, data: &TemplateData) -> (String, Vec<EmbeddedImage>) {
    let mut xml = xml.to_string();
    let mut embedded: Vec<EmbeddedImage> = Vec::new();

    while let Some(caps) = IMAGE_RE.captures(&xml) {
        let (tag_start, tag_end) = caps.get(0).map(|m| (m.start(), m.end())).unwrap_or_default();
        let name = caps[1].to_string();
        let run_start = open_element_start(&xml, tag_start, "w:r").unwrap_or(tag_start);
        let run_end = element_end(&xml, tag_end, "w:r").unwrap_or(tag_end);

        let replacement = match data.images.get(&name) {
            Some(image) => {
                let rel_id = format!("rIdJd{}", embedded.len() + 1);
                let safe_name: String = name.chars().map(|c| if c.is_alphanumeric() { c } else { '_' }).collect();
                let target = format!("media/jd_{safe_name}_{}.png", embedded.len() + 1);
                let run = drawing_run(&rel_id, &name, 9000 + embedded.len(), image);
                embedded.push(EmbeddedImage { rel_id, target, bytes: image.bytes.clone() });
                run
            }
            None => {
                debug!(image = %name, "No image data, dropping placeholder");
                String::new()
            }
        };
        xml.replace_range(run_start..run_end, &replacement);
    }
    (xml, embedded)
}

/// Adds `xmlns:prefix` to the root element when the template lacks it.
fn ensure_namespace(xml: &str, prefix: &str, uri: &str) -> String {
    let decl = format!("xmlns:{prefix}=");
    let Some(root_start) = xml.find("<w:document") else {
        return xml.to_string();
    };
    let Some(root_len) = xml[root_start..].find('>') else {
        return xml.to_string();
    };
    let root_end = root_start + root_len;
    if xml[root_start..root_end].contains(&decl) {
        return xml.to_string();
    }
    let mut out = xml.to_string();
    out.insert_str(root_end, &format!(r#" xmlns:{prefix}="{uri}""#));
    out
}

fn add_relationships(rels: &str, images: &[EmbeddedImage]) -> String {
    let entries: String = images
        .iter()
        .map(|img| format!(r#"<Relationship Id="{}" Type="{}" Target="{}"/>"#, img.rel_id, IMAGE_REL_TYPE, img.target))
        .collect();
    match rels.rfind("</Relationships>") {
        Some(pos) => {
            let mut out = rels.to_string();
            out.insert_str(pos, &entries);
            out
        }
        None => rels.to_string(),
    }
}

fn ensure_png_content_type(types: &str) -> String {
    if types.contains(r#"Extension="png""#) {
        return types.to_string();
    }
    match types.rfind("</Types>") {
        Some(pos) => {
            let mut out = types.to_string();
            out.insert_str(pos, r#"<Default Extension="png" ContentType="image/png"/>"#);
            out
        }
        None => types.to_string(),
    }
}

fn fill_document(xml: &str, data: &TemplateData) -> Result<(String, Vec<EmbeddedImage>)> {
    let merged = merge_split_runs(xml);
    let looped = expand_loops(&merged, data)?;
    let (with_images, embedded) = embed_images(&looped, data);
    let mut filled = restore_braces(&substitute_fields(&with_images, &data.fields, &BTreeMap::new()));
    if !embedded.is_empty() {
        filled = ensure_namespace(&filled, "r", NS_R);
        filled = ensure_namespace(&filled, "wp", NS_WP);
    }
    Ok((filled, embedded))
}

/// Fills `document.xml` alone and reports how many images were embedded.
pub fn render_document_xml(xml: &str, data: &TemplateData) -> Result<(String, usize)> {
    let (filled, embedded) = fill_document(xml, data)?;
    Ok((filled, embedded.len()))
}

/// Fills a `.docx` template and returns the new package bytes.
pub fn render(template: &[u8], data: &TemplateData) -> Result<Vec<u8>> {
    let mut archive = ZipArchive::new(Cursor::new(template))?;
    let mut parts: Vec<(String, Vec<u8>)> = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let mut file = archive.by_index(i)?;
        if file.is_dir() {
            continue;
        }
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;
        parts.push((file.name().to_string(), bytes));
    }

    let document = parts
        .iter()
        .find(|(name, _)| name == DOCUMENT_PART)
        .map(|(_, bytes)| String::from_utf8_lossy(bytes).into_owned())
        .ok_or_else(|| Error::NotFound(format!("{DOCUMENT_PART} in template")))?;

    let (filled, embedded) = fill_document(&document, data)?;

    if !embedded.is_empty() && !parts.iter().any(|(name, _)| name == DOCUMENT_RELS_PART) {
        parts.push((DOCUMENT_RELS_PART.to_string(), DEFAULT_DOCUMENT_RELS.as_bytes().to_vec()));
    }

    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, bytes) in &parts {
        let content: Vec<u8> = match name.as_str() {
            DOCUMENT_PART => filled.clone().into_bytes(),
            DOCUMENT_RELS_PART if !embedded.is_empty() => {
                add_relationships(&String::from_utf8_lossy(bytes), &embedded).into_bytes()
            }
            CONTENT_TYPES_PART if !embedded.is_empty() => {
                ensure_png_content_type(&String::from_utf8_lossy(bytes)).into_bytes()
            }
            _ => bytes.clone(),
        };
        writer.start_file(name.as_str(), options)?;
        writer.write_all(&content)?;
    }
    for image in &embedded {
        writer.start_file(format!("word/{}", image.target), options)?;
        writer.write_all(&image.bytes)?;
    }

    let bytes = writer.finish()?.into_inner();
    info!(size = bytes.len(), images = embedded.len(), "Rendered DOCX");
    Ok(bytes)
}

/// Builds a minimal `.docx` package around a `document.xml` body.
pub fn package_document(document_xml: &str) -> Result<Vec<u8>> {
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, content) in [
        (CONTENT_TYPES_PART, DEFAULT_CONTENT_TYPES),
        ("_rels/.rels", DEFAULT_PACKAGE_RELS),
        (DOCUMENT_RELS_PART, DEFAULT_DOCUMENT_RELS),
        (DOCUMENT_PART, document_xml),
    ] {
        writer.start_file(name, options)?;
        writer.write_all(content.as_bytes())?;
    }
    Ok(writer.finish()?.into_inner())
}

/// Loads `<dir>/<file_name>`, creating it from `default_xml` if it does not exist yet.
pub fn load_or_init_template(dir: &Path, file_name: &str, default_xml: &str) -> Result<Vec<u8>> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(file_name);
    if !path.exists() {
        info!(path = %path.display(), "Initializing default Word template");
        std::fs::write(&path, package_document(default_xml)?)?;
    }
    Ok(std::fs::read(&path)?)
}

/// Reads one part of a `.docx` package as text.
pub fn read_part(docx: &[u8], part: &str) -> Result<String> {
    let mut archive = ZipArchive::new(Cursor::new(docx))?;
    let mut file = archive.by_name(part)?;
    let mut text = String::new();
    file.read_to_string(&mut text)?;
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data() -> TemplateData {
        let mut data = TemplateData::default();
        data.fields.insert("buyer.name".into(), "Đỗ Thị <An>".into());
        data.fields.insert("total".into(), "209.000 ₫".into());
        data.loops.insert(
            "items".into(),
            vec![
                BTreeMap::from([("name".into(), "Nhẫn".into()), ("amount".into(), "100".into())]),
                BTreeMap::from([("name".into(), "Lắc".into()), ("amount".into(), "200".into())]),
            ],
        );
        data
    }

    #[test]
    fn merges_runs_split_by_word() {
        let xml = r#"<w:p><w:r><w:t>{buyer</w:t></w:r><w:r><w:t>.name}</w:t></w:r></w:p>"#;
        let (out, _) = render_document_xml(xml, &data()).unwrap();
        assert!(out.contains("Đỗ Thị &lt;An&gt;"));
        assert!(!out.contains("{buyer"));
    }

    #[test]
    fn repeats_table_rows_for_loops() {
        let xml = concat!(
            "<w:tbl><w:tr><w:tc><w:p><w:r><w:t>Tên</w:t></w:r></w:p></w:tc></w:tr>",
            r#"<w:tr w:rsidR="1"><w:tc><w:p><w:r><w:t>{#items}{name}</w:t></w:r></w:p></w:tc>"#,
            "<w:tc><w:p><w:r><w:t>{amount}{/items}</w:t></w:r></w:p></w:tc></w:tr></w:tbl>",
            "<w:p><w:r><w:t>{total}</w:t></w:r></w:p>"
        );
        let (out, _) = render_document_xml(xml, &data()).unwrap();
        assert_eq!(out.matches("<w:tr").count(), 3);
        assert!(out.contains("Nhẫn") && out.contains("Lắc"));
        assert!(out.contains("209.000 ₫"));
        assert!(!out.contains("{#items}") && !out.contains("{/items}"));
    }

    #[test]
    fn empty_loop_removes_the_row() {
        let xml = "<w:tbl><w:tr><w:tc><w:p><w:r><w:t>{#schedule}{amount}{/schedule}</w:t></w:r></w:p></w:tc></w:tr></w:tbl>";
        let (out, _) = render_document_xml(xml, &data()).unwrap();
        assert_eq!(out, "<w:tbl></w:tbl>");
    }

    #[test]
    fn braces_in_values_stay_literal() {
        let mut data = data();
        data.loops.insert(
            "items".into(),
            vec![
                BTreeMap::from([("name".into(), "Nhẫn {total} khắc {ten}".into())]),
                BTreeMap::from([("name".into(), "Bộ {#quà} tặng {%qr_code}".into())]),
            ],
        );
        data.fields.insert("note".into(), "Ghi {buyer.name}".into());
        let xml = concat!(
            "<w:tbl><w:tr><w:tc><w:p><w:r><w:t>{#items}{name}{/items}</w:t></w:r></w:p></w:tc></w:tr></w:tbl>",
            "<w:p><w:r><w:t>{note}</w:t></w:r></w:p>"
        );
        let (out, images) = render_document_xml(xml, &data).unwrap();
        assert!(out.contains("Nhẫn {total} khắc {ten}"));
        assert!(out.contains("Bộ {#quà} tặng {%qr_code}"));
        assert!(out.contains("Ghi {buyer.name}"));
        assert!(!out.contains("209.000 ₫"));
        assert_eq!(images, 0);
    }

    #[test]
    fn unclosed_loop_is_an_error() {
        let xml = "<w:p><w:r><w:t>{#items}{name}</w:t></w:r></w:p>";
        assert!(render_document_xml(xml, &data()).is_err());
    }

    #[test]
    fn flattens_nested_view_models() {
        #[derive(Serialize)]
        struct Inner {
            name: String,
        }
        #[derive(Serialize)]
        struct Outer {
            buyer: Inner,
            count: u32,
            tags: Vec<String>,
            note: Option<String>,
        }
        let data = TemplateData::from_serialize(&Outer {
            buyer: Inner { name: "Hà".into() },
            count: 3,
            tags: vec!["a".into()],
            note: None,
        })
        .unwrap();
        assert_eq!(data.fields["buyer.name"], "Hà");
        assert_eq!(data.fields["count"], "3");
        assert_eq!(data.fields["note"], "");
        assert_eq!(data.loops["tags"][0]["value"], "a");
    }
}
