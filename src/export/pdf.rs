//! PDF export: tera renders Typst source, the `typst` binary compiles it.

use std::collections::HashMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::Path;
use std::process::Command;

use serde::Serialize;
use tera::{Context, Tera, Value};
use tracing::{debug, info};

use crate::builder::{AgreementData, InstallmentData};
use crate::error::{Error, Result};
use crate::layout::{paginate, Block, Page, A4_USABLE_HEIGHT_MM};

pub const CONTRACT_TEMPLATE: &str = "contract.typ.tera";

const DEFAULT_CONTRACT_TEMPLATE: &str = include_str!("../../templates/contract.typ.tera");

pub trait PdfCompiler {
    fn compile(&self, source: &Path, output: &Path) -> Result<()>;
}

/// Shells out to the Typst CLI.
#[derive(Debug, Clone)]
pub struct TypstCompiler {
    pub binary: String,
}

impl TypstCompiler {
    pub fn new(binary: Option<&str>) -> Self {
        Self { binary: binary.unwrap_or("typst").to_string() }
    }
}

impl Default for TypstCompiler {
    fn default() -> Self {
        Self::new(None)
    }
}

impl PdfCompiler for TypstCompiler {
    fn compile(&self, source: &Path, output: &Path) -> Result<()> {
        let result = Command::new(&self.binary).arg("compile").arg(source).arg(output).output();
        let out = match result {
            Ok(out) => out,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(Error::Compile(format!(
                    "'{}' is not installed. Please install Typst (https://typst.app).",
                    self.binary
                )));
            }
            Err(e) => return Err(e.into()),
        };
        if !out.status.success() {
            return Err(Error::Compile(String::from_utf8_lossy(&out.stderr).trim().to_string()));
        }
        Ok(())
    }
}

/// Quotes a value as a Typst string literal.
fn typst_filter(value: &Value, _: &HashMap<String, Value>) -> tera::Result<Value> {
    let text = match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    let mut quoted = String::with_capacity(text.len() + 2);
    quoted.push('"');
    for ch in text.chars() {
        match ch {
            '\\' => quoted.push_str("\\\\"),
            '"' => quoted.push_str("\\\""),
            '\n' => quoted.push_str("\\n"),
            '\r' => {}
            c => quoted.push(c),
        }
    }
    quoted.push('"');
    Ok(Value::String(quoted))
}

fn register_filters(tera: &mut Tera) {
    tera.register_filter("typst", typst_filter);
}

/// Loads every `*.tera` under `dir`, writing the default contract template first if missing.
pub fn load_templates(dir: &Path) -> Result<Tera> {
    fs::create_dir_all(dir)?;
    let path = dir.join(CONTRACT_TEMPLATE);
    if !path.exists() {
        info!(path = %path.display(), "Initializing default PDF template");
        fs::write(&path, DEFAULT_CONTRACT_TEMPLATE)?;
    }
    let glob = dir.join("*.tera");
    let mut tera = Tera::new(&glob.to_string_lossy())?;
    register_filters(&mut tera);
    Ok(tera)
}

/// The built-in templates only, without touching the filesystem.
pub fn embedded_templates() -> Result<Tera> {
    let mut tera = Tera::default();
    tera.add_raw_template(CONTRACT_TEMPLATE, DEFAULT_CONTRACT_TEMPLATE)?;
    register_filters(&mut tera);
    Ok(tera)
}

pub fn agreement_blocks(data: &AgreementData) -> Vec<Block> {
    vec![
        Block::text("header", 9),
        Block::text("parties", 14),
        Block::table("items", data.items.len()),
        Block::text("totals", 6),
        Block::text("terms", if data.note.is_empty() { 5 } else { 7 }),
        Block::text("signatures", 8),
    ]
}

pub fn installment_blocks(data: &InstallmentData) -> Vec<Block> {
    let mut blocks = agreement_blocks(&data.agreement);
    let signatures = blocks.pop();
    blocks.push(Block::text("payment", 4));
    blocks.push(Block::table("schedule", data.schedule.len()));
    blocks.extend(signatures);
    blocks
}

/// Renders Typst source for `data` laid out as `pages`.
pub fn render_source<T: Serialize>(tera: &Tera, title: &str, data: &T, pages: &[Page]) -> Result<String> {
    let mut context = Context::from_serialize(data)?;
    context.insert("title", title);
    context.insert("pages", pages);
    Ok(tera.render(CONTRACT_TEMPLATE, &context)?)
}

/// Writes the Typst source to a temporary file and compiles it into `output`.
///
/// The temporary file is removed when this returns, whether or not compilation succeeded.
pub fn export_pdf<T: Serialize>(
    tera: &Tera,
    compiler: &dyn PdfCompiler,
    title: &str,
    data: &T,
    blocks: &[Block],
    output: &Path,
) -> Result<()> {
    let pages = paginate(blocks, A4_USABLE_HEIGHT_MM);
    let source = render_source(tera, title, data, &pages)?;

    let mut tmp = tempfile::Builder::new().prefix("jewelry-desk-").suffix(".typ").tempfile()?;
    tmp.write_all(source.as_bytes())?;
    tmp.flush()?;
    debug!(source = %tmp.path().display(), pages = pages.len(), "Compiling Typst source");

    compiler.compile(tmp.path(), output)?;
    info!(output = %output.display(), pages = pages.len(), "Generated PDF");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::path::PathBuf;

    use super::*;
    use crate::builder::build_agreement_data;
    use crate::config::SellerConfig;
    use crate::model::{Customer, CustomerRef, Invoice, InvoiceItem};
    use rust_decimal::Decimal;

    struct RecordingCompiler {
        source: RefCell<Option<PathBuf>>,
        text: RefCell<String>,
        fail: bool,
    }

    impl RecordingCompiler {
        fn new(fail: bool) -> Self {
            Self { source: RefCell::new(None), text: RefCell::new(String::new()), fail }
        }
    }

    impl PdfCompiler for RecordingCompiler {
        fn compile(&self, source: &Path, output: &Path) -> Result<()> {
            *self.source.borrow_mut() = Some(source.to_path_buf());
            *self.text.borrow_mut() = fs::read_to_string(source)?;
            if self.fail {
                return Err(Error::Compile("syntax error".into()));
            }
            fs::write(output, b"%PDF-1.7")?;
            Ok(())
        }
    }

    fn data(lines: usize) -> AgreementData {
        let invoice = Invoice {
            code: "HD0042".into(),
            customer: Some(CustomerRef::Record(Customer { name: "Lê \"Vàng\" Thu".into(), ..Default::default() })),
            items: (0..lines)
                .map(|i| InvoiceItem::new(format!("p{i}"), format!("Nhẫn {i}"), Decimal::from(1_000_000)))
                .collect(),
            ..Default::default()
        };
        build_agreement_data(&invoice, &SellerConfig::embedded_default().unwrap())
    }

    #[test]
    fn filter_quotes_and_escapes() {
        let out = typst_filter(&Value::String(r#"a "b" \c"#.into()), &HashMap::new()).unwrap();
        assert_eq!(out, Value::String(r#""a \"b\" \\c""#.into()));
    }

    #[test]
    fn temp_source_is_removed_after_successful_compile() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.pdf");
        let compiler = RecordingCompiler::new(false);
        let data = data(2);
        export_pdf(&embedded_templates().unwrap(), &compiler, "HỢP ĐỒNG", &data, &agreement_blocks(&data), &output)
            .unwrap();

        assert!(output.exists());
        assert!(!compiler.source.borrow().as_ref().unwrap().exists());
        assert!(compiler.text.borrow().contains(r#""Lê \"Vàng\" Thu""#));
    }

    #[test]
    fn temp_source_is_removed_when_compile_fails() {
        let dir = tempfile::tempdir().unwrap();
        let compiler = RecordingCompiler::new(true);
        let data = data(1);
        let result = export_pdf(
            &embedded_templates().unwrap(),
            &compiler,
            "HỢP ĐỒNG",
            &data,
            &agreement_blocks(&data),
            &dir.path().join("out.pdf"),
        );

        assert!(matches!(result, Err(Error::Compile(_))));
        assert!(!compiler.source.borrow().as_ref().unwrap().exists());
    }

    #[test]
    fn long_item_tables_get_their_own_page() {
        let data = data(24);
        let pages = paginate(&agreement_blocks(&data), A4_USABLE_HEIGHT_MM);
        let source = render_source(&embedded_templates().unwrap(), "HỢP ĐỒNG", &data, &pages).unwrap();
        assert!(pages.len() > 1);
        assert!(source.contains("#pagebreak()"));
        assert!(source.contains("breakable: false"));
    }

    #[test]
    fn empty_invoice_still_renders() {
        let data = data(0);
        let pages = paginate(&agreement_blocks(&data), A4_USABLE_HEIGHT_MM);
        let source = render_source(&embedded_templates().unwrap(), "HỢP ĐỒNG", &data, &pages).unwrap();
        assert!(source.contains("table.header"));
        assert!(!source.contains("#pagebreak()"));
    }
}
