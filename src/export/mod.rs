//! Document exporters and the file naming around them.

pub mod docx;
pub mod pdf;
pub mod qr;
pub mod xlsx;

use std::fs;
use std::path::{Path, PathBuf};

use base64::{engine::general_purpose, Engine as _};
use chrono::{Datelike, Local, NaiveDate};
use serde::Serialize;
use slug::slugify;
use tera::Tera;
use tracing::{info, warn};

use crate::builder::{build_agreement_data, build_contract_data, build_installment_data};
use crate::config::{SellerConfig, Workspace};
use crate::error::Result;
use crate::format::local_date;
use crate::layout::Block;
use crate::model::{Invoice, SalesContract};

use self::docx::TemplateData;
use self::pdf::PdfCompiler;
use self::qr::PngImage;

const AGREEMENT_DOCX: &str = "agreement.docx";
const INSTALLMENT_DOCX: &str = "installment.docx";
const DEFAULT_AGREEMENT_XML: &str = include_str!("../../templates/agreement.docx.xml");
const DEFAULT_INSTALLMENT_XML: &str = include_str!("../../templates/installment.docx.xml");

const QR_PLACEHOLDER: &str = "qr_code";

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ExportFormat {
    Pdf,
    Docx,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Pdf => "pdf",
            ExportFormat::Docx => "docx",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Agreement,
    Installment,
}

impl DocumentKind {
    pub fn title(self) -> &'static str {
        match self {
            DocumentKind::Agreement => "HỢP ĐỒNG MUA BÁN",
            DocumentKind::Installment => "HỢP ĐỒNG MUA BÁN TRẢ GÓP",
        }
    }

    fn file_suffix(self) -> &'static str {
        match self {
            DocumentKind::Agreement => "hop-dong",
            DocumentKind::Installment => "tra-gop",
        }
    }

    fn docx_template(self) -> (&'static str, &'static str) {
        match self {
            DocumentKind::Agreement => (AGREEMENT_DOCX, DEFAULT_AGREEMENT_XML),
            DocumentKind::Installment => (INSTALLMENT_DOCX, DEFAULT_INSTALLMENT_XML),
        }
    }
}

/// The e-invoice QR stored on the invoice wins; otherwise the seller's payment QR payload.
pub fn qr_image(invoice_qr: Option<&str>, seller: &SellerConfig) -> Result<Option<PngImage>> {
    if let Some(encoded) = invoice_qr.filter(|s| !s.trim().is_empty()) {
        match qr::decode_base64_png(encoded) {
            Ok(image) => return Ok(Some(image)),
            Err(e) => warn!(error = %e, "Ignoring unreadable invoice QR image"),
        }
    }
    match seller.payment_qr.as_deref().filter(|s| !s.trim().is_empty()) {
        Some(payload) => Ok(Some(qr::generate_png(payload)?)),
        None => Ok(None),
    }
}

fn file_stem(code: &str, kind: DocumentKind) -> String {
    match slugify(code) {
        s if s.is_empty() => format!("nhap_{}", kind.file_suffix()),
        s => format!("{}_{}", s.to_uppercase(), kind.file_suffix()),
    }
}

/// Renders agreements into `<data_root>/output/<year>/<customer>/`.
pub struct Exporter<'a> {
    pub workspace: &'a Workspace,
    pub seller: &'a SellerConfig,
    pub templates: &'a Tera,
    pub compiler: &'a dyn PdfCompiler,
}

impl<'a> Exporter<'a> {
    pub fn invoice_document(&self, invoice: &Invoice, kind: DocumentKind, format: ExportFormat) -> Result<PathBuf> {
        let date = invoice.created_at.map(local_date).unwrap_or_else(|| Local::now().date_naive());
        let path = self.target(date, invoice.customer_name(), &invoice.code, kind, format)?;
        let qr = qr_image(invoice.qr_code.as_deref(), self.seller)?;

        match kind {
            DocumentKind::Agreement => {
                let data = build_agreement_data(invoice, self.seller);
                let blocks = pdf::agreement_blocks(&data);
                self.write(&data, kind, format, blocks, qr, &path)?;
            }
            DocumentKind::Installment => {
                let data = build_installment_data(invoice, self.seller);
                let blocks = pdf::installment_blocks(&data);
                self.write(&data, kind, format, blocks, qr, &path)?;
            }
        }
        Ok(path)
    }

    pub fn contract_document(&self, contract: &SalesContract, format: ExportFormat) -> Result<PathBuf> {
        let kind = DocumentKind::Agreement;
        let date = contract.contract_date.unwrap_or_else(|| Local::now().date_naive());
        let path = self.target(date, &contract.buyer_name, &contract.code, kind, format)?;
        let data = build_contract_data(contract, self.seller);
        let qr = qr_image(None, self.seller)?;
        let blocks = pdf::agreement_blocks(&data);
        self.write(&data, kind, format, blocks, qr, &path)?;
        Ok(path)
    }

    fn target(
        &self,
        date: NaiveDate,
        customer: &str,
        code: &str,
        kind: DocumentKind,
        format: ExportFormat,
    ) -> Result<PathBuf> {
        let dir = self.workspace.output_dir(date.year(), customer)?;
        Ok(dir.join(format!("{}.{}", file_stem(code, kind), format.extension())))
    }

    fn write<T: Serialize>(
        &self,
        data: &T,
        kind: DocumentKind,
        format: ExportFormat,
        blocks: Vec<Block>,
        qr: Option<PngImage>,
        path: &Path,
    ) -> Result<()> {
        match format {
            ExportFormat::Pdf => pdf::export_pdf(self.templates, self.compiler, kind.title(), data, &blocks, path),
            ExportFormat::Docx => {
                let (file_name, default_xml) = kind.docx_template();
                let template = docx::load_or_init_template(&self.workspace.templates_dir(), file_name, default_xml)?;
                let mut fields = TemplateData::from_serialize(data)?;
                if let Some(image) = qr {
                    fields = fields.with_image(QR_PLACEHOLDER, image);
                }
                fs::write(path, docx::render(&template, &fields)?)?;
                info!(path = %path.display(), "Generated DOCX");
                Ok(())
            }
        }
    }
}

/// Writes the invoice list workbook under `output/<year>/`.
pub fn write_invoice_list(workspace: &Workspace, invoices: &[Invoice]) -> Result<PathBuf> {
    let today = Local::now().date_naive();
    let dir = workspace.output_root().join(today.year().to_string());
    fs::create_dir_all(&dir)?;
    let path = dir.join(format!("hoa-don_{}.xlsx", today.format("%Y%m%d")));
    fs::write(&path, xlsx::export_invoices(invoices)?)?;
    Ok(path)
}

/// Decodes the provider's base64 preview into a PDF next to the customer's documents.
pub fn write_einvoice_preview(workspace: &Workspace, invoice: &Invoice, encoded: &str) -> Result<PathBuf> {
    let cleaned: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    let payload = cleaned.split_once("base64,").map(|(_, rest)| rest).unwrap_or(cleaned.as_str());
    let bytes = general_purpose::STANDARD.decode(payload)?;
    let date = invoice.created_at.map(local_date).unwrap_or_else(|| Local::now().date_naive());
    let dir = workspace.output_dir(date.year(), invoice.customer_name())?;
    let path = dir.join(format!("{}_hddt.pdf", slugify(&invoice.code).to_uppercase()));
    fs::write(&path, bytes)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::model::{Customer, CustomerRef, InvoiceItem};
    use rust_decimal::Decimal;

    struct NoCompiler;

    impl PdfCompiler for NoCompiler {
        fn compile(&self, _: &Path, _: &Path) -> Result<()> {
            Err(Error::Compile("not available".into()))
        }
    }

    fn invoice() -> Invoice {
        Invoice {
            code: "HD-0007".into(),
            customer: Some(CustomerRef::Record(Customer { name: "Phạm Văn Bình".into(), ..Default::default() })),
            items: vec![InvoiceItem::new("p1", "Dây chuyền vàng 18K", Decimal::from(5_400_000))],
            sub_total: Decimal::from(5_400_000),
            tax_amount: Decimal::from(432_000),
            amount: Decimal::from(5_832_000),
            installment_count: Some(3),
            ..Default::default()
        }
    }

    #[test]
    fn docx_lands_in_customer_folder() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = Workspace::new(dir.path());
        let seller = SellerConfig { payment_qr: Some("VIETQR-DEMO".into()), ..SellerConfig::embedded_default().unwrap() };
        let templates = pdf::embedded_templates().unwrap();
        let exporter = Exporter { workspace: &workspace, seller: &seller, templates: &templates, compiler: &NoCompiler };

        let path = exporter
            .invoice_document(&invoice(), DocumentKind::Installment, ExportFormat::Docx)
            .unwrap();
        assert!(path.ends_with("pham-van-binh/HD-0007_tra-gop.docx"));

        let document = docx::read_part(&fs::read(&path).unwrap(), "word/document.xml").unwrap();
        assert!(document.contains("Dây chuyền vàng 18K"));
        assert!(document.contains("5.832.000 ₫"));
        assert!(document.contains("<w:drawing>"));
        assert!(!document.contains("{#schedule}"));
        assert!(dir.path().join("templates").join(INSTALLMENT_DOCX).exists());
    }

    #[test]
    fn pdf_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = Workspace::new(dir.path());
        let seller = SellerConfig::embedded_default().unwrap();
        let templates = pdf::embedded_templates().unwrap();
        let exporter = Exporter { workspace: &workspace, seller: &seller, templates: &templates, compiler: &NoCompiler };

        let result = exporter.invoice_document(&invoice(), DocumentKind::Agreement, ExportFormat::Pdf);
        assert!(matches!(result, Err(Error::Compile(_))));
    }

    #[test]
    fn seller_qr_is_used_without_invoice_qr() {
        let seller = SellerConfig { payment_qr: Some("pay-me".into()), ..SellerConfig::embedded_default().unwrap() };
        assert!(qr_image(None, &seller).unwrap().is_some());
        let plain = SellerConfig::embedded_default().unwrap();
        assert!(qr_image(Some("   "), &plain).unwrap().is_none());
    }

    #[test]
    fn file_stem_handles_missing_code() {
        assert_eq!(file_stem("HD 12", DocumentKind::Agreement), "HD-12_hop-dong");
        assert_eq!(file_stem("", DocumentKind::Installment), "nhap_tra-gop");
    }
}
