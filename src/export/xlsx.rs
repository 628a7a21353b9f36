//! Invoice list export to Excel.
//!
//! One row per invoice line. Invoice-level columns are merged vertically across the
//! consecutive rows that share an invoice code.

use rust_decimal::prelude::*;
use rust_xlsxwriter::{Color, Format, FormatAlign, FormatBorder, Workbook, Worksheet};
use tracing::info;

use crate::calc;
use crate::error::Result;
use crate::format::{format_date, format_weight, local_date};
use crate::model::Invoice;

const SHEET_NAME: &str = "Hóa đơn";

const HEADERS: [(&str, f64); 14] = [
    ("Mã HĐ", 14.0),
    ("Ngày tạo", 12.0),
    ("Khách hàng", 26.0),
    ("SĐT", 14.0),
    ("Sản phẩm", 30.0),
    ("Trọng lượng", 12.0),
    ("SL", 8.0),
    ("Đơn giá", 14.0),
    ("Giảm giá", 12.0),
    ("Thuế", 12.0),
    ("Thành tiền", 14.0),
    ("Tổng HĐ", 16.0),
    ("Trạng thái", 14.0),
    ("Thanh toán", 18.0),
];

/// Invoice-level columns, merged per invoice.
const MERGED_TEXT_COLS: [u16; 4] = [0, 1, 2, 3];
const TOTAL_COL: u16 = 11;
const MERGED_STATUS_COLS: [u16; 2] = [12, 13];

struct Styles {
    header: Format,
    text: Format,
    money: Format,
}

impl Styles {
    fn new() -> Self {
        let base = Format::new().set_border(FormatBorder::Thin).set_align(FormatAlign::VerticalCenter);
        Self {
            header: base.clone().set_bold().set_align(FormatAlign::Center).set_background_color(Color::RGB(0xF3E8C8)),
            text: base.clone(),
            money: base.set_num_format("#,##0"),
        }
    }
}

struct InvoiceRow<'a> {
    invoice: &'a Invoice,
    product: String,
    weight: String,
    quantity: f64,
    price: f64,
    discount: f64,
    tax: f64,
    amount: f64,
}

fn money(value: Decimal) -> f64 {
    value.to_f64().unwrap_or(0.0)
}

fn rows_for(invoice: &Invoice) -> Vec<InvoiceRow<'_>> {
    if invoice.items.is_empty() {
        return vec![InvoiceRow {
            invoice,
            product: String::new(),
            weight: String::new(),
            quantity: 0.0,
            price: 0.0,
            discount: 0.0,
            tax: 0.0,
            amount: 0.0,
        }];
    }
    invoice
        .items
        .iter()
        .map(|item| InvoiceRow {
            invoice,
            product: item.product_name.clone(),
            weight: item.weight.map(format_weight).unwrap_or_default(),
            quantity: money(calc::effective_quantity(item)),
            price: money(calc::effective_price(item)),
            discount: money(item.discount),
            tax: money(item.tax_amount),
            amount: money(calc::calc_sub_total(item) + item.tax_amount),
        })
        .collect()
}

fn invoice_columns(invoice: &Invoice) -> ([String; 4], [String; 2]) {
    let phone = invoice
        .customer_record()
        .and_then(|c| c.phone.clone())
        .unwrap_or_default();
    let date = invoice.created_at.map(|at| format_date(local_date(at))).unwrap_or_default();
    (
        [invoice.code.clone(), date, invoice.customer_name().to_string(), phone],
        [
            invoice.status.style().label.to_string(),
            invoice.payment_status.style().label.to_string(),
        ],
    )
}

fn write_invoice_cells(
    sheet: &mut Worksheet,
    first: u32,
    last: u32,
    invoice: &Invoice,
    styles: &Styles,
) -> Result<()> {
    let (text_cols, status_cols) = invoice_columns(invoice);
    let text_cells = MERGED_TEXT_COLS.iter().zip(text_cols.iter());
    let status_cells = MERGED_STATUS_COLS.iter().zip(status_cols.iter());
    for (col, value) in text_cells.chain(status_cells) {
        if last > first {
            sheet.merge_range(first, *col, last, *col, value, &styles.text)?;
        } else {
            sheet.write_string_with_format(first, *col, value, &styles.text)?;
        }
    }
    if last > first {
        sheet.merge_range(first, TOTAL_COL, last, TOTAL_COL, "", &styles.money)?;
    }
    sheet.write_number_with_format(first, TOTAL_COL, money(invoice.amount), &styles.money)?;
    Ok(())
}

/// Builds the workbook in memory.
pub fn export_invoices(invoices: &[Invoice]) -> Result<Vec<u8>> {
    let styles = Styles::new();
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name(SHEET_NAME)?;

    for (col, (title, width)) in HEADERS.iter().enumerate() {
        let col = col as u16;
        sheet.set_column_width(col, *width)?;
        sheet.write_string_with_format(0, col, *title, &styles.header)?;
    }
    sheet.set_freeze_panes(1, 0)?;

    let rows: Vec<InvoiceRow> = invoices.iter().flat_map(rows_for).collect();
    let mut row_idx: u32 = 1;
    let mut start = 0;
    while start < rows.len() {
        let code = &rows[start].invoice.code;
        let run = rows[start..]
            .iter()
            .take_while(|r| &r.invoice.code == code && !code.is_empty())
            .count()
            .max(1);

        for (offset, row) in rows[start..start + run].iter().enumerate() {
            let r = row_idx + offset as u32;
            sheet.write_string_with_format(r, 4, &row.product, &styles.text)?;
            sheet.write_string_with_format(r, 5, &row.weight, &styles.text)?;
            sheet.write_number_with_format(r, 6, row.quantity, &styles.text)?;
            sheet.write_number_with_format(r, 7, row.price, &styles.money)?;
            sheet.write_number_with_format(r, 8, row.discount, &styles.money)?;
            sheet.write_number_with_format(r, 9, row.tax, &styles.money)?;
            sheet.write_number_with_format(r, 10, row.amount, &styles.money)?;
        }
        write_invoice_cells(sheet, row_idx, row_idx + run as u32 - 1, rows[start].invoice, &styles)?;

        row_idx += run as u32;
        start += run;
    }

    let bytes = workbook.save_to_buffer()?;
    info!(invoices = invoices.len(), rows = rows.len(), "Exported invoices to XLSX");
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::docx::read_part;
    use crate::model::{Customer, CustomerRef, InvoiceItem};

    fn invoice(code: &str, lines: usize) -> Invoice {
        Invoice {
            code: code.into(),
            customer: Some(CustomerRef::Record(Customer { name: "Khách A".into(), ..Default::default() })),
            items: (0..lines)
                .map(|i| InvoiceItem::new(format!("p{i}"), format!("SP {i}"), Decimal::from(1000)))
                .collect(),
            amount: Decimal::from(1000 * lines as i64),
            ..Default::default()
        }
    }

    #[test]
    fn merges_invoice_columns_across_item_rows() {
        let bytes = export_invoices(&[invoice("HD001", 2), invoice("HD002", 1)]).unwrap();
        let sheet = read_part(&bytes, "xl/worksheets/sheet1.xml").unwrap();
        assert!(sheet.contains(r#"<mergeCell ref="A2:A3"/>"#));
        assert!(sheet.contains(r#"<mergeCell ref="L2:L3"/>"#));
        assert!(!sheet.contains(r#"ref="A4:A4""#));
    }

    #[test]
    fn invoices_without_items_get_one_row() {
        let bytes = export_invoices(&[invoice("HD009", 0)]).unwrap();
        let sheet = read_part(&bytes, "xl/worksheets/sheet1.xml").unwrap();
        assert!(!sheet.contains("<mergeCell "));
        assert!(sheet.contains(r#"<row r="2""#));
    }
}
