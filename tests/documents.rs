use chrono::{TimeZone, Utc};
use jewelry_desk::builder::{build_agreement_data, build_installment_data, FALLBACK_VAT_RATE};
use jewelry_desk::config::SellerConfig;
use jewelry_desk::export::docx::{self, TemplateData};
use jewelry_desk::export::qr;
use jewelry_desk::model::{Customer, CustomerRef, Invoice, InvoiceItem};
use rust_decimal::Decimal;

fn seller() -> SellerConfig {
    SellerConfig::embedded_default().unwrap()
}

fn invoice() -> Invoice {
    Invoice {
        code: "HD2026-015".into(),
        customer: Some(CustomerRef::Record(Customer {
            id: "c15".into(),
            name: "Trương Mỹ Lan".into(),
            address: Some("12 Hai Bà Trưng, Q1".into()),
            ..Default::default()
        })),
        items: vec![
            InvoiceItem {
                quantity: Some(Decimal::from(2)),
                weight: Some(Decimal::new(1_5, 1)),
                ..InvoiceItem::new("ring", "Nhẫn vàng 18K", Decimal::from(500_000))
            },
            InvoiceItem::new("chain", "Dây chuyền bạc", Decimal::from(1_000_000)),
        ],
        sub_total: Decimal::from(2_000_000),
        tax_amount: Decimal::from(160_000),
        amount: Decimal::from(2_160_000),
        paid_amount: Decimal::from(160_000),
        installment_count: Some(4),
        created_at: Utc.with_ymd_and_hms(2026, 1, 31, 3, 0, 0).single(),
        ..Default::default()
    }
}

#[test]
fn agreement_data_is_flat_and_formatted() {
    let data = build_agreement_data(&invoice(), &seller());
    assert_eq!(data.contract_no, "HD2026-015");
    assert_eq!(data.date, "31/01/2026");
    assert_eq!(data.buyer.name, "Trương Mỹ Lan");
    assert_eq!(data.items.len(), 2);
    assert_eq!(data.items[0].index, 1);
    assert_eq!(data.items[0].amount, "1.000.000");
    assert_eq!(data.items[0].weight, "1,5");
    assert_eq!(data.vat_rate, "8%");
    assert_eq!(data.total, "2.160.000 ₫");
    assert_eq!(data.total_in_words, "Hai triệu một trăm sáu mươi nghìn đồng");
}

#[test]
fn empty_invoice_builds_zero_documents() {
    let data = build_agreement_data(&Invoice::default(), &seller());
    assert!(data.items.is_empty());
    assert_eq!(data.amounts.total, Decimal::ZERO);
    assert_eq!(data.amounts.vat_rate, Decimal::ZERO);
    assert_eq!(data.buyer.name, "");

    let installment = build_installment_data(&Invoice::default(), &seller());
    assert!(installment.schedule.is_empty());
    assert_eq!(installment.remaining_value, Decimal::ZERO);
}

#[test]
fn tax_without_subtotal_uses_fallback_rate() {
    let invoice = Invoice { tax_amount: Decimal::from(8_000), amount: Decimal::from(8_000), ..Default::default() };
    assert_eq!(build_agreement_data(&invoice, &seller()).amounts.vat_rate, FALLBACK_VAT_RATE);
}

#[test]
fn installment_schedule_covers_the_remaining_amount() {
    let data = build_installment_data(&invoice(), &seller());
    assert_eq!(data.installment_count, 4);
    assert_eq!(data.remaining_value, Decimal::from(2_000_000));
    let scheduled: Decimal = data.schedule.iter().map(|t| t.amount_value).sum();
    assert_eq!(scheduled, data.remaining_value);
    // Month-end start dates clamp to the end of shorter months.
    assert_eq!(data.schedule[0].due_date, "28/02/2026");
    assert_eq!(data.schedule[3].due_date, "31/05/2026");
}

#[test]
fn word_template_gets_rows_fields_and_qr() {
    let template = docx::package_document(concat!(
        r#"<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>"#,
        r#"<w:p><w:r><w:t>Bên mua: {buyer.</w:t></w:r><w:r><w:t>name}</w:t></w:r></w:p>"#,
        r#"<w:tbl><w:tr><w:tc><w:p><w:r><w:t>{#items}{index}</w:t></w:r></w:p></w:tc>"#,
        r#"<w:tc><w:p><w:r><w:t>{name}{/items}</w:t></w:r></w:p></w:tc></w:tr></w:tbl>"#,
        r#"<w:p><w:r><w:t>{%qr_code}</w:t></w:r></w:p>"#,
        r#"</w:body></w:document>"#
    ))
    .unwrap();

    let data = TemplateData::from_serialize(&build_agreement_data(&invoice(), &seller()))
        .unwrap()
        .with_image("qr_code", qr::generate_png("00020101021138570010A000000727").unwrap());
    let rendered = docx::render(&template, &data).unwrap();

    let document = docx::read_part(&rendered, "word/document.xml").unwrap();
    assert!(document.contains("Bên mua: Trương Mỹ Lan"));
    assert_eq!(document.matches("<w:tr>").count(), 2);
    assert!(document.contains("Dây chuyền bạc"));
    assert!(document.contains(r#"r:embed="rIdJd1""#));
    assert!(document.contains("xmlns:r="));

    let rels = docx::read_part(&rendered, "word/_rels/document.xml.rels").unwrap();
    assert!(rels.contains("media/jd_qr_code_1.png"));
    let types = docx::read_part(&rendered, "[Content_Types].xml").unwrap();
    assert!(types.contains(r#"Extension="png""#));
}
