use jewelry_desk::calc::{self, Totals};
use jewelry_desk::draft::{Draft, DraftAction, MSG_ADD_PRODUCT, MSG_CHOOSE_CUSTOMER};
use jewelry_desk::model::{Customer, InvoiceItem, Tax};
use jewelry_desk::Error;
use rust_decimal::Decimal;

fn catalog() -> Vec<Tax> {
    vec![
        Tax { id: "vat8".into(), name: "VAT 8%".into(), percentage: Decimal::from(8) },
        Tax { id: "vat10".into(), name: "VAT 10%".into(), percentage: Decimal::from(10) },
    ]
}

fn line(qty: i64, price: i64, discount: i64, taxes: &[&str]) -> InvoiceItem {
    InvoiceItem {
        quantity: Some(Decimal::from(qty)),
        price: Some(Decimal::from(price)),
        discount: Decimal::from(discount),
        taxes: taxes.iter().map(|t| t.to_string()).collect(),
        ..InvoiceItem::new(format!("p-{qty}-{price}"), "Hàng mẫu", Decimal::from(price))
    }
}

#[test]
fn subtotal_is_never_negative() {
    for (qty, price, discount) in [(0, 100, 50), (1, 0, 10), (3, 1_000, 5_000), (2, 500_000, 0)] {
        let item = line(qty, price, discount, &["vat10"]);
        assert!(calc::calc_sub_total(&item) >= Decimal::ZERO);
        assert!(calc::calc_total(&item, &catalog()) >= Decimal::ZERO);
    }
}

#[test]
fn amount_is_subtotal_plus_tax() {
    let items = vec![
        line(2, 100_000, 10_000, &["vat10"]),
        line(1, 3_450_000, 0, &["vat8"]),
        line(5, 12_345, 999, &["vat8", "vat10"]),
        line(1, 20_000, 50_000, &["vat10"]),
        line(4, 75_000, 0, &[]),
    ];
    let catalog = catalog();
    assert_eq!(
        calc::total_amount(&items, &catalog),
        calc::total_sub(&items) + calc::total_tax(&items, &catalog)
    );
}

#[test]
fn reference_invoice_totals() {
    let totals = Totals::of(&[line(2, 100_000, 10_000, &["vat10"])], &catalog());
    assert_eq!(totals.sub_total, Decimal::from(190_000));
    assert_eq!(totals.tax_amount, Decimal::from(19_000));
    assert_eq!(totals.amount, Decimal::from(209_000));
    assert_eq!(totals.discount, Decimal::from(10_000));
}

#[test]
fn submit_guards_run_in_order() {
    let err = Draft::new().submit_invoice(&catalog()).unwrap_err();
    assert!(matches!(err, Error::Validation(ref m) if m == MSG_CHOOSE_CUSTOMER));

    let draft = Draft::new()
        .apply(DraftAction::SelectCustomer(Customer { id: "c9".into(), name: "Hồ Văn K".into(), ..Default::default() }))
        .unwrap();
    let err = draft.submit_invoice(&catalog()).unwrap_err();
    assert!(matches!(err, Error::Validation(ref m) if m == MSG_ADD_PRODUCT));

    let invoice = draft
        .apply(DraftAction::AddLine(line(1, 1_000_000, 0, &["vat8"])))
        .unwrap()
        .submit_invoice(&catalog())
        .unwrap();
    assert_eq!(invoice.amount, Decimal::from(1_080_000));
    assert_eq!(invoice.items[0].total, Decimal::from(1_080_000));
}
