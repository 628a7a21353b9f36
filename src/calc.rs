//! Line-item arithmetic for invoices and credit notes.
//!
//! `total = max(quantity × price − discount, 0) + tax`, where tax is the sum of the
//! selected tax percentages applied to that floored subtotal. Aggregates are plain
//! reductions over the current lines and are recomputed on every call.

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::debug;

use crate::model::{InvoiceItem, Tax};

const HUNDRED: Decimal = Decimal::ONE_HUNDRED;

/// Edited price, falling back to the catalog price.
pub fn effective_price(item: &InvoiceItem) -> Decimal {
    item.price.unwrap_or(item.original_price)
}

/// Edited quantity, falling back to one.
pub fn effective_quantity(item: &InvoiceItem) -> Decimal {
    item.quantity.unwrap_or(Decimal::ONE)
}

/// Quantity × price − discount, never below zero.
pub fn calc_sub_total(item: &InvoiceItem) -> Decimal {
    let gross = effective_quantity(item) * effective_price(item);
    (gross - item.discount).max(Decimal::ZERO)
}

/// Sum of the selected taxes applied to the line subtotal.
pub fn calc_tax(item: &InvoiceItem, catalog: &[Tax]) -> Decimal {
    let base = calc_sub_total(item);
    item.taxes
        .iter()
        .filter_map(|tax_id| {
            let tax = catalog.iter().find(|t| &t.id == tax_id);
            if tax.is_none() {
                debug!(tax_id = %tax_id, product = %item.product_id, "Ignoring unknown tax");
            }
            tax
        })
        .map(|tax| base * tax.percentage / HUNDRED)
        .sum()
}

pub fn calc_total(item: &InvoiceItem, catalog: &[Tax]) -> Decimal {
    calc_sub_total(item) + calc_tax(item, catalog)
}

/// Copy of the line with its computed fields filled in, ready to submit.
pub fn finalize_item(item: &InvoiceItem, catalog: &[Tax]) -> InvoiceItem {
    let sub_total = calc_sub_total(item);
    let tax_amount = calc_tax(item, catalog);
    InvoiceItem {
        quantity: Some(effective_quantity(item)),
        price: Some(effective_price(item)),
        sub_total,
        tax_amount,
        total: sub_total + tax_amount,
        ..item.clone()
    }
}

pub fn total_sub(items: &[InvoiceItem]) -> Decimal {
    items.iter().map(calc_sub_total).sum()
}

pub fn total_tax(items: &[InvoiceItem], catalog: &[Tax]) -> Decimal {
    items.iter().map(|i| calc_tax(i, catalog)).sum()
}

pub fn total_discount(items: &[InvoiceItem]) -> Decimal {
    items.iter().map(|i| i.discount).sum()
}

pub fn total_amount(items: &[InvoiceItem], catalog: &[Tax]) -> Decimal {
    items.iter().map(|i| calc_total(i, catalog)).sum()
}

/// Aggregates shown under the line table and sent with the document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Totals {
    pub sub_total: Decimal,
    pub tax_amount: Decimal,
    pub discount: Decimal,
    pub amount: Decimal,
}

impl Totals {
    pub fn of(items: &[InvoiceItem], catalog: &[Tax]) -> Self {
        Self {
            sub_total: total_sub(items),
            tax_amount: total_tax(items, catalog),
            discount: total_discount(items),
            amount: total_amount(items, catalog),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vat(id: &str, pct: i64) -> Tax {
        Tax { id: id.into(), name: format!("VAT {pct}%"), percentage: Decimal::from(pct) }
    }

    fn line(qty: i64, price: i64, discount: i64, taxes: &[&str]) -> InvoiceItem {
        InvoiceItem {
            product_id: "p1".into(),
            quantity: Some(Decimal::from(qty)),
            price: Some(Decimal::from(price)),
            discount: Decimal::from(discount),
            taxes: taxes.iter().map(|t| t.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn computes_the_reference_line() {
        let catalog = vec![vat("vat10", 10)];
        let item = line(2, 100_000, 10_000, &["vat10"]);
        assert_eq!(calc_sub_total(&item), Decimal::from(190_000));
        assert_eq!(calc_tax(&item, &catalog), Decimal::from(19_000));
        assert_eq!(calc_total(&item, &catalog), Decimal::from(209_000));
    }

    #[test]
    fn discount_floors_subtotal_at_zero() {
        let catalog = vec![vat("vat10", 10)];
        let item = line(1, 50_000, 80_000, &["vat10"]);
        assert_eq!(calc_sub_total(&item), Decimal::ZERO);
        assert_eq!(calc_tax(&item, &catalog), Decimal::ZERO);
        assert_eq!(calc_total(&item, &catalog), Decimal::ZERO);
    }

    #[test]
    fn missing_price_and_quantity_fall_back() {
        let item = InvoiceItem::new("p2", "Nhẫn vàng", Decimal::from(3_500_000));
        assert_eq!(effective_quantity(&item), Decimal::ONE);
        assert_eq!(calc_sub_total(&item), Decimal::from(3_500_000));
    }

    #[test]
    fn stacks_multiple_taxes_and_skips_unknown_ids() {
        let catalog = vec![vat("vat8", 8), vat("env", 2)];
        let item = line(1, 1_000_000, 0, &["vat8", "env", "gone"]);
        assert_eq!(calc_tax(&item, &catalog), Decimal::from(100_000));
    }

    #[test]
    fn totals_are_sums_of_lines() {
        let catalog = vec![vat("vat10", 10)];
        let items = vec![
            line(2, 100_000, 10_000, &["vat10"]),
            line(1, 50_000, 80_000, &["vat10"]),
            line(3, 1_000, 0, &[]),
        ];
        let totals = Totals::of(&items, &catalog);
        assert_eq!(totals.sub_total, Decimal::from(193_000));
        assert_eq!(totals.tax_amount, Decimal::from(19_000));
        assert_eq!(totals.discount, Decimal::from(90_000));
        assert_eq!(totals.amount, totals.sub_total + totals.tax_amount);
    }

    #[test]
    fn finalize_fills_computed_fields() {
        let catalog = vec![vat("vat10", 10)];
        let item = finalize_item(&line(2, 100_000, 10_000, &["vat10"]), &catalog);
        assert_eq!(item.sub_total, Decimal::from(190_000));
        assert_eq!(item.tax_amount, Decimal::from(19_000));
        assert_eq!(item.total, Decimal::from(209_000));
    }
}
