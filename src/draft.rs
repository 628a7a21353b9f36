//! Editable invoice / credit-note drafts.
//!
//! A [`Draft`] is never mutated in place: [`Draft::apply`] consumes one
//! [`DraftAction`] and returns the next draft, so every edit goes through the same
//! validation.

use std::collections::HashMap;

use rust_decimal::Decimal;

use crate::calc::{self, Totals};
use crate::error::{Error, Result};
use crate::model::{CreditNote, Customer, CustomerRef, Invoice, InvoiceItem, Tax};

pub const MSG_CHOOSE_CUSTOMER: &str = "Vui lòng chọn khách hàng";
pub const MSG_ADD_PRODUCT: &str = "Vui lòng thêm sản phẩm";
pub const MSG_CHOOSE_INVOICE: &str = "Vui lòng chọn hóa đơn gốc";
pub const MSG_CUSTOMER_MISMATCH: &str = "Khách hàng không khớp với hóa đơn gốc";

#[derive(Debug, Clone, PartialEq)]
pub enum DraftAction {
    SelectCustomer(Customer),
    SelectOriginalInvoice(Invoice),
    AddLine(InvoiceItem),
    RemoveLine(usize),
    SetQuantity { line: usize, quantity: Decimal },
    SetPrice { line: usize, price: Decimal },
    SetDiscount { line: usize, discount: Decimal },
    ToggleTax { line: usize, tax_id: String },
    SetNote(Option<String>),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Draft {
    pub customer: Option<Customer>,
    pub original_invoice: Option<Invoice>,
    pub lines: Vec<InvoiceItem>,
    pub note: Option<String>,
}

fn non_negative(value: Decimal, field: &str) -> Result<Decimal> {
    if value.is_sign_negative() && !value.is_zero() {
        return Err(Error::validation(format!("{field} không được âm")));
    }
    Ok(value)
}

impl Draft {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(self, action: DraftAction) -> Result<Self> {
        let mut next = self;
        match action {
            DraftAction::SelectCustomer(customer) => next.customer = Some(customer),
            DraftAction::SelectOriginalInvoice(invoice) => {
                if next.customer.is_none() {
                    next.customer = invoice.customer_record().cloned();
                }
                next.original_invoice = Some(invoice);
            }
            DraftAction::AddLine(item) => next.lines.push(item),
            DraftAction::RemoveLine(line) => {
                next.line_mut(line)?;
                next.lines.remove(line);
            }
            DraftAction::SetQuantity { line, quantity } => {
                next.line_mut(line)?.quantity = Some(non_negative(quantity, "Số lượng")?);
            }
            DraftAction::SetPrice { line, price } => {
                next.line_mut(line)?.price = Some(non_negative(price, "Đơn giá")?);
            }
            DraftAction::SetDiscount { line, discount } => {
                next.line_mut(line)?.discount = non_negative(discount, "Giảm giá")?;
            }
            DraftAction::ToggleTax { line, tax_id } => {
                let taxes = &mut next.line_mut(line)?.taxes;
                match taxes.iter().position(|t| *t == tax_id) {
                    Some(pos) => {
                        taxes.remove(pos);
                    }
                    None => taxes.push(tax_id),
                }
            }
            DraftAction::SetNote(note) => {
                next.note = note.filter(|n| !n.trim().is_empty());
            }
        }
        Ok(next)
    }

    fn line_mut(&mut self, line: usize) -> Result<&mut InvoiceItem> {
        let count = self.lines.len();
        self.lines
            .get_mut(line)
            .ok_or_else(|| Error::validation(format!("Dòng {} không tồn tại (có {} dòng)", line + 1, count)))
    }

    pub fn totals(&self, catalog: &[Tax]) -> Totals {
        Totals::of(&self.lines, catalog)
    }

    fn require_customer(&self) -> Result<&Customer> {
        self.customer
            .as_ref()
            .ok_or_else(|| Error::validation(MSG_CHOOSE_CUSTOMER))
    }

    fn finalized_lines(&self, catalog: &[Tax]) -> Result<Vec<InvoiceItem>> {
        if self.lines.is_empty() {
            return Err(Error::validation(MSG_ADD_PRODUCT));
        }
        Ok(self.lines.iter().map(|l| calc::finalize_item(l, catalog)).collect())
    }

    /// Runs the pre-submit guards and builds the invoice payload.
    pub fn submit_invoice(&self, catalog: &[Tax]) -> Result<Invoice> {
        let customer = self.require_customer()?;
        let items = self.finalized_lines(catalog)?;
        let totals = Totals::of(&items, catalog);
        Ok(Invoice {
            customer: Some(CustomerRef::Id(customer.id.clone())),
            items,
            sub_total: totals.sub_total,
            tax_amount: totals.tax_amount,
            discount: totals.discount,
            amount: totals.amount,
            note: self.note.clone(),
            ..Default::default()
        })
    }

    /// Credit notes must reference an original invoice billed to the same customer and
    /// may not credit more of a product than that invoice billed.
    pub fn submit_credit_note(&self, catalog: &[Tax]) -> Result<CreditNote> {
        let customer = self.require_customer()?;
        let original = self
            .original_invoice
            .as_ref()
            .ok_or_else(|| Error::validation(MSG_CHOOSE_INVOICE))?;
        let billed_to = original.customer.as_ref().map(CustomerRef::id).unwrap_or_default();
        if !billed_to.is_empty() && billed_to != customer.id {
            return Err(Error::validation(MSG_CUSTOMER_MISMATCH));
        }
        let items = self.finalized_lines(catalog)?;

        let mut billed: HashMap<&str, Decimal> = HashMap::new();
        for item in &original.items {
            *billed.entry(item.product_id.as_str()).or_default() += calc::effective_quantity(item);
        }
        let mut credited: HashMap<&str, Decimal> = HashMap::new();
        for item in &items {
            *credited.entry(item.product_id.as_str()).or_default() += calc::effective_quantity(item);
        }
        for (product, qty) in &credited {
            let limit = billed.get(product).copied().unwrap_or(Decimal::ZERO);
            if *qty > limit {
                return Err(Error::validation(format!(
                    "Số lượng giảm trừ của sản phẩm {product} ({qty}) vượt quá hóa đơn gốc ({limit})"
                )));
            }
        }

        let totals = Totals::of(&items, catalog);
        Ok(CreditNote {
            original_invoice_id: original.id.clone(),
            customer: Some(CustomerRef::Id(customer.id.clone())),
            items,
            sub_total: totals.sub_total,
            tax_amount: totals.tax_amount,
            discount: totals.discount,
            amount: totals.amount,
            reason: self.note.clone(),
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> Vec<Tax> {
        vec![Tax { id: "vat10".into(), name: "VAT 10%".into(), percentage: Decimal::from(10) }]
    }

    fn customer() -> Customer {
        Customer { id: "c1".into(), name: "Trần Thị B".into(), ..Default::default() }
    }

    fn ring() -> InvoiceItem {
        InvoiceItem::new("ring", "Nhẫn vàng 18K", Decimal::from(100_000))
    }

    #[test]
    fn edits_flow_through_reducer() {
        let draft = Draft::new()
            .apply(DraftAction::SelectCustomer(customer()))
            .and_then(|d| d.apply(DraftAction::AddLine(ring())))
            .and_then(|d| d.apply(DraftAction::SetQuantity { line: 0, quantity: Decimal::from(2) }))
            .and_then(|d| d.apply(DraftAction::SetDiscount { line: 0, discount: Decimal::from(10_000) }))
            .and_then(|d| d.apply(DraftAction::ToggleTax { line: 0, tax_id: "vat10".into() }))
            .unwrap();

        let invoice = draft.submit_invoice(&catalog()).unwrap();
        assert_eq!(invoice.amount, Decimal::from(209_000));
        assert_eq!(invoice.items[0].total, Decimal::from(209_000));
        assert_eq!(invoice.customer.as_ref().map(|c| c.id()), Some("c1"));
    }

    #[test]
    fn toggling_a_tax_twice_removes_it() {
        let draft = Draft::new()
            .apply(DraftAction::AddLine(ring()))
            .and_then(|d| d.apply(DraftAction::ToggleTax { line: 0, tax_id: "vat10".into() }))
            .and_then(|d| d.apply(DraftAction::ToggleTax { line: 0, tax_id: "vat10".into() }))
            .unwrap();
        assert!(draft.lines[0].taxes.is_empty());
    }

    #[test]
    fn rejects_out_of_range_and_negative_edits() {
        let draft = Draft::new().apply(DraftAction::AddLine(ring())).unwrap();
        assert!(draft.clone().apply(DraftAction::RemoveLine(3)).is_err());
        assert!(draft
            .apply(DraftAction::SetPrice { line: 0, price: Decimal::from(-1) })
            .is_err());
    }

    #[test]
    fn submit_requires_customer_then_lines() {
        let err = Draft::new().submit_invoice(&catalog()).unwrap_err();
        assert_eq!(err.to_string(), MSG_CHOOSE_CUSTOMER);

        let err = Draft::new()
            .apply(DraftAction::SelectCustomer(customer()))
            .unwrap()
            .submit_invoice(&catalog())
            .unwrap_err();
        assert_eq!(err.to_string(), MSG_ADD_PRODUCT);
    }

    #[test]
    fn credit_note_cannot_exceed_original_quantity() {
        let original = Invoice {
            id: "inv1".into(),
            customer: Some(CustomerRef::Record(customer())),
            items: vec![InvoiceItem { quantity: Some(Decimal::from(2)), ..ring() }],
            ..Default::default()
        };
        let base = Draft::new()
            .apply(DraftAction::SelectOriginalInvoice(original))
            .and_then(|d| d.apply(DraftAction::AddLine(ring())))
            .unwrap();
        assert_eq!(base.customer.as_ref().map(|c| c.id.as_str()), Some("c1"));

        let ok = base.clone().submit_credit_note(&catalog()).unwrap();
        assert_eq!(ok.original_invoice_id, "inv1");
        assert_eq!(ok.signed_amount(), Decimal::from(-100_000));

        let too_much = base
            .apply(DraftAction::SetQuantity { line: 0, quantity: Decimal::from(3) })
            .unwrap()
            .submit_credit_note(&catalog());
        assert!(too_much.is_err());
    }

    #[test]
    fn credit_note_requires_original_invoice() {
        let err = Draft::new()
            .apply(DraftAction::SelectCustomer(customer()))
            .and_then(|d| d.apply(DraftAction::AddLine(ring())))
            .unwrap()
            .submit_credit_note(&catalog())
            .unwrap_err();
        assert_eq!(err.to_string(), MSG_CHOOSE_INVOICE);
    }

    #[test]
    fn credit_note_customer_must_match_original() {
        let original = Invoice {
            id: "inv1".into(),
            customer: Some(CustomerRef::Id("c1".into())),
            items: vec![ring()],
            ..Default::default()
        };
        let other = Customer { id: "c2".into(), name: "Lê Văn C".into(), ..Default::default() };
        let err = Draft::new()
            .apply(DraftAction::SelectOriginalInvoice(original))
            .and_then(|d| d.apply(DraftAction::SelectCustomer(other)))
            .and_then(|d| d.apply(DraftAction::AddLine(ring())))
            .unwrap()
            .submit_credit_note(&catalog())
            .unwrap_err();
        assert_eq!(err.to_string(), MSG_CUSTOMER_MISMATCH);
    }
}
