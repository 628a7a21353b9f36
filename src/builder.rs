//! Flat view-models for printed documents.
//!
//! Builders take a persisted invoice (or contract) and produce plain strings and
//! numbers in exactly the shape the templates read. They never fail: an invoice without
//! items yields an empty item list and zero totals.

use chrono::{Local, Months, NaiveDate};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::warn;

use crate::calc;
use crate::config::SellerConfig;
use crate::format::{
    amount_in_words, format_currency, format_date, format_long_date, format_number, format_percent,
    format_weight, local_date, round_vnd,
};
use crate::model::{Customer, Invoice, InvoiceItem, SalesContract};

/// Used when an invoice carries tax but no subtotal to derive a rate from.
pub const FALLBACK_VAT_RATE: Decimal = Decimal::from_parts(8, 0, 0, false, 0);

const DEFAULT_INSTALLMENTS: u32 = 1;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Party {
    pub name: String,
    pub address: String,
    pub phone: String,
    pub email: String,
    pub tax_code: String,
    pub id_number: String,
    pub representative: String,
    pub position: String,
    pub bank_account: String,
    pub bank_name: String,
}

impl Party {
    pub fn seller(seller: &SellerConfig) -> Self {
        Self {
            name: seller.name.clone(),
            address: seller.address.clone(),
            phone: seller.phone.clone(),
            email: seller.email.clone().unwrap_or_default(),
            tax_code: seller.tax_code.clone(),
            representative: seller.representative.clone().unwrap_or_default(),
            position: seller.position.clone().unwrap_or_default(),
            bank_account: seller.bank_account.clone().unwrap_or_default(),
            bank_name: seller.bank_name.clone().unwrap_or_default(),
            ..Default::default()
        }
    }

    pub fn buyer(customer: &Customer) -> Self {
        Self {
            name: customer.name.clone(),
            address: customer.address.clone().unwrap_or_default(),
            phone: customer.phone.clone().unwrap_or_default(),
            email: customer.email.clone().unwrap_or_default(),
            tax_code: customer.tax_code.clone().unwrap_or_default(),
            id_number: customer.id_number.clone().unwrap_or_default(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentItem {
    pub index: usize,
    pub code: String,
    pub name: String,
    pub unit: String,
    pub weight: String,
    pub quantity: String,
    pub unit_price: String,
    pub discount: String,
    pub amount: String,
}

/// Numeric totals kept next to their formatted strings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct DocumentAmounts {
    pub sub_total: Decimal,
    pub discount: Decimal,
    pub vat_rate: Decimal,
    pub vat_amount: Decimal,
    pub total: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgreementData {
    pub contract_no: String,
    pub date: String,
    pub long_date: String,
    pub seller: Party,
    pub buyer: Party,
    pub items: Vec<DocumentItem>,
    pub amounts: DocumentAmounts,
    pub sub_total: String,
    pub discount: String,
    pub vat_rate: String,
    pub vat_amount: String,
    pub total: String,
    pub total_in_words: String,
    pub note: String,
    /// Base64 PNG shown on the Word document.
    pub qr_code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstallmentTerm {
    pub index: u32,
    pub due_date: String,
    pub amount: String,
    pub amount_value: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstallmentData {
    #[serde(flatten)]
    pub agreement: AgreementData,
    pub prepaid: String,
    pub prepaid_value: Decimal,
    pub remaining: String,
    pub remaining_value: Decimal,
    pub remaining_in_words: String,
    pub installment_count: u32,
    pub schedule: Vec<InstallmentTerm>,
}

/// VAT percentage implied by an invoice's totals.
///
/// With a zero subtotal the ratio is undefined: no tax gives 0, any tax gives
/// [`FALLBACK_VAT_RATE`].
pub fn infer_vat_rate(sub_total: Decimal, tax_amount: Decimal) -> Decimal {
    if !sub_total.is_zero() {
        return (tax_amount / sub_total * Decimal::ONE_HUNDRED).round_dp(2);
    }
    if tax_amount.is_zero() {
        Decimal::ZERO
    } else {
        warn!(%tax_amount, "Tax without subtotal, using fallback VAT rate");
        FALLBACK_VAT_RATE
    }
}

fn document_item(index: usize, item: &InvoiceItem) -> DocumentItem {
    DocumentItem {
        index: index + 1,
        code: item.product_code.clone().unwrap_or_default(),
        name: item.product_name.clone(),
        unit: item.unit.clone().unwrap_or_default(),
        weight: item.weight.map(format_weight).unwrap_or_default(),
        quantity: format_weight(calc::effective_quantity(item)),
        unit_price: format_number(calc::effective_price(item)),
        discount: format_number(item.discount),
        amount: format_number(calc::calc_sub_total(item)),
    }
}

struct Source<'a> {
    code: &'a str,
    date: NaiveDate,
    buyer: Party,
    items: &'a [InvoiceItem],
    sub_total: Decimal,
    tax_amount: Decimal,
    discount: Decimal,
    total: Decimal,
    note: Option<&'a str>,
    qr_code: Option<String>,
}

fn assemble(source: Source<'_>, seller: &SellerConfig) -> AgreementData {
    let vat_rate = infer_vat_rate(source.sub_total, source.tax_amount);
    let amounts = DocumentAmounts {
        sub_total: source.sub_total,
        discount: source.discount,
        vat_rate,
        vat_amount: source.tax_amount,
        total: source.total,
    };
    AgreementData {
        contract_no: source.code.to_string(),
        date: format_date(source.date),
        long_date: format_long_date(source.date),
        seller: Party::seller(seller),
        buyer: source.buyer,
        items: source.items.iter().enumerate().map(|(i, item)| document_item(i, item)).collect(),
        amounts,
        sub_total: format_currency(amounts.sub_total),
        discount: format_currency(amounts.discount),
        vat_rate: format_percent(amounts.vat_rate),
        vat_amount: format_currency(amounts.vat_amount),
        total: format_currency(amounts.total),
        total_in_words: amount_in_words(amounts.total),
        note: source.note.unwrap_or_default().to_string(),
        qr_code: source.qr_code,
    }
}

fn invoice_date(invoice: &Invoice) -> NaiveDate {
    invoice
        .created_at
        .map(local_date)
        .unwrap_or_else(|| Local::now().date_naive())
}

pub fn build_agreement_data(invoice: &Invoice, seller: &SellerConfig) -> AgreementData {
    let buyer = invoice.customer_record().map(Party::buyer).unwrap_or_default();
    assemble(
        Source {
            code: &invoice.code,
            date: invoice_date(invoice),
            buyer,
            items: &invoice.items,
            sub_total: invoice.sub_total,
            tax_amount: invoice.tax_amount,
            discount: invoice.discount,
            total: invoice.amount,
            note: invoice.note.as_deref(),
            qr_code: invoice.qr_code.clone(),
        },
        seller,
    )
}

/// Contracts carry no tax split; the whole snapshot total is printed as the amount.
pub fn build_contract_data(contract: &SalesContract, seller: &SellerConfig) -> AgreementData {
    let buyer = Party {
        name: contract.buyer_name.clone(),
        address: contract.buyer_address.clone().unwrap_or_default(),
        phone: contract.buyer_phone.clone().unwrap_or_default(),
        id_number: contract.buyer_id_number.clone().unwrap_or_default(),
        ..Default::default()
    };
    let sub_total = calc::total_sub(&contract.items);
    let tax_amount: Decimal = contract.items.iter().map(|i| i.tax_amount).sum();
    assemble(
        Source {
            code: &contract.code,
            date: contract.contract_date.unwrap_or_else(|| Local::now().date_naive()),
            buyer,
            items: &contract.items,
            sub_total,
            tax_amount,
            discount: calc::total_discount(&contract.items),
            total: contract.total,
            note: None,
            qr_code: None,
        },
        seller,
    )
}

/// Splits `total` into `count` whole-đồng terms; the last term takes the remainder.
pub fn split_installments(total: Decimal, count: u32) -> Vec<Decimal> {
    let count = count.max(1);
    if total <= Decimal::ZERO {
        return Vec::new();
    }
    let total = round_vnd(total);
    let per_term = (total / Decimal::from(count)).floor();
    let mut terms = vec![per_term; count as usize];
    if let Some(last) = terms.last_mut() {
        *last = total - per_term * Decimal::from(count - 1);
    }
    terms
}

pub fn build_installment_data(invoice: &Invoice, seller: &SellerConfig) -> InstallmentData {
    let agreement = build_agreement_data(invoice, seller);
    let start = invoice_date(invoice);
    let prepaid = invoice.paid_amount.max(Decimal::ZERO);
    let remaining = (invoice.amount - prepaid).max(Decimal::ZERO);
    let count = invoice.installment_count.unwrap_or(DEFAULT_INSTALLMENTS).max(1);

    let schedule = split_installments(remaining, count)
        .into_iter()
        .enumerate()
        .map(|(i, amount)| {
            let index = i as u32 + 1;
            let due = start.checked_add_months(Months::new(index)).unwrap_or(start);
            InstallmentTerm {
                index,
                due_date: format_date(due),
                amount: format_currency(amount),
                amount_value: amount,
            }
        })
        .collect();

    InstallmentData {
        agreement,
        prepaid: format_currency(prepaid),
        prepaid_value: prepaid,
        remaining: format_currency(remaining),
        remaining_value: remaining,
        remaining_in_words: amount_in_words(remaining),
        installment_count: count,
        schedule,
    }
}
