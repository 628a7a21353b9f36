//! Sales contracts: creation from invoices, status changes and liquidation.

use std::collections::HashMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::info;

use crate::calc;
use crate::error::{Error, Result};
use crate::model::{Invoice, SalesContract};
use crate::status::ContractStatus;

impl SalesContract {
    /// Snapshots the items of one customer's invoices into a draft contract.
    pub fn from_invoices(invoices: &[Invoice], contract_date: NaiveDate) -> Result<Self> {
        let first = invoices
            .first()
            .ok_or_else(|| Error::validation("Vui lòng chọn ít nhất một hóa đơn"))?;
        let customer_id = first
            .customer
            .as_ref()
            .map(|c| c.id().to_string())
            .ok_or_else(|| Error::validation(crate::draft::MSG_CHOOSE_CUSTOMER))?;

        if invoices
            .iter()
            .any(|inv| inv.customer.as_ref().map(|c| c.id()) != Some(customer_id.as_str()))
        {
            return Err(Error::validation("Các hóa đơn phải thuộc cùng một khách hàng"));
        }

        let buyer = invoices.iter().find_map(|inv| inv.customer_record());
        Ok(SalesContract {
            invoice_ids: invoices.iter().map(|inv| inv.id.clone()).collect(),
            customer_id,
            buyer_name: buyer.map(|c| c.name.clone()).unwrap_or_default(),
            buyer_phone: buyer.and_then(|c| c.phone.clone()),
            buyer_address: buyer.and_then(|c| c.address.clone()),
            buyer_id_number: buyer.and_then(|c| c.id_number.clone()),
            items: invoices.iter().flat_map(|inv| inv.items.iter().cloned()).collect(),
            total: invoices.iter().map(|inv| inv.amount).sum(),
            contract_date: Some(contract_date),
            status: ContractStatus::Draft,
            ..Default::default()
        })
    }

    /// Draft -> Confirmed -> Liquidated; nothing else.
    pub fn transition(&self, to: ContractStatus) -> Result<ContractStatus> {
        let allowed = matches!(
            (self.status, to),
            (ContractStatus::Draft, ContractStatus::Confirmed)
                | (ContractStatus::Confirmed, ContractStatus::Liquidated)
        );
        if !allowed {
            return Err(Error::InvalidTransition {
                entity: "sales contract",
                from: self.status.as_str().to_string(),
                to: to.as_str().to_string(),
            });
        }
        Ok(to)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LiquidationLine {
    pub product_id: String,
    pub product_name: String,
    pub quantity: Decimal,
    pub contracted_price: Decimal,
    pub market_price: Decimal,
    pub contracted_amount: Decimal,
    pub market_amount: Decimal,
    pub difference: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Liquidation {
    pub contract_code: String,
    pub lines: Vec<LiquidationLine>,
    pub contracted_total: Decimal,
    pub market_total: Decimal,
    /// `market_total - contracted_total`.
    pub settlement: Decimal,
}

/// Compares contracted line amounts with today's market unit prices.
///
/// Every product on the contract needs a market price. Only confirmed contracts can be
/// liquidated.
pub fn liquidate(contract: &SalesContract, market_prices: &HashMap<String, Decimal>) -> Result<Liquidation> {
    contract.transition(ContractStatus::Liquidated)?;

    let mut lines = Vec::with_capacity(contract.items.len());
    for item in &contract.items {
        let market_price = market_prices
            .get(&item.product_id)
            .copied()
            .ok_or_else(|| Error::validation(format!("Thiếu giá thị trường cho sản phẩm {}", item.product_id)))?;
        let quantity = calc::effective_quantity(item);
        let contracted_amount = calc::calc_sub_total(item);
        let market_amount = quantity * market_price;
        lines.push(LiquidationLine {
            product_id: item.product_id.clone(),
            product_name: item.product_name.clone(),
            quantity,
            contracted_price: calc::effective_price(item),
            market_price,
            contracted_amount,
            market_amount,
            difference: market_amount - contracted_amount,
        });
    }

    let contracted_total: Decimal = lines.iter().map(|l| l.contracted_amount).sum();
    let market_total: Decimal = lines.iter().map(|l| l.market_amount).sum();
    info!(contract = %contract.code, %contracted_total, %market_total, "Computed liquidation");
    Ok(Liquidation {
        contract_code: contract.code.clone(),
        lines,
        contracted_total,
        market_total,
        settlement: market_total - contracted_total,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Customer, CustomerRef, InvoiceItem};

    fn invoice(id: &str, customer: &str, amount: i64) -> Invoice {
        Invoice {
            id: id.into(),
            customer: Some(CustomerRef::Record(Customer {
                id: customer.into(),
                name: "Võ Minh C".into(),
                phone: Some("0912345678".into()),
                ..Default::default()
            })),
            items: vec![InvoiceItem {
                quantity: Some(Decimal::from(2)),
                ..InvoiceItem::new(format!("gold-{id}"), "Vàng miếng", Decimal::from(amount / 2))
            }],
            amount: Decimal::from(amount),
            ..Default::default()
        }
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 5, 1).unwrap()
    }

    #[test]
    fn snapshots_items_from_all_invoices() {
        let contract =
            SalesContract::from_invoices(&[invoice("a", "c1", 200), invoice("b", "c1", 300)], date()).unwrap();
        assert_eq!(contract.items.len(), 2);
        assert_eq!(contract.total, Decimal::from(500));
        assert_eq!(contract.buyer_name, "Võ Minh C");
        assert_eq!(contract.status, ContractStatus::Draft);
    }

    #[test]
    fn rejects_mixed_customers_and_empty_input() {
        assert!(SalesContract::from_invoices(&[], date()).is_err());
        assert!(SalesContract::from_invoices(&[invoice("a", "c1", 200), invoice("b", "c2", 300)], date()).is_err());
    }

    #[test]
    fn lifecycle_only_moves_forward() {
        let mut contract = SalesContract::from_invoices(&[invoice("a", "c1", 200)], date()).unwrap();
        assert!(contract.transition(ContractStatus::Liquidated).is_err());
        contract.status = contract.transition(ContractStatus::Confirmed).unwrap();
        assert!(contract.transition(ContractStatus::Draft).is_err());
        contract.status = contract.transition(ContractStatus::Liquidated).unwrap();
        assert!(contract.transition(ContractStatus::Liquidated).is_err());
    }

    #[test]
    fn settlement_is_market_minus_contracted() {
        let mut contract = SalesContract::from_invoices(&[invoice("a", "c1", 2_000_000)], date()).unwrap();
        contract.status = ContractStatus::Confirmed;
        let prices = HashMap::from([("gold-a".to_string(), Decimal::from(1_200_000))]);
        let result = liquidate(&contract, &prices).unwrap();
        assert_eq!(result.contracted_total, Decimal::from(2_000_000));
        assert_eq!(result.market_total, Decimal::from(2_400_000));
        assert_eq!(result.settlement, Decimal::from(400_000));
    }

    #[test]
    fn liquidation_needs_every_market_price() {
        let mut contract = SalesContract::from_invoices(&[invoice("a", "c1", 200)], date()).unwrap();
        contract.status = ContractStatus::Confirmed;
        assert!(liquidate(&contract, &HashMap::new()).is_err());
    }
}
