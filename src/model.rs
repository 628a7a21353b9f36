use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::status::{ContractStatus, InvoiceStatus, PaymentStatus};

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    #[serde(default, alias = "_id", skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    /// Citizen ID (CCCD) printed on agreements.
    #[serde(default)]
    pub id_number: Option<String>,
    #[serde(default)]
    pub tax_code: Option<String>,
}

/// The backend returns either a populated customer or just its id.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum CustomerRef {
    Record(Customer),
    Id(String),
}

impl CustomerRef {
    pub fn id(&self) -> &str {
        match self {
            CustomerRef::Record(c) => &c.id,
            CustomerRef::Id(id) => id,
        }
    }

    pub fn record(&self) -> Option<&Customer> {
        match self {
            CustomerRef::Record(c) => Some(c),
            CustomerRef::Id(_) => None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Tax {
    pub id: String,
    pub name: String,
    /// 10 means 10%.
    pub percentage: Decimal,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceItem {
    #[serde(alias = "product")]
    pub product_id: String,
    #[serde(default)]
    pub product_name: String,
    #[serde(default)]
    pub product_code: Option<String>,
    #[serde(default)]
    pub quantity: Option<Decimal>,
    #[serde(default)]
    pub price: Option<Decimal>,
    /// Catalog price, used while the line has no edited price.
    #[serde(default)]
    pub original_price: Decimal,
    #[serde(default)]
    pub discount: Decimal,
    #[serde(default, alias = "taxIds")]
    pub taxes: Vec<String>,
    #[serde(default)]
    pub weight: Option<Decimal>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub tax_amount: Decimal,
    #[serde(default)]
    pub sub_total: Decimal,
    #[serde(default)]
    pub total: Decimal,
}

impl InvoiceItem {
    pub fn new(product_id: impl Into<String>, name: impl Into<String>, price: Decimal) -> Self {
        Self {
            product_id: product_id.into(),
            product_name: name.into(),
            original_price: price,
            ..Default::default()
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
    #[serde(default, alias = "_id", skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub customer: Option<CustomerRef>,
    #[serde(default)]
    pub items: Vec<InvoiceItem>,
    #[serde(default)]
    pub sub_total: Decimal,
    #[serde(default)]
    pub tax_amount: Decimal,
    #[serde(default)]
    pub discount: Decimal,
    #[serde(default)]
    pub amount: Decimal,
    #[serde(default)]
    pub paid_amount: Decimal,
    #[serde(default)]
    pub installment_count: Option<u32>,
    #[serde(default)]
    pub status: InvoiceStatus,
    #[serde(default)]
    pub payment_status: PaymentStatus,
    #[serde(default)]
    pub note: Option<String>,
    /// Base64 PNG, present once the e-invoice has been published.
    #[serde(default)]
    pub qr_code: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Invoice {
    pub fn customer_record(&self) -> Option<&Customer> {
        self.customer.as_ref().and_then(CustomerRef::record)
    }

    pub fn customer_name(&self) -> &str {
        self.customer_record().map(|c| c.name.as_str()).unwrap_or("")
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CreditNote {
    #[serde(default, alias = "_id", skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(default)]
    pub code: String,
    pub original_invoice_id: String,
    #[serde(default)]
    pub customer: Option<CustomerRef>,
    #[serde(default)]
    pub items: Vec<InvoiceItem>,
    #[serde(default)]
    pub sub_total: Decimal,
    #[serde(default)]
    pub tax_amount: Decimal,
    #[serde(default)]
    pub discount: Decimal,
    #[serde(default)]
    pub amount: Decimal,
    #[serde(default)]
    pub status: InvoiceStatus,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl CreditNote {
    /// Credit notes reduce what the customer owes.
    pub fn signed_amount(&self) -> Decimal {
        -self.amount
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    #[serde(default, alias = "_id", skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub invoice_id: Option<String>,
    #[serde(default)]
    pub customer: Option<CustomerRef>,
    #[serde(default)]
    pub amount: Decimal,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum WarehouseReceiptKind {
    #[default]
    Import,
    Export,
}

impl WarehouseReceiptKind {
    pub fn label(&self) -> &'static str {
        match self {
            WarehouseReceiptKind::Import => "Nhập kho",
            WarehouseReceiptKind::Export => "Xuất kho",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WarehouseLine {
    #[serde(alias = "product")]
    pub product_id: String,
    #[serde(default)]
    pub product_name: String,
    #[serde(default)]
    pub quantity: Decimal,
    #[serde(default)]
    pub weight: Option<Decimal>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WarehouseReceipt {
    #[serde(default, alias = "_id", skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(default)]
    pub code: String,
    #[serde(default, rename = "type")]
    pub kind: WarehouseReceiptKind,
    #[serde(default)]
    pub items: Vec<WarehouseLine>,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SalesContract {
    #[serde(default, alias = "_id", skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub invoice_ids: Vec<String>,
    #[serde(default)]
    pub customer_id: String,
    #[serde(default)]
    pub buyer_name: String,
    #[serde(default)]
    pub buyer_phone: Option<String>,
    #[serde(default)]
    pub buyer_address: Option<String>,
    #[serde(default)]
    pub buyer_id_number: Option<String>,
    #[serde(default)]
    pub items: Vec<InvoiceItem>,
    #[serde(default)]
    pub total: Decimal,
    #[serde(default)]
    pub contract_date: Option<NaiveDate>,
    #[serde(default)]
    pub delivery_date: Option<NaiveDate>,
    #[serde(default)]
    pub status: ContractStatus,
}

/// List envelope used by the paged endpoints.
#[derive(Debug, Deserialize, Clone)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct Page<T> {
    #[serde(default, alias = "items", alias = "rows")]
    pub data: Vec<T>,
    #[serde(default)]
    pub total: Option<u64>,
}
