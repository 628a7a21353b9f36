//! Blocking client for the shop backend.
//!
//! Responses come either bare or wrapped in `{ "data": ... }`; list endpoints may
//! also return `{ "data": [...], "total": n }`. Non-2xx statuses become
//! [`Error::Api`] carrying the server's `message`. List methods walk every page, so
//! callers always see the full listing.

use std::time::Duration;

use chrono::NaiveDate;
use reqwest::blocking::{Client, Request};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::config::AppSettings;
use crate::error::{Error, Result};
use crate::model::{CreditNote, Customer, Invoice, Page, Receipt, SalesContract, WarehouseReceipt};
use crate::status::ContractStatus;

const TIMEOUT: Duration = Duration::from_secs(30);
const PAGE_LIMIT: u32 = 100;
const MAX_PAGES: u32 = 1_000;

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct ListParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<NaiveDate>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum One<T> {
    Wrapped { data: T },
    Bare(T),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Many<T> {
    Bare(Vec<T>),
    Paged(Page<T>),
    Nested { data: Page<T> },
}

fn error_message(status: StatusCode, body: &str) -> String {
    let parsed = serde_json::from_str::<Value>(body).ok();
    let message = parsed.as_ref().and_then(|v| v.get("message")).and_then(|m| match m {
        Value::String(s) => Some(s.clone()),
        Value::Array(parts) => Some(
            parts
                .iter()
                .filter_map(Value::as_str)
                .collect::<Vec<_>>()
                .join("; "),
        ),
        _ => None,
    });
    match message {
        Some(m) if !m.is_empty() => m,
        _ if !body.trim().is_empty() && parsed.is_none() => body.trim().to_string(),
        _ => status.canonical_reason().unwrap_or("request failed").to_string(),
    }
}

fn check(status: StatusCode, body: &str) -> Result<()> {
    if status.is_success() {
        return Ok(());
    }
    Err(Error::Api { status: status.as_u16(), message: error_message(status, body) })
}

pub(crate) fn decode_one<T: DeserializeOwned>(status: StatusCode, body: &str) -> Result<T> {
    check(status, body)?;
    let body = if body.trim().is_empty() { "null" } else { body };
    Ok(match serde_json::from_str::<One<T>>(body)? {
        One::Wrapped { data } | One::Bare(data) => data,
    })
}

pub(crate) fn decode_many<T: DeserializeOwned>(status: StatusCode, body: &str) -> Result<Page<T>> {
    check(status, body)?;
    Ok(match serde_json::from_str::<Many<T>>(body)? {
        Many::Bare(data) => {
            let total = Some(data.len() as u64);
            Page { data, total }
        }
        Many::Paged(page) | Many::Nested { data: page } => page,
    })
}

/// Requests pages from `first` on until the reported total is reached, a page comes
/// back empty, or (without a total) a page comes back short.
pub(crate) fn collect_pages<T, F>(first: u32, limit: u32, mut fetch: F) -> Result<Vec<T>>
where
    F: FnMut(u32) -> Result<Page<T>>,
{
    let mut rows = Vec::new();
    let mut page = first.max(1);
    loop {
        let Page { data, total } = fetch(page)?;
        let received = data.len();
        rows.extend(data);
        let done = match total {
            _ if received == 0 => true,
            Some(total) => rows.len() as u64 >= total,
            None => received < limit as usize,
        };
        if done {
            return Ok(rows);
        }
        if page - first.max(1) + 1 >= MAX_PAGES {
            warn!(pages = MAX_PAGES, rows = rows.len(), "Stopped paging before the listing ended");
            return Ok(rows);
        }
        page += 1;
    }
}

pub struct ApiClient {
    base_url: String,
    token: Option<String>,
    http: Client,
}

impl ApiClient {
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self> {
        let http = Client::builder().timeout(TIMEOUT).build()?;
        Ok(Self { base_url: base_url.trim_end_matches('/').to_string(), token, http })
    }

    pub fn from_settings(settings: &AppSettings) -> Result<Self> {
        Self::new(&settings.api_base_url, settings.api_token.clone())
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn build(&self, method: Method, path: &str, query: Option<&ListParams>, body: Option<&Value>) -> Result<Request> {
        let mut builder = self.http.request(method, self.url(path));
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }
        if let Some(params) = query {
            builder = builder.query(params);
        }
        if let Some(body) = body {
            builder = builder.json(body);
        }
        Ok(builder.build()?)
    }

    fn execute(&self, request: Request) -> Result<(StatusCode, String)> {
        debug!(method = %request.method(), url = %request.url(), "API request");
        let response = self.http.execute(request)?;
        let status = response.status();
        let body = response.text()?;
        debug!(status = status.as_u16(), bytes = body.len(), "API response");
        Ok((status, body))
    }

    fn get_one<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let (status, body) = self.execute(self.build(Method::GET, path, None, None)?)?;
        decode_one(status, &body)
    }

    fn get_many<T: DeserializeOwned>(&self, path: &str, params: &ListParams) -> Result<Page<T>> {
        let (status, body) = self.execute(self.build(Method::GET, path, Some(params), None)?)?;
        decode_many(status, &body)
    }

    fn get_all<T: DeserializeOwned>(&self, path: &str, params: &ListParams) -> Result<Vec<T>> {
        let mut params = params.clone();
        let limit = params.limit.unwrap_or(PAGE_LIMIT).max(1);
        params.limit = Some(limit);
        let first = params.page.unwrap_or(1);
        collect_pages(first, limit, |page| {
            params.page = Some(page);
            self.get_many(path, &params)
        })
    }

    fn send<B: Serialize, T: DeserializeOwned>(&self, method: Method, path: &str, payload: &B) -> Result<T> {
        let value = serde_json::to_value(payload)?;
        let (status, body) = self.execute(self.build(method, path, None, Some(&value))?)?;
        decode_one(status, &body)
    }

    // Invoices

    pub fn list_invoices(&self, params: &ListParams) -> Result<Vec<Invoice>> {
        self.get_all("/invoice", params)
    }

    /// Invoices created by the signed-in user.
    pub fn list_my_invoices(&self, params: &ListParams) -> Result<Vec<Invoice>> {
        self.get_all("/invoice/by-user", params)
    }

    pub fn get_invoice(&self, id: &str) -> Result<Invoice> {
        self.get_one(&format!("/invoice/{id}"))
    }

    pub fn create_invoice(&self, invoice: &Invoice) -> Result<Invoice> {
        let created: Invoice = self.send(Method::POST, "/invoice", invoice)?;
        info!(code = %created.code, "Created invoice");
        Ok(created)
    }

    pub fn send_delivery_reminder(&self, invoice_ids: &[String]) -> Result<Value> {
        self.send(Method::POST, "/invoice/send-delivery-reminder", &json!({ "invoiceIds": invoice_ids }))
    }

    // Customers

    pub fn list_customers(&self, params: &ListParams) -> Result<Vec<Customer>> {
        self.get_all("/customer", params)
    }

    pub fn get_customer(&self, id: &str) -> Result<Customer> {
        self.get_one(&format!("/customer/{id}"))
    }

    pub fn create_customer(&self, customer: &Customer) -> Result<Customer> {
        self.send(Method::POST, "/customer", customer)
    }

    pub fn update_customer(&self, customer: &Customer) -> Result<Customer> {
        if customer.id.is_empty() {
            return Err(Error::validation("Khách hàng chưa có mã"));
        }
        self.send(Method::PUT, &format!("/customer/{}", customer.id), customer)
    }

    // Credit notes, receipts, warehouse

    pub fn list_credit_notes(&self, params: &ListParams) -> Result<Vec<CreditNote>> {
        self.get_all("/credit_note", params)
    }

    pub fn get_credit_note(&self, id: &str) -> Result<CreditNote> {
        self.get_one(&format!("/credit_note/{id}"))
    }

    pub fn create_credit_note(&self, note: &CreditNote) -> Result<CreditNote> {
        self.send(Method::POST, "/credit_note", note)
    }

    pub fn list_receipts(&self, params: &ListParams) -> Result<Vec<Receipt>> {
        self.get_all("/receipt", params)
    }

    pub fn list_warehouse_receipts(&self, params: &ListParams) -> Result<Vec<WarehouseReceipt>> {
        self.get_all("/warehouse-receipt", params)
    }

    // Sales contracts

    pub fn list_contracts(&self, params: &ListParams) -> Result<Vec<SalesContract>> {
        self.get_all("/sales-contract", params)
    }

    pub fn get_contract(&self, id: &str) -> Result<SalesContract> {
        self.get_one(&format!("/sales-contract/{id}"))
    }

    pub fn create_contract(&self, contract: &SalesContract) -> Result<SalesContract> {
        self.send(Method::POST, "/sales-contract", contract)
    }

    pub fn update_contract_status(&self, id: &str, status: ContractStatus) -> Result<SalesContract> {
        self.send(Method::PUT, &format!("/sales-contract/{id}/status"), &json!({ "status": status }))
    }

    // E-invoices

    pub fn publish_einvoice(&self, invoice_id: &str) -> Result<Value> {
        let result = self.send(Method::POST, "/s_invoice/publish", &json!({ "invoiceId": invoice_id }))?;
        info!(invoice = invoice_id, "Published e-invoice");
        Ok(result)
    }

    /// Base64-encoded PDF preview from the e-invoice provider.
    pub fn preview_einvoice(&self, invoice_id: &str) -> Result<String> {
        self.get_one(&format!("/s_invoice/preview/{invoice_id}"))
    }
}
