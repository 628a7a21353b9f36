//! Client-side search and paging for list views.

use crate::format::{self, search_matches};
use crate::model::{CreditNote, Customer, Invoice, Receipt, SalesContract, WarehouseReceipt};

pub const DEFAULT_PAGE_SIZE: usize = 10;

/// Rows that can be matched by the free-text search box.
pub trait Searchable {
    fn search_text(&self) -> String;
}

#[derive(Debug, Clone)]
pub struct TableQuery {
    pub search: Option<String>,
    /// 1-based.
    pub page: usize,
    pub page_size: usize,
}

impl Default for TableQuery {
    fn default() -> Self {
        Self { search: None, page: 1, page_size: DEFAULT_PAGE_SIZE }
    }
}

#[derive(Debug)]
pub struct PageSlice<'a, T> {
    pub rows: Vec<&'a T>,
    pub page: usize,
    pub total_pages: usize,
    pub total_rows: usize,
}

impl TableQuery {
    /// Filters by search text and `keep`, then cuts out the requested page. Pages past the
    /// end are clamped to the last page.
    pub fn apply<'a, T, F>(&self, rows: &'a [T], keep: F) -> PageSlice<'a, T>
    where
        T: Searchable,
        F: Fn(&T) -> bool,
    {
        let query = self.search.as_deref().unwrap_or("");
        let matched: Vec<&T> = rows
            .iter()
            .filter(|row| keep(row))
            .filter(|row| search_matches(&row.search_text(), query))
            .collect();

        let page_size = self.page_size.max(1);
        let total_rows = matched.len();
        let total_pages = total_rows.div_ceil(page_size).max(1);
        let page = self.page.clamp(1, total_pages);
        let rows = matched
            .into_iter()
            .skip((page - 1) * page_size)
            .take(page_size)
            .collect();

        PageSlice { rows, page, total_pages, total_rows }
    }
}

impl Searchable for Customer {
    fn search_text(&self) -> String {
        [
            Some(self.name.as_str()),
            self.phone.as_deref(),
            self.email.as_deref(),
            self.id_number.as_deref(),
        ]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(" ")
    }
}

impl Searchable for Invoice {
    fn search_text(&self) -> String {
        let phone = self.customer_record().and_then(|c| c.phone.as_deref()).unwrap_or("");
        let products: Vec<&str> = self.items.iter().map(|i| i.product_name.as_str()).collect();
        format!("{} {} {} {}", self.code, self.customer_name(), phone, products.join(" "))
    }
}

impl Searchable for CreditNote {
    fn search_text(&self) -> String {
        let name = self
            .customer
            .as_ref()
            .and_then(|c| c.record())
            .map(|c| c.name.as_str())
            .unwrap_or("");
        format!("{} {} {}", self.code, name, self.reason.as_deref().unwrap_or(""))
    }
}

impl Searchable for Receipt {
    fn search_text(&self) -> String {
        let name = self
            .customer
            .as_ref()
            .and_then(|c| c.record())
            .map(|c| c.name.as_str())
            .unwrap_or("");
        format!("{} {} {}", self.code, name, format::format_number(self.amount))
    }
}

impl Searchable for WarehouseReceipt {
    fn search_text(&self) -> String {
        let products: Vec<&str> = self.items.iter().map(|i| i.product_name.as_str()).collect();
        format!("{} {} {}", self.code, self.kind.label(), products.join(" "))
    }
}

impl Searchable for SalesContract {
    fn search_text(&self) -> String {
        format!(
            "{} {} {}",
            self.code,
            self.buyer_name,
            self.buyer_phone.as_deref().unwrap_or("")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CustomerRef;
    use crate::status::PaymentStatus;

    fn customers(n: usize) -> Vec<Customer> {
        (1..=n)
            .map(|i| Customer {
                id: format!("c{i}"),
                name: if i % 2 == 0 { format!("Lê Văn {i}") } else { format!("Phạm Thị {i}") },
                phone: Some(format!("09000000{i:02}")),
                ..Default::default()
            })
            .collect()
    }

    #[test]
    fn pages_are_one_based_and_clamped() {
        let rows = customers(23);
        let query = TableQuery { page: 3, ..Default::default() };
        let page = query.apply(&rows, |_| true);
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.rows.len(), 3);
        assert_eq!(page.rows[0].id, "c21");

        let past_end = TableQuery { page: 99, ..Default::default() }.apply(&rows, |_| true);
        assert_eq!(past_end.page, 3);
    }

    #[test]
    fn search_is_accent_insensitive() {
        let rows = customers(6);
        let query = TableQuery { search: Some("le van".into()), ..Default::default() };
        let page = query.apply(&rows, |_| true);
        assert_eq!(page.total_rows, 3);
        assert!(page.rows.iter().all(|c| c.name.starts_with("Lê")));
    }

    #[test]
    fn empty_result_still_has_one_page() {
        let rows: Vec<Customer> = Vec::new();
        let page = TableQuery::default().apply(&rows, |_| true);
        assert_eq!(page.total_pages, 1);
        assert!(page.rows.is_empty());
    }

    #[test]
    fn predicate_filters_before_paging() {
        let invoices: Vec<Invoice> = (0..5)
            .map(|i| Invoice {
                code: format!("HD{i:03}"),
                customer: Some(CustomerRef::Id("c1".into())),
                payment_status: if i < 2 { PaymentStatus::Paid } else { PaymentStatus::Unpaid },
                ..Default::default()
            })
            .collect();
        let page = TableQuery::default().apply(&invoices, |inv| inv.payment_status.is_paid());
        assert_eq!(page.total_rows, 2);
    }
}
