//! Status badges.
//!
//! Every status the backend reports maps to one [`StatusStyle`] record through an
//! exhaustive `match`, so adding a variant forces a decision about how it is shown.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Neutral,
    Warning,
    Info,
    Success,
    Danger,
}

impl Tone {
    pub fn rgb(&self) -> (u8, u8, u8) {
        match self {
            Tone::Neutral => (107, 114, 128),
            Tone::Warning => (180, 83, 9),
            Tone::Info => (29, 78, 216),
            Tone::Success => (4, 120, 87),
            Tone::Danger => (185, 28, 28),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusStyle {
    pub label: &'static str,
    pub tone: Tone,
    pub icon: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    #[default]
    Pending,
    Accepted,
    Delivered,
    Rejected,
    #[serde(other)]
    Unknown,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Pending => "pending",
            InvoiceStatus::Accepted => "accepted",
            InvoiceStatus::Delivered => "delivered",
            InvoiceStatus::Rejected => "rejected",
            InvoiceStatus::Unknown => "unknown",
        }
    }

    pub fn style(&self) -> StatusStyle {
        match self {
            InvoiceStatus::Pending => StatusStyle { label: "Chờ duyệt", tone: Tone::Warning, icon: "clock" },
            InvoiceStatus::Accepted => StatusStyle { label: "Đã duyệt", tone: Tone::Info, icon: "check" },
            InvoiceStatus::Delivered => StatusStyle { label: "Đã giao", tone: Tone::Success, icon: "truck" },
            InvoiceStatus::Rejected => StatusStyle { label: "Từ chối", tone: Tone::Danger, icon: "x-circle" },
            InvoiceStatus::Unknown => StatusStyle { label: "Không xác định", tone: Tone::Neutral, icon: "help-circle" },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    #[default]
    Unpaid,
    #[serde(alias = "partially_paid")]
    Partial,
    Paid,
    #[serde(other)]
    Unknown,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Unpaid => "unpaid",
            PaymentStatus::Partial => "partial",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Unknown => "unknown",
        }
    }

    pub fn style(&self) -> StatusStyle {
        match self {
            PaymentStatus::Unpaid => StatusStyle { label: "Chưa thanh toán", tone: Tone::Danger, icon: "alert-circle" },
            PaymentStatus::Partial => StatusStyle { label: "Thanh toán một phần", tone: Tone::Warning, icon: "pie-chart" },
            PaymentStatus::Paid => StatusStyle { label: "Đã thanh toán", tone: Tone::Success, icon: "check-circle" },
            PaymentStatus::Unknown => StatusStyle { label: "Không xác định", tone: Tone::Neutral, icon: "help-circle" },
        }
    }

    pub fn is_paid(&self) -> bool {
        matches!(self, PaymentStatus::Paid)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContractStatus {
    #[default]
    Draft,
    Confirmed,
    Liquidated,
}

impl ContractStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContractStatus::Draft => "draft",
            ContractStatus::Confirmed => "confirmed",
            ContractStatus::Liquidated => "liquidated",
        }
    }

    pub fn style(&self) -> StatusStyle {
        match self {
            ContractStatus::Draft => StatusStyle { label: "Nháp", tone: Tone::Neutral, icon: "file" },
            ContractStatus::Confirmed => StatusStyle { label: "Đã xác nhận", tone: Tone::Info, icon: "file-check" },
            ContractStatus::Liquidated => StatusStyle { label: "Đã thanh lý", tone: Tone::Success, icon: "archive" },
        }
    }
}

impl std::str::FromStr for ContractStatus {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "draft" => Ok(ContractStatus::Draft),
            "confirmed" => Ok(ContractStatus::Confirmed),
            "liquidated" => Ok(ContractStatus::Liquidated),
            other => Err(crate::Error::validation(format!("Trạng thái hợp đồng không hợp lệ: {other}"))),
        }
    }
}

impl std::str::FromStr for InvoiceStatus {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(InvoiceStatus::Pending),
            "accepted" => Ok(InvoiceStatus::Accepted),
            "delivered" => Ok(InvoiceStatus::Delivered),
            "rejected" => Ok(InvoiceStatus::Rejected),
            other => Err(crate::Error::validation(format!("Trạng thái hóa đơn không hợp lệ: {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_invoice_status_falls_back_to_neutral_badge() {
        let status: InvoiceStatus = serde_json::from_str(r#""archived""#).unwrap();
        assert_eq!(status, InvoiceStatus::Unknown);
        assert_eq!(status.style().tone, Tone::Neutral);
    }

    #[test]
    fn payment_status_accepts_backend_alias() {
        let status: PaymentStatus = serde_json::from_str(r#""partially_paid""#).unwrap();
        assert_eq!(status, PaymentStatus::Partial);
        assert_eq!(status.style().label, "Thanh toán một phần");
    }

    #[test]
    fn styles_map_to_records() {
        assert_eq!(InvoiceStatus::Delivered.style().tone, Tone::Success);
        assert_eq!(InvoiceStatus::Rejected.style().icon, "x-circle");
        assert_eq!(ContractStatus::Liquidated.style().label, "Đã thanh lý");
    }

    #[test]
    fn contract_status_parses_cli_input() {
        assert_eq!("Confirmed".parse::<ContractStatus>().unwrap(), ContractStatus::Confirmed);
        assert!("closed".parse::<ContractStatus>().is_err());
    }
}
