use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitCode};

use anyhow::{anyhow, Context, Result};
use chrono::{Datelike, Local, NaiveDate};
use clap::{Parser, Subcommand};
use comfy_table::{Attribute, Cell, Color, Table};
use inquire::{Confirm, DateSelect, InquireError, MultiSelect, Password, PasswordDisplayMode, Select, Text};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::Value;
use slug::slugify;
use tracing_subscriber::EnvFilter;

use jewelry_desk::api::{ApiClient, ListParams};
use jewelry_desk::calc::{self, Totals};
use jewelry_desk::config::{self, AppSettings, SellerConfig, Workspace};
use jewelry_desk::contract;
use jewelry_desk::draft::{Draft, DraftAction};
use jewelry_desk::export::pdf::{self, TypstCompiler};
use jewelry_desk::export::{self, DocumentKind, ExportFormat, Exporter};
use jewelry_desk::format::{
    format_currency, format_date, format_weight, local_date, parse_money, parse_quantity,
};
use jewelry_desk::model::{Customer, Invoice, InvoiceItem, SalesContract, Tax};
use jewelry_desk::status::{ContractStatus, InvoiceStatus, StatusStyle, Tone};
use jewelry_desk::table::{Searchable, TableQuery, DEFAULT_PAGE_SIZE};

// ==========================================
// Constants
// ==========================================
const NEW_CUSTOMER_OPT: &str = "➕ Thêm khách hàng mới";
const DEFAULT_DATA_ROOT: &str = "~/Documents/JewelryDesk";
const DEFAULT_API_URL: &str = "http://localhost:3000/api";

// ==========================================
// CLI
// ==========================================

#[derive(Parser)]
#[command(name = "jewelry-desk", version, about = "Invoices, contracts and documents for a jewelry shop")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Args, Clone)]
struct ListArgs {
    /// Free-text search (accents and case are ignored)
    #[arg(short, long)]
    search: Option<String>,
    /// Page number, starting at 1
    #[arg(short, long, default_value_t = 1)]
    page: usize,
    #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
    page_size: usize,
}

impl ListArgs {
    fn query(&self) -> TableQuery {
        TableQuery { search: self.search.clone(), page: self.page, page_size: self.page_size }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Configure data directory and backend
    Config,
    /// List customers
    Customers(ListArgs),
    /// Show one customer, optionally editing it
    Customer {
        id: String,
        /// Edit the customer's details
        #[arg(long)]
        edit: bool,
    },
    /// List invoices
    Invoices {
        #[command(flatten)]
        list: ListArgs,
        /// Only this status (pending, accepted, delivered, rejected)
        #[arg(long)]
        status: Option<InvoiceStatus>,
        /// Only invoices created by the signed-in user
        #[arg(long)]
        mine: bool,
    },
    /// List credit notes
    CreditNotes(ListArgs),
    /// Show one credit note with its lines
    CreditNote { id: String },
    /// List receipts
    Receipts(ListArgs),
    /// List warehouse import/export receipts
    WarehouseReceipts(ListArgs),
    /// List sales contracts
    Contracts(ListArgs),
    /// Recalculate totals of a JSON invoice or item list
    Totals { file: PathBuf },
    /// Create a new invoice
    InvoiceNew,
    /// Create a credit note against an existing invoice
    CreditNoteNew,
    /// Print the sales agreement of an invoice
    Agreement {
        id: String,
        #[arg(short, long, value_enum, default_value_t = ExportFormat::Pdf)]
        format: ExportFormat,
    },
    /// Print the installment agreement of an invoice
    Installment {
        id: String,
        #[arg(short, long, value_enum, default_value_t = ExportFormat::Pdf)]
        format: ExportFormat,
    },
    /// Export invoices to Excel
    ExportInvoices {
        #[arg(long)]
        status: Option<InvoiceStatus>,
        /// From date (YYYY-MM-DD)
        #[arg(long)]
        from: Option<NaiveDate>,
        /// To date (YYYY-MM-DD)
        #[arg(long)]
        to: Option<NaiveDate>,
    },
    /// Send delivery reminders for invoices
    Remind {
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Publish or preview an e-invoice
    EInvoice {
        #[command(subcommand)]
        action: EInvoiceAction,
    },
    /// Create a sales contract from one customer's invoices
    ContractNew {
        #[arg(required = true)]
        invoice_ids: Vec<String>,
        /// Delivery date (YYYY-MM-DD)
        #[arg(long)]
        delivery: Option<NaiveDate>,
    },
    /// Print a sales contract
    Contract {
        id: String,
        #[arg(short, long, value_enum, default_value_t = ExportFormat::Pdf)]
        format: ExportFormat,
    },
    /// Move a sales contract to its next status
    ContractStatus { id: String, status: ContractStatus },
    /// Liquidate a confirmed contract at today's market prices
    Liquidate {
        id: String,
        /// Market unit price per product, as product=price
        #[arg(long = "price", required = true)]
        prices: Vec<String>,
    },
    /// Show summary of invoices
    Summary {
        /// Year to summarize (defaults to current year)
        year: Option<i32>,
    },
    /// Open output folder
    Open,
}

#[derive(Subcommand)]
enum EInvoiceAction {
    /// Publish the e-invoice of an invoice
    Publish { id: String },
    /// Download the provider's PDF preview
    Preview { id: String },
}

struct App {
    settings: AppSettings,
    workspace: Workspace,
    seller: SellerConfig,
}

impl App {
    fn api(&self) -> Result<ApiClient> {
        Ok(ApiClient::from_settings(&self.settings)?)
    }

    fn compiler(&self) -> TypstCompiler {
        TypstCompiler::new(self.settings.typst_bin.as_deref())
    }
}

// ==========================================
// Main Function
// ==========================================

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) if is_cancelled(&e) => {
            println!("Operation cancelled.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("❌ Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn is_cancelled(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<InquireError>(),
        Some(InquireError::OperationCanceled | InquireError::OperationInterrupted)
    )
}

fn run(cli: Cli) -> Result<()> {
    let Some(command) = cli.command else {
        use clap::CommandFactory;
        Cli::command().print_help()?;
        return Ok(());
    };

    // 1. Initialize configuration
    let settings = match (&command, config::load_settings()) {
        (Commands::Config, _) | (_, None) => setup_config_wizard()?,
        (_, Some(settings)) => settings,
    };
    if matches!(command, Commands::Config) {
        return Ok(());
    }
    let settings = settings.with_env_overrides();
    let workspace = settings.workspace();
    fs::create_dir_all(workspace.output_root())
        .with_context(|| format!("Failed to create {}", workspace.output_root().display()))?;
    let seller = workspace.load_seller()?;
    let app = App { settings, workspace, seller };

    match command {
        Commands::Config => Ok(()),
        Commands::Customers(list) => list_customers(&app, &list),
        Commands::Customer { id, edit } => show_customer(&app, &id, edit),
        Commands::Invoices { list, status, mine } => list_invoices(&app, &list, status, mine),
        Commands::CreditNotes(list) => list_credit_notes(&app, &list),
        Commands::CreditNote { id } => show_credit_note(&app, &id),
        Commands::Receipts(list) => list_receipts(&app, &list),
        Commands::WarehouseReceipts(list) => list_warehouse_receipts(&app, &list),
        Commands::Contracts(list) => list_contracts(&app, &list),
        Commands::Totals { file } => show_totals(&app, &file),
        Commands::InvoiceNew => new_invoice_wizard(&app),
        Commands::CreditNoteNew => new_credit_note_wizard(&app),
        Commands::Agreement { id, format } => print_invoice_document(&app, &id, DocumentKind::Agreement, format),
        Commands::Installment { id, format } => {
            print_invoice_document(&app, &id, DocumentKind::Installment, format)
        }
        Commands::ExportInvoices { status, from, to } => export_invoices(&app, status, from, to),
        Commands::Remind { ids } => send_reminders(&app, &ids),
        Commands::EInvoice { action } => einvoice(&app, action),
        Commands::ContractNew { invoice_ids, delivery } => new_contract(&app, &invoice_ids, delivery),
        Commands::Contract { id, format } => print_contract(&app, &id, format),
        Commands::ContractStatus { id, status } => change_contract_status(&app, &id, status),
        Commands::Liquidate { id, prices } => liquidate_contract(&app, &id, &prices),
        Commands::Summary { year } => show_summary(&app, year),
        Commands::Open => open_folder_wizard(&app.workspace.output_root()),
    }
}

// ==========================================
// 1. List Logic
// ==========================================

fn status_cell(style: StatusStyle) -> Cell {
    let (r, g, b) = style.tone.rgb();
    Cell::new(format!("{} {}", style.icon, style.label)).fg(Color::Rgb { r, g, b })
}

fn money_cell(value: Decimal) -> Cell {
    Cell::new(format_currency(value))
}

fn print_table<T: Searchable>(
    title: &str,
    rows: &[T],
    list: &ListArgs,
    header: &[&str],
    keep: impl Fn(&T) -> bool,
    row: impl Fn(&T) -> Vec<Cell>,
) {
    let slice = list.query().apply(rows, keep);
    println!("--- {} ---", title);
    if slice.rows.is_empty() {
        println!("(None found)");
        return;
    }
    let mut table = Table::new();
    table.set_header(header.iter().map(|h| Cell::new(h).add_attribute(Attribute::Bold)));
    for r in slice.rows.iter().copied() {
        table.add_row(row(r));
    }
    println!("{table}");
    println!("Trang {}/{} · {} dòng", slice.page, slice.total_pages, slice.total_rows);
}

fn date_text(at: Option<chrono::DateTime<chrono::Utc>>) -> String {
    at.map(|at| format_date(local_date(at))).unwrap_or_default()
}

fn list_customers(app: &App, list: &ListArgs) -> Result<()> {
    let customers = app.api()?.list_customers(&ListParams::default())?;
    print_table("Khách hàng", &customers, list, &["Mã", "Tên", "SĐT", "Email", "Địa chỉ"], |_| true, |c| {
        vec![
            Cell::new(&c.id),
            Cell::new(&c.name),
            Cell::new(c.phone.as_deref().unwrap_or("")),
            Cell::new(c.email.as_deref().unwrap_or("")),
            Cell::new(c.address.as_deref().unwrap_or("")),
        ]
    });
    Ok(())
}

fn print_customer(customer: &Customer) {
    let mut table = Table::new();
    let fields = [
        ("Mã", Some(customer.id.as_str())),
        ("Tên", Some(customer.name.as_str())),
        ("SĐT", customer.phone.as_deref()),
        ("Email", customer.email.as_deref()),
        ("Địa chỉ", customer.address.as_deref()),
        ("CCCD", customer.id_number.as_deref()),
        ("MST", customer.tax_code.as_deref()),
    ];
    for (label, value) in fields {
        table.add_row(vec![Cell::new(label).add_attribute(Attribute::Bold), Cell::new(value.unwrap_or(""))]);
    }
    println!("{table}");
}

fn show_customer(app: &App, id: &str, edit: bool) -> Result<()> {
    let api = app.api()?;
    let customer = api.get_customer(id)?;
    print_customer(&customer);
    if !edit {
        return Ok(());
    }

    let mut edited = edit_customer_wizard(&customer)?;
    if edited == customer {
        println!("(No changes)");
        return Ok(());
    }
    if edited.id.is_empty() {
        edited.id = id.to_string();
    }
    let updated = api.update_customer(&edited)?;
    println!("✅ Customer updated: {}", updated.name);
    print_customer(&updated);
    Ok(())
}

fn list_invoices(app: &App, list: &ListArgs, status: Option<InvoiceStatus>, mine: bool) -> Result<()> {
    let api = app.api()?;
    let params = ListParams::default();
    let invoices = if mine { api.list_my_invoices(&params)? } else { api.list_invoices(&params)? };
    print_table(
        "Hóa đơn",
        &invoices,
        list,
        &["Mã", "Ngày", "Khách hàng", "Tổng tiền", "Trạng thái", "Thanh toán"],
        |inv| status.is_none_or(|s| inv.status == s),
        |inv| {
            vec![
                Cell::new(&inv.code),
                Cell::new(date_text(inv.created_at)),
                Cell::new(inv.customer_name()),
                money_cell(inv.amount),
                status_cell(inv.status.style()),
                status_cell(inv.payment_status.style()),
            ]
        },
    );
    Ok(())
}

fn list_credit_notes(app: &App, list: &ListArgs) -> Result<()> {
    let notes = app.api()?.list_credit_notes(&ListParams::default())?;
    print_table(
        "Hóa đơn giảm trừ",
        &notes,
        list,
        &["Mã", "Ngày", "HĐ gốc", "Giá trị", "Trạng thái", "Lý do"],
        |_| true,
        |n| {
            vec![
                Cell::new(&n.code),
                Cell::new(date_text(n.created_at)),
                Cell::new(&n.original_invoice_id),
                money_cell(n.signed_amount()),
                status_cell(n.status.style()),
                Cell::new(n.reason.as_deref().unwrap_or("")),
            ]
        },
    );
    Ok(())
}

fn show_credit_note(app: &App, id: &str) -> Result<()> {
    let note = app.api()?.get_credit_note(id)?;
    println!("--- Hóa đơn giảm trừ {} ---", note.code);
    println!("HĐ gốc: {}", note.original_invoice_id);
    println!("Ngày: {}", date_text(note.created_at));
    println!("Trạng thái: {} {}", note.status.style().icon, note.status.style().label);
    if let Some(reason) = &note.reason {
        println!("Lý do: {reason}");
    }
    println!("{}", totals_table(&note.items, &app.seller.taxes));
    println!("Giá trị giảm trừ: {}", format_currency(note.signed_amount()));
    Ok(())
}

fn list_receipts(app: &App, list: &ListArgs) -> Result<()> {
    let receipts = app.api()?.list_receipts(&ListParams::default())?;
    print_table(
        "Phiếu thu",
        &receipts,
        list,
        &["Mã", "Ngày", "Hóa đơn", "Số tiền", "Hình thức"],
        |_| true,
        |r| {
            vec![
                Cell::new(&r.code),
                Cell::new(date_text(r.created_at)),
                Cell::new(r.invoice_id.as_deref().unwrap_or("")),
                money_cell(r.amount),
                Cell::new(r.method.as_deref().unwrap_or("")),
            ]
        },
    );
    Ok(())
}

fn list_warehouse_receipts(app: &App, list: &ListArgs) -> Result<()> {
    let receipts = app.api()?.list_warehouse_receipts(&ListParams::default())?;
    print_table(
        "Phiếu kho",
        &receipts,
        list,
        &["Mã", "Ngày", "Loại", "Số dòng", "Tổng SL", "Ghi chú"],
        |_| true,
        |r| {
            let quantity: Decimal = r.items.iter().map(|l| l.quantity).sum();
            vec![
                Cell::new(&r.code),
                Cell::new(date_text(r.created_at)),
                Cell::new(r.kind.label()),
                Cell::new(r.items.len()),
                Cell::new(format_weight(quantity)),
                Cell::new(r.note.as_deref().unwrap_or("")),
            ]
        },
    );
    Ok(())
}

fn list_contracts(app: &App, list: &ListArgs) -> Result<()> {
    let contracts = app.api()?.list_contracts(&ListParams::default())?;
    print_table(
        "Hợp đồng mua bán",
        &contracts,
        list,
        &["Mã", "Ngày", "Bên mua", "Giá trị", "Giao hàng", "Trạng thái"],
        |_| true,
        |c| {
            vec![
                Cell::new(&c.code),
                Cell::new(c.contract_date.map(format_date).unwrap_or_default()),
                Cell::new(&c.buyer_name),
                money_cell(c.total),
                Cell::new(c.delivery_date.map(format_date).unwrap_or_default()),
                status_cell(c.status.style()),
            ]
        },
    );
    Ok(())
}

// ==========================================
// 2. Totals & Data Entry Helpers
// ==========================================

fn totals_table(items: &[InvoiceItem], catalog: &[Tax]) -> Table {
    let mut table = Table::new();
    table.set_header(vec!["#", "Sản phẩm", "SL", "Đơn giá", "Giảm giá", "Thuế", "Thành tiền"]);
    for (i, item) in items.iter().enumerate() {
        table.add_row(vec![
            Cell::new(i + 1),
            Cell::new(&item.product_name),
            Cell::new(format_weight(calc::effective_quantity(item))),
            money_cell(calc::effective_price(item)),
            money_cell(item.discount),
            money_cell(calc::calc_tax(item, catalog)),
            money_cell(calc::calc_total(item, catalog)),
        ]);
    }
    let totals = Totals::of(items, catalog);
    table.add_row(vec![
        Cell::new("").add_attribute(Attribute::Bold),
        Cell::new("Tổng cộng").add_attribute(Attribute::Bold),
        Cell::new(""),
        money_cell(totals.sub_total),
        money_cell(totals.discount),
        money_cell(totals.tax_amount),
        money_cell(totals.amount).add_attribute(Attribute::Bold),
    ]);
    table
}

fn show_totals(app: &App, file: &Path) -> Result<()> {
    let content = fs::read_to_string(file).with_context(|| format!("Failed to read {}", file.display()))?;
    let value: Value = serde_json::from_str(&content)?;
    let items: Vec<InvoiceItem> = match value {
        Value::Array(_) => serde_json::from_value(value)?,
        other => serde_json::from_value::<Invoice>(other)?.items,
    };
    println!("{}", totals_table(&items, &app.seller.taxes));
    Ok(())
}

fn prompt_money(label: &str, default: Option<Decimal>) -> Result<Decimal> {
    loop {
        let default_text = default.map(|d| d.to_string()).unwrap_or_default();
        let mut prompt = Text::new(label);
        if default.is_some() {
            prompt = prompt.with_default(&default_text);
        }
        let input = prompt.prompt()?;
        match parse_money(&input) {
            Some(v) => return Ok(v),
            None => println!("⚠️  Vui lòng nhập số tiền hợp lệ (ví dụ 1.250.000)."),
        }
    }
}

fn prompt_quantity(label: &str, default: &str) -> Result<Decimal> {
    loop {
        let input = Text::new(label).with_default(default).prompt()?;
        match parse_quantity(&input) {
            Some(v) => return Ok(v),
            None => println!("⚠️  Vui lòng nhập số hợp lệ (ví dụ 2 hoặc 3,75)."),
        }
    }
}

fn optional_text(label: &str) -> Result<Option<String>> {
    let input = Text::new(label).prompt()?;
    Ok(Some(input.trim().to_string()).filter(|s| !s.is_empty()))
}

fn create_customer_wizard(api: &ApiClient) -> Result<Customer> {
    println!("\n--- Thêm khách hàng mới ---");
    let name = loop {
        let name = Text::new("Họ tên:").prompt()?;
        if !name.trim().is_empty() {
            break name.trim().to_string();
        }
    };
    let customer = Customer {
        name,
        phone: optional_text("Số điện thoại (bỏ trống để bỏ qua):")?,
        email: optional_text("Email (bỏ trống để bỏ qua):")?,
        address: optional_text("Địa chỉ (bỏ trống để bỏ qua):")?,
        id_number: optional_text("Số CCCD (bỏ trống để bỏ qua):")?,
        tax_code: optional_text("Mã số thuế (bỏ trống để bỏ qua):")?,
        ..Default::default()
    };
    let created = api.create_customer(&customer)?;
    println!("✅ Customer created: {}", created.name);
    Ok(created)
}

fn edit_text(label: &str, current: Option<&str>) -> Result<Option<String>> {
    let input = Text::new(label).with_default(current.unwrap_or("")).prompt()?;
    Ok(Some(input.trim().to_string()).filter(|s| !s.is_empty()))
}

fn edit_customer_wizard(customer: &Customer) -> Result<Customer> {
    println!("\n--- Sửa khách hàng ---");
    let name = loop {
        let name = Text::new("Họ tên:").with_default(&customer.name).prompt()?;
        if !name.trim().is_empty() {
            break name.trim().to_string();
        }
    };
    Ok(Customer {
        name,
        phone: edit_text("Số điện thoại:", customer.phone.as_deref())?,
        email: edit_text("Email:", customer.email.as_deref())?,
        address: edit_text("Địa chỉ:", customer.address.as_deref())?,
        id_number: edit_text("Số CCCD:", customer.id_number.as_deref())?,
        tax_code: edit_text("Mã số thuế:", customer.tax_code.as_deref())?,
        ..customer.clone()
    })
}

fn select_or_create_customer(api: &ApiClient) -> Result<Customer> {
    let mut customers = api.list_customers(&ListParams::default())?;
    let mut options = vec![NEW_CUSTOMER_OPT.to_string()];
    options.extend(
        customers
            .iter()
            .map(|c| format!("{} | {}", c.name, c.phone.as_deref().unwrap_or("-"))),
    );

    let choice = Select::new("Chọn khách hàng (gõ để lọc):", options).raw_prompt()?;
    if choice.index == 0 {
        create_customer_wizard(api)
    } else {
        Ok(customers.swap_remove(choice.index - 1))
    }
}

fn enter_line(catalog: &[Tax]) -> Result<Option<(InvoiceItem, Decimal, Decimal, Vec<String>)>> {
    let name = Text::new("Tên sản phẩm (bỏ trống để kết thúc):").prompt()?;
    if name.trim().is_empty() {
        return Ok(None);
    }
    let code = optional_text("Mã sản phẩm (tùy chọn):")?;
    let price = prompt_money("Đơn giá (₫):", None)?;
    let quantity = prompt_quantity("Số lượng:", "1")?;
    let discount = prompt_money("Giảm giá (₫):", Some(Decimal::ZERO))?;
    let weight = optional_text("Trọng lượng (chỉ, tùy chọn):")?.and_then(|w| parse_quantity(&w));

    let tax_names: Vec<String> = catalog.iter().map(|t| t.name.clone()).collect();
    let taxes = if tax_names.is_empty() {
        Vec::new()
    } else {
        MultiSelect::new("Thuế áp dụng:", tax_names)
            .raw_prompt()?
            .into_iter()
            .map(|o| catalog[o.index].id.clone())
            .collect()
    };

    let product_id = code.clone().unwrap_or_else(|| slugify(&name));
    let item = InvoiceItem {
        product_code: code,
        weight,
        ..InvoiceItem::new(product_id, name.trim(), price)
    };
    Ok(Some((item, quantity, discount, taxes)))
}

// ==========================================
// 3. Invoice & Credit Note Wizards
// ==========================================

fn new_invoice_wizard(app: &App) -> Result<()> {
    let api = app.api()?;
    let catalog = &app.seller.taxes;

    let customer = select_or_create_customer(&api)?;
    println!("✅ Selected Customer: {}", customer.name);
    let mut draft = Draft::new().apply(DraftAction::SelectCustomer(customer))?;

    println!("\n--- Nhập sản phẩm ---");
    while let Some((item, quantity, discount, taxes)) = enter_line(catalog)? {
        let line = draft.lines.len();
        draft = draft.apply(DraftAction::AddLine(item))?;
        draft = draft.apply(DraftAction::SetQuantity { line, quantity })?;
        draft = draft.apply(DraftAction::SetDiscount { line, discount })?;
        for tax_id in taxes {
            draft = draft.apply(DraftAction::ToggleTax { line, tax_id })?;
        }
        println!("{}", totals_table(&draft.lines, catalog));
    }

    draft = draft.apply(DraftAction::SetNote(optional_text("Ghi chú (tùy chọn):")?))?;
    let mut invoice = draft.submit_invoice(catalog)?;

    let installments = prompt_quantity("Số kỳ trả góp (1 = trả một lần):", "1")?;
    invoice.installment_count = installments.trunc().to_u32().filter(|n| *n > 1);

    println!("{}", totals_table(&invoice.items, catalog));
    if !Confirm::new("Lưu hóa đơn?").with_default(true).prompt()? {
        println!("❌ Invoice discarded.");
        return Ok(());
    }
    let created = api.create_invoice(&invoice)?;
    println!("✅ Invoice created: {} ({})", created.code, format_currency(created.amount));
    Ok(())
}

fn select_invoice(api: &ApiClient, prompt: &str) -> Result<Invoice> {
    let mut invoices = api.list_invoices(&ListParams::default())?;
    if invoices.is_empty() {
        return Err(anyhow!("No invoices found."));
    }
    let options: Vec<String> = invoices
        .iter()
        .map(|inv| format!("{} | {} | {}", inv.code, inv.customer_name(), format_currency(inv.amount)))
        .collect();
    let choice = Select::new(prompt, options).raw_prompt()?;
    let summary = invoices.swap_remove(choice.index);
    // List rows may carry only the customer id; fetch the full record.
    Ok(api.get_invoice(&summary.id)?)
}

fn new_credit_note_wizard(app: &App) -> Result<()> {
    let api = app.api()?;
    let catalog = &app.seller.taxes;

    let original = select_invoice(&api, "Chọn hóa đơn gốc:")?;
    println!("✅ Selected Invoice: {}", original.code);
    let mut draft = Draft::new().apply(DraftAction::SelectOriginalInvoice(original.clone()))?;
    if draft.customer.is_none() {
        draft = draft.apply(DraftAction::SelectCustomer(select_or_create_customer(&api)?))?;
    }

    println!("\n--- Số lượng giảm trừ (0 để bỏ qua) ---");
    for item in &original.items {
        let billed = calc::effective_quantity(item);
        let label = format!("{} (đã bán {}):", item.product_name, format_weight(billed));
        let quantity = prompt_quantity(&label, "0")?;
        if quantity.is_zero() {
            continue;
        }
        let line = draft.lines.len();
        draft = draft.apply(DraftAction::AddLine(item.clone()))?;
        draft = draft.apply(DraftAction::SetQuantity { line, quantity })?;
    }

    draft = draft.apply(DraftAction::SetNote(optional_text("Lý do giảm trừ:")?))?;
    let note = draft.submit_credit_note(catalog)?;
    println!("{}", totals_table(&note.items, catalog));
    if !Confirm::new("Lưu hóa đơn giảm trừ?").with_default(true).prompt()? {
        println!("❌ Credit note discarded.");
        return Ok(());
    }
    let created = api.create_credit_note(&note)?;
    println!("✅ Credit note created: {} ({})", created.code, format_currency(created.signed_amount()));
    Ok(())
}

// ==========================================
// 4. Document Export
// ==========================================

fn print_invoice_document(app: &App, id: &str, kind: DocumentKind, format: ExportFormat) -> Result<()> {
    let invoice = app.api()?.get_invoice(id)?;
    let templates = pdf::load_templates(&app.workspace.templates_dir())?;
    let compiler = app.compiler();
    let exporter = Exporter { workspace: &app.workspace, seller: &app.seller, templates: &templates, compiler: &compiler };

    println!("\n🔨 Generating {}...", format.extension().to_uppercase());
    let path = exporter.invoice_document(&invoice, kind, format)?;
    println!("✅ Document Generated: {:?}", path);
    open_and_reveal(&path);
    Ok(())
}

fn print_contract(app: &App, id: &str, format: ExportFormat) -> Result<()> {
    let contract = app.api()?.get_contract(id)?;
    let templates = pdf::load_templates(&app.workspace.templates_dir())?;
    let compiler = app.compiler();
    let exporter = Exporter { workspace: &app.workspace, seller: &app.seller, templates: &templates, compiler: &compiler };

    println!("\n🔨 Generating {}...", format.extension().to_uppercase());
    let path = exporter.contract_document(&contract, format)?;
    println!("✅ Document Generated: {:?}", path);
    open_and_reveal(&path);
    Ok(())
}

fn export_invoices(
    app: &App,
    status: Option<InvoiceStatus>,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> Result<()> {
    let params = ListParams {
        status: status.map(|s| s.as_str().to_string()),
        from,
        to,
        ..Default::default()
    };
    let invoices = app.api()?.list_invoices(&params)?;
    if invoices.is_empty() {
        println!("(None found)");
        return Ok(());
    }
    let path = export::write_invoice_list(&app.workspace, &invoices)?;
    println!("✅ Exported {} invoices: {:?}", invoices.len(), path);
    open_and_reveal(&path);
    Ok(())
}

fn server_message(value: &Value, fallback: &str) -> String {
    value
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or(fallback)
        .to_string()
}

fn send_reminders(app: &App, ids: &[String]) -> Result<()> {
    let result = app.api()?.send_delivery_reminder(ids)?;
    println!("✅ {}", server_message(&result, &format!("Reminders sent for {} invoices", ids.len())));
    Ok(())
}

fn einvoice(app: &App, action: EInvoiceAction) -> Result<()> {
    let api = app.api()?;
    match action {
        EInvoiceAction::Publish { id } => {
            let result = api.publish_einvoice(&id)?;
            println!("✅ {}", server_message(&result, "E-invoice published"));
        }
        EInvoiceAction::Preview { id } => {
            let invoice = api.get_invoice(&id)?;
            let encoded = api.preview_einvoice(&id)?;
            let path = export::write_einvoice_preview(&app.workspace, &invoice, &encoded)?;
            println!("✅ Preview saved: {:?}", path);
            open_and_reveal(&path);
        }
    }
    Ok(())
}

// ==========================================
// 5. Sales Contracts
// ==========================================

fn new_contract(app: &App, invoice_ids: &[String], delivery: Option<NaiveDate>) -> Result<()> {
    let api = app.api()?;
    let invoices = invoice_ids
        .iter()
        .map(|id| api.get_invoice(id))
        .collect::<jewelry_desk::Result<Vec<_>>>()?;

    let contract_date = DateSelect::new("Ngày hợp đồng:")
        .with_default(Local::now().date_naive())
        .prompt()?;
    let mut contract = SalesContract::from_invoices(&invoices, contract_date)?;
    contract.delivery_date = delivery;
    println!("{}", totals_table(&contract.items, &app.seller.taxes));

    let created = api.create_contract(&contract)?;
    println!("✅ Contract created: {} ({})", created.code, format_currency(created.total));
    Ok(())
}

fn change_contract_status(app: &App, id: &str, status: ContractStatus) -> Result<()> {
    let api = app.api()?;
    let contract = api.get_contract(id)?;
    let next = contract.transition(status)?;
    let updated = api.update_contract_status(id, next)?;
    println!("✅ Contract {} is now {}", updated.code, updated.status.style().label);
    Ok(())
}

fn parse_price_args(prices: &[String]) -> Result<HashMap<String, Decimal>> {
    prices
        .iter()
        .map(|arg| -> Result<(String, Decimal)> {
            let (product, price) = arg
                .split_once('=')
                .ok_or_else(|| anyhow!("Expected product=price, got '{arg}'"))?;
            let price = parse_money(price).ok_or_else(|| anyhow!("Invalid price in '{arg}'"))?;
            Ok((product.trim().to_string(), price))
        })
        .collect()
}

fn liquidate_contract(app: &App, id: &str, prices: &[String]) -> Result<()> {
    let api = app.api()?;
    let contract = api.get_contract(id)?;
    let result = contract::liquidate(&contract, &parse_price_args(prices)?)?;

    let mut table = Table::new();
    table.set_header(vec!["Sản phẩm", "SL", "Giá hợp đồng", "Giá thị trường", "Chênh lệch"]);
    for line in &result.lines {
        table.add_row(vec![
            Cell::new(&line.product_name),
            Cell::new(format_weight(line.quantity)),
            money_cell(line.contracted_amount),
            money_cell(line.market_amount),
            signed_cell(line.difference),
        ]);
    }
    table.add_row(vec![
        Cell::new("Tổng cộng").add_attribute(Attribute::Bold),
        Cell::new(""),
        money_cell(result.contracted_total),
        money_cell(result.market_total),
        signed_cell(result.settlement).add_attribute(Attribute::Bold),
    ]);
    println!("\n--- Thanh lý hợp đồng {} ---", result.contract_code);
    println!("{table}");

    if Confirm::new("Chuyển hợp đồng sang trạng thái đã thanh lý?").with_default(false).prompt()? {
        let updated = api.update_contract_status(id, ContractStatus::Liquidated)?;
        println!("✅ Contract {} is now {}", updated.code, updated.status.style().label);
    }
    Ok(())
}

fn tone_rgb(tone: Tone) -> Color {
    let (r, g, b) = tone.rgb();
    Color::Rgb { r, g, b }
}

fn signed_cell(value: Decimal) -> Cell {
    let cell = money_cell(value);
    if value > Decimal::ZERO {
        cell.fg(tone_rgb(Tone::Success))
    } else if value < Decimal::ZERO {
        cell.fg(tone_rgb(Tone::Danger))
    } else {
        cell
    }
}

// ==========================================
// 6. Open Folder Logic
// ==========================================

fn open_folder_wizard(output_root: &Path) -> Result<()> {
    let root_opt = "📂 Open Root Output Directory".to_string();
    let mut client_paths = Vec::new();

    if let Ok(years) = fs::read_dir(output_root) {
        for year_entry in years.flatten().filter(|e| e.path().is_dir()) {
            let year_name = year_entry.file_name().to_string_lossy().to_string();
            if let Ok(customers) = fs::read_dir(year_entry.path()) {
                for customer_entry in customers.flatten().filter(|e| e.path().is_dir()) {
                    let customer = customer_entry.file_name().to_string_lossy().to_string();
                    client_paths.push(format!("{} / {}", year_name, customer));
                }
            }
        }
    }
    client_paths.sort();
    client_paths.reverse();

    let mut options = vec![root_opt.clone()];
    options.extend(client_paths);

    let choice = Select::new("Select Folder to Open:", options).prompt()?;
    let target_path = match choice.split_once(" / ") {
        Some((year, customer)) if choice != root_opt => output_root.join(year).join(customer),
        _ => output_root.to_path_buf(),
    };
    println!("🚀 Opening: {:?}", target_path);
    open_path(&target_path);
    Ok(())
}

fn open_path(path: &Path) {
    #[cfg(target_os = "macos")]
    Command::new("open").arg(path).spawn().ok();
    #[cfg(target_os = "windows")]
    Command::new("explorer").arg(path).spawn().ok();
    #[cfg(target_os = "linux")]
    Command::new("xdg-open").arg(path).spawn().ok();
}

// Helper: Open file and reveal in Finder/Explorer
fn open_and_reveal(path: &Path) {
    #[cfg(target_os = "macos")]
    Command::new("open").arg("-R").arg(path).spawn().ok();

    #[cfg(target_os = "windows")]
    Command::new("explorer").arg(format!("/select,{}", path.to_string_lossy())).spawn().ok();

    #[cfg(target_os = "linux")]
    if let Some(parent) = path.parent() {
        Command::new("xdg-open").arg(parent).spawn().ok();
    }

    open_path(path);
}

// ==========================================
// 7. Config
// ==========================================

fn setup_config_wizard() -> Result<AppSettings> {
    println!("\n⚙️  --- Configuration Setup ---");
    let current = config::load_settings();
    let default_root = current
        .as_ref()
        .map(|s| s.data_root.clone())
        .unwrap_or_else(|| DEFAULT_DATA_ROOT.to_string());
    let default_url = current
        .as_ref()
        .map(|s| s.api_base_url.clone())
        .unwrap_or_else(|| DEFAULT_API_URL.to_string());

    println!("📂 Opening folder picker...");
    let picked_path = rfd::FileDialog::new()
        .set_title("Select Root Data Directory")
        .pick_folder();

    let data_root = match picked_path {
        Some(path) => path.to_string_lossy().to_string(),
        None => {
            println!("❌ No folder selected. Falling back to manual input.");
            Text::new("Enter Root Data Directory:").with_default(&default_root).prompt()?
        }
    };

    let api_base_url = Text::new("Backend API URL:").with_default(&default_url).prompt()?;
    let token = Password::new("API token (leave empty to keep current):")
        .with_display_mode(PasswordDisplayMode::Masked)
        .without_confirmation()
        .prompt()?;
    let api_token = match token.trim() {
        "" => current.as_ref().and_then(|s| s.api_token.clone()),
        t => Some(t.to_string()),
    };
    let typst = Text::new("Typst binary:")
        .with_default(current.as_ref().and_then(|s| s.typst_bin.as_deref()).unwrap_or("typst"))
        .prompt()?;

    let settings = AppSettings {
        data_root,
        api_base_url,
        api_token,
        typst_bin: Some(typst).filter(|t| t != "typst"),
    };
    config::save_settings_to(&config::config_path(), &settings).context("Failed to save settings")?;
    println!("✅ Settings saved.");
    Ok(settings)
}

// ==========================================
// 8. Summary Logic
// ==========================================

#[derive(Default, Clone, Copy)]
struct Bucket {
    paid: Decimal,
    unpaid: Decimal,
}

impl Bucket {
    fn add(&mut self, invoice: &Invoice) {
        let paid = if invoice.payment_status.is_paid() {
            invoice.amount
        } else {
            invoice.paid_amount.min(invoice.amount)
        };
        self.paid += paid;
        self.unpaid += invoice.amount - paid;
    }

    fn total(&self) -> Decimal {
        self.paid + self.unpaid
    }

    fn cells(&self, label: Cell, bold: bool) -> Vec<Cell> {
        let style = |cell: Cell| if bold { cell.add_attribute(Attribute::Bold) } else { cell };
        let paid = style(money_cell(self.paid));
        let unpaid = style(money_cell(self.unpaid));
        vec![
            label,
            if self.paid > Decimal::ZERO { paid.fg(tone_rgb(Tone::Success)) } else { paid },
            if self.unpaid > Decimal::ZERO { unpaid.fg(tone_rgb(Tone::Danger)) } else { unpaid },
            style(money_cell(self.total())),
        ]
    }
}

fn show_summary(app: &App, year: Option<i32>) -> Result<()> {
    let target_year = year.unwrap_or_else(|| Local::now().year());
    let from = NaiveDate::from_ymd_opt(target_year, 1, 1);
    let to = NaiveDate::from_ymd_opt(target_year, 12, 31);
    let params = ListParams { from, to, ..Default::default() };
    let invoices: Vec<Invoice> = app
        .api()?
        .list_invoices(&params)?
        .into_iter()
        .filter(|inv| inv.status != InvoiceStatus::Rejected)
        .filter(|inv| inv.created_at.map(local_date).is_some_and(|d| d.year() == target_year))
        .collect();

    if invoices.is_empty() {
        println!("❌ No invoices found for {}.", target_year);
        return Ok(());
    }

    let mut monthly: BTreeMap<u32, Bucket> = BTreeMap::new();
    let mut customers: HashMap<String, Bucket> = HashMap::new();
    let mut overall = Bucket::default();
    for invoice in &invoices {
        let month = invoice.created_at.map(local_date).map(|d| d.month()).unwrap_or(1);
        monthly.entry(month).or_default().add(invoice);
        let name = match invoice.customer_name() {
            "" => "Khách lẻ".to_string(),
            n => n.to_string(),
        };
        customers.entry(name).or_default().add(invoice);
        overall.add(invoice);
    }

    // Monthly table
    let mut table = Table::new();
    table.set_header(vec!["Tháng", "Đã thu", "Còn nợ", "Tổng"]);
    for (month, bucket) in monthly.iter().rev() {
        table.add_row(bucket.cells(Cell::new(format!("{:02}/{}", month, target_year)), false));
    }
    table.add_row(overall.cells(
        Cell::new(format!("Tổng ({})", target_year)).add_attribute(Attribute::Bold),
        true,
    ));
    println!("\n--- Monthly Invoice Summary ({}) ---", target_year);
    println!("{table}");

    // Customer table, largest first
    let mut customer_vec: Vec<_> = customers.into_iter().collect();
    customer_vec.sort_by(|a, b| b.1.total().cmp(&a.1.total()).then_with(|| a.0.cmp(&b.0)));

    let mut customer_table = Table::new();
    customer_table.set_header(vec!["Khách hàng", "Đã thu", "Còn nợ", "Tổng"]);
    for (name, bucket) in customer_vec {
        customer_table.add_row(bucket.cells(Cell::new(name), false));
    }
    println!("\n--- Customer Summary ({}) ---", target_year);
    println!("{customer_table}");
    Ok(())
}
