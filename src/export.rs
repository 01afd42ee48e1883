//! Presentation of scanned receipts: text views and the Excel workbook.
//!
//! The workbook is derived from a history snapshot each time it is exported.
//! Three sheets are built as plain row data first ([`workbook_sheets`]) and
//! only then written with `rust_xlsxwriter`, so the flattening rules are
//! testable without opening a spreadsheet.

use crate::error::ScanError;
use crate::model::{running_total, Receipt};
use rust_xlsxwriter::{Color, Format, FormatAlign, Workbook, XlsxError};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Placeholder for absent text fields.
pub const NOT_AVAILABLE: &str = "N/A";

/// File name used when no export path is given.
pub const DEFAULT_EXPORT_FILE: &str = "receipts.xlsx";

pub const SUMMARY_SHEET: &str = "Receipts Summary";
pub const ITEMIZED_SHEET: &str = "Itemized Details";
pub const COMBINED_SHEET: &str = "All Data Combined";

pub const SUMMARY_HEADERS: [&str; 5] = ["Merchant", "Date", "Total Amount", "Location", "Card (Last 4)"];
pub const ITEMIZED_HEADERS: [&str; 5] = ["Merchant", "Date", "Item Name", "Item Quantity", "Item Price"];
pub const COMBINED_HEADERS: [&str; 8] = [
    "Merchant",
    "Date",
    "Location",
    "Card (Last 4)",
    "Receipt Total Amount",
    "Item Name",
    "Item Quantity",
    "Item Price",
];

// ── Sheet model ──────────────────────────────────────────────────────────────

/// One spreadsheet cell before it is written.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Text(String),
    /// Plain number (quantities).
    Number(f64),
    /// Money, written with a two-decimal number format.
    Amount(f64),
    Empty,
}

impl Cell {
    fn text_or_na(value: Option<&str>) -> Self {
        match value {
            Some(v) if !v.trim().is_empty() => Cell::Text(v.to_string()),
            _ => Cell::Text(NOT_AVAILABLE.to_string()),
        }
    }

    fn amount(value: Option<f64>) -> Self {
        value.map_or(Cell::Empty, Cell::Amount)
    }

    fn number(value: Option<f64>) -> Self {
        value.map_or(Cell::Empty, Cell::Number)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Cell::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// A named sheet: header row plus data rows.
#[derive(Debug, Clone, PartialEq)]
pub struct Sheet {
    pub name: &'static str,
    pub headers: &'static [&'static str],
    pub rows: Vec<Vec<Cell>>,
}

/// One row per receipt.
pub fn summary_sheet(history: &[Receipt]) -> Sheet {
    let rows = history
        .iter()
        .map(|r| {
            vec![
                Cell::text_or_na(r.merchant.as_deref()),
                Cell::text_or_na(r.date.as_deref()),
                Cell::amount(r.total_amount),
                Cell::text_or_na(r.location.as_deref()),
                Cell::text_or_na(r.card_number.as_deref()),
            ]
        })
        .collect();
    Sheet {
        name: SUMMARY_SHEET,
        headers: &SUMMARY_HEADERS,
        rows,
    }
}

/// One row per (receipt, item). A receipt without items still gets a row,
/// priced at the receipt total.
pub fn itemized_sheet(history: &[Receipt]) -> Sheet {
    let mut rows = Vec::new();
    for r in history {
        let merchant = Cell::text_or_na(r.merchant.as_deref());
        let date = Cell::text_or_na(r.date.as_deref());
        if r.items.is_empty() {
            rows.push(vec![
                merchant,
                date,
                Cell::Text(NOT_AVAILABLE.to_string()),
                Cell::Empty,
                Cell::amount(r.total_amount),
            ]);
            continue;
        }
        for item in &r.items {
            rows.push(vec![
                merchant.clone(),
                date.clone(),
                Cell::text_or_na(Some(&item.name)),
                Cell::number(item.quantity),
                Cell::amount(item.price),
            ]);
        }
    }
    Sheet {
        name: ITEMIZED_SHEET,
        headers: &ITEMIZED_HEADERS,
        rows,
    }
}

/// Receipt fields repeated on every item row.
pub fn combined_sheet(history: &[Receipt]) -> Sheet {
    let mut rows = Vec::new();
    for r in history {
        let head = [
            Cell::text_or_na(r.merchant.as_deref()),
            Cell::text_or_na(r.date.as_deref()),
            Cell::text_or_na(r.location.as_deref()),
            Cell::text_or_na(r.card_number.as_deref()),
            Cell::amount(r.total_amount),
        ];
        if r.items.is_empty() {
            let mut row = head.to_vec();
            row.extend([Cell::Text(NOT_AVAILABLE.to_string()), Cell::Empty, Cell::Empty]);
            rows.push(row);
            continue;
        }
        for item in &r.items {
            let mut row = head.to_vec();
            row.extend([
                Cell::text_or_na(Some(&item.name)),
                Cell::number(item.quantity),
                Cell::amount(item.price),
            ]);
            rows.push(row);
        }
    }
    Sheet {
        name: COMBINED_SHEET,
        headers: &COMBINED_HEADERS,
        rows,
    }
}

/// The three sheets of an export, in workbook order.
pub fn workbook_sheets(history: &[Receipt]) -> [Sheet; 3] {
    [
        summary_sheet(history),
        itemized_sheet(history),
        combined_sheet(history),
    ]
}

// ── Workbook output ──────────────────────────────────────────────────────────

/// What an export wrote.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportStats {
    pub path: PathBuf,
    pub receipts: usize,
    pub itemized_rows: usize,
    pub combined_rows: usize,
}

/// Write `history` to an `.xlsx` file at `path`.
///
/// Nothing is written when `history` is empty; the result is then `Ok(None)`.
/// The workbook is saved to a temporary file next to `path` and renamed into
/// place, so an existing file is never left half-written.
///
/// # Errors
/// [`ScanError::ExportWriteFailed`] when the workbook cannot be built or the
/// target cannot be written.
pub fn export_workbook(history: &[Receipt], path: &Path) -> Result<Option<ExportStats>, ScanError> {
    if history.is_empty() {
        debug!("Export skipped: history is empty");
        return Ok(None);
    }

    let failed = |detail: String| ScanError::ExportWriteFailed {
        path: path.to_path_buf(),
        detail,
    };

    let sheets = workbook_sheets(history);
    let mut workbook = build_workbook(&sheets).map_err(|e| failed(e.to_string()))?;

    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let tmp = tempfile::Builder::new()
        .prefix(".receipts-")
        .suffix(".xlsx")
        .tempfile_in(dir)
        .map_err(|e| failed(e.to_string()))?;
    workbook
        .save(tmp.path())
        .map_err(|e| failed(e.to_string()))?;
    tmp.persist(path).map_err(|e| failed(e.error.to_string()))?;

    let stats = ExportStats {
        path: path.to_path_buf(),
        receipts: history.len(),
        itemized_rows: sheets[1].rows.len(),
        combined_rows: sheets[2].rows.len(),
    };
    info!(
        "Exported {} receipts to {} ({} item rows)",
        stats.receipts,
        path.display(),
        stats.itemized_rows
    );
    Ok(Some(stats))
}

fn build_workbook(sheets: &[Sheet]) -> Result<Workbook, XlsxError> {
    let header_format = Format::new()
        .set_bold()
        .set_background_color(Color::RGB(0x2563EB))
        .set_font_color(Color::RGB(0xFFFFFF));
    let amount_format = Format::new()
        .set_num_format("#,##0.00")
        .set_align(FormatAlign::Right);

    let mut workbook = Workbook::new();
    for sheet in sheets {
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(sheet.name)?;

        for (col, header) in sheet.headers.iter().enumerate() {
            worksheet.write_string_with_format(0, col as u16, *header, &header_format)?;
        }
        for (row_idx, row) in sheet.rows.iter().enumerate() {
            let r = (row_idx + 1) as u32;
            for (col, cell) in row.iter().enumerate() {
                let c = col as u16;
                match cell {
                    Cell::Text(s) => {
                        worksheet.write_string(r, c, s.as_str())?;
                    }
                    Cell::Number(n) => {
                        worksheet.write_number(r, c, *n)?;
                    }
                    Cell::Amount(n) => {
                        worksheet.write_number_with_format(r, c, *n, &amount_format)?;
                    }
                    Cell::Empty => {}
                }
            }
        }

        worksheet.set_freeze_panes(1, 0)?;
        worksheet.autofit();
    }
    Ok(workbook)
}

// ── Text views ───────────────────────────────────────────────────────────────

/// `$12.30`, `-$5.00`.
pub fn format_money(amount: f64) -> String {
    if amount < 0.0 {
        format!("-${:.2}", -amount)
    } else {
        format!("${amount:.2}")
    }
}

fn format_quantity(q: f64) -> String {
    if q.fract() == 0.0 && q.abs() < 1e15 {
        format!("{}", q as i64)
    } else {
        format!("{q}")
    }
}

fn or_na(value: Option<&str>) -> &str {
    match value {
        Some(v) if !v.trim().is_empty() => v,
        _ => NOT_AVAILABLE,
    }
}

/// History table (merchant, date, total) followed by the running total.
pub fn render_history(history: &[Receipt]) -> String {
    let mut out = String::new();
    if history.is_empty() {
        out.push_str("No receipts scanned yet.\n");
    } else {
        let merchant_w = history
            .iter()
            .map(|r| or_na(r.merchant.as_deref()).chars().count())
            .chain(std::iter::once("Merchant".len()))
            .max()
            .unwrap_or(8);
        let _ = writeln!(out, "{:<merchant_w$}  {:<10}  {:>12}", "Merchant", "Date", "Total Amount");
        let _ = writeln!(out, "{}", "-".repeat(merchant_w + 2 + 10 + 2 + 12));
        for r in history {
            let _ = writeln!(
                out,
                "{:<merchant_w$}  {:<10}  {:>12}",
                or_na(r.merchant.as_deref()),
                or_na(r.date.as_deref()),
                format_money(r.total_or_zero())
            );
        }
    }
    let _ = writeln!(out, "Running Total: {}", format_money(running_total(history)));
    out
}

/// Mask a card number down to its last four characters.
pub fn mask_card(card: &str) -> String {
    let chars: Vec<char> = card.trim().chars().collect();
    let last4: String = chars[chars.len().saturating_sub(4)..].iter().collect();
    format!("**** **** **** {last4}")
}

/// Details view of one receipt.
pub fn render_receipt(receipt: &Receipt) -> String {
    let mut out = String::new();
    let title = match receipt.merchant.as_deref() {
        Some(m) if !m.trim().is_empty() => m,
        _ => "Receipt Details",
    };
    let _ = writeln!(out, "{title}");
    let _ = writeln!(out, "{}", "=".repeat(title.chars().count()));
    let _ = writeln!(out, "Location: {}", or_na(receipt.location.as_deref()));
    let _ = writeln!(out, "Date:     {}", or_na(receipt.date.as_deref()));
    if let Some(card) = receipt.card_number.as_deref().filter(|c| !c.trim().is_empty()) {
        let _ = writeln!(out, "Card:     {}", mask_card(card));
    }

    out.push('\n');
    if receipt.items.is_empty() {
        out.push_str("No items found.\n");
    } else {
        out.push_str("Items:\n");
        for item in &receipt.items {
            let name = match item.quantity {
                Some(q) => format!("{} (x{})", item.name, format_quantity(q)),
                None => item.name.clone(),
            };
            let price = item.price.map_or_else(|| NOT_AVAILABLE.to_string(), format_money);
            let _ = writeln!(out, "  {:<40} {:>10}", name, price);
        }
    }
    let _ = writeln!(out, "\nTotal: {}", format_money(receipt.total_or_zero()));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ReceiptItem;

    fn item(name: &str, quantity: Option<f64>, price: f64) -> ReceiptItem {
        ReceiptItem {
            name: name.into(),
            quantity,
            price: Some(price),
        }
    }

    fn grocery() -> Receipt {
        Receipt {
            merchant: Some("Corner Market".into()),
            date: Some("2024-05-17".into()),
            total_amount: Some(23.4),
            location: Some("12 High St".into()),
            card_number: Some("4242".into()),
            items: vec![item("Bread", Some(1.0), 3.2), item("Coffee", None, 20.2)],
        }
    }

    fn bare() -> Receipt {
        Receipt {
            merchant: None,
            total_amount: Some(9.99),
            ..Default::default()
        }
    }

    #[test]
    fn summary_defaults_text_to_na_and_leaves_missing_amount_empty() {
        let r = Receipt::default();
        let sheet = summary_sheet(&[r]);
        assert_eq!(sheet.rows.len(), 1);
        let row = &sheet.rows[0];
        assert_eq!(row[0].as_text(), Some("N/A"));
        assert_eq!(row[2], Cell::Empty);
        assert_eq!(row[4].as_text(), Some("N/A"));
    }

    #[test]
    fn itemized_has_one_row_per_item() {
        let sheet = itemized_sheet(&[grocery(), grocery()]);
        assert_eq!(sheet.rows.len(), 4);
        assert_eq!(sheet.rows[1][2].as_text(), Some("Coffee"));
        assert_eq!(sheet.rows[1][3], Cell::Empty);
        assert_eq!(sheet.rows[0][3], Cell::Number(1.0));
    }

    #[test]
    fn zero_item_receipt_yields_single_na_row_in_both_item_sheets() {
        let history = [bare()];
        let itemized = itemized_sheet(&history);
        assert_eq!(itemized.rows.len(), 1);
        assert_eq!(itemized.rows[0][2].as_text(), Some("N/A"));
        assert_eq!(itemized.rows[0][3], Cell::Empty);
        assert_eq!(itemized.rows[0][4], Cell::Amount(9.99));

        let combined = combined_sheet(&history);
        assert_eq!(combined.rows.len(), 1);
        assert_eq!(combined.rows[0][5].as_text(), Some("N/A"));
        assert_eq!(combined.rows[0][6], Cell::Empty);
        assert_eq!(combined.rows[0][7], Cell::Empty);
    }

    #[test]
    fn unreadable_item_price_leaves_cell_empty() {
        let mut r = grocery();
        r.items[0].price = None;
        let itemized = itemized_sheet(std::slice::from_ref(&r));
        assert_eq!(itemized.rows[0][4], Cell::Empty);
        let combined = combined_sheet(std::slice::from_ref(&r));
        assert_eq!(combined.rows[0][7], Cell::Empty);
        assert!(render_receipt(&r).contains("N/A"));
    }

    #[test]
    fn combined_repeats_receipt_fields() {
        let sheet = combined_sheet(&[grocery()]);
        assert_eq!(sheet.rows.len(), 2);
        for row in &sheet.rows {
            assert_eq!(row.len(), COMBINED_HEADERS.len());
            assert_eq!(row[0].as_text(), Some("Corner Market"));
            assert_eq!(row[4], Cell::Amount(23.4));
        }
    }

    #[test]
    fn sheets_are_named_and_ordered() {
        let names: Vec<_> = workbook_sheets(&[]).iter().map(|s| s.name).collect();
        assert_eq!(names, [SUMMARY_SHEET, ITEMIZED_SHEET, COMBINED_SHEET]);
    }

    #[test]
    fn empty_history_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.xlsx");
        assert_eq!(export_workbook(&[], &path).unwrap(), None);
        assert!(!path.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn export_writes_xlsx_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("receipts.xlsx");
        let stats = export_workbook(&[grocery(), bare()], &path)
            .unwrap()
            .expect("non-empty history exports");
        assert_eq!(stats.receipts, 2);
        assert_eq!(stats.itemized_rows, 3);
        assert_eq!(stats.combined_rows, 3);

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[..2], b"PK", "xlsx is a zip container");
        // No temp files left behind.
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn export_to_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope").join("receipts.xlsx");
        let err = export_workbook(&[grocery()], &path).unwrap_err();
        assert!(matches!(err, ScanError::ExportWriteFailed { .. }));
    }

    #[test]
    fn history_view_lists_rows_and_running_total() {
        let text = render_history(&[grocery(), Receipt::default()]);
        assert!(text.contains("Corner Market"));
        assert!(text.contains("$23.40"));
        assert!(text.contains("N/A"));
        assert!(text.trim_end().ends_with("Running Total: $23.40"));
    }

    #[test]
    fn empty_history_view_has_zero_total() {
        let text = render_history(&[]);
        assert!(text.contains("Running Total: $0.00"));
    }

    #[test]
    fn receipt_view_masks_card_and_shows_quantities() {
        let text = render_receipt(&grocery());
        assert!(text.starts_with("Corner Market\n"));
        assert!(text.contains("**** **** **** 4242"));
        assert!(text.contains("Bread (x1)"));
        assert!(text.contains("Total: $23.40"));
        assert!(render_receipt(&Receipt::default()).starts_with("Receipt Details\n"));
    }

    #[test]
    fn money_and_masking_helpers() {
        assert_eq!(format_money(-5.0), "-$5.00");
        assert_eq!(format_money(0.126), "$0.13");
        assert_eq!(mask_card("1234567812345678"), "**** **** **** 5678");
        assert_eq!(mask_card("12"), "**** **** **** 12");
    }
}
