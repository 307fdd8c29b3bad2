//! Synthetic statement for trying the pipeline without real bank data.

use std::path::Path;

use anyhow::{Context, Result};
use reckon_ingest::{write_text_pdf, PlacedText};

fn header(page: &mut Vec<PlacedText>, kind: &str, number: &str, balances: [&str; 4]) {
    let [opening, paid_in, paid_out, closing] = balances;
    page.extend([
        PlacedText::new(40.0, 800.0, "Your Statement 01 April 2025 to 30 April 2025"),
        PlacedText::new(40.0, 790.0, format!("{kind} Account")),
        PlacedText::new(40.0, 775.0, "Account Name Sortcode Account Number Sheet Number"),
        PlacedText::new(40.0, 765.0, format!("MS A SAMPLE 40-11-22 {number} 1")),
        PlacedText::new(40.0, 745.0, format!("Opening Balance £{opening}")),
        PlacedText::new(40.0, 735.0, format!("Payments In £{paid_in}")),
        PlacedText::new(40.0, 725.0, format!("Payments Out £{paid_out}")),
        PlacedText::new(40.0, 715.0, format!("Closing Balance £{closing}")),
    ]);
}

fn rows(page: &mut Vec<PlacedText>, start_y: f32, rows: &[&[(f32, &str)]]) {
    let mut y = start_y;
    for cells in rows {
        for (x, text) in cells.iter() {
            page.push(PlacedText::new(*x, y, *text));
        }
        y -= 12.0;
    }
}

fn current_account() -> Vec<PlacedText> {
    let mut page = Vec::new();
    header(&mut page, "Current", "12345678", ["1,250.00", "2,100.00", "1,122.33", "2,227.67"]);
    rows(
        &mut page,
        690.0,
        &[
            &[(40.0, "Date"), (100.0, "Payment type and details"), (340.0, "Paid out"), (420.0, "Paid in"), (500.0, "Balance")],
            &[(40.0, "01 Apr 25"), (100.0, "BALANCE BROUGHT FORWARD"), (500.0, "1,250.00")],
            &[(40.0, "02 Apr 25"), (100.0, "CR ACME PAYROLL"), (420.0, "2,100.00"), (500.0, "3,350.00")],
            &[(40.0, "03 Apr 25"), (100.0, "DD BRITISH GAS"), (340.0, "85.40")],
            &[(100.0, "VIS TESCO STORES 3117"), (340.0, "42.18"), (500.0, "3,222.42")],
            &[(40.0, "05 Apr 25"), (100.0, "SO LANDLORD RENT")],
            &[(100.0, "APRIL"), (340.0, "950.00"), (500.0, "2,272.42")],
            &[(40.0, "07 Apr 25"), (100.0, "))) PRET A MANGER"), (340.0, "4.75")],
            &[(100.0, "ATM CASH HIGH ST"), (340.0, "40.00"), (500.0, "2,227.67")],
            &[(40.0, "30 Apr 25"), (100.0, "BALANCE CARRIED FORWARD"), (500.0, "2,227.67")],
        ],
    );
    page
}

fn savings_account() -> Vec<PlacedText> {
    let mut page = Vec::new();
    header(&mut page, "Savings", "87654321", ["5,000.00", "512.34", "200.00", "5,312.34"]);
    rows(
        &mut page,
        690.0,
        &[
            &[(40.0, "Date"), (120.0, "Description"), (390.0, "Amount"), (480.0, "Balance")],
            &[(40.0, "01 Apr 25"), (120.0, "TRANSFER FROM CURRENT"), (390.0, "500.00"), (480.0, "5,500.00")],
            &[(40.0, "15 Apr 25"), (120.0, "TRANSFER TO CURRENT"), (390.0, "-200.00"), (480.0, "5,300.00")],
            &[(40.0, "30 Apr 25"), (120.0, "GROSS INTEREST"), (390.0, "12.34"), (480.0, "5,312.34")],
        ],
    );
    page
}

/// Write a two-account statement (current + savings) that reconciles exactly.
pub fn write_sample(path: &Path) -> Result<()> {
    write_text_pdf(path, &[current_account(), savings_account()])
        .with_context(|| format!("write {}", path.display()))?;
    println!("Wrote sample statement {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use reckon_core::ReckonConfig;
    use reckon_finance::{process_file, ReconciliationStatus};

    #[test]
    fn test_sample_reconciles() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.pdf");
        write_sample(&path).unwrap();

        let outcome = process_file(&path, &ReckonConfig::default());
        assert!(outcome.issues.is_empty(), "{:?}", outcome.issues);
        assert_eq!(outcome.results.len(), 2);
        assert!(outcome.results.iter().all(|r| r.status == ReconciliationStatus::Pass));
        assert!(outcome.results.iter().all(|r| r.balance_break.is_none()));
        assert!(outcome.results.iter().all(|r| r.totals.as_ref().is_some_and(|t| t.matches)));
        assert_eq!(outcome.transactions.len(), 9);

        let rent = outcome
            .transactions
            .iter()
            .find(|t| t.description.starts_with("SO LANDLORD"))
            .unwrap();
        assert_eq!(rent.description, "SO LANDLORD RENT APRIL");
        assert_eq!(rent.transaction_type.as_str(), "standing_order");
    }
}
