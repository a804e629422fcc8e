//! Pure projections of the session model for display.
//!
//! Nothing here reads state back from the output; every table and panel is
//! rebuilt from the model on each call.

use std::fmt::Write as _;

use chrono::{DateTime, Local, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;

use crate::history::{ClosedDay, HistorySummary};
use crate::models::{
    CloseSummary, Discrepancy, RegisterDay, RegisterStatus, Transaction, TransactionKind,
    TransactionRow, VaultTotal, VerificationResult,
};

/// Which controls the operator may use in the current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ControlState {
    pub start_day: bool,
    pub add_transaction: bool,
    pub close_day: bool,
    pub export: bool,
    pub status_card_visible: bool,
}

impl ControlState {
    pub fn for_day(day: &RegisterDay, has_export_id: bool) -> Self {
        let open = day.status == RegisterStatus::Open;
        Self {
            start_day: day.status == RegisterStatus::Unopened,
            add_transaction: open,
            close_day: open,
            export: has_export_id,
            status_card_visible: open,
        }
    }
}

/// Ledger rows in timestamp order with the balance after each entry.
///
/// The sort is stable, so entries sharing a timestamp keep their server order.
pub fn project_transactions(opening_float: Decimal, transactions: &[Transaction]) -> Vec<TransactionRow> {
    let mut sorted: Vec<&Transaction> = transactions.iter().collect();
    sorted.sort_by_key(|t| t.timestamp);

    let mut running_balance = opening_float;
    sorted
        .into_iter()
        .map(|t| {
            running_balance = running_balance.saturating_add(t.signed_amount());
            TransactionRow {
                time: t.timestamp,
                kind: t.kind,
                description: t.description.clone(),
                signed_amount: t.signed_amount(),
                running_balance,
                recorded_by: t.recorded_by.clone(),
            }
        })
        .collect()
}

/// `$1,234.50`. The sign is dropped; callers show direction separately.
pub fn format_currency(amount: Decimal) -> String {
    let rounded = amount
        .abs()
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    let fixed = format!("{rounded:.2}");
    let (int_part, frac_part) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    format!("${grouped}.{frac_part}")
}

/// `+$50.00` / `-$12.00`.
pub fn format_signed(amount: Decimal) -> String {
    let sign = if amount.is_sign_negative() && !amount.is_zero() {
        '-'
    } else {
        '+'
    };
    format!("{sign}{}", format_currency(amount))
}

fn local_time(time: DateTime<Utc>) -> String {
    time.with_timezone(&Local).format("%H:%M").to_string()
}

pub fn render_verification(result: &VerificationResult) -> String {
    match result.discrepancy {
        Discrepancy::Exact => "Amount verified".to_string(),
        _ => {
            let level = if result.discrepancy == Discrepancy::Minor {
                "Warning"
            } else {
                "Error"
            };
            let direction = if result.is_surplus() { "surplus" } else { "shortage" };
            format!(
                "{level}: difference detected {} ({direction})",
                format_currency(result.difference)
            )
        }
    }
}

pub fn render_status(day: &RegisterDay, vault: &VaultTotal) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Register: {}", day.status);
    if let Some(id) = &day.id {
        let _ = writeln!(out, "Id:       {id}");
    }
    if day.status == RegisterStatus::Open {
        let verified = if day.opening_verified { "" } else { " (unverified)" };
        let _ = writeln!(out, "Opening:  {}{verified}", format_currency(day.opening_float));
        let _ = writeln!(out, "Sales:    {}", format_currency(day.totals.sales));
        let _ = writeln!(out, "Expenses: {}", format_currency(day.totals.expenses));
        let _ = writeln!(out, "Balance:  {}", format_currency(day.totals.balance));
    }
    let _ = writeln!(
        out,
        "Vault:    {} [{}]",
        format_currency(vault.amount()),
        vault.source()
    );
    out
}

pub fn render_transactions(rows: &[TransactionRow]) -> String {
    if rows.is_empty() {
        return "No transactions recorded\n".to_string();
    }
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<5}  {:<7}  {:<28}  {:>12}  {:>12}  {}",
        "Time", "Type", "Description", "Amount", "Balance", "By"
    );
    for row in rows {
        let _ = writeln!(
            out,
            "{:<5}  {:<7}  {:<28}  {:>12}  {:>12}  {}",
            local_time(row.time),
            row.kind.label(),
            truncate(&row.description, 28),
            format_signed(row.signed_amount),
            format_currency(row.running_balance),
            row.recorded_by.as_deref().unwrap_or("")
        );
    }
    out
}

pub fn render_close_summary(summary: &CloseSummary) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Expected: {}", format_currency(summary.expected_balance));
    let _ = writeln!(out, "Counted:  {}", format_currency(summary.final_count));
    let _ = writeln!(out, "Diff:     {}", format_signed(summary.difference));
    if let Some(vault) = summary.vault_total {
        let _ = writeln!(out, "Vault:    {}", format_currency(vault));
    }
    out
}

pub fn render_history(days: &[ClosedDay], summary: &HistorySummary) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<10}  {:>12}  {:>12}  {:>12}  {:>12}",
        "Date", "Initial", "Billing", "Expenses", "Final"
    );
    for day in days {
        let date = day
            .date
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "-".into());
        let _ = writeln!(
            out,
            "{date:<10}  {:>12}  {:>12}  {:>12}  {:>12}",
            format_currency(day.initial_amount),
            format_currency(day.billing),
            format_currency(day.expenses),
            format_currency(day.final_amount)
        );
    }
    let _ = writeln!(
        out,
        "{:<10}  {:>12}  {:>12}  {:>12}  {:>12}",
        format!("{} days", summary.days),
        format_currency(summary.total_initial),
        format_currency(summary.total_billing),
        format_currency(summary.total_expenses),
        format_currency(summary.total_balance)
    );
    out
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max.saturating_sub(1)).collect();
    cut.push('~');
    cut
}

/// Kind label used when echoing a request back to the operator.
pub fn kind_phrase(kind: TransactionKind) -> &'static str {
    match kind {
        TransactionKind::Income => "Income",
        TransactionKind::Expense => "Expense",
    }
}
