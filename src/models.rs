//! Register day, ledger and vault models.
//!
//! Field names on the wire follow the back office (`snake_case`, Mongo-style
//! `_id`). All amounts are `rust_decimal::Decimal` and travel as JSON numbers.

use std::fmt;

use chrono::{DateTime, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{RegisterError, Result};

/// Discrepancies strictly below this magnitude are shown as a warning rather
/// than an error when verifying the opening float.
pub const MINOR_DISCREPANCY: Decimal = Decimal::from_parts(500, 0, 0, false, 2);

/// Largest magnitude accepted for an entered amount (one trillion).
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(0xD4A5_1000, 0xE8, 0, false, 0);

/// Whether an entered amount is small enough for the till's arithmetic.
pub fn within_till_bound(amount: Decimal) -> bool {
    amount.abs() <= MAX_AMOUNT
}

// ---------------------------------------------------------------------------
// Status / kind
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegisterStatus {
    #[default]
    Unopened,
    Open,
    Closed,
}

impl fmt::Display for RegisterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RegisterStatus::Unopened => "unopened",
            RegisterStatus::Open => "open",
            RegisterStatus::Closed => "closed",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Income,
    Expense,
}

impl TransactionKind {
    /// Apply the kind's sign to an unsigned ledger amount.
    pub fn signed(self, amount: Decimal) -> Decimal {
        match self {
            TransactionKind::Income => amount,
            TransactionKind::Expense => -amount,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            TransactionKind::Income => "INCOME",
            TransactionKind::Expense => "EXPENSE",
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TransactionKind::Income => "income",
            TransactionKind::Expense => "expense",
        })
    }
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

/// One ledger entry as returned by the back office.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    pub amount: Decimal,
    #[serde(default)]
    pub description: String,
    #[serde(
        rename = "time",
        alias = "timestamp",
        deserialize_with = "deserialize_timestamp"
    )]
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recorded_by: Option<String>,
}

impl Transaction {
    pub fn signed_amount(&self) -> Decimal {
        self.kind.signed(self.amount)
    }
}

/// Accept RFC 3339 or a naive ISO-8601 date-time (interpreted as UTC), which is
/// what a Python `datetime.isoformat()` without tzinfo produces.
fn deserialize_timestamp<'de, D>(deserializer: D) -> std::result::Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid time: {raw}")))
}

pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// Derived day totals. Never authoritative: always rebuilt from the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Totals {
    pub sales: Decimal,
    pub expenses: Decimal,
    pub balance: Decimal,
}

impl Totals {
    /// Totals of a day with no transactions yet.
    pub fn opening(opening_float: Decimal) -> Self {
        Self {
            sales: Decimal::ZERO,
            expenses: Decimal::ZERO,
            balance: opening_float,
        }
    }

    /// Rebuild totals from scratch for the given ledger.
    pub fn recompute(opening_float: Decimal, transactions: &[Transaction]) -> Self {
        let (sales, expenses) = transactions.iter().fold(
            (Decimal::ZERO, Decimal::ZERO),
            |(sales, expenses), t| match t.kind {
                TransactionKind::Income => (sales.saturating_add(t.amount), expenses),
                TransactionKind::Expense => (sales, expenses.saturating_add(t.amount)),
            },
        );
        // Ledgers come from the server, so sums saturate instead of overflowing.
        Self {
            sales,
            expenses,
            balance: opening_float.saturating_add(sales).saturating_sub(expenses),
        }
    }
}

// ---------------------------------------------------------------------------
// Register day
// ---------------------------------------------------------------------------

/// One business day's till as mirrored on the client.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegisterDay {
    pub id: Option<String>,
    pub status: RegisterStatus,
    pub opening_float: Decimal,
    pub opening_verified: bool,
    pub transactions: Vec<Transaction>,
    pub totals: Totals,
}

impl RegisterDay {
    /// Default state before any register exists for the day. The reference
    /// amount is shown as the expected float.
    pub fn unopened(reference_amount: Decimal) -> Self {
        Self {
            id: None,
            status: RegisterStatus::Unopened,
            opening_float: reference_amount,
            opening_verified: false,
            transactions: Vec::new(),
            totals: Totals::opening(reference_amount),
        }
    }

    /// Hydrate from a snapshot. Anything but an open register resets to the
    /// unopened default.
    pub fn from_snapshot(snapshot: Option<&RegisterSnapshot>, reference_amount: Decimal) -> Self {
        let Some(snap) = snapshot.filter(|s| s.is_open()) else {
            return Self::unopened(reference_amount);
        };

        let opening_float = snap.initial_amount_counted.unwrap_or(reference_amount);
        Self {
            id: snap.id.clone(),
            status: RegisterStatus::Open,
            opening_float,
            opening_verified: snap.initial_amount_verified.unwrap_or(false),
            transactions: snap.transactions.clone(),
            totals: Totals {
                sales: snap.total_income.unwrap_or(Decimal::ZERO),
                expenses: snap.total_expenses.unwrap_or(Decimal::ZERO),
                balance: snap.current_balance.unwrap_or(opening_float),
            },
        }
    }

    /// Take the server's ledger as authoritative and rebuild the totals.
    pub fn replace_transactions(&mut self, transactions: Vec<Transaction>) {
        self.transactions = transactions;
        self.totals = Totals::recompute(self.opening_float, &self.transactions);
    }
}

/// Register document as embedded in the page payload or listed by the back
/// office. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RegisterSnapshot {
    #[serde(default, rename = "_id", alias = "id")]
    pub id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub initial_amount_counted: Option<Decimal>,
    #[serde(default)]
    pub initial_amount_verified: Option<bool>,
    #[serde(default)]
    pub total_income: Option<Decimal>,
    #[serde(default)]
    pub total_expenses: Option<Decimal>,
    #[serde(default)]
    pub current_balance: Option<Decimal>,
    #[serde(default)]
    pub transactions: Vec<Transaction>,
}

impl RegisterSnapshot {
    pub fn is_open(&self) -> bool {
        self.status
            .as_deref()
            .is_some_and(|s| s.trim().eq_ignore_ascii_case("open"))
    }
}

#[derive(Deserialize)]
struct HydrationPayload {
    #[serde(rename = "currentRegister", alias = "current_register")]
    current_register: Option<RegisterSnapshot>,
}

/// Parse an initial-state payload: either `{ "currentRegister": {...} }`, a bare
/// register object, or `null`.
pub fn parse_hydration(raw: &str) -> Result<Option<RegisterSnapshot>> {
    let value: serde_json::Value = serde_json::from_str(raw)
        .map_err(|e| RegisterError::Validation(format!("Invalid initial data: {e}")))?;

    if value.is_null() {
        return Ok(None);
    }
    let decode = |e: serde_json::Error| RegisterError::Validation(format!("Invalid register data: {e}"));
    if value.get("currentRegister").is_some() || value.get("current_register").is_some() {
        let payload: HydrationPayload = serde_json::from_value(value).map_err(decode)?;
        return Ok(payload.current_register);
    }
    serde_json::from_value(value).map(Some).map_err(decode)
}

// ---------------------------------------------------------------------------
// Vault
// ---------------------------------------------------------------------------

/// Where the current vault figure came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VaultSource {
    /// Never fetched; the amount is the zero default.
    #[default]
    Unknown,
    /// Locally adjusted after a transaction, awaiting reconciliation.
    Optimistic,
    /// Last value reported by the back office.
    Server,
}

impl fmt::Display for VaultSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            VaultSource::Unknown => "unknown",
            VaultSource::Optimistic => "optimistic",
            VaultSource::Server => "server",
        })
    }
}

/// Safe balance, tracked independently of the day's float.
///
/// Updates are two-phase: [`VaultTotal::apply_optimistic`] adjusts the local
/// figure right after a transaction, [`VaultTotal::reconcile`] overwrites it
/// with the server value whenever one arrives. The server always wins.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct VaultTotal {
    amount: Decimal,
    source: VaultSource,
    synced_at: Option<DateTime<Utc>>,
}

impl VaultTotal {
    pub fn amount(&self) -> Decimal {
        self.amount
    }

    pub fn source(&self) -> VaultSource {
        self.source
    }

    pub fn synced_at(&self) -> Option<DateTime<Utc>> {
        self.synced_at
    }

    pub fn apply_optimistic(&mut self, kind: TransactionKind, amount: Decimal) {
        self.amount = self.amount.saturating_add(kind.signed(amount));
        self.source = VaultSource::Optimistic;
    }

    pub fn reconcile(&mut self, server_amount: Decimal) {
        self.amount = server_amount;
        self.source = VaultSource::Server;
        self.synced_at = Some(Utc::now());
    }
}

// ---------------------------------------------------------------------------
// Operation results / projections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Discrepancy {
    Exact,
    Minor,
    Major,
}

/// Outcome of checking the counted opening float against the reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VerificationResult {
    pub verified: bool,
    pub difference: Decimal,
    pub discrepancy: Discrepancy,
}

impl VerificationResult {
    pub fn new(counted: Decimal, reference: Decimal) -> Self {
        let difference = counted.saturating_sub(reference);
        let discrepancy = if difference.is_zero() {
            Discrepancy::Exact
        } else if difference.abs() < MINOR_DISCREPANCY {
            Discrepancy::Minor
        } else {
            Discrepancy::Major
        };
        Self {
            verified: difference.is_zero(),
            difference,
            discrepancy,
        }
    }

    pub fn is_surplus(&self) -> bool {
        self.difference.is_sign_positive() && !self.difference.is_zero()
    }

    pub fn is_shortage(&self) -> bool {
        self.difference.is_sign_negative() && !self.difference.is_zero()
    }
}

/// Result of a successful day close.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CloseSummary {
    pub register_id: Option<String>,
    pub final_count: Decimal,
    pub expected_balance: Decimal,
    /// `final_count - expected_balance`.
    pub difference: Decimal,
    /// Vault figure after the close, if one could be obtained.
    pub vault_total: Option<Decimal>,
    /// The page-level view must be rebuilt with a fresh session.
    pub reload_required: bool,
}

/// One rendered ledger line with the balance after it was applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionRow {
    pub time: DateTime<Utc>,
    pub kind: TransactionKind,
    pub description: String,
    pub signed_amount: Decimal,
    pub running_balance: Decimal,
    pub recorded_by: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tx(kind: TransactionKind, cents: i64, time: &str) -> Transaction {
        Transaction {
            kind,
            amount: Decimal::new(cents, 2),
            description: "t".into(),
            timestamp: parse_timestamp(time).unwrap(),
            recorded_by: None,
        }
    }

    #[test]
    fn test_transaction_accepts_naive_and_rfc3339_times() {
        let naive: Transaction = serde_json::from_value(json!({
            "type": "income",
            "amount": 12.5,
            "description": "cash sale",
            "time": "2025-03-01T10:15:00.123000",
            "recorded_by": "ana"
        }))
        .unwrap();
        assert_eq!(naive.kind, TransactionKind::Income);
        assert_eq!(naive.amount, Decimal::new(125, 1));
        assert_eq!(naive.recorded_by.as_deref(), Some("ana"));
        assert_eq!(
            naive.timestamp.to_rfc3339(),
            "2025-03-01T10:15:00.123+00:00"
        );

        let zoned: Transaction = serde_json::from_value(json!({
            "type": "expense",
            "amount": 3,
            "description": "ice",
            "timestamp": "2025-03-01T12:00:00+02:00"
        }))
        .unwrap();
        assert_eq!(zoned.kind, TransactionKind::Expense);
        assert_eq!(zoned.timestamp.to_rfc3339(), "2025-03-01T10:00:00+00:00");
        assert!(zoned.recorded_by.is_none());
    }

    #[test]
    fn test_transaction_rejects_garbage_time() {
        let result: std::result::Result<Transaction, _> = serde_json::from_value(json!({
            "type": "income",
            "amount": 1,
            "description": "x",
            "time": "yesterday"
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_recompute_is_idempotent() {
        let ledger = vec![
            tx(TransactionKind::Income, 5000, "2025-03-01T10:00:00Z"),
            tx(TransactionKind::Expense, 1250, "2025-03-01T11:00:00Z"),
            tx(TransactionKind::Income, 799, "2025-03-01T12:00:00Z"),
        ];
        let opening = Decimal::new(200, 0);
        let first = Totals::recompute(opening, &ledger);
        let second = Totals::recompute(opening, &ledger);
        assert_eq!(first, second);
        assert_eq!(first.sales, Decimal::new(5799, 2));
        assert_eq!(first.expenses, Decimal::new(1250, 2));
        assert_eq!(first.balance, Decimal::new(24549, 2));
    }

    #[test]
    fn test_recompute_saturates_on_huge_server_ledger() {
        let mut huge = tx(TransactionKind::Income, 0, "2025-03-01T10:00:00Z");
        huge.amount = Decimal::MAX;
        let ledger = vec![huge.clone(), huge];
        let totals = Totals::recompute(Decimal::MAX, &ledger);
        assert_eq!(totals.sales, Decimal::MAX);
        assert_eq!(totals.balance, Decimal::MAX);

        let mut vault = VaultTotal::default();
        vault.reconcile(Decimal::MAX);
        vault.apply_optimistic(TransactionKind::Income, Decimal::ONE);
        assert_eq!(vault.amount(), Decimal::MAX);
    }

    #[test]
    fn test_till_bound() {
        assert_eq!(MAX_AMOUNT, Decimal::new(1_000_000_000_000, 0));
        assert!(within_till_bound(MAX_AMOUNT));
        assert!(within_till_bound(-MAX_AMOUNT));
        assert!(!within_till_bound(MAX_AMOUNT + Decimal::ONE));
        assert!(!within_till_bound(Decimal::MAX));
    }

    #[test]
    fn test_snapshot_hydrates_only_open_registers() {
        let reference = Decimal::new(200, 0);
        let open: RegisterSnapshot = serde_json::from_value(json!({
            "_id": "abc123",
            "status": "open",
            "initial_amount_counted": 195,
            "initial_amount_verified": false,
            "total_income": 80,
            "total_expenses": 20,
            "transactions": []
        }))
        .unwrap();
        let day = RegisterDay::from_snapshot(Some(&open), reference);
        assert_eq!(day.status, RegisterStatus::Open);
        assert_eq!(day.id.as_deref(), Some("abc123"));
        assert_eq!(day.opening_float, Decimal::new(195, 0));
        assert!(!day.opening_verified);
        assert_eq!(day.totals.sales, Decimal::new(80, 0));
        // No current_balance in the payload: balance falls back to the float.
        assert_eq!(day.totals.balance, Decimal::new(195, 0));

        let closed = RegisterSnapshot {
            status: Some("closed".into()),
            id: Some("old".into()),
            ..Default::default()
        };
        let day = RegisterDay::from_snapshot(Some(&closed), reference);
        assert_eq!(day, RegisterDay::unopened(reference));
        assert_eq!(day.totals.balance, reference);
    }

    #[test]
    fn test_parse_hydration_shapes() {
        let wrapped = parse_hydration(r#"{"currentRegister": {"_id": "x", "status": "open"}}"#)
            .unwrap()
            .unwrap();
        assert_eq!(wrapped.id.as_deref(), Some("x"));
        assert!(wrapped.is_open());

        assert!(parse_hydration(r#"{"currentRegister": null}"#).unwrap().is_none());
        assert!(parse_hydration("null").unwrap().is_none());

        let bare = parse_hydration(r#"{"id": "y", "status": "OPEN"}"#).unwrap().unwrap();
        assert_eq!(bare.id.as_deref(), Some("y"));
        assert!(bare.is_open());

        assert!(parse_hydration("{not json").is_err());
    }

    #[test]
    fn test_vault_server_value_overwrites_optimistic() {
        let mut vault = VaultTotal::default();
        assert_eq!(vault.source(), VaultSource::Unknown);

        vault.reconcile(Decimal::new(900, 0));
        vault.apply_optimistic(TransactionKind::Income, Decimal::new(50, 0));
        assert_eq!(vault.amount(), Decimal::new(950, 0));
        assert_eq!(vault.source(), VaultSource::Optimistic);

        vault.apply_optimistic(TransactionKind::Expense, Decimal::new(20, 0));
        assert_eq!(vault.amount(), Decimal::new(930, 0));

        // Server disagrees with the local guess; the server wins.
        vault.reconcile(Decimal::new(875, 0));
        assert_eq!(vault.amount(), Decimal::new(875, 0));
        assert_eq!(vault.source(), VaultSource::Server);
        assert!(vault.synced_at().is_some());
    }

    #[test]
    fn test_verification_classifies_discrepancy() {
        let reference = Decimal::new(200, 0);

        let exact = VerificationResult::new(Decimal::new(20000, 2), reference);
        assert!(exact.verified);
        assert!(exact.difference.is_zero());
        assert_eq!(exact.discrepancy, Discrepancy::Exact);

        let minor = VerificationResult::new(Decimal::new(20350, 2), reference);
        assert!(!minor.verified);
        assert!(minor.is_surplus());
        assert_eq!(minor.discrepancy, Discrepancy::Minor);

        let major = VerificationResult::new(Decimal::new(170, 0), reference);
        assert!(major.is_shortage());
        assert_eq!(major.difference, Decimal::new(-30, 0));
        assert_eq!(major.discrepancy, Discrepancy::Major);
    }
}
