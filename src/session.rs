//! Cash register day session.
//!
//! Mirrors one back-office register day, keeps the derived totals consistent
//! with the server's ledger and tracks the vault total alongside. Every
//! failure is reported through the injected [`Notices`] sink and returned as
//! an `Err`; no operation leaves the session half-updated.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use chrono::{Local, NaiveDate, Utc};
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::api::{CloseRegisterRequest, OpenRegisterRequest, RegisterApi, TransactionRequest};
use crate::config::TillConfig;
use crate::error::{RegisterError, Result};
use crate::export::{self, EXPORT_FORMAT};
use crate::models::{
    within_till_bound, CloseSummary, RegisterDay, RegisterSnapshot, RegisterStatus, Totals,
    TransactionKind, TransactionRow, VaultSource, VaultTotal, VerificationResult,
};
use crate::notify::{Notice, NoticeLevel, Notices};
use crate::view::{self, ControlState};

pub struct CashRegisterSession<A, N> {
    api: A,
    notices: N,
    reference_amount: Decimal,
    notice_ttl: Duration,
    day: RegisterDay,
    vault: VaultTotal,
    /// Register id usable for exports, including a non-open snapshot's id.
    export_id: Option<String>,
}

impl<A: RegisterApi, N: Notices> CashRegisterSession<A, N> {
    /// Build a session from an optional snapshot without touching the network.
    pub fn new(api: A, notices: N, config: &TillConfig, snapshot: Option<&RegisterSnapshot>) -> Self {
        let day = RegisterDay::from_snapshot(snapshot, config.reference_amount);
        if day.status == RegisterStatus::Open {
            info!(
                register_id = day.id.as_deref().unwrap_or(""),
                balance = %day.totals.balance,
                "Session hydrated from open register"
            );
        } else {
            debug!("No open register, session starts unopened");
        }

        Self {
            api,
            notices,
            reference_amount: config.reference_amount,
            notice_ttl: config.notice_ttl(),
            export_id: day.id.clone().or_else(|| snapshot.and_then(|s| s.id.clone())),
            day,
            vault: VaultTotal::default(),
        }
    }

    /// Build the session and load the vault total. A failed vault fetch is
    /// reported but never fails construction.
    pub async fn connect(
        api: A,
        notices: N,
        config: &TillConfig,
        snapshot: Option<&RegisterSnapshot>,
    ) -> Self {
        let mut session = Self::new(api, notices, config, snapshot);
        let _ = session.refresh_vault_total().await;
        session
    }

    // -----------------------------------------------------------------------
    // Read-only state
    // -----------------------------------------------------------------------

    pub fn day(&self) -> &RegisterDay {
        &self.day
    }

    pub fn status(&self) -> RegisterStatus {
        self.day.status
    }

    pub fn totals(&self) -> Totals {
        self.day.totals
    }

    pub fn vault(&self) -> &VaultTotal {
        &self.vault
    }

    pub fn reference_amount(&self) -> Decimal {
        self.reference_amount
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn notices(&self) -> &N {
        &self.notices
    }

    pub fn notices_mut(&mut self) -> &mut N {
        &mut self.notices
    }

    pub fn control_state(&self) -> ControlState {
        ControlState::for_day(&self.day, self.export_id.is_some())
    }

    /// Balance the drawer should hold when the day is closed.
    pub fn expected_close_balance(&self) -> Decimal {
        self.day.totals.balance
    }

    // -----------------------------------------------------------------------
    // Operations
    // -----------------------------------------------------------------------

    /// Compare a counted opening float with the reference amount.
    pub fn verify_opening_amount(&self, counted: Decimal) -> VerificationResult {
        VerificationResult::new(counted, self.reference_amount)
    }

    /// Open today's register with the counted float.
    ///
    /// The verification outcome is sent along but not enforced: a float that
    /// does not match the reference is still accepted.
    pub async fn start_day(
        &mut self,
        counted: Decimal,
        notes: &str,
        responsible: &str,
    ) -> Result<&RegisterDay> {
        if self.day.status != RegisterStatus::Unopened {
            return Err(self.fail(RegisterError::InvalidState {
                operation: "start the day",
                status: self.day.status,
            }));
        }
        self.check_bound(counted)?;

        let verification = self.verify_opening_amount(counted);
        let now = Utc::now();
        let request = OpenRegisterRequest {
            date: now,
            initial_amount_counted: counted,
            initial_amount_verified: verification.verified,
            initial_count_time: now,
            notes: notes.trim().to_string(),
            responsible: responsible.trim().to_string(),
            status: RegisterStatus::Open,
        };

        let id = match self.api.open_register(&request).await {
            Ok(id) => id,
            Err(e) => return Err(self.fail(e)),
        };

        self.export_id = Some(id.clone());
        self.day = RegisterDay {
            id: Some(id),
            status: RegisterStatus::Open,
            opening_float: counted,
            opening_verified: verification.verified,
            transactions: Vec::new(),
            totals: Totals::opening(counted),
        };
        info!(
            register_id = self.day.id.as_deref().unwrap_or(""),
            counted = %counted,
            verified = verification.verified,
            "Day started"
        );
        self.notify(NoticeLevel::Success, "Day started");

        self.reconcile_vault("start_day").await;
        Ok(&self.day)
    }

    /// Record an income or expense against the open register.
    pub async fn add_transaction(
        &mut self,
        kind: TransactionKind,
        amount: Decimal,
        description: &str,
    ) -> Result<&RegisterDay> {
        if self.day.status != RegisterStatus::Open {
            return Err(self.fail(RegisterError::InvalidState {
                operation: "add a transaction",
                status: self.day.status,
            }));
        }
        if amount <= Decimal::ZERO {
            return Err(self.fail(RegisterError::Validation(
                "Please enter a valid amount".into(),
            )));
        }
        self.check_bound(amount)?;
        let description = description.trim();
        if description.is_empty() {
            return Err(self.fail(RegisterError::Validation(
                "Please enter a description".into(),
            )));
        }
        let register_id = self.require_id()?;

        let request = TransactionRequest {
            kind,
            amount,
            description: description.to_string(),
        };
        let ledger = match self.api.add_transaction(&register_id, &request).await {
            Ok(ledger) => ledger,
            Err(e) => return Err(self.fail(e)),
        };

        // The returned ledger is authoritative; totals are rebuilt from it.
        self.day.replace_transactions(ledger);
        self.vault.apply_optimistic(kind, amount);
        info!(
            register_id = %register_id,
            kind = %kind,
            amount = %amount,
            entries = self.day.transactions.len(),
            balance = %self.day.totals.balance,
            "Transaction recorded"
        );
        self.notify(NoticeLevel::Success, "Transaction saved");

        self.reconcile_vault("add_transaction").await;
        Ok(&self.day)
    }

    /// Close the open register with the final drawer count.
    ///
    /// After success the session is finished: the caller must build a new
    /// session (fresh snapshot) to continue.
    pub async fn close_day(&mut self, final_count: Decimal, notes: &str) -> Result<CloseSummary> {
        if self.day.status != RegisterStatus::Open {
            return Err(self.fail(RegisterError::InvalidState {
                operation: "close the day",
                status: self.day.status,
            }));
        }
        self.check_bound(final_count)?;
        let register_id = self.require_id()?;

        let request = CloseRegisterRequest {
            final_count,
            notes: notes.trim().to_string(),
        };
        let response = match self.api.close_register(&register_id, &request).await {
            Ok(resp) => resp,
            Err(e) => return Err(self.fail(e)),
        };

        self.day.status = RegisterStatus::Closed;
        match response.vault_total {
            Some(total) => self.vault.reconcile(total),
            None => self.reconcile_vault("close_day").await,
        }

        let expected_balance = self.day.totals.balance;
        let summary = CloseSummary {
            register_id: Some(register_id),
            final_count,
            expected_balance,
            difference: final_count.saturating_sub(expected_balance),
            vault_total: (self.vault.source() != VaultSource::Unknown)
                .then(|| self.vault.amount()),
            reload_required: true,
        };
        info!(
            register_id = summary.register_id.as_deref().unwrap_or(""),
            final_count = %final_count,
            expected = %expected_balance,
            difference = %summary.difference,
            "Day closed"
        );
        self.notify(NoticeLevel::Success, "Day closed");
        Ok(summary)
    }

    /// Ledger rows with running balance, rebuilt on every call.
    pub fn project_transactions_view(&self) -> Vec<TransactionRow> {
        view::project_transactions(self.day.opening_float, &self.day.transactions)
    }

    /// Fetch the vault total and overwrite the local value.
    pub async fn refresh_vault_total(&mut self) -> Result<Decimal> {
        match self.api.vault_total().await {
            Ok(total) => {
                self.vault.reconcile(total);
                debug!(vault = %total, "Vault total loaded");
                Ok(total)
            }
            Err(e) => {
                let message = format!("Could not load the vault total: {}", e.user_message());
                self.notify(NoticeLevel::Danger, message);
                Err(e)
            }
        }
    }

    /// Download the register's spreadsheet into `dir`.
    pub async fn export_report(&mut self, dir: &Path) -> Result<PathBuf> {
        let Some(register_id) = self.export_id.clone() else {
            let err = RegisterError::Validation("There is no data to export".into());
            self.notify(NoticeLevel::Warning, err.user_message());
            return Err(err);
        };

        let written = match self.api.export_report(&register_id, EXPORT_FORMAT).await {
            Ok(bytes) => export::write_report(dir, Local::now().date_naive(), &bytes).await,
            Err(e) => Err(e),
        };
        match written {
            Ok(path) => {
                self.notify(NoticeLevel::Success, "Report exported");
                Ok(path)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn require_id(&mut self) -> Result<String> {
        match self.day.id.clone() {
            Some(id) => Ok(id),
            None => Err(self.fail(RegisterError::Validation(
                "The open register has no id; reload the register".into(),
            ))),
        }
    }

    fn check_bound(&mut self, amount: Decimal) -> Result<()> {
        if within_till_bound(amount) {
            Ok(())
        } else {
            Err(self.fail(RegisterError::Validation(
                "Amount is larger than the till accepts".into(),
            )))
        }
    }

    /// Second phase of every mutation: the server's vault figure replaces
    /// whatever the session holds. On failure the local value is kept.
    async fn reconcile_vault(&mut self, after: &'static str) {
        match self.api.vault_total().await {
            Ok(total) => {
                if total != self.vault.amount() {
                    debug!(local = %self.vault.amount(), server = %total, after, "Vault total corrected by server");
                }
                self.vault.reconcile(total);
            }
            Err(e) => {
                warn!(after, error = %e, "Vault reconciliation failed");
                let message = format!("Vault total may be out of date: {}", e.user_message());
                self.notify(NoticeLevel::Warning, message);
            }
        }
    }

    fn fail(&mut self, err: RegisterError) -> RegisterError {
        if err.is_local() {
            debug!(error = %err, "Operation rejected locally");
        } else {
            warn!(error = %err, "Operation failed");
        }
        self.notify(NoticeLevel::Danger, err.user_message());
        err
    }

    fn notify(&mut self, level: NoticeLevel, message: impl Into<String>) {
        self.notices
            .push(Notice::new(level, message).with_ttl(self.notice_ttl));
    }
}

/// Today's open register, if the back office has one.
pub async fn find_open_register<A: RegisterApi>(
    api: &A,
    date: NaiveDate,
) -> Result<Option<RegisterSnapshot>> {
    let registers = api.list_registers(date, date).await?;
    Ok(registers.into_iter().find(RegisterSnapshot::is_open))
}

/// Parse operator input into an amount. Accepts a plain or scientific decimal
/// number within the till bound; digit separators are not allowed.
pub fn parse_amount(raw: &str) -> Result<Decimal> {
    let trimmed = raw.trim();
    let invalid = || RegisterError::Validation(format!("Not a valid amount: {trimmed:?}"));
    if trimmed.contains('_') {
        return Err(invalid());
    }
    let amount = Decimal::from_str(trimmed)
        .or_else(|_| Decimal::from_scientific(trimmed))
        .map_err(|_| invalid())?;
    if !within_till_bound(amount) {
        return Err(RegisterError::Validation(format!(
            "Amount {trimmed} is larger than the till accepts"
        )));
    }
    Ok(amount)
}
