//! Back-office till.
//!
//! Client side of the daily cash register: a [`CashRegisterSession`] mirrors
//! one register day held by the back office, keeps the derived totals in step
//! with the server ledger and tracks the vault total alongside it. The `till`
//! binary is a thin controller over the session (see [`cli`]).

pub mod api;
pub mod cli;
pub mod config;
pub mod error;
pub mod export;
pub mod history;
pub mod logging;
pub mod models;
pub mod notify;
pub mod session;
pub mod view;

pub use api::{HttpRegisterApi, RegisterApi};
pub use cli::run;
pub use config::TillConfig;
pub use error::{RegisterError, Result};
pub use models::{
    CloseSummary, RegisterDay, RegisterSnapshot, RegisterStatus, Totals, Transaction,
    TransactionKind, TransactionRow, VaultSource, VaultTotal, VerificationResult,
};
pub use notify::{Notice, NoticeBoard, NoticeLevel, Notices, TracingNotices};
pub use session::{find_open_register, parse_amount, CashRegisterSession};
