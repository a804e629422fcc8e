//! Command-line controller.
//!
//! Owns the session for one invocation: builds it from a snapshot (file or
//! today's open register), runs one operation, then prints the notices and
//! the re-rendered view.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use anyhow::Context;
use chrono::Local;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{info, warn};

use crate::api::HttpRegisterApi;
use crate::config::TillConfig;
use crate::history;
use crate::logging;
use crate::models::{parse_hydration, RegisterSnapshot, TransactionKind, VerificationResult};
use crate::notify::{NoticeBoard, NoticeLevel};
use crate::session::{find_open_register, parse_amount, CashRegisterSession};
use crate::view;

type Session = CashRegisterSession<HttpRegisterApi, NoticeBoard>;

#[derive(Parser, Debug)]
#[command(name = "till", version, about = "Daily cash register for the back office")]
pub struct Cli {
    /// JSON configuration file
    #[arg(short = 'c', long = "config", global = true)]
    config: Option<PathBuf>,

    /// Initial-state JSON (`{"currentRegister": ...}`); defaults to today's
    /// open register on the back office
    #[arg(long = "snapshot", global = true)]
    snapshot: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum Kind {
    Income,
    Expense,
}

impl From<Kind> for TransactionKind {
    fn from(kind: Kind) -> Self {
        match kind {
            Kind::Income => TransactionKind::Income,
            Kind::Expense => TransactionKind::Expense,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the register, its ledger and the vault total
    Status,
    /// Check a counted opening float against the reference amount
    Verify { counted: String },
    /// Open today's register
    Start {
        counted: String,
        #[arg(long)]
        responsible: String,
        #[arg(long, default_value = "")]
        notes: String,
        /// Open even though the count does not match the reference amount
        #[arg(long)]
        accept_difference: bool,
    },
    /// Record an income or expense
    Add {
        #[arg(value_enum)]
        kind: Kind,
        amount: String,
        #[arg(required = true, num_args = 1..)]
        description: Vec<String>,
    },
    /// Close today's register with the final count
    Close {
        final_count: String,
        #[arg(long, default_value = "")]
        notes: String,
    },
    /// Download today's register as a spreadsheet
    Export {
        #[arg(long)]
        dir: Option<PathBuf>,
    },
    /// List closed days with column totals
    History,
}

/// Binary entry point.
pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let config = match TillConfig::load(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("till: {e}");
            return ExitCode::FAILURE;
        }
    };
    let _log_guard = logging::init_logging(config.log_dir.as_deref());
    info!(version = env!("CARGO_PKG_VERSION"), api = %config.api_url, "Starting till");

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("till: failed to start runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(execute(cli, config)) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("till: {e:#}");
            ExitCode::FAILURE
        }
    }
}

/// Run one command. `Ok(false)` means the operation failed and was reported.
async fn execute(cli: Cli, config: TillConfig) -> anyhow::Result<bool> {
    let api = HttpRegisterApi::from_config(&config).context("building HTTP client")?;

    if let Command::Verify { counted } = &cli.command {
        let result = verify_offline(api, &config, counted)?;
        println!("{}", view::render_verification(&result));
        return Ok(result.verified);
    }

    if let Command::History = cli.command {
        let (days, summary) = history::load_history(&api)
            .await
            .context("loading closed days")?;
        print!("{}", view::render_history(&days, &summary));
        return Ok(true);
    }

    let snapshot = load_snapshot(&api, cli.snapshot.as_ref()).await?;
    let board = NoticeBoard::with_ttl(config.notice_ttl());
    let mut session = CashRegisterSession::connect(api, board, &config, snapshot.as_ref()).await;

    let ok = match cli.command {
        Command::Status | Command::History | Command::Verify { .. } => true,
        Command::Start {
            counted,
            responsible,
            notes,
            accept_difference,
        } => {
            let counted = parse_amount(&counted)?;
            let result = session.verify_opening_amount(counted);
            println!("{}", view::render_verification(&result));
            if !result.verified && !accept_difference {
                println!("Count again or pass --accept-difference to open anyway.");
                false
            } else {
                session.start_day(counted, &notes, &responsible).await.is_ok()
            }
        }
        Command::Add {
            kind,
            amount,
            description,
        } => {
            let amount = parse_amount(&amount)?;
            let kind = TransactionKind::from(kind);
            info!(kind = view::kind_phrase(kind), amount = %amount, "Adding transaction");
            session
                .add_transaction(kind, amount, &description.join(" "))
                .await
                .is_ok()
        }
        Command::Close { final_count, notes } => {
            let final_count = parse_amount(&final_count)?;
            println!(
                "Expected balance: {}",
                view::format_currency(session.expected_close_balance())
            );
            match session.close_day(final_count, &notes).await {
                Ok(summary) => {
                    print!("{}", view::render_close_summary(&summary));
                    print_notices(&mut session);
                    if summary.reload_required {
                        session = reload(session, &config).await?;
                    }
                    true
                }
                Err(_) => false,
            }
        }
        Command::Export { dir } => {
            let dir = dir.unwrap_or_else(|| config.export_dir.clone());
            match session.export_report(&dir).await {
                Ok(path) => {
                    println!("Saved {}", path.display());
                    true
                }
                Err(_) => false,
            }
        }
    };

    print_notices(&mut session);
    print_view(&session);
    Ok(ok)
}

/// Check a counted float against the reference. Builds the session without a
/// snapshot and sends nothing to the back office.
fn verify_offline(
    api: HttpRegisterApi,
    config: &TillConfig,
    counted: &str,
) -> anyhow::Result<VerificationResult> {
    let counted = parse_amount(counted)?;
    let session = CashRegisterSession::new(api, NoticeBoard::new(), config, None);
    Ok(session.verify_opening_amount(counted))
}

/// Snapshot from the given file, or today's open register from the back
/// office. A failed lookup starts the session unopened.
async fn load_snapshot(
    api: &HttpRegisterApi,
    path: Option<&PathBuf>,
) -> anyhow::Result<Option<RegisterSnapshot>> {
    if let Some(path) = path {
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        return Ok(parse_hydration(&raw)?);
    }
    match find_open_register(api, Local::now().date_naive()).await {
        Ok(found) => Ok(found),
        Err(e) => {
            warn!(error = %e, "Could not look up today's register");
            Ok(None)
        }
    }
}

/// Rebuild the session from the back office after a close.
async fn reload(session: Session, config: &TillConfig) -> anyhow::Result<Session> {
    let api = HttpRegisterApi::from_config(config)?;
    let snapshot = load_snapshot(&api, None).await?;
    drop(session);
    let board = NoticeBoard::with_ttl(config.notice_ttl());
    Ok(CashRegisterSession::connect(api, board, config, snapshot.as_ref()).await)
}

fn print_notices(session: &mut Session) {
    for notice in session.notices_mut().visible(Instant::now()) {
        let marker = match notice.level {
            NoticeLevel::Success => "ok",
            NoticeLevel::Info => "info",
            NoticeLevel::Warning => "warn",
            NoticeLevel::Danger => "error",
        };
        eprintln!("[{marker}] {}", notice.message);
    }
    session.notices_mut().drain();
}

fn print_view(session: &Session) {
    println!();
    print!("{}", view::render_status(session.day(), session.vault()));
    let controls = session.control_state();
    if controls.status_card_visible {
        println!();
        print!(
            "{}",
            view::render_transactions(&session.project_transactions_view())
        );
    }
}
