//! Command line front end for the loan engine.
//!
//! Every subcommand prints its result as pretty JSON on stdout; logs go to
//! stderr. Exit codes are listed in [`loan_engine::exit_codes`].

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use serde::Serialize;

use loan_engine::config::{self, EngineConfig};
use loan_engine::evidence::{EvidenceKind, EvidenceStore};
use loan_engine::exit_codes;
use loan_engine::logging;
use loan_engine::store::LoanStore;
use loan_engine::types::{EVIDENCE_DATE_FORMAT, TimeStamp};
use loan_engine::{
    ApprovalEvidence, CreateLoanParams, DisbursementEvidence, InvestParams, LoanError, LoanFilter,
    LoanService, LoanState,
};

#[derive(Parser)]
#[command(
    name = "loan-engine",
    version,
    about = "Loan lifecycle and investment ledger"
)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, global = true, default_value = "loan_engine.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Propose a new loan.
    CreateLoan {
        #[arg(long)]
        borrower_id: String,
        #[arg(long)]
        principal: Decimal,
        /// Borrower interest rate in percent.
        #[arg(long)]
        rate: Decimal,
        /// Investor return in percent.
        #[arg(long)]
        roi: Decimal,
        #[arg(long)]
        agreement_link: String,
    },
    /// List loans, newest first.
    ListLoans {
        #[arg(long)]
        state: Option<LoanState>,
        #[arg(long)]
        borrower_id: Option<String>,
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long)]
        offset: Option<usize>,
    },
    /// Show a loan with its investments and funding totals.
    GetLoan { id: String },
    /// Approve a proposed loan with a proof picture.
    ApproveLoan {
        id: String,
        #[arg(long)]
        proof: PathBuf,
        #[arg(long)]
        employee_id: String,
        /// Approval time as `YYYY-MM-DD HH:MM:SS` (UTC), defaults to now.
        #[arg(long, value_parser = parse_timestamp)]
        approved_at: Option<TimeStamp>,
    },
    /// Invest in an approved loan.
    Invest {
        id: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        amount: Decimal,
    },
    /// Disburse a fully invested loan against the signed agreement.
    DisburseLoan {
        id: String,
        #[arg(long)]
        agreement: PathBuf,
        #[arg(long)]
        employee_id: String,
        /// Disbursement time as `YYYY-MM-DD HH:MM:SS` (UTC), defaults to now.
        #[arg(long, value_parser = parse_timestamp)]
        disbursed_at: Option<TimeStamp>,
    },
}

fn main() -> ExitCode {
    logging::init();

    match run(Cli::parse()) {
        Ok(()) => ExitCode::from(exit_codes::OK as u8),
        Err(err) => {
            eprintln!("{:#}", err);
            let code = err
                .downcast_ref::<LoanError>()
                .map_or(exit_codes::FAILURE, exit_codes::for_error);
            ExitCode::from(code as u8)
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let cfg = config::load_config(&cli.config)?;
    let store = cfg.open_store()?;
    let service = cfg.build_service(store.clone());

    let result = dispatch(&cfg, &service, cli.command);
    store.flush().context("flush database")?;
    result
}

fn dispatch(cfg: &EngineConfig, service: &LoanService, command: Command) -> Result<()> {
    match command {
        Command::CreateLoan {
            borrower_id,
            principal,
            rate,
            roi,
            agreement_link,
        } => {
            let loan = service.create_loan(CreateLoanParams {
                borrower_id,
                principal,
                rate,
                roi,
                agreement_link,
            })?;
            print_json(&loan)
        }
        Command::ListLoans {
            state,
            borrower_id,
            limit,
            offset,
        } => {
            let filter = LoanFilter {
                state,
                borrower_id,
                limit,
                offset,
            };
            print_json(&service.list_loans(&filter)?)
        }
        Command::GetLoan { id } => print_json(&service.get_loan_summary(&id)?),
        Command::ApproveLoan {
            id,
            proof,
            employee_id,
            approved_at,
        } => {
            service.check_approvable(&id, &employee_id)?;
            let proof_ref = store_evidence(cfg, &id, EvidenceKind::ApprovalProof, &proof)?;
            let evidence = ApprovalEvidence {
                proof_ref,
                staff_id: employee_id,
                approved_at: approved_at.unwrap_or_default(),
            };
            print_json(&service.approve_loan(&id, evidence, cfg.deadline())?)
        }
        Command::Invest { id, email, amount } => {
            let params = InvestParams {
                investor_email: email,
                amount,
            };
            print_json(&service.invest_in_loan(&id, params, cfg.deadline())?)
        }
        Command::DisburseLoan {
            id,
            agreement,
            employee_id,
            disbursed_at,
        } => {
            service.check_disbursable(&id, &employee_id)?;
            let agreement_ref = store_evidence(cfg, &id, EvidenceKind::SignedAgreement, &agreement)?;
            let evidence = DisbursementEvidence {
                agreement_ref,
                staff_id: employee_id,
                disbursed_at: disbursed_at.unwrap_or_default(),
            };
            print_json(&service.disburse_loan(&id, evidence, cfg.deadline())?)
        }
    }
}

/// Copies an uploaded file into the evidence directory. Run after the transition pre-check.
fn store_evidence(cfg: &EngineConfig, id: &str, kind: EvidenceKind, source: &Path) -> Result<String> {
    let reference = cfg
        .evidence_store()
        .store(id, kind, source)
        .map_err(LoanError::from)?;
    Ok(reference)
}

fn parse_timestamp(input: &str) -> Result<TimeStamp> {
    TimeStamp::parse(input).ok_or_else(|| anyhow!("expected {EVIDENCE_DATE_FORMAT}, got '{input}'"))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let payload = serde_json::to_string_pretty(value).context("serialize json")?;
    println!("{payload}");
    Ok(())
}
