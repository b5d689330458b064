//! Smoke screen unit tests for loan engine components
//!
//! These span the public surface of the crate and test behavior in isolation
//! from the lifecycle scenarios. They are intended as a smoke screen and
//! mostly cover the happy path.

use std::fs;
use std::sync::Arc;

use loan_engine::{
    ApprovalEvidence, CreateLoanParams, Deadline, InvestParams, LoanError, LoanFilter,
    LoanService, LoanState, LoanStore, MemoryStore, SledStore,
    evidence::{EvidenceKind, EvidenceStore, FsEvidenceStore},
    notify::{FundedNotice, Notifier, OutboxNotifier, RecordingNotifier},
    types::TimeStamp,
};
use rust_decimal_macros::dec;

fn params(borrower: &str) -> CreateLoanParams {
    CreateLoanParams {
        borrower_id: borrower.into(),
        principal: dec!(1000),
        rate: dec!(11),
        roi: dec!(8),
        agreement_link: "https://example.com/agreements/letter.pdf".into(),
    }
}

fn approval() -> ApprovalEvidence {
    ApprovalEvidence {
        proof_ref: "proof_pictures/proof.png".into(),
        staff_id: "EMP001".into(),
        approved_at: TimeStamp::new(),
    }
}

// LISTING TESTS
mod listing_tests {
    use super::*;

    /// Creates three loans for two borrowers, approving the second one
    fn seeded(store: Arc<dyn LoanStore>) -> (LoanService, Vec<String>) {
        let service = LoanService::new(store, Arc::new(RecordingNotifier::new()));
        let ids: Vec<String> = ["B-1", "B-2", "B-1"]
            .into_iter()
            .map(|borrower| service.create_loan(params(borrower)).unwrap().id().to_string())
            .collect();
        service
            .approve_loan(&ids[1], approval(), Deadline::none())
            .unwrap();
        (service, ids)
    }

    fn check_filters(service: &LoanService, ids: &[String]) {
        let all = service.list_loans(&LoanFilter::default()).unwrap();
        assert_eq!(all.len(), 3);
        // newest first
        assert_eq!(all[0].id(), ids[2]);
        assert_eq!(all[2].id(), ids[0]);

        let approved = service
            .list_loans(&LoanFilter {
                state: Some(LoanState::Approved),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(approved.len(), 1);
        assert_eq!(approved[0].id(), ids[1]);

        let by_borrower = service
            .list_loans(&LoanFilter {
                borrower_id: Some("B-1".into()),
                ..Default::default()
            })
            .unwrap();
        assert!(by_borrower.iter().all(|loan| loan.borrower_id() == "B-1"));
        assert_eq!(by_borrower.len(), 2);

        let page = service
            .list_loans(&LoanFilter {
                limit: Some(2),
                offset: Some(1),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].id(), ids[1]);
    }

    #[test]
    fn memory_store_filters() {
        let (service, ids) = seeded(Arc::new(MemoryStore::new()));
        check_filters(&service, &ids);
    }

    #[test]
    fn sled_store_filters() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = SledStore::open(&temp_dir.path().join("listing.db")).unwrap();
        let (service, ids) = seeded(Arc::new(store));
        check_filters(&service, &ids);
    }

    #[test]
    fn reads_are_idempotent() {
        let (service, ids) = seeded(Arc::new(MemoryStore::new()));
        service
            .invest_in_loan(
                &ids[1],
                InvestParams {
                    investor_email: "alice@example.com".into(),
                    amount: dec!(250),
                },
                Deadline::none(),
            )
            .unwrap();

        let first = service.get_loan_summary(&ids[1]).unwrap();
        let second = service.get_loan_summary(&ids[1]).unwrap();
        assert_eq!(first, second);

        let listed = service.list_loans(&LoanFilter::default()).unwrap();
        assert_eq!(listed, service.list_loans(&LoanFilter::default()).unwrap());
    }
}

// STORE TESTS
mod store_tests {
    use super::*;

    #[test]
    fn duplicate_loan_id_is_rejected() {
        let store = MemoryStore::new();
        let loan = loan_engine::Loan::new("loan_1dup".into(), params("B-1"), TimeStamp::new());

        store.create_loan(&loan).unwrap();
        assert!(matches!(
            store.create_loan(&loan),
            Err(loan_engine::StoreError::Duplicate(_))
        ));
    }

    #[test]
    fn stale_revision_is_a_conflict() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = SledStore::open(&temp_dir.path().join("stale.db")).unwrap();
        let loan = loan_engine::Loan::new("loan_1stale".into(), params("B-1"), TimeStamp::new());
        store.create_loan(&loan).unwrap();

        assert_eq!(store.update_loan(&loan, 0).unwrap(), 1);
        assert!(matches!(
            store.update_loan(&loan, 7),
            Err(loan_engine::StoreError::Conflict { expected: 7, .. })
        ));
        assert_eq!(store.get_loan("loan_1stale").unwrap(), loan);
    }

    #[test]
    fn missing_loan_is_not_found() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.get_loan("loan_1none"),
            Err(loan_engine::StoreError::NotFound(_))
        ));
        assert!(store.list_investments_by_loan("loan_1none").unwrap().is_empty());
    }
}

// EVIDENCE TESTS
mod evidence_tests {
    use super::*;

    #[test]
    fn stores_proof_under_its_kind_directory() {
        let temp_dir = tempfile::tempdir().unwrap();
        let source = temp_dir.path().join("Proof.JPG");
        fs::write(&source, b"jpeg bytes").unwrap();

        let store = FsEvidenceStore::new(temp_dir.path().join("uploads"), 1024);
        let reference = store
            .store("loan_1abc", EvidenceKind::ApprovalProof, &source)
            .unwrap();

        assert!(reference.starts_with("proof_pictures/loan_1abc_proof_"));
        assert!(reference.ends_with(".jpg"));
        assert_eq!(fs::read(store.root().join(&reference)).unwrap(), b"jpeg bytes");
    }

    #[test]
    fn rejects_wrong_type_and_oversized_files() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = FsEvidenceStore::new(temp_dir.path().join("uploads"), 4);

        let pdf = temp_dir.path().join("proof.pdf");
        fs::write(&pdf, b"pdf").unwrap();
        assert!(store.store("loan_1abc", EvidenceKind::ApprovalProof, &pdf).is_err());
        // agreements may be PDFs
        assert!(store.store("loan_1abc", EvidenceKind::SignedAgreement, &pdf).is_ok());

        let big = temp_dir.path().join("big.png");
        fs::write(&big, b"too many bytes").unwrap();
        let err = LoanError::from(
            store
                .store("loan_1abc", EvidenceKind::ApprovalProof, &big)
                .unwrap_err(),
        );
        assert!(err.is_caller_error());
    }
}

// NOTIFIER TESTS
mod notifier_tests {
    use super::*;

    fn notice() -> FundedNotice {
        FundedNotice {
            loan_id: "loan_1abc".into(),
            borrower_id: "B-1".into(),
            principal: dec!(1000.00),
            agreement_link: "https://example.com/agreements/letter.pdf".into(),
            investor_emails: vec!["alice@example.com".into(), "bob@example.com".into()],
        }
    }

    #[test]
    fn outbox_spools_one_line_per_recipient() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("spool").join("notifications.jsonl");
        let notifier = OutboxNotifier::new(&path);

        notifier.notify_fully_funded(&notice()).unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        let lines: Vec<serde_json::Value> = contents
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["to"], "alice@example.com");
        assert_eq!(lines[1]["to"], "bob@example.com");
        assert_eq!(lines[0]["loan_id"], "loan_1abc");
        assert!(lines[0]["body"].as_str().unwrap().contains("Principal Amount: 1000"));
    }

    #[test]
    fn notice_subject_names_the_loan() {
        assert!(notice().subject().contains("loan_1abc"));
        assert!(notice().body().contains("https://example.com/agreements/letter.pdf"));
    }
}

// TYPES TESTS
mod types_tests {
    use super::*;

    #[test]
    fn parses_state_names() {
        assert_eq!("approved".parse::<LoanState>(), Ok(LoanState::Approved));
        assert_eq!(" Invested ".parse::<LoanState>(), Ok(LoanState::Invested));
        assert!("funded".parse::<LoanState>().is_err());
    }

    #[test]
    fn parses_evidence_dates() {
        let parsed = TimeStamp::parse("2024-03-01 09:30:00").unwrap();
        assert_eq!(parsed, TimeStamp::new_with(2024, 3, 1, 9, 30, 0));
        assert!(TimeStamp::parse("01/03/2024").is_none());
        // past the range the record encoding can hold
        assert!(TimeStamp::parse("2300-01-01 00:00:00").is_none());
    }
}
