use proptest::prelude::*;
use sdk::errors::{AbacusErrorExt, EngineError};
use sdk::types::{ExecutionResult, ExecutionStatus, ValidationGate, ValidationVerdict};

// User hints are static text and never echo the wrapped detail
proptest! {
    #[test]
    fn test_error_user_hint_completeness(error_str in "[a-zA-Z0-9_ ]{12,40}") {
        let errs = vec![
            EngineError::ValidationRejected(error_str.clone()),
            EngineError::SyntaxInvalid(error_str.clone()),
            EngineError::Execution { message: error_str.clone(), trace: Some(error_str.clone()) },
            EngineError::Generation(error_str.clone()),
            EngineError::Summarization(error_str.clone()),
            EngineError::Retrieval(error_str.clone()),
            EngineError::Config(error_str.clone()),
        ];

        for err in errs {
            let hint = err.user_hint();
            prop_assert!(!hint.is_empty());
            prop_assert!(!hint.contains(&error_str));
        }
    }
}

// A rejected verdict always carries its reason and gate
proptest! {
    #[test]
    fn test_rejected_verdict_keeps_reason(
        reason in "\\PC{1,80}",
        gate_index in 0usize..3,
    ) {
        let gate = [ValidationGate::Lexical, ValidationGate::Parse, ValidationGate::Structural][gate_index];
        let verdict = ValidationVerdict::rejected(gate, reason.clone());

        prop_assert!(!verdict.safe);
        prop_assert_eq!(verdict.reason(), reason.as_str());
        prop_assert_eq!(verdict.gate, Some(gate));

        let json = serde_json::to_string(&verdict).unwrap();
        let parsed: ValidationVerdict = serde_json::from_str(&json).unwrap();
        prop_assert_eq!(parsed, verdict);
    }
}

proptest! {
    #[test]
    fn test_failure_result_is_error(error in "\\PC{1,60}", stderr in "\\PC{0,60}") {
        let result = ExecutionResult::failure(error.clone(), stderr.clone());
        prop_assert_eq!(result.status, ExecutionStatus::Error);
        prop_assert!(!result.is_success());
        prop_assert_eq!(result.error.as_deref(), Some(error.as_str()));
        prop_assert_eq!(result.stderr, stderr);
        prop_assert!(result.stdout.is_empty());
    }
}
