//! Integration tests for the initialization counter

mod common;

use common::{Harness, low_check};
use pretty_assertions::assert_eq;
use rstest::rstest;
use testing_secrets_backend::{BackendError, SecretsBackend};
use testing_secrets_storage::Op;

#[tokio::test]
async fn low_check_two_fails_third_call() {
    // GIVEN: A root credential with low_check = 2
    let h = Harness::new();
    h.backend.on_config_write(low_check(2)).await.unwrap();

    // WHEN/THEN: The first two initializations succeed
    h.backend.on_initialize().await.unwrap();
    assert_eq!(h.raw("check"), Some(vec![1]));
    h.backend.on_initialize().await.unwrap();
    assert_eq!(h.raw("check"), Some(vec![2]));

    // WHEN/THEN: The third fails, reporting 3 vs 2, and the count is still 3
    let err = h.backend.on_initialize().await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "artificial initialize failure due to initialize count being higher than low_check: 3 vs 2"
    );
    assert_eq!(h.raw("check"), Some(vec![3]));
}

#[tokio::test]
async fn fourth_call_fails_with_low_check_three() {
    let h = Harness::new();
    h.backend.on_config_write(low_check(3)).await.unwrap();

    for _ in 0..3 {
        h.backend.on_initialize().await.unwrap();
    }
    let err = h.backend.on_initialize().await.unwrap_err();

    assert!(matches!(
        err,
        BackendError::InitializeThreshold {
            count: 4,
            low_check: 3
        }
    ));
    assert!(err.to_string().contains("4 vs 3"));
    assert_eq!(h.raw("check"), Some(vec![4]));
}

#[rstest]
#[case(0, 1)]
#[case(0, 7)]
#[case(2, 7)]
#[case(5, 12)]
#[tokio::test]
async fn count_equals_number_of_calls(#[case] threshold: i64, #[case] calls: u8) {
    let h = Harness::new();
    if threshold != 0 {
        h.backend.on_config_write(low_check(threshold)).await.unwrap();
    }

    for _ in 0..calls {
        let _ = h.backend.on_initialize().await;
    }

    assert_eq!(h.raw("check"), Some(vec![calls]));
}

#[tokio::test]
async fn lowering_threshold_fails_later_calls() {
    let h = Harness::new();
    h.backend.on_initialize().await.unwrap();
    h.backend.on_initialize().await.unwrap();

    h.backend.on_config_write(low_check(1)).await.unwrap();

    assert!(h.backend.on_initialize().await.is_err());
    assert!(h.backend.on_initialize().await.is_err());
    assert_eq!(h.raw("check"), Some(vec![4]));
}

#[tokio::test]
async fn counter_write_failure_is_reported() {
    let h = Harness::new();
    h.storage.fail(Op::Put, "check");

    let err = h.backend.on_initialize().await.unwrap_err();

    assert!(matches!(err, BackendError::Storage(_)));
    assert_eq!(h.raw("check"), None);
}
