//! Property-based tests for money arithmetic, work order helpers and the
//! wallet ledger.

mod common;

use chrono::{TimeZone, Utc};
use proptest::prelude::*;
use rust_decimal::Decimal;

use common::TestApp;
use fieldops_api::{
    entities::wallet_transaction::TransactionType,
    errors::ServiceError,
    money::{round2, sum_rounded},
    services::{
        commission_rates::commission_amount,
        compensation::WalletAdjustmentInput,
        work_orders::{generate_number, validate_location},
    },
};

fn cents_strategy() -> impl Strategy<Value = Decimal> {
    (1i64..10_000_000).prop_map(|cents| Decimal::new(cents, 2))
}

fn fine_amount_strategy() -> impl Strategy<Value = Decimal> {
    (-10_000_000i64..10_000_000, 0u32..6).prop_map(|(mantissa, scale)| Decimal::new(mantissa, scale))
}

fn rate_strategy() -> impl Strategy<Value = Decimal> {
    (0i64..=10_000).prop_map(|bp| Decimal::new(bp, 4))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    #[test]
    fn round2_is_idempotent_and_close(value in fine_amount_strategy()) {
        let once = round2(value);
        prop_assert_eq!(round2(once), once);
        prop_assert!(once.scale() <= 2);
        prop_assert!((once - value).abs() <= Decimal::new(5, 3));
    }

    #[test]
    fn sum_rounded_matches_rounded_total(values in prop::collection::vec(fine_amount_strategy(), 0..20)) {
        let total = values.iter().fold(Decimal::ZERO, |acc, v| acc + v);
        prop_assert_eq!(sum_rounded(values), round2(total));
    }

    #[test]
    fn commission_never_exceeds_base(base in cents_strategy(), rate in rate_strategy()) {
        let amount = commission_amount(base, rate).unwrap();
        prop_assert!(amount >= Decimal::ZERO);
        prop_assert!(amount <= base);
        prop_assert_eq!(amount, round2(base * rate));
    }

    #[test]
    fn commission_rejects_non_positive_base(base in -1_000_000i64..=0, rate in rate_strategy()) {
        let result = commission_amount(Decimal::new(base, 2), rate);
        prop_assert!(matches!(result, Err(ServiceError::InvalidCommissionAmount(_))));
    }

    #[test]
    fn locations_inside_the_globe_are_valid(lat in -90.0f64..=90.0, lng in -180.0f64..=180.0) {
        prop_assert!(validate_location(lat, lng).is_ok());
    }

    #[test]
    fn latitudes_past_the_poles_are_invalid(lat in 90.0001f64..1_000.0, lng in -180.0f64..=180.0) {
        prop_assert!(validate_location(lat, lng).is_err());
        prop_assert!(validate_location(-lat, lng).is_err());
    }

    #[test]
    fn work_order_numbers_follow_the_date(days in 0i64..20_000) {
        let at = Utc.with_ymd_and_hms(1990, 1, 1, 12, 0, 0).unwrap() + chrono::Duration::days(days);
        let number = generate_number(at);
        let expected_prefix = format!("WO-{}-", at.format("%Y%m%d"));
        prop_assert!(number.starts_with(&expected_prefix));
        let suffix = &number[expected_prefix.len()..];
        prop_assert_eq!(suffix.len(), 6);
        prop_assert!(suffix.chars().all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c)));
    }
}

#[derive(Debug, Clone)]
enum LedgerOp {
    Credit(Decimal),
    Debit(Decimal),
}

fn ledger_op_strategy() -> impl Strategy<Value = LedgerOp> {
    prop_oneof![
        (1i64..50_000).prop_map(|c| LedgerOp::Credit(Decimal::new(c, 2))),
        (1i64..50_000).prop_map(|c| LedgerOp::Debit(Decimal::new(c, 2))),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn wallet_balance_always_equals_its_ledger(ops in prop::collection::vec(ledger_op_strategy(), 1..12)) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        let (expected, integrity) = runtime.block_on(async {
            let app = TestApp::new().await;
            let tech = app.freelancer("Prop").await;
            let ledger = &app.state.services.ledger;
            let mut expected = Decimal::ZERO;

            for op in ops {
                let (tx_type, amount) = match op {
                    LedgerOp::Credit(a) => (TransactionType::Credit, a),
                    LedgerOp::Debit(a) => (TransactionType::Debit, a),
                };
                let result = ledger
                    .adjust_wallet(
                        &app.admin,
                        tech.id,
                        WalletAdjustmentInput {
                            tx_type,
                            amount,
                            reason: "property".into(),
                        },
                    )
                    .await;
                match (tx_type, result) {
                    (TransactionType::Credit, Ok(_)) => expected += amount,
                    (TransactionType::Debit, Ok(_)) => {
                        assert!(amount <= expected);
                        expected -= amount;
                    }
                    (TransactionType::Debit, Err(ServiceError::InsufficientBalance { .. })) => {
                        assert!(amount > expected);
                    }
                    (_, Err(e)) => panic!("unexpected ledger error: {e}"),
                }
            }

            let integrity = ledger.verify_wallet_integrity(tech.id).await.unwrap();
            (expected, integrity)
        });

        prop_assert!(integrity.consistent);
        prop_assert_eq!(integrity.balance, round2(expected));
        prop_assert!(integrity.balance >= Decimal::ZERO);
    }
}
