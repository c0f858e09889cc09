use rust_decimal::{Decimal, RoundingStrategy};

/// Rounds to cents, halves away from zero.
pub fn round2(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Sums then rounds, so aggregates never carry sub-cent drift.
pub fn sum_rounded<I>(values: I) -> Decimal
where
    I: IntoIterator<Item = Decimal>,
{
    round2(values.into_iter().fold(Decimal::ZERO, |acc, v| acc + v))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use rust_decimal_macros::dec;

    #[rstest]
    #[case(dec!(1.005), dec!(1.01))]
    #[case(dec!(1.004), dec!(1.00))]
    #[case(dec!(-1.005), dec!(-1.01))]
    #[case(dec!(2.675), dec!(2.68))]
    #[case(dec!(50), dec!(50.00))]
    fn round2_midpoint_away_from_zero(#[case] input: Decimal, #[case] expected: Decimal) {
        assert_eq!(round2(input), expected);
    }

    #[test]
    fn summing_many_small_amounts_does_not_drift() {
        let total = sum_rounded(std::iter::repeat(dec!(0.01)).take(10_000));
        assert_eq!(total, dec!(100.00));
    }

    #[test]
    fn scenario_e_batch_total() {
        assert_eq!(
            sum_rounded([dec!(50.00), dec!(75.00), dec!(150.00)]),
            dec!(275.00)
        );
    }
}
