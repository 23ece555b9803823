pub mod affiliate;
pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod orders;

use rust_decimal::{Decimal, RoundingStrategy};

/// Rounds a monetary amount to the 2 decimal places the schema stores,
/// half away from zero. Applied at persistence points only, never at
/// intermediate steps.
pub(crate) fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}
