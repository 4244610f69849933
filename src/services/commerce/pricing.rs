//! Money arithmetic shared by the catalog, cart, order and coupon services.
//!
//! Every amount leaving this module has exactly two fractional digits and is
//! rounded half-to-even.

use crate::entities::commerce::coupon::DiscountType;
use rust_decimal::{Decimal, RoundingStrategy};

const HUNDRED: Decimal = Decimal::ONE_HUNDRED;

/// Rounds to cents and fixes the scale at two digits.
///
/// Some backends hand decimals back with a different scale (`18` instead of
/// `18.00`); responses always go through here.
pub fn money(amount: Decimal) -> Decimal {
    let mut rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointNearestEven);
    rounded.rescale(2);
    rounded
}

/// `base × (1 − discount / 100)`, rounded to cents.
pub fn final_price(base_price: Decimal, discount_percentage: Decimal) -> Decimal {
    money(base_price * (Decimal::ONE - discount_percentage / HUNDRED))
}

/// Unit price of a product line: the product's final price plus any variant adjustment.
pub fn unit_price(final_price: Decimal, variant_adjustment: Option<Decimal>) -> Decimal {
    money(final_price + variant_adjustment.unwrap_or(Decimal::ZERO))
}

pub fn line_total(unit_price: Decimal, quantity: i32) -> Decimal {
    money(unit_price * Decimal::from(quantity))
}

pub fn tax(subtotal: Decimal, rate: Decimal) -> Decimal {
    money(subtotal * rate)
}

/// Discount a coupon grants on `subtotal`. Fixed discounts never exceed the subtotal.
pub fn coupon_discount(kind: DiscountType, value: Decimal, subtotal: Decimal) -> Decimal {
    let raw = match kind {
        DiscountType::Percentage => subtotal * value / HUNDRED,
        DiscountType::Fixed => value,
    };
    money(raw.min(subtotal).max(Decimal::ZERO))
}

/// Grand total; never negative.
pub fn order_total(subtotal: Decimal, tax: Decimal, shipping: Decimal, discount: Decimal) -> Decimal {
    money((subtotal + tax + shipping - discount).max(Decimal::ZERO))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;
    use rust_decimal_macros::dec;

    #[rstest]
    #[case(dec!(20.00), dec!(10), dec!(18.00))]
    #[case(dec!(100), dec!(0), dec!(100.00))]
    #[case(dec!(99.99), dec!(100), dec!(0.00))]
    #[case(dec!(49.99), dec!(15), dec!(42.49))]
    #[case(dec!(10.01), dec!(50), dec!(5.00))]
    fn final_price_applies_discount(
        #[case] base: Decimal,
        #[case] discount: Decimal,
        #[case] expected: Decimal,
    ) {
        assert_eq!(final_price(base, discount), expected);
    }

    #[test]
    fn money_always_has_two_fraction_digits() {
        assert_eq!(money(dec!(18)).to_string(), "18.00");
        assert_eq!(money(dec!(18.005)).to_string(), "18.00");
        assert_eq!(money(dec!(18.015)).to_string(), "18.02");
    }

    #[test]
    fn variant_adjustment_adds_to_unit_price() {
        assert_eq!(unit_price(dec!(18.00), Some(dec!(2.50))), dec!(20.50));
        assert_eq!(unit_price(dec!(18.00), None), dec!(18.00));
        assert_eq!(line_total(dec!(20.50), 3), dec!(61.50));
    }

    #[test]
    fn fixed_coupon_is_capped_at_subtotal() {
        assert_eq!(
            coupon_discount(DiscountType::Fixed, dec!(50), dec!(30.00)),
            dec!(30.00)
        );
        assert_eq!(
            coupon_discount(DiscountType::Percentage, dec!(10), dec!(30.00)),
            dec!(3.00)
        );
    }

    #[test]
    fn order_total_never_negative() {
        assert_eq!(
            order_total(dec!(10), dec!(0), dec!(0), dec!(25)),
            dec!(0.00)
        );
        assert_eq!(
            order_total(dec!(100), dec!(18), dec!(50), dec!(10)),
            dec!(158.00)
        );
    }

    proptest! {
        #[test]
        fn final_price_stays_within_bounds(cents in 0i64..10_000_000, pct in 0u32..=100) {
            let base = Decimal::new(cents, 2);
            let discount = Decimal::from(pct);
            let price = final_price(base, discount);
            prop_assert!(price >= Decimal::ZERO);
            prop_assert!(price <= base);
            prop_assert_eq!(price.scale(), 2);
        }

        #[test]
        fn zero_discount_is_identity(cents in 0i64..10_000_000) {
            let base = Decimal::new(cents, 2);
            prop_assert_eq!(final_price(base, Decimal::ZERO), base);
        }
    }
}
