//! Tax and shipping policy
//!
//! Tax and shipping are derived from the cart on every read, never stored.
//! The policy is a strategy seam so storefront deployments can swap rates
//! without touching cart or checkout code.

use rust_decimal::Decimal;

use crate::domain::aggregates::cart::CartLine;
use crate::domain::value_objects::Money;

pub trait PricingPolicy: Send + Sync {
    fn tax(&self, subtotal: &Money, lines: &[CartLine]) -> Money;
    fn shipping(&self, subtotal: &Money, lines: &[CartLine]) -> Money;
}

/// Default storefront policy: no tax, flat 5.99 shipping. An empty cart has
/// nothing to ship, so its totals read as all zeros.
#[derive(Clone, Debug)]
pub struct StandardPricing;

impl StandardPricing {
    pub const FLAT_SHIPPING: Decimal = Decimal::from_parts(599, 0, 0, false, 2);
}

impl PricingPolicy for StandardPricing {
    fn tax(&self, subtotal: &Money, _lines: &[CartLine]) -> Money {
        Money::zero(subtotal.currency())
    }

    fn shipping(&self, subtotal: &Money, lines: &[CartLine]) -> Money {
        if lines.is_empty() {
            Money::zero(subtotal.currency())
        } else {
            Money::new(Self::FLAT_SHIPPING, subtotal.currency())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[test]
    fn test_flat_shipping_constant() {
        assert_eq!(StandardPricing::FLAT_SHIPPING, Decimal::new(599, 2));
    }

    #[test]
    fn test_zero_tax() {
        let subtotal = Money::new(Decimal::new(2500, 2), "GHS");
        let tax = StandardPricing.tax(&subtotal, &[]);
        assert!(tax.is_zero());
        assert_eq!(tax.currency(), "GHS");
    }

    #[test]
    fn test_no_shipping_on_empty_cart() {
        let subtotal = Money::zero("GHS");
        assert!(StandardPricing.shipping(&subtotal, &[]).is_zero());
    }
}
