//! Value Objects for the storefront domain

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::AppError;

/// Money value object
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    amount: Decimal,
    currency: String,
}

impl Money {
    pub fn new(amount: Decimal, currency: &str) -> Self {
        Self { amount, currency: currency.to_string() }
    }
    pub fn zero(currency: &str) -> Self { Self::new(Decimal::ZERO, currency) }
    pub fn amount(&self) -> Decimal { self.amount }
    pub fn currency(&self) -> &str { &self.currency }
    pub fn is_zero(&self) -> bool { self.amount.is_zero() }
    pub fn multiply(&self, qty: u32) -> Money { Money::new(self.amount * Decimal::from(qty), &self.currency) }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.amount, self.currency)
    }
}

/// Shipping address, copied by value onto each order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub street: String,
    pub town: String,
    pub region: String,
    pub digital_address: String,
    pub phone: String,
    pub country: String,
}

impl Address {
    /// Every field is required and must be non-blank after trimming.
    pub fn validate(&self) -> Result<(), AppError> {
        let fields = [
            ("street", &self.street),
            ("town", &self.town),
            ("region", &self.region),
            ("digitalAddress", &self.digital_address),
            ("phone", &self.phone),
            ("country", &self.country),
        ];
        for (name, value) in fields {
            if value.trim().is_empty() {
                return Err(AppError::InvalidInput(format!("Shipping address is missing '{name}'.")));
            }
        }
        Ok(())
    }
}

/// Accepted payment instruments. Payment settlement itself is out of scope;
/// the method is recorded on the order verbatim.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    CreditCard,
    MobileMoney,
    BankTransfer,
    CashOnDelivery,
}

impl PaymentMethod {
    pub fn parse(value: &str) -> Result<Self, AppError> {
        match value {
            "credit_card" => Ok(Self::CreditCard),
            "mobile_money" => Ok(Self::MobileMoney),
            "bank_transfer" => Ok(Self::BankTransfer),
            "cash_on_delivery" => Ok(Self::CashOnDelivery),
            other => Err(AppError::InvalidInput(format!("Unknown payment method '{other}'."))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreditCard => "credit_card",
            Self::MobileMoney => "mobile_money",
            Self::BankTransfer => "bank_transfer",
            Self::CashOnDelivery => "cash_on_delivery",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.as_str()) }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Paid,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn parse(value: &str) -> Result<Self, AppError> {
        match value {
            "pending" => Ok(Self::Pending),
            "paid" => Ok(Self::Paid),
            "failed" => Ok(Self::Failed),
            "refunded" => Ok(Self::Refunded),
            other => Err(AppError::InvalidInput(format!("Unknown payment status '{other}'."))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Failed => "failed",
            Self::Refunded => "refunded",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.as_str()) }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn parse(value: &str) -> Result<Self, AppError> {
        match value {
            "processing" => Ok(Self::Processing),
            "shipped" => Ok(Self::Shipped),
            "delivered" => Ok(Self::Delivered),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(AppError::InvalidInput(format!("Unknown order status '{other}'."))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Processing => "processing",
            Self::Shipped => "shipped",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.as_str()) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_money_multiply() {
        let price = Money::new(Decimal::new(1050, 2), "GHS");
        assert_eq!(price.multiply(3).amount(), Decimal::new(3150, 2));
    }

    #[test]
    fn test_payment_method_parse() {
        assert_eq!(PaymentMethod::parse("mobile_money").unwrap(), PaymentMethod::MobileMoney);
        assert!(PaymentMethod::parse("barter").is_err());
    }

    #[test]
    fn test_address_requires_all_fields() {
        let mut addr = Address {
            street: "12 Ridge Rd".into(), town: "Accra".into(), region: "Greater Accra".into(),
            digital_address: "GA-183-8164".into(), phone: "+233201234567".into(), country: "Ghana".into(),
        };
        assert!(addr.validate().is_ok());
        addr.phone = "  ".into();
        assert!(addr.validate().is_err());
    }
}
