use {
    super::error::MarketError,
    rust_decimal::{Decimal, RoundingStrategy, prelude::ToPrimitive},
    serde::{Deserialize, Serialize},
    std::fmt,
};

/// Amount in the currency's minor unit (cents for USD, yen for JPY).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MoneyAmount(i64);

impl MoneyAmount {
    pub fn new(minor: i64) -> Result<Self, MarketError> {
        if minor < 0 {
            return Err(MarketError::Validation(format!(
                "MoneyAmount cannot be negative, got: {minor}"
            )));
        }
        Ok(Self(minor))
    }

    pub fn minor_units(&self) -> i64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for MoneyAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Usd,
    Eur,
    Gbp,
    Jpy,
}

impl Currency {
    /// ISO code as stored on listings and orders.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Usd => "USD",
            Self::Eur => "EUR",
            Self::Gbp => "GBP",
            Self::Jpy => "JPY",
        }
    }

    /// Lowercase form the payment processor speaks.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Usd => "usd",
            Self::Eur => "eur",
            Self::Gbp => "gbp",
            Self::Jpy => "jpy",
        }
    }

    pub fn minor_unit_exponent(&self) -> u32 {
        match self {
            Self::Jpy => 0,
            Self::Usd | Self::Eur | Self::Gbp => 2,
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl TryFrom<&str> for Currency {
    type Error = MarketError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s.to_ascii_lowercase().as_str() {
            "usd" => Ok(Self::Usd),
            "eur" => Ok(Self::Eur),
            "gbp" => Ok(Self::Gbp),
            "jpy" => Ok(Self::Jpy),
            other => Err(MarketError::Validation(format!(
                "unknown currency: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    amount: MoneyAmount,
    currency: Currency,
}

impl Money {
    pub fn new(amount: MoneyAmount, currency: Currency) -> Self {
        Self { amount, currency }
    }

    /// Converts a decimal price (major units) into minor units, rounding
    /// half away from zero at the currency's precision.
    pub fn from_major(price: Decimal, currency: Currency) -> Result<Self, MarketError> {
        let exponent = currency.minor_unit_exponent();
        let rounded = price.round_dp_with_strategy(exponent, RoundingStrategy::MidpointAwayFromZero);
        let minor = (rounded * Decimal::from(10_i64.pow(exponent)))
            .to_i64()
            .ok_or_else(|| MarketError::Validation(format!("price out of range: {price}")))?;
        Ok(Self::new(MoneyAmount::new(minor)?, currency))
    }

    pub fn amount(&self) -> MoneyAmount {
        self.amount
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }

    /// Major-unit decimal at the currency's precision (`4900` USD -> `49.00`).
    pub fn to_major(&self) -> Decimal {
        Decimal::new(self.amount.minor_units(), self.currency.minor_unit_exponent())
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.to_major(), self.currency)
    }
}

#[cfg(test)]
mod tests {
    use {super::*, std::str::FromStr};

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn converts_major_to_minor_units() {
        let m = Money::from_major(dec("49.00"), Currency::Usd).unwrap();
        assert_eq!(m.amount().minor_units(), 4900);
        assert_eq!(m.to_major().to_string(), "49.00");
    }

    #[test]
    fn rounds_half_away_from_zero() {
        let m = Money::from_major(dec("10.005"), Currency::Eur).unwrap();
        assert_eq!(m.amount().minor_units(), 1001);
        let m = Money::from_major(dec("10.004"), Currency::Eur).unwrap();
        assert_eq!(m.amount().minor_units(), 1000);
    }

    #[test]
    fn zero_decimal_currencies_have_no_minor_digits() {
        let m = Money::from_major(dec("1500.4"), Currency::Jpy).unwrap();
        assert_eq!(m.amount().minor_units(), 1500);
        assert_eq!(m.to_major().to_string(), "1500");
    }

    #[test]
    fn negative_prices_are_rejected() {
        assert!(Money::from_major(dec("-1.00"), Currency::Usd).is_err());
    }

    #[test]
    fn currency_parsing_is_case_insensitive() {
        assert_eq!(Currency::try_from("USD").unwrap(), Currency::Usd);
        assert_eq!(Currency::try_from("usd").unwrap(), Currency::Usd);
        assert!(Currency::try_from("chf").is_err());
    }
}
