use std::fmt;

use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::validation::{alnum_or_space, digits_only, in_range, luhn_valid};

pub const MAX_NAME_LENGTH: usize = 64;
const MIN_NUMBER_DIGITS: usize = 12;
const MAX_NUMBER_DIGITS: usize = 19;

/// Card field identifiers, used for error reporting and detail views.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardField {
    Name,
    Number,
    Cvv,
    Month,
    Year,
}

impl CardField {
    pub const ALL: [CardField; 5] = [
        CardField::Name,
        CardField::Number,
        CardField::Cvv,
        CardField::Month,
        CardField::Year,
    ];

    pub fn label(self) -> &'static str {
        match self {
            CardField::Name => "Name",
            CardField::Number => "Number",
            CardField::Cvv => "CVV",
            CardField::Month => "Month",
            CardField::Year => "Year",
        }
    }
}

impl fmt::Display for CardField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Rejections from the validating setters (the field keeps its previous value)
/// and from [`Card::validate`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CardError {
    #[error("{0} is required")]
    Missing(CardField),
    #[error("name must contain only letters, numbers, and spaces (max 64)")]
    InvalidName,
    #[error("card number must be 12-19 digits and pass the Luhn check")]
    InvalidNumber,
    #[error("cvv must be {expected} digits for {network}")]
    InvalidCvv { network: Network, expected: usize },
    #[error("month must be between 1 and 12")]
    InvalidMonth,
    #[error("year must be between 1900 and 2100")]
    InvalidYear,
}

impl CardError {
    pub fn field(&self) -> CardField {
        match self {
            CardError::Missing(field) => *field,
            CardError::InvalidName => CardField::Name,
            CardError::InvalidNumber => CardField::Number,
            CardError::InvalidCvv { .. } => CardField::Cvv,
            CardError::InvalidMonth => CardField::Month,
            CardError::InvalidYear => CardField::Year,
        }
    }
}

/// Payment network, classified from the leading digit of the card number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Network {
    #[default]
    Other,
    Visa,
    Mastercard,
    AmericanExpress,
    Discover,
}

impl Network {
    pub fn from_number(number: &str) -> Self {
        match number.as_bytes().first() {
            Some(b'4') => Network::Visa,
            Some(b'2') | Some(b'5') => Network::Mastercard,
            Some(b'3') => Network::AmericanExpress,
            Some(b'6') => Network::Discover,
            _ => Network::Other,
        }
    }

    pub fn cvv_len(self) -> usize {
        match self {
            Network::AmericanExpress => 4,
            _ => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Network::Other => "Other",
            Network::Visa => "Visa",
            Network::Mastercard => "Mastercard",
            Network::AmericanExpress => "American Express",
            Network::Discover => "Discover",
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One stored payment card. Built empty, then filled through the validating setters.
///
/// Field contents are wiped when the card is dropped.
#[derive(Clone, Default, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Card {
    name: String,
    number: String,
    cvv: String,
    month: String,
    year: String,
    #[zeroize(skip)]
    network: Network,
}

// Never print card data through Debug.
impl fmt::Debug for Card {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Card")
            .field("display_name", &self.display_name())
            .field("network", &self.network)
            .finish_non_exhaustive()
    }
}

impl Card {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_name(&mut self, name: &str) -> Result<(), CardError> {
        if !name.is_empty() && (name.len() > MAX_NAME_LENGTH || !alnum_or_space(name)) {
            return Err(CardError::InvalidName);
        }
        self.name = name.to_string();
        Ok(())
    }

    pub fn set_number(&mut self, number: &str) -> Result<(), CardError> {
        if !digits_only(number)
            || !(MIN_NUMBER_DIGITS..=MAX_NUMBER_DIGITS).contains(&number.len())
            || !luhn_valid(number)
        {
            return Err(CardError::InvalidNumber);
        }
        self.number.zeroize();
        self.number = number.to_string();
        self.network = Network::from_number(number);
        // A CVV entered for another network no longer fits.
        if !self.cvv.is_empty() && self.cvv.len() != self.network.cvv_len() {
            self.cvv.zeroize();
        }
        Ok(())
    }

    /// Expected length follows the network of the number currently set.
    pub fn set_cvv(&mut self, cvv: &str) -> Result<(), CardError> {
        let expected = self.network.cvv_len();
        if !digits_only(cvv) || cvv.len() != expected {
            return Err(CardError::InvalidCvv {
                network: self.network,
                expected,
            });
        }
        self.cvv.zeroize();
        self.cvv = cvv.to_string();
        Ok(())
    }

    pub fn set_month(&mut self, month: &str) -> Result<(), CardError> {
        if !in_range(month, 1, 12) {
            return Err(CardError::InvalidMonth);
        }
        self.month = month.to_string();
        Ok(())
    }

    pub fn set_year(&mut self, year: &str) -> Result<(), CardError> {
        if !in_range(year, 1900, 2100) {
            return Err(CardError::InvalidYear);
        }
        self.year = year.to_string();
        Ok(())
    }

    /// Runs the setter for `field`.
    pub fn set_field(&mut self, field: CardField, value: &str) -> Result<(), CardError> {
        match field {
            CardField::Name => self.set_name(value),
            CardField::Number => self.set_number(value),
            CardField::Cvv => self.set_cvv(value),
            CardField::Month => self.set_month(value),
            CardField::Year => self.set_year(value),
        }
    }

    /// Check that every field but the name is set. The setters already keep
    /// each set field valid and the CVV in step with the network.
    pub fn validate(&self) -> Result<(), CardError> {
        for field in [
            CardField::Number,
            CardField::Cvv,
            CardField::Month,
            CardField::Year,
        ] {
            if self.field(field).is_empty() {
                return Err(CardError::Missing(field));
            }
        }
        Ok(())
    }

    pub fn field(&self, field: CardField) -> &str {
        match field {
            CardField::Name => &self.name,
            CardField::Number => &self.number,
            CardField::Cvv => &self.cvv,
            CardField::Month => &self.month,
            CardField::Year => &self.year,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn number(&self) -> &str {
        &self.number
    }

    pub fn cvv(&self) -> &str {
        &self.cvv
    }

    pub fn month(&self) -> &str {
        &self.month
    }

    pub fn year(&self) -> &str {
        &self.year
    }

    pub fn network(&self) -> Network {
        self.network
    }

    /// User label, or `"<network> <last 4 digits>"` when the label is empty.
    pub fn display_name(&self) -> String {
        if !self.name.is_empty() {
            return self.name.clone();
        }
        if self.number.is_empty() {
            return String::new();
        }
        format!("{} {}", self.network, last_four(&self.number))
    }

    /// Label/value pairs for a detail view. Unless `reveal` is set, the number
    /// is cut to its last four digits and the CVV is fully masked.
    pub fn display_fields(&self, reveal: bool) -> Vec<(&'static str, String)> {
        CardField::ALL
            .iter()
            .map(|&field| {
                let value = match field {
                    CardField::Name => self.display_name(),
                    CardField::Number if !reveal && !self.number.is_empty() => {
                        format!("**** {}", last_four(&self.number))
                    }
                    CardField::Cvv if !reveal => "*".repeat(self.cvv.len()),
                    _ => self.field(field).to_string(),
                };
                (field.label(), value)
            })
            .collect()
    }
}

fn last_four(number: &str) -> &str {
    &number[number.len().saturating_sub(4)..]
}
