//! Field checks shared by the card setters and the new-profile flow.

pub const MIN_PASSWORD_LENGTH: usize = 8;
pub const MAX_PASSWORD_LENGTH: usize = 128;

/// Outcome of checking a freshly chosen master password.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NewPasswordStatus {
    Valid,
    NoMatch,
    TooShort,
    TooLong,
}

/// Length is checked before the confirmation so the user fixes one thing at a time.
pub fn verify_new_password(password: &str, confirm: &str) -> NewPasswordStatus {
    let len = password.chars().count();
    if len < MIN_PASSWORD_LENGTH {
        NewPasswordStatus::TooShort
    } else if len > MAX_PASSWORD_LENGTH {
        NewPasswordStatus::TooLong
    } else if password != confirm {
        NewPasswordStatus::NoMatch
    } else {
        NewPasswordStatus::Valid
    }
}

/// Luhn mod-10 checksum over an all-digit string.
pub fn luhn_valid(number: &str) -> bool {
    if number.is_empty() || !digits_only(number) {
        return false;
    }

    let sum: u32 = number
        .bytes()
        .rev()
        .enumerate()
        .map(|(i, b)| {
            let digit = u32::from(b - b'0');
            if i % 2 == 1 {
                let doubled = digit * 2;
                if doubled > 9 {
                    doubled - 9
                } else {
                    doubled
                }
            } else {
                digit
            }
        })
        .sum();
    sum % 10 == 0
}

/// Letters, digits, and spaces only (ASCII). Empty input is rejected.
pub fn alnum_or_space(input: &str) -> bool {
    !input.is_empty()
        && input
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == ' ')
}

pub fn digits_only(input: &str) -> bool {
    !input.is_empty() && input.bytes().all(|b| b.is_ascii_digit())
}

/// Parses `input` as a plain decimal integer and checks `lower..=upper`.
/// Signs and surrounding whitespace are rejected.
pub fn in_range(input: &str, lower: u32, upper: u32) -> bool {
    if !digits_only(input) {
        return false;
    }
    match input.parse::<u32>() {
        Ok(value) => (lower..=upper).contains(&value),
        Err(_) => false,
    }
}
