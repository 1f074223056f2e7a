use std::io::{self, BufRead, Write};

use cardvault_core::validation::{
    verify_new_password, NewPasswordStatus, MAX_PASSWORD_LENGTH, MIN_PASSWORD_LENGTH,
};
use color_eyre::{eyre::bail, Result};
use zeroize::Zeroizing;

/// Environment variable that supplies the master password non-interactively.
pub const PASSWORD_ENV: &str = "CARDVAULT_PASSWORD";

pub type Password = Zeroizing<String>;

fn from_env() -> Option<Password> {
    std::env::var(PASSWORD_ENV).ok().map(Zeroizing::new)
}

/// Master password of an existing store.
pub fn read_existing() -> Result<Password> {
    if let Some(password) = from_env() {
        return Ok(password);
    }
    let stdin = io::stdin();
    let mut input = stdin.lock();
    Ok(prompt(&mut input, &mut io::stderr(), "Master password: ")?)
}

/// New master password, confirmed and checked against the password rules.
pub fn read_new() -> Result<Password> {
    let stdin = io::stdin();
    let mut input = stdin.lock();
    new_password(from_env(), &mut input, &mut io::stderr())
}

pub(crate) fn new_password<R: BufRead, W: Write>(
    preset: Option<Password>,
    input: &mut R,
    output: &mut W,
) -> Result<Password> {
    let (password, confirm) = match preset {
        Some(password) => (password.clone(), password),
        None => (
            prompt(input, output, "New master password: ")?,
            prompt(input, output, "Confirm master password: ")?,
        ),
    };
    match verify_new_password(&password, &confirm) {
        NewPasswordStatus::Valid => Ok(password),
        NewPasswordStatus::NoMatch => bail!("passwords do not match"),
        NewPasswordStatus::TooShort => {
            bail!("password must be at least {MIN_PASSWORD_LENGTH} characters")
        }
        NewPasswordStatus::TooLong => {
            bail!("password must be at most {MAX_PASSWORD_LENGTH} characters")
        }
    }
}

/// Read one line, without its line ending. Input is echoed; use the
/// environment variable where that matters.
pub(crate) fn prompt<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    label: &str,
) -> io::Result<Password> {
    write!(output, "{label}")?;
    output.flush()?;

    let mut line = Zeroizing::new(String::new());
    if input.read_line(&mut line)? == 0 {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "no password on stdin",
        ));
    }
    let trimmed = line.trim_end_matches(['\r', '\n']).len();
    line.truncate(trimmed);
    Ok(line)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_new(preset: Option<&str>, stdin: &str) -> Result<Password> {
        let mut input = stdin.as_bytes();
        let mut output = Vec::new();
        new_password(
            preset.map(|p| Zeroizing::new(p.to_string())),
            &mut input,
            &mut output,
        )
    }

    #[test]
    fn prompt_strips_line_ending() {
        let mut input = "hunter22\r\nnext\n".as_bytes();
        let mut output = Vec::new();
        let password = prompt(&mut input, &mut output, "pw: ").expect("prompt");
        assert_eq!(password.as_str(), "hunter22");
        assert_eq!(output, b"pw: ");
    }

    #[test]
    fn prompt_fails_on_closed_stdin() {
        let mut input = "".as_bytes();
        let err = prompt(&mut input, &mut Vec::new(), "pw: ").expect_err("eof");
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn new_password_needs_matching_confirmation() {
        let password = run_new(None, "longenough\nlongenough\n").expect("valid");
        assert_eq!(password.as_str(), "longenough");
        assert!(run_new(None, "longenough\nlongenougH\n").is_err());
    }

    #[test]
    fn new_password_enforces_length_rules() {
        let err = run_new(None, "short\nshort\n").expect_err("too short");
        assert!(err.to_string().contains("at least 8"));
        let long = "x".repeat(MAX_PASSWORD_LENGTH + 1);
        assert!(run_new(Some(&long), "").is_err());
    }

    #[test]
    fn preset_password_skips_prompts() {
        let password = run_new(Some("from-the-env"), "").expect("preset");
        assert_eq!(password.as_str(), "from-the-env");
    }
}
