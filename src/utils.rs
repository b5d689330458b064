//! Utility functions for identifiers and input checks

use std::sync::LazyLock;

use bech32::Bech32m;
use regex::Regex;
use uuid7::uuid7;

pub const LOAN_HRP: &str = "loan_";
pub const INVESTMENT_HRP: &str = "inv_";

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9\-]+(\.[A-Za-z0-9\-]+)*\.[A-Za-z]{2,}$")
        .expect("email pattern is valid")
});

// construct a unique, time-ordered id then encode using bech32m
pub fn new_uuid_to_bech32(hrp: &str) -> anyhow::Result<String> {
    let hrp = bech32::Hrp::parse(hrp)?;
    let encode = bech32::encode::<Bech32m>(hrp, uuid7().as_bytes())?;
    Ok(encode)
}

pub fn is_valid_email(input: &str) -> bool {
    EMAIL.is_match(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_carry_prefix_and_are_unique() {
        let a = new_uuid_to_bech32(LOAN_HRP).unwrap();
        let b = new_uuid_to_bech32(LOAN_HRP).unwrap();

        assert!(a.starts_with("loan_1"));
        assert_ne!(a, b);
    }

    #[test]
    fn empty_hrp_is_rejected() {
        assert!(new_uuid_to_bech32("").is_err());
    }

    #[test]
    fn email_shapes() {
        assert!(is_valid_email("investor@example.com"));
        assert!(is_valid_email("first.last+tag@mail.example.co.id"));
        assert!(!is_valid_email("investor"));
        assert!(!is_valid_email("investor@"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email("investor@example"));
        assert!(!is_valid_email("in vestor@example.com"));
    }
}
