//! Settings form validation

use inventory_storage_sqlite::SettingsField;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z].*@.+\..+$").expect("email pattern is valid"));

static PHONE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\+?[0-9]+$").expect("phone pattern is valid"));

/// Email check: starts with a letter, exactly one `@`, and a dot-separated
/// domain with at least one character on each side of the dot. The whole
/// string must match, so trailing line breaks are rejected.
pub fn check_email(email: &str) -> bool {
    email.matches('@').count() == 1 && EMAIL_RE.is_match(email)
}

/// Phone check: optional leading `+`, then one or more ASCII digits.
pub fn check_phone_number(phone: &str) -> bool {
    PHONE_RE.is_match(phone)
}

/// Per-field validation failures
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    errors: Vec<(SettingsField, String)>,
}

impl ValidationErrors {
    /// Record a failure for `field`
    pub fn add(&mut self, field: SettingsField, message: impl Into<String>) {
        self.errors.push((field, message.into()));
    }

    /// Whether nothing failed
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Message for `field`, if it failed
    pub fn for_field(&self, field: SettingsField) -> Option<&str> {
        self.errors
            .iter()
            .find(|(f, _)| *f == field)
            .map(|(_, message)| message.as_str())
    }

    /// All failures in the order they were found
    pub fn iter(&self) -> impl Iterator<Item = (SettingsField, &str)> {
        self.errors.iter().map(|(f, m)| (*f, m.as_str()))
    }

    /// `Ok` when empty, otherwise `Err(self)`
    pub fn into_result(self) -> Result<(), ValidationErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (field, message)) in self.errors.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}: {}", field, message)?;
        }
        Ok(())
    }
}

/// Validate supplier email and phone as entered on the settings form
pub fn validate_contact(email: &str, phone: &str) -> ValidationErrors {
    let mut errors = ValidationErrors::default();
    if !check_email(email) {
        errors.add(SettingsField::DefaultShipperEmail, "not a valid email address");
    }
    if !check_phone_number(phone) {
        errors.add(
            SettingsField::DefaultShipperPhone,
            "use digits only, with an optional leading +",
        );
    }
    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_check_email() {
        assert!(check_email("a@b.co"));
        assert!(check_email("jane.doe@shop.example.org"));
        assert!(!check_email("@b.co"));
        assert!(!check_email("abc"));
        assert!(!check_email("a@b"));
        assert!(!check_email("1a@b.co"));
        assert!(!check_email("a@b@c.co"));
        assert!(!check_email(""));
    }

    #[test]
    fn test_check_email_rejects_trailing_line_break() {
        assert!(!check_email("a@b.co\n"));
        assert!(!check_email("a@b.co\r\n"));
        assert!(!check_email("a@b.co\n.org"));
    }

    #[test]
    fn test_check_phone_number() {
        assert!(check_phone_number("12345"));
        assert!(check_phone_number("+12345"));
        assert!(!check_phone_number("12-345"));
        assert!(!check_phone_number(""));
        assert!(!check_phone_number("+"));
        assert!(!check_phone_number("++1"));
        assert!(!check_phone_number("123 45"));
    }

    #[test]
    fn test_validate_contact_reports_each_field() {
        let errors = validate_contact("nope", "12-3");

        assert!(errors.for_field(SettingsField::DefaultShipperEmail).is_some());
        assert!(errors.for_field(SettingsField::DefaultShipperPhone).is_some());
        assert!(errors.to_string().contains("supplier_email_key"));
        assert!(validate_contact("a@b.co", "+1").is_empty());
    }

    proptest! {
        #[test]
        fn prop_digit_strings_are_phone_numbers(digits in "[0-9]{1,15}", plus in any::<bool>()) {
            let phone = if plus { format!("+{}", digits) } else { digits };
            prop_assert!(check_phone_number(&phone));
        }

        #[test]
        fn prop_email_needs_exactly_one_at(local in "[a-z][a-z0-9]{0,8}", domain in "[a-z]{1,8}") {
            let good = format!("{}@{}.com", local, domain);
            let doubled = format!("{}@@{}.com", local, domain);
            prop_assert!(check_email(&good));
            prop_assert!(!check_email(&doubled));
        }
    }
}
