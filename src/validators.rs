//! Field validators shared by the handlers.
//!
//! Each returns `Ok(())` or the reason the value is rejected; callers collect
//! failures per field into [`crate::error::FieldErrors`].

pub const RESERVED_USERNAME: &str = "me";
pub const USERNAME_MAX_LEN: usize = 150;
pub const EMAIL_MAX_LEN: usize = 254;
pub const NAME_MAX_LEN: usize = 256;
pub const SLUG_MAX_LEN: usize = 50;
pub const PERSON_NAME_MAX_LEN: usize = 150;
pub const MIN_SCORE: i32 = 1;
pub const MAX_SCORE: i32 = 10;

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("this field is required")]
    Required,
    #[error("username \"me\" is reserved")]
    ReservedUsername,
    #[error("contains invalid characters: {0}")]
    InvalidCharacters(String),
    #[error("ensure this field has no more than {0} characters")]
    TooLong(usize),
    #[error("year {year} is later than the current year {current}")]
    FutureYear { year: i32, current: i32 },
    #[error("enter a valid email address")]
    InvalidEmail,
    #[error("score must be between {} and {}", MIN_SCORE, MAX_SCORE)]
    ScoreOutOfRange,
}

/// Accepts non-empty ASCII usernames made of letters, digits and `_.@+-`,
/// except the reserved `me`.
pub fn validate_username(name: &str) -> Result<(), ValidationError> {
    if name.is_empty() {
        return Err(ValidationError::Required);
    }
    if name == RESERVED_USERNAME {
        return Err(ValidationError::ReservedUsername);
    }
    validate_max_len(name, USERNAME_MAX_LEN)?;

    let mut invalid: Vec<char> = name.chars().filter(|c| !is_username_char(*c)).collect();
    if !invalid.is_empty() {
        invalid.sort_unstable();
        invalid.dedup();
        return Err(ValidationError::InvalidCharacters(invalid.into_iter().collect()));
    }
    Ok(())
}

fn is_username_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '@' | '+' | '-')
}

pub fn validate_year(year: i32) -> Result<(), ValidationError> {
    validate_year_at(year, current_year())
}

pub fn validate_year_at(year: i32, current: i32) -> Result<(), ValidationError> {
    if year > current {
        return Err(ValidationError::FutureYear { year, current });
    }
    Ok(())
}

pub fn current_year() -> i32 {
    let today: jiff::civil::Date = jiff::Zoned::now().into();
    i32::from(today.year())
}

pub fn validate_slug(slug: &str) -> Result<(), ValidationError> {
    if slug.is_empty() {
        return Err(ValidationError::Required);
    }
    validate_max_len(slug, SLUG_MAX_LEN)?;
    if !slug.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
        let bad: String = slug
            .chars()
            .filter(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
            .collect();
        return Err(ValidationError::InvalidCharacters(bad));
    }
    Ok(())
}

/// Shape check only: one `@`, a non-empty local part and a dotted domain.
pub fn validate_email(email: &str) -> Result<(), ValidationError> {
    if email.is_empty() {
        return Err(ValidationError::Required);
    }
    validate_max_len(email, EMAIL_MAX_LEN)?;

    let Some((local, domain)) = email.split_once('@') else {
        return Err(ValidationError::InvalidEmail);
    };
    let domain_ok = !domain.contains('@')
        && domain.contains('.')
        && domain.split('.').all(|label| !label.is_empty());
    if local.is_empty() || !domain_ok || email.chars().any(char::is_whitespace) {
        return Err(ValidationError::InvalidEmail);
    }
    Ok(())
}

pub fn validate_score(score: i32) -> Result<(), ValidationError> {
    if !(MIN_SCORE..=MAX_SCORE).contains(&score) {
        return Err(ValidationError::ScoreOutOfRange);
    }
    Ok(())
}

pub fn validate_max_len(value: &str, max: usize) -> Result<(), ValidationError> {
    if value.chars().count() > max {
        return Err(ValidationError::TooLong(max));
    }
    Ok(())
}

pub fn validate_required_text(value: &str, max: usize) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::Required);
    }
    validate_max_len(value, max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_username_is_rejected() {
        assert_eq!(validate_username("me"), Err(ValidationError::ReservedUsername));
    }

    #[test]
    fn ordinary_usernames_pass() {
        assert_eq!(validate_username("bob_2"), Ok(()));
        assert_eq!(validate_username("a.b@c+d-e"), Ok(()));
        assert_eq!(validate_username("meme"), Ok(()));
    }

    #[test]
    fn username_rejects_empty_and_foreign_characters() {
        assert_eq!(validate_username(""), Err(ValidationError::Required));
        assert_eq!(
            validate_username("bad name!"),
            Err(ValidationError::InvalidCharacters(" !".to_string()))
        );
        assert!(validate_username("jürgen").is_err());
    }

    #[test]
    fn username_length_is_capped() {
        assert!(validate_username(&"a".repeat(USERNAME_MAX_LEN)).is_ok());
        assert_eq!(
            validate_username(&"a".repeat(USERNAME_MAX_LEN + 1)),
            Err(ValidationError::TooLong(USERNAME_MAX_LEN))
        );
    }

    #[test]
    fn year_cannot_be_in_the_future() {
        let now = current_year();
        assert_eq!(validate_year(now), Ok(()));
        assert!(validate_year(now + 1).is_err());
        assert_eq!(validate_year_at(1999, 2000), Ok(()));
        assert_eq!(
            validate_year_at(2001, 2000),
            Err(ValidationError::FutureYear { year: 2001, current: 2000 })
        );
    }

    #[test]
    fn slugs_allow_hyphen_and_underscore() {
        assert_eq!(validate_slug("sci-fi_2"), Ok(()));
        assert!(validate_slug("sci fi").is_err());
        assert!(validate_slug("").is_err());
        assert!(validate_slug(&"s".repeat(SLUG_MAX_LEN + 1)).is_err());
    }

    #[test]
    fn email_shape() {
        assert_eq!(validate_email("bob@example.com"), Ok(()));
        assert_eq!(validate_email(""), Err(ValidationError::Required));
        assert_eq!(validate_email("bob"), Err(ValidationError::InvalidEmail));
        assert_eq!(validate_email("bob@localhost"), Err(ValidationError::InvalidEmail));
        assert_eq!(validate_email("a@b@c.com"), Err(ValidationError::InvalidEmail));
    }

    #[test]
    fn score_bounds() {
        assert!(validate_score(0).is_err());
        assert!(validate_score(1).is_ok());
        assert!(validate_score(10).is_ok());
        assert!(validate_score(11).is_err());
    }
}
