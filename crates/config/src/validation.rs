//! Section contract and field checks for policy settings

pub use crate::error::ValidationError;

/// A policy section of the config file
pub trait ConfigSection: Default {
    /// Checks every field, returning all failures
    fn validate(&self) -> Result<(), Vec<ValidationError>>;

    /// Overlays `other` onto this section
    fn merge(&mut self, other: Self);

    /// Table name in the config file
    fn section_name(&self) -> &'static str;
}

/// Field checks shared by the policy sections
///
/// Each check returns `Err` naming the dotted field path (for example
/// `retry.max_attempts`) so a whole section can be checked in one pass.
pub struct Validator;

fn check<T: std::fmt::Display>(
    passes: bool,
    field: &str,
    message: impl FnOnce() -> String,
    value: T,
) -> Result<(), ValidationError> {
    if passes {
        Ok(())
    } else {
        Err(ValidationError::with_value(field, message(), value))
    }
}

impl Validator {
    /// `value` must lie in `min..=max`
    pub fn in_range<T>(value: T, min: T, max: T, field: &str) -> Result<(), ValidationError>
    where
        T: PartialOrd + std::fmt::Display + Copy,
    {
        check(
            min <= value && value <= max,
            field,
            || format!("must be between {} and {}", min, max),
            value,
        )
    }

    /// `value` must be `min` or more
    pub fn at_least<T>(value: T, min: T, field: &str) -> Result<(), ValidationError>
    where
        T: PartialOrd + std::fmt::Display + Copy,
    {
        check(value >= min, field, || format!("must be at least {}", min), value)
    }

    /// The list must have at least one entry
    pub fn not_empty<T>(values: &[T], field: &str) -> Result<(), ValidationError> {
        if values.is_empty() {
            return Err(ValidationError::new(field, "must not be empty"));
        }
        Ok(())
    }

    /// `lower` must not exceed `upper`, which lives in `upper_field`
    pub fn ordered<T>(
        lower: T,
        upper: T,
        field: &str,
        upper_field: &str,
    ) -> Result<(), ValidationError>
    where
        T: PartialOrd + std::fmt::Display + Copy,
    {
        check(
            lower <= upper,
            field,
            || format!("must not exceed {} ({})", upper_field, upper),
            lower,
        )
    }

    /// Gathers the failed checks of a section
    pub fn collect_errors<I>(results: I) -> Result<(), Vec<ValidationError>>
    where
        I: IntoIterator<Item = Result<(), ValidationError>>,
    {
        let errors: Vec<ValidationError> = results.into_iter().filter_map(Result::err).collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_range_valid() {
        assert!(Validator::in_range(50, 0, 100, "test").is_ok());
        assert!(Validator::in_range(0, 0, 100, "test").is_ok());
        assert!(Validator::in_range(100, 0, 100, "test").is_ok());
    }

    #[test]
    fn test_in_range_invalid() {
        assert!(Validator::in_range(-1, 0, 100, "test").is_err());
        assert!(Validator::in_range(101, 0, 100, "test").is_err());
    }

    #[test]
    fn test_at_least() {
        assert!(Validator::at_least(1u64, 1, "test").is_ok());
        let err = Validator::at_least(0u64, 1, "timeout.duration_ms").unwrap_err();
        assert_eq!(
            err.to_string(),
            "timeout.duration_ms must be at least 1 (got 0)"
        );
    }

    #[test]
    fn test_not_empty() {
        assert!(Validator::not_empty(&[1], "test").is_ok());
        assert!(Validator::not_empty::<u64>(&[], "test").is_err());
    }

    #[test]
    fn test_ordered() {
        assert!(Validator::ordered(1, 2, "low", "high").is_ok());
        assert!(Validator::ordered(2, 2, "low", "high").is_ok());
        assert!(Validator::ordered(3, 2, "low", "high").is_err());
    }

    #[test]
    fn test_collect_errors_all_ok() {
        let results = vec![Ok(()), Ok(()), Ok(())];
        assert!(Validator::collect_errors(results).is_ok());
    }

    #[test]
    fn test_collect_errors_some_err() {
        let results = vec![
            Ok(()),
            Err(ValidationError::new("field1", "error1")),
            Ok(()),
            Err(ValidationError::new("field2", "error2")),
        ];
        let result = Validator::collect_errors(results);
        assert!(result.is_err());
        assert_eq!(result.unwrap_err().len(), 2);
    }
}
