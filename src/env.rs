//! Environment variable substitution for configuration values
//!
//! References use `${VAR_NAME}` or `${VAR_NAME:-default}`. Substitution runs
//! on the raw configuration text before it is parsed.

use std::env;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::config::ConfigError;

/// `${VAR_NAME}` with an optional `:-default` suffix
static ENV_VAR_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}").unwrap()
});

/// Substitute environment variable references in a string.
///
/// An unset variable falls back to its default when one is given. Returns an
/// error listing every variable that is unset and has no default.
///
/// # Examples
///
/// ```ignore
/// use efs_provisioner::env::substitute_env_vars;
///
/// std::env::set_var("EFS_REGION", "eu-west-1");
/// let result = substitute_env_vars("region: ${EFS_REGION}").unwrap();
/// assert_eq!(result, "region: eu-west-1");
/// ```
pub fn substitute_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut missing_vars: Vec<String> = Vec::new();

    let result = ENV_VAR_PATTERN.replace_all(input, |caps: &Captures| {
        let var_name = &caps[1];
        match (env::var(var_name), caps.get(2)) {
            (Ok(value), _) => value,
            (Err(_), Some(default)) => default.as_str().to_string(),
            (Err(_), None) => {
                if !missing_vars.iter().any(|v| v == var_name) {
                    missing_vars.push(var_name.to_string());
                }
                caps[0].to_string()
            }
        }
    });

    if !missing_vars.is_empty() {
        return Err(ConfigError::ValidationError(format!(
            "Missing environment variables: {}",
            missing_vars.join(", ")
        )));
    }

    Ok(result.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn test_no_substitution_needed() {
        let input = "plain text without variables";
        let result = substitute_env_vars(input).unwrap();
        assert_eq!(result, input);
    }

    #[test]
    fn test_single_variable_substitution() {
        env::set_var("EFS_TEST_VAR_SINGLE", "hello");
        let result = substitute_env_vars("prefix_${EFS_TEST_VAR_SINGLE}_suffix").unwrap();
        assert_eq!(result, "prefix_hello_suffix");
        env::remove_var("EFS_TEST_VAR_SINGLE");
    }

    #[test]
    fn test_same_variable_multiple_times() {
        env::set_var("EFS_TEST_VAR_REPEAT", "value");
        let result = substitute_env_vars("${EFS_TEST_VAR_REPEAT}-${EFS_TEST_VAR_REPEAT}").unwrap();
        assert_eq!(result, "value-value");
        env::remove_var("EFS_TEST_VAR_REPEAT");
    }

    #[test]
    fn test_default_used_when_unset() {
        let result = substitute_env_vars("region: ${EFS_UNSET_REGION_12345:-us-east-1}").unwrap();
        assert_eq!(result, "region: us-east-1");
    }

    #[test]
    fn test_empty_default() {
        let result = substitute_env_vars("[${EFS_UNSET_EMPTY_12345:-}]").unwrap();
        assert_eq!(result, "[]");
    }

    #[test]
    fn test_set_variable_wins_over_default() {
        env::set_var("EFS_TEST_VAR_DEFAULTED", "eu-west-1");
        let result = substitute_env_vars("${EFS_TEST_VAR_DEFAULTED:-us-east-1}").unwrap();
        assert_eq!(result, "eu-west-1");
        env::remove_var("EFS_TEST_VAR_DEFAULTED");
    }

    #[test]
    fn test_multiple_missing_variables_error() {
        let result = substitute_env_vars(
            "${EFS_MISSING_A_12345} ${EFS_MISSING_B_12345} ${EFS_MISSING_A_12345}",
        );
        let err = result.unwrap_err().to_string();
        assert!(err.contains("EFS_MISSING_A_12345, EFS_MISSING_B_12345"));
        assert_eq!(err.matches("EFS_MISSING_A_12345").count(), 1);
    }

    #[test]
    fn test_partial_match_not_substituted() {
        let result = substitute_env_vars("$VAR and {VAR} remain unchanged").unwrap();
        assert_eq!(result, "$VAR and {VAR} remain unchanged");
    }
}
