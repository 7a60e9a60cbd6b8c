use std::{env, fmt::Display, str::FromStr};

/// Parse a boolean flag from a string value, or return the given default value otherwise.
pub fn parse_boolean_flag(value: Option<String>, default: bool) -> bool {
    let value = match value {
        Some(v) => v,
        None => return default,
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => default,
    }
}

/// Reads and parses the environment variable `var`.
///
/// Returns `Ok(None)` if the variable is not set, and the parse error message if it is set but invalid. Callers
/// decide whether to fall back to a default.
pub fn parse_env_var<T>(var: &str) -> Result<Option<T>, String>
where
    T: FromStr,
    T::Err: Display,
{
    match env::var(var) {
        Ok(s) => s.trim().parse::<T>().map(Some).map_err(|e| format!("{var}={s} is invalid. {e}")),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn boolean_flags() {
        assert!(parse_boolean_flag(Some("Yes".into()), false));
        assert!(!parse_boolean_flag(Some(" off ".into()), true));
        assert!(parse_boolean_flag(Some("maybe".into()), true));
        assert!(!parse_boolean_flag(None, false));
    }

    #[test]
    fn env_var_parsing() {
        env::set_var("LEDGER_COMMON_TEST_U32", "42");
        assert_eq!(parse_env_var::<u32>("LEDGER_COMMON_TEST_U32"), Ok(Some(42)));
        env::set_var("LEDGER_COMMON_TEST_U32", "forty-two");
        assert!(parse_env_var::<u32>("LEDGER_COMMON_TEST_U32").is_err());
        assert_eq!(parse_env_var::<u32>("LEDGER_COMMON_TEST_NOT_SET"), Ok(None));
    }
}
