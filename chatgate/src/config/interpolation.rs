// Copyright 2026 The Chatgate Project
// SPDX-License-Identifier: Apache-2.0

use super::error::ConfigError;

/// Resolves `${VAR_NAME}` references in a string from environment variables.
/// Returns `ConfigError::UndefinedVariable` if a referenced variable is not set.
pub fn resolve_variables(input: &str) -> Result<String, ConfigError> {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut var_name = String::new();
            let mut found_close = false;
            for c in chars.by_ref() {
                if c == '}' {
                    found_close = true;
                    break;
                }
                var_name.push(c);
            }
            if !found_close || var_name.is_empty() {
                // Malformed interpolation, kept literally
                result.push_str("${");
                result.push_str(&var_name);
                if found_close {
                    result.push('}');
                }
                continue;
            }
            let value = std::env::var(&var_name).map_err(|_| ConfigError::UndefinedVariable {
                name: var_name.clone(),
            })?;
            result.push_str(&value);
        } else {
            result.push(ch);
        }
    }

    Ok(result)
}

/// Resolve an optional field; `None` stays `None`.
pub fn resolve_optional(input: Option<&str>) -> Result<Option<String>, ConfigError> {
    input.map(resolve_variables).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_without_variables_unchanged() {
        assert_eq!(
            resolve_variables("http://localhost:11434").unwrap(),
            "http://localhost:11434"
        );
    }

    #[test]
    fn multiple_variables_in_one_string() {
        std::env::set_var("CHATGATE_TEST_INTERP_HOST", "example.com");
        std::env::set_var("CHATGATE_TEST_INTERP_PORT", "8443");
        let out =
            resolve_variables("https://${CHATGATE_TEST_INTERP_HOST}:${CHATGATE_TEST_INTERP_PORT}/v1")
                .unwrap();
        assert_eq!(out, "https://example.com:8443/v1");
    }

    #[test]
    fn undefined_variable_is_named_in_error() {
        std::env::remove_var("CHATGATE_TEST_INTERP_UNDEFINED");
        let err = resolve_variables("${CHATGATE_TEST_INTERP_UNDEFINED}").unwrap_err();
        assert!(err
            .to_string()
            .contains("CHATGATE_TEST_INTERP_UNDEFINED"));
    }

    #[test]
    fn malformed_references_kept_literally() {
        assert_eq!(resolve_variables("${unclosed").unwrap(), "${unclosed");
        assert_eq!(resolve_variables("${}").unwrap(), "${}");
        assert_eq!(resolve_variables("$HOME").unwrap(), "$HOME");
    }

    #[test]
    fn optional_none_stays_none() {
        assert_eq!(resolve_optional(None).unwrap(), None);
    }
}
