//! Environment variable interpolation for config files.
//!
//! | Syntax            | Meaning                                        |
//! |-------------------|------------------------------------------------|
//! | `$VAR`, `${VAR}`  | value of `VAR`, an error when unset            |
//! | `${VAR:-default}` | `default` when `VAR` is unset or empty         |
//! | `${VAR-default}`  | `default` only when `VAR` is unset             |
//! | `$$`              | a literal `$`                                  |

use regex::{Captures, Regex};
use std::env;
use std::sync::LazyLock;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
        (?P<escape>\$\$)
        | \$\{ (?P<braced>[A-Za-z_][A-Za-z0-9_]*) (?: (?P<op>:?-) (?P<default>[^}]*) )? \}
        | \$(?P<bare>[A-Za-z_][A-Za-z0-9_]*)
        ",
    )
    .expect("placeholder pattern is valid")
});

/// Result of environment variable interpolation.
#[derive(Debug)]
pub struct InterpolationResult {
    /// The interpolated text. Unresolved placeholders are left as written.
    pub text: String,
    /// Every problem found, so all missing variables are reported at once.
    pub errors: Vec<String>,
}

impl InterpolationResult {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Interpolate environment variables in `input`.
pub fn interpolate(input: &str) -> InterpolationResult {
    let mut errors = Vec::new();
    let text = PLACEHOLDER
        .replace_all(input, |caps: &Captures| resolve(caps, &mut errors))
        .into_owned();
    InterpolationResult { text, errors }
}

fn resolve(caps: &Captures, errors: &mut Vec<String>) -> String {
    if caps.name("escape").is_some() {
        return "$".to_string();
    }

    let placeholder = &caps[0];
    let Some(name) = caps.name("braced").or_else(|| caps.name("bare")) else {
        return placeholder.to_string();
    };
    let name = name.as_str();
    let default = caps.name("default").map(|m| m.as_str());
    let empty_uses_default = caps.name("op").is_some_and(|m| m.as_str() == ":-");

    match env::var(name) {
        Ok(value) if value.contains(['\n', '\r']) => {
            errors.push(format!(
                "environment variable '{name}' contains newlines, which is not allowed"
            ));
            placeholder.to_string()
        }
        Ok(value) if value.is_empty() && empty_uses_default => {
            default.unwrap_or_default().to_string()
        }
        Ok(value) => value,
        Err(_) => match default {
            Some(default) => default.to_string(),
            None => {
                errors.push(format!("environment variable '{name}' is not set"));
                placeholder.to_string()
            }
        },
    }
}
