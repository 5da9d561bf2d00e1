//! Target-language emission profile.
//!
//! Loaded from JSON by the driver, e.g.
//!
//! ```json
//! { "naming_style": "camel", "assertion_style": "return-result",
//!   "optional_representation": "nullable", "private_prefix": "_" }
//! ```
//!
//! Missing keys take their defaults.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NamingStyle {
    #[default]
    Snake,
    Camel,
}

/// How a failed check reports itself in the target language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AssertionStyle {
    #[default]
    Exception,
    ReturnResult,
}

/// How the target represents an optional value.
///
/// `Tagged` targets have sum types with exhaustiveness checking, so
/// synthesized matches carry no fallback arm. `Nullable` targets get an
/// explicit fallback that raises `UnreachableCaseError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionalRepresentation {
    Nullable,
    #[default]
    Tagged,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmissionProfile {
    pub naming_style: NamingStyle,
    pub assertion_style: AssertionStyle,
    pub optional_representation: OptionalRepresentation,
    /// Prepended to the names of private functions.
    pub private_prefix: String,
    /// Name of the error raised or returned on contract failure.
    pub error_type: String,
}

impl Default for EmissionProfile {
    fn default() -> Self {
        EmissionProfile {
            naming_style: NamingStyle::default(),
            assertion_style: AssertionStyle::default(),
            optional_representation: OptionalRepresentation::default(),
            private_prefix: String::new(),
            error_type: "ContractViolation".to_string(),
        }
    }
}

impl EmissionProfile {
    /// Applies the naming convention to an identifier written in either
    /// style.
    pub fn style(&self, name: &str) -> String {
        match self.naming_style {
            NamingStyle::Snake => to_snake(name),
            NamingStyle::Camel => to_camel(name),
        }
    }
}

pub(crate) fn to_snake(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev_lower = false;
    for c in name.chars() {
        if c.is_ascii_uppercase() {
            if prev_lower {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
            prev_lower = false;
        } else {
            out.push(c);
            prev_lower = c.is_ascii_lowercase() || c.is_ascii_digit();
        }
    }
    out
}

fn to_camel(name: &str) -> String {
    let leading = name.len() - name.trim_start_matches('_').len();
    let mut out: String = name[..leading].to_string();
    let mut upper_next = false;
    for c in name[leading..].chars() {
        if c == '_' {
            upper_next = true;
        } else if upper_next {
            out.push(c.to_ascii_uppercase());
            upper_next = false;
        } else {
            out.push(c);
        }
    }
    out
}
