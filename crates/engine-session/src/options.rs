//! Engine option declarations and value validation.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OptionKind {
    Check {
        default: bool,
    },
    Spin {
        default: i64,
        min: i64,
        max: i64,
    },
    Combo {
        default: String,
        vars: Vec<String>,
    },
    Button,
    String {
        default: String,
    },
}

/// An option as declared by the engine during the handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionSpec {
    pub name: String,
    #[serde(flatten)]
    pub kind: OptionKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    Bool(bool),
    Int(i64),
    Text(String),
    /// Pressing a button option
    Trigger,
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionValue::Bool(b) => write!(f, "{b}"),
            OptionValue::Int(i) => write!(f, "{i}"),
            OptionValue::Text(s) => f.write_str(s),
            OptionValue::Trigger => f.write_str("trigger"),
        }
    }
}

impl OptionSpec {
    pub fn default_value(&self) -> OptionValue {
        match &self.kind {
            OptionKind::Check { default } => OptionValue::Bool(*default),
            OptionKind::Spin { default, .. } => OptionValue::Int(*default),
            OptionKind::Combo { default, .. } | OptionKind::String { default } => {
                OptionValue::Text(default.clone())
            }
            OptionKind::Button => OptionValue::Trigger,
        }
    }

    pub fn is_button(&self) -> bool {
        matches!(self.kind, OptionKind::Button)
    }

    /// Parse user input against this option's declared type and bounds.
    pub fn validate(&self, raw: &str) -> Result<OptionValue, EngineError> {
        let raw = raw.trim();
        let out_of_range = || EngineError::OutOfRange {
            name: self.name.clone(),
            value: raw.to_string(),
        };
        match &self.kind {
            OptionKind::Check { .. } => match raw.to_ascii_lowercase().as_str() {
                "true" | "check" => Ok(OptionValue::Bool(true)),
                "false" | "uncheck" => Ok(OptionValue::Bool(false)),
                _ => Err(out_of_range()),
            },
            OptionKind::Spin { min, max, .. } => {
                let value: i64 = raw.parse().map_err(|_| out_of_range())?;
                if (*min..=*max).contains(&value) {
                    Ok(OptionValue::Int(value))
                } else {
                    Err(out_of_range())
                }
            }
            OptionKind::Combo { vars, .. } => vars
                .iter()
                .find(|v| v.eq_ignore_ascii_case(raw))
                .map(|v| OptionValue::Text(v.clone()))
                .ok_or_else(out_of_range),
            OptionKind::Button => {
                if raw.eq_ignore_ascii_case("trigger") {
                    Ok(OptionValue::Trigger)
                } else {
                    Err(out_of_range())
                }
            }
            OptionKind::String { .. } => Ok(OptionValue::Text(raw.to_string())),
        }
    }
}

/// Case-insensitive lookup among declared options.
pub fn find_option<'a>(options: &'a [OptionSpec], name: &str) -> Option<&'a OptionSpec> {
    options.iter().find(|o| o.name.eq_ignore_ascii_case(name.trim()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spin() -> OptionSpec {
        OptionSpec {
            name: "Hash".into(),
            kind: OptionKind::Spin {
                default: 16,
                min: 1,
                max: 1024,
            },
        }
    }

    #[test]
    fn test_spin_bounds() {
        let spec = spin();
        assert_eq!(spec.validate("64"), Ok(OptionValue::Int(64)));
        assert!(matches!(spec.validate("0"), Err(EngineError::OutOfRange { .. })));
        assert!(matches!(spec.validate("lots"), Err(EngineError::OutOfRange { .. })));
    }

    #[test]
    fn test_check_and_button() {
        let check = OptionSpec {
            name: "Ponder".into(),
            kind: OptionKind::Check { default: false },
        };
        assert_eq!(check.validate("check"), Ok(OptionValue::Bool(true)));
        assert_eq!(check.validate("False"), Ok(OptionValue::Bool(false)));
        assert!(check.validate("yes").is_err());

        let button = OptionSpec {
            name: "Clear Hash".into(),
            kind: OptionKind::Button,
        };
        assert_eq!(button.validate("trigger"), Ok(OptionValue::Trigger));
        assert!(button.validate("true").is_err());
    }

    #[test]
    fn test_combo_canonical_case() {
        let combo = OptionSpec {
            name: "Style".into(),
            kind: OptionKind::Combo {
                default: "Normal".into(),
                vars: vec!["Solid".into(), "Normal".into(), "Risky".into()],
            },
        };
        assert_eq!(combo.validate("risky"), Ok(OptionValue::Text("Risky".into())));
        assert!(combo.validate("Wild").is_err());
    }

    #[test]
    fn test_find_option_ignores_case() {
        let options = vec![spin()];
        assert!(find_option(&options, "hash").is_some());
        assert!(find_option(&options, "Threads").is_none());
    }
}
