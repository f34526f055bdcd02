//! Turns validation failures into field, global and parameter errors.
//!
//! Validation itself happens elsewhere; this module only consumes results.

use crate::config::ErrorCodeStrategy;
use crate::localization::Localizer;
use crate::naming::{to_camel_case, to_screaming_snake_case};
use crate::response::{ErrorResponse, FieldError, GlobalError, ParameterError};
use serde::Serialize;
use serde_json::Value;

/// Kind of rule that failed.
///
/// Parses the rule names common validation libraries report (`"required"`,
/// `"length"`, `"regex"`, `"NotEmpty"`, ...); unknown names become `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, strum_macros::EnumString, strum_macros::Display)]
#[strum(ascii_case_insensitive)]
pub enum RuleKind {
    #[strum(to_string = "NotEmpty", serialize = "not_empty", serialize = "non_empty")]
    NotEmpty,
    #[strum(to_string = "NotNull", serialize = "not_null", serialize = "required")]
    NotNull,
    #[strum(to_string = "Pattern", serialize = "regex", serialize = "matches")]
    Pattern,
    #[strum(to_string = "Size", serialize = "length", serialize = "MaxLength", serialize = "MinLength")]
    Size,
    #[strum(to_string = "Min", serialize = "GreaterThanOrEqual", serialize = "minimum")]
    Min,
    #[strum(to_string = "Range", serialize = "InclusiveBetween")]
    Range,
    #[strum(to_string = "Email", serialize = "EmailAddress")]
    Email,
    #[strum(default)]
    Other(String),
}

impl RuleKind {
    /// Code from the fixed mapping table.
    pub fn mapped_code(&self) -> &'static str {
        match self {
            RuleKind::NotEmpty => "REQUIRED_NOT_EMPTY",
            RuleKind::NotNull => "REQUIRED_NOT_NULL",
            RuleKind::Pattern => "INVALID_PATTERN",
            RuleKind::Size => "INVALID_SIZE",
            RuleKind::Min => "INVALID_MIN",
            RuleKind::Range => "VALUE_OUT_OF_RANGE",
            RuleKind::Email => "INVALID_EMAIL",
            RuleKind::Other(_) => "VALIDATION_FAILED",
        }
    }

    /// Builds a kind from a reported rule name.
    pub fn from_rule_name(name: &str) -> Self {
        // `#[strum(default)]` makes parsing infallible.
        name.parse().unwrap_or_else(|_| RuleKind::Other(name.to_string()))
    }
}

/// What a failure is attached to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureTarget {
    /// Dotted path into the request body, e.g. `Address.ZipCode`.
    Property(String),
    /// Route or query parameter name.
    Parameter(String),
    /// Cross-field rule with no single owner.
    Global,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidationFailure {
    pub target: FailureTarget,
    pub rule: RuleKind,
    /// Rule name as reported, used by [`ErrorCodeStrategy::RuleName`].
    pub rule_name: Option<String>,
    /// Explicit code carried by the rule; preserved verbatim.
    pub code: Option<String>,
    pub message: String,
    pub rejected_value: Option<Value>,
    /// Alternate location descriptor, e.g. a JSON pointer.
    pub location: Option<String>,
}

impl ValidationFailure {
    fn new(target: FailureTarget, rule: RuleKind, message: impl Into<String>) -> Self {
        Self {
            target,
            rule,
            rule_name: None,
            code: None,
            message: message.into(),
            rejected_value: None,
            location: None,
        }
    }

    pub fn property(path: impl Into<String>, rule: RuleKind, message: impl Into<String>) -> Self {
        Self::new(FailureTarget::Property(path.into()), rule, message)
    }

    pub fn parameter(name: impl Into<String>, rule: RuleKind, message: impl Into<String>) -> Self {
        Self::new(FailureTarget::Parameter(name.into()), rule, message)
    }

    pub fn global(rule: RuleKind, message: impl Into<String>) -> Self {
        Self::new(FailureTarget::Global, rule, message)
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_rule_name(mut self, name: impl Into<String>) -> Self {
        self.rule_name = Some(name.into());
        self
    }

    /// Fails when the value does not serialize; no stand-in value is recorded.
    pub fn with_rejected_value<T: Serialize>(mut self, value: T) -> serde_json::Result<Self> {
        self.rejected_value = Some(serde_json::to_value(value)?);
        Ok(self)
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }
}

/// Raised when request input fails validation.
#[derive(Debug, Clone, thiserror::Error)]
#[error("Validation failed. Error count: {}", failures.len())]
pub struct ValidationException {
    pub failures: Vec<ValidationFailure>,
}

impl ValidationException {
    pub fn new(failures: Vec<ValidationFailure>) -> Self {
        Self { failures }
    }
}

impl From<Vec<ValidationFailure>> for ValidationException {
    fn from(failures: Vec<ValidationFailure>) -> Self {
        Self::new(failures)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregatedErrors {
    pub field_errors: Vec<FieldError>,
    pub global_errors: Vec<GlobalError>,
    pub parameter_errors: Vec<ParameterError>,
}

impl AggregatedErrors {
    pub fn is_empty(&self) -> bool {
        self.field_errors.is_empty() && self.global_errors.is_empty() && self.parameter_errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.field_errors.len() + self.global_errors.len() + self.parameter_errors.len()
    }

    pub fn apply_to(self, response: &mut ErrorResponse) {
        for error in self.field_errors {
            response.add_field_error(error);
        }
        for error in self.global_errors {
            response.add_global_error(error);
        }
        for error in self.parameter_errors {
            response.add_parameter_error(error);
        }
    }
}

pub struct ValidationAggregator<'a> {
    strategy: ErrorCodeStrategy,
    localizer: &'a dyn Localizer,
}

impl<'a> ValidationAggregator<'a> {
    pub fn new(strategy: ErrorCodeStrategy, localizer: &'a dyn Localizer) -> Self {
        Self { strategy, localizer }
    }

    /// Splits failures by target, keeping input order within each collection.
    pub fn aggregate(&self, failures: &[ValidationFailure]) -> AggregatedErrors {
        let mut errors = AggregatedErrors::default();
        for failure in failures {
            let code = self.code_for(failure);
            match &failure.target {
                FailureTarget::Property(path) => {
                    let property = to_camel_case(path);
                    let message = self
                        .localizer
                        .localize_field_error(&code, &property, &failure.message)
                        .unwrap_or_else(|| failure.message.clone());
                    let mut error = FieldError::new(code, property, message);
                    error.rejected_value = failure.rejected_value.clone();
                    error.path = failure.location.clone();
                    errors.field_errors.push(error);
                }
                FailureTarget::Parameter(name) => {
                    let message = self
                        .localizer
                        .localize_field_error(&code, name, &failure.message)
                        .unwrap_or_else(|| failure.message.clone());
                    let mut error = ParameterError::new(code, name.clone(), message);
                    error.rejected_value = failure.rejected_value.clone();
                    errors.parameter_errors.push(error);
                }
                FailureTarget::Global => {
                    let message = self
                        .localizer
                        .localize(&code, &failure.message)
                        .unwrap_or_else(|| failure.message.clone());
                    errors.global_errors.push(GlobalError::new(code, message));
                }
            }
        }
        errors
    }

    fn code_for(&self, failure: &ValidationFailure) -> String {
        if let Some(code) = &failure.code {
            return code.clone();
        }
        match self.strategy {
            ErrorCodeStrategy::Mapped => failure.rule.mapped_code().to_string(),
            ErrorCodeStrategy::RuleName => {
                let name = match (&failure.rule_name, &failure.rule) {
                    (Some(name), _) => name.clone(),
                    (None, RuleKind::Other(name)) => name.clone(),
                    (None, rule) => rule.to_string(),
                };
                to_screaming_snake_case(&name)
            }
        }
    }
}
