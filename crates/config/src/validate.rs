//! Configuration validation
//!
//! Field-level rules come from the `validator` derives on the config types;
//! this module adds the cross-field checks and collects everything into a
//! single [`ValidationResult`] so `acme-registrar test` can report all
//! problems at once.

use std::collections::HashSet;
use std::fmt;

use validator::Validate;

use crate::Config;

/// Category of a validation error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Invalid field value
    Field,
    /// Conflicting or duplicated definitions
    Conflict,
    /// Referenced file is missing or unreadable
    File,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Field => write!(f, "field"),
            ErrorCategory::Conflict => write!(f, "conflict"),
            ErrorCategory::File => write!(f, "file"),
        }
    }
}

/// A validation error that makes the configuration unusable
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub category: ErrorCategory,
    pub message: String,
}

impl ValidationError {
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.category, self.message)
    }
}

/// A non-fatal finding
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub message: String,
}

impl ValidationWarning {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Collected validation findings
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: ValidationWarning) {
        self.warnings.push(warning);
    }

    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Validate a loaded configuration
pub fn validate_config(config: &Config) -> ValidationResult {
    let mut result = ValidationResult::new();

    if let Err(e) = config.acme.validate() {
        result.add_error(ValidationError::new(
            ErrorCategory::Field,
            format!("acme: {}", e),
        ));
    }

    if config.accounts.is_empty() {
        result.add_warning(ValidationWarning::new(
            "No accounts configured; nothing to manage",
        ));
    }

    let mut seen = HashSet::new();
    for account in &config.accounts {
        if !seen.insert(account.name.as_str()) {
            result.add_error(ValidationError::new(
                ErrorCategory::Conflict,
                format!("Account '{}' is defined more than once", account.name),
            ));
        }

        if let Err(e) = account.validate() {
            result.add_error(ValidationError::new(
                ErrorCategory::Field,
                format!("account '{}': {}", account.name, e),
            ));
        }

        if !account.key_file.exists() {
            result.add_error(ValidationError::new(
                ErrorCategory::File,
                format!(
                    "Account '{}' key file not found: {:?}",
                    account.name, account.key_file
                ),
            ));
        }
    }

    if config.acme.directory_url.starts_with("http://") {
        result.add_warning(ValidationWarning::new(format!(
            "ACME directory {} is not served over HTTPS",
            config.acme.directory_url
        )));
    }

    result
}
