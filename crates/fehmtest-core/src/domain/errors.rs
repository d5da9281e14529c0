use std::error::Error;
use std::fmt::{Display, Formatter};

pub type HarnessResult<T> = Result<T, HarnessError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HarnessErrorCategory {
    InputValidationError,
    IoSystemError,
    ComparisonError,
}

impl HarnessErrorCategory {
    pub const fn exit_code(self) -> i32 {
        match self {
            Self::InputValidationError => 2,
            Self::IoSystemError => 3,
            Self::ComparisonError => 4,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InputValidationError => "InputValidationError",
            Self::IoSystemError => "IoSystemError",
            Self::ComparisonError => "ComparisonError",
        }
    }
}

/// Boundary error carried out of the harness: a category that maps onto a
/// process exit code, a stable dotted placeholder, and a human message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarnessError {
    category: HarnessErrorCategory,
    placeholder: &'static str,
    message: String,
}

impl HarnessError {
    pub fn new(
        category: HarnessErrorCategory,
        placeholder: &'static str,
        message: impl Into<String>,
    ) -> Self {
        Self {
            category,
            placeholder,
            message: message.into(),
        }
    }

    pub fn input_validation(placeholder: &'static str, message: impl Into<String>) -> Self {
        Self::new(
            HarnessErrorCategory::InputValidationError,
            placeholder,
            message,
        )
    }

    pub fn io_system(placeholder: &'static str, message: impl Into<String>) -> Self {
        Self::new(HarnessErrorCategory::IoSystemError, placeholder, message)
    }

    pub fn comparison(placeholder: &'static str, message: impl Into<String>) -> Self {
        Self::new(HarnessErrorCategory::ComparisonError, placeholder, message)
    }

    pub const fn category(&self) -> HarnessErrorCategory {
        self.category
    }

    pub const fn placeholder(&self) -> &'static str {
        self.placeholder
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn exit_code(&self) -> i32 {
        self.category.exit_code()
    }

    pub fn diagnostic_line(&self) -> String {
        format!("ERROR: [{}] {}", self.placeholder, self.message)
    }
}

impl Display for HarnessError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} [{}] {}",
            self.category.as_str(),
            self.placeholder,
            self.message
        )
    }
}

impl Error for HarnessError {}

#[cfg(test)]
mod tests {
    use super::{HarnessError, HarnessErrorCategory};

    #[test]
    fn exit_mapping_is_stable() {
        let cases = [
            (
                HarnessErrorCategory::InputValidationError,
                2,
                "InputValidationError",
            ),
            (HarnessErrorCategory::IoSystemError, 3, "IoSystemError"),
            (HarnessErrorCategory::ComparisonError, 4, "ComparisonError"),
        ];

        for (category, exit_code, name) in cases {
            assert_eq!(category.exit_code(), exit_code);
            assert_eq!(category.as_str(), name);
        }
    }

    #[test]
    fn fatal_error_renders_diagnostic_line() {
        let error = HarnessError::input_validation(
            "INPUT.CONTROL_FILE",
            "control file 'input/control/fehmn.files' is empty",
        );

        assert_eq!(error.exit_code(), 2);
        assert_eq!(
            error.diagnostic_line(),
            "ERROR: [INPUT.CONTROL_FILE] control file 'input/control/fehmn.files' is empty"
        );
        assert_eq!(
            error.to_string(),
            "InputValidationError [INPUT.CONTROL_FILE] control file 'input/control/fehmn.files' is empty"
        );
    }
}
