use std::error::Error;
use std::fmt::{Display, Formatter};

pub type LatticeResult<T> = Result<T, LatticeError>;
pub type ParserResult<T> = LatticeResult<T>;
pub type ConversionResult<T> = LatticeResult<T>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LatticeErrorCategory {
    Success,
    InputValidationError,
    IoSystemError,
    ComputationError,
    InternalError,
}

impl LatticeErrorCategory {
    pub const fn exit_status(self) -> ExitStatus {
        match self {
            Self::Success => ExitStatus {
                exit_code: 0,
                label: "Success",
            },
            Self::InputValidationError => ExitStatus {
                exit_code: 2,
                label: "InputValidationError",
            },
            Self::IoSystemError => ExitStatus {
                exit_code: 3,
                label: "IoSystemError",
            },
            Self::ComputationError => ExitStatus {
                exit_code: 4,
                label: "ComputationError",
            },
            Self::InternalError => ExitStatus {
                exit_code: 5,
                label: "InternalError",
            },
        }
    }

    pub const fn exit_code(self) -> i32 {
        self.exit_status().exit_code
    }

    pub const fn label(self) -> &'static str {
        self.exit_status().label
    }

    pub const fn is_fatal(self) -> bool {
        !matches!(self, Self::Success)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitStatus {
    pub exit_code: i32,
    pub label: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LatticeError {
    category: LatticeErrorCategory,
    code: &'static str,
    message: String,
}

impl LatticeError {
    pub fn new(
        category: LatticeErrorCategory,
        code: &'static str,
        message: impl Into<String>,
    ) -> Self {
        Self {
            category,
            code,
            message: message.into(),
        }
    }

    pub fn input_validation(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(LatticeErrorCategory::InputValidationError, code, message)
    }

    pub fn io_system(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(LatticeErrorCategory::IoSystemError, code, message)
    }

    pub fn computation(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(LatticeErrorCategory::ComputationError, code, message)
    }

    pub fn internal(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(LatticeErrorCategory::InternalError, code, message)
    }

    pub const fn category(&self) -> LatticeErrorCategory {
        self.category
    }

    pub const fn code(&self) -> &'static str {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn exit_code(&self) -> i32 {
        self.category.exit_code()
    }

    pub fn diagnostic_line(&self) -> String {
        let severity = if self.category.is_fatal() {
            "ERROR"
        } else {
            "INFO"
        };
        format!("{}: [{}] {}", severity, self.code, self.message)
    }
}

impl Display for LatticeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} [{}] {}",
            self.category.label(),
            self.code,
            self.message
        )
    }
}

impl Error for LatticeError {}

#[cfg(test)]
mod tests {
    use super::{LatticeError, LatticeErrorCategory};

    #[test]
    fn exit_mapping_is_stable() {
        let cases = [
            (LatticeErrorCategory::Success, 0, "Success"),
            (
                LatticeErrorCategory::InputValidationError,
                2,
                "InputValidationError",
            ),
            (LatticeErrorCategory::IoSystemError, 3, "IoSystemError"),
            (LatticeErrorCategory::ComputationError, 4, "ComputationError"),
            (LatticeErrorCategory::InternalError, 5, "InternalError"),
        ];

        for (category, exit_code, label) in cases {
            let status = category.exit_status();
            assert_eq!(status.exit_code, exit_code);
            assert_eq!(status.label, label);
        }
    }

    #[test]
    fn fatal_error_renders_diagnostic_line() {
        let error = LatticeError::input_validation(
            "INPUT.SAVELINE_SYNTAX",
            "expected ':' after label at line 3",
        );

        assert_eq!(error.exit_code(), 2);
        assert_eq!(
            error.diagnostic_line(),
            "ERROR: [INPUT.SAVELINE_SYNTAX] expected ':' after label at line 3"
        );
        assert_eq!(
            error.to_string(),
            "InputValidationError [INPUT.SAVELINE_SYNTAX] expected ':' after label at line 3"
        );
    }
}
