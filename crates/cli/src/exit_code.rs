// Consistent exit codes for the casegate CLI.
//
//   0  = success
//   1  = general error
//   2  = usage/argument error
//   3  = input file missing or unreadable
//   11 = access denied by the case definition

use std::process;

use casegate_common::error::{AccessDeniedError, ConfigurationError};

/// Named exit codes for the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,
    Error = 1,
    Usage = 2,
    Input = 3,
    Denied = 11,
}

impl ExitCode {
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Map an anyhow error to an exit code by inspecting the error chain.
    pub fn from_error(err: &anyhow::Error) -> Self {
        for cause in err.chain() {
            if cause.downcast_ref::<AccessDeniedError>().is_some() {
                return Self::Denied;
            }
            if cause.downcast_ref::<ConfigurationError>().is_some() {
                return Self::Usage;
            }
            if let Some(io_err) = cause.downcast_ref::<std::io::Error>() {
                return match io_err.kind() {
                    std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => {
                        Self::Input
                    }
                    _ => Self::Error,
                };
            }
            if cause.downcast_ref::<serde_json::Error>().is_some()
                || cause.downcast_ref::<toml::de::Error>().is_some()
            {
                return Self::Input;
            }
        }

        Self::Error
    }
}

impl From<ExitCode> for process::ExitCode {
    fn from(code: ExitCode) -> Self {
        process::ExitCode::from(code.code() as u8)
    }
}
