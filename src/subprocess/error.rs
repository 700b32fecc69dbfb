#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("Command not found: {0}")]
    CommandNotFound(String),

    #[error("Process exited with code {code}: {stderr}")]
    ExitCode { code: i32, stderr: String },

    #[error("Process terminated by signal {0}")]
    Signal(i32),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("UTF-8 conversion error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("Invalid environment assignment '{0}', expected KEY=VALUE")]
    InvalidEnv(String),

    #[error("Mock expectation not met: {0}")]
    MockExpectationNotMet(String),
}
