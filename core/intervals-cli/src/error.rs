use intervals_core::IntervalsError;

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] IntervalsError),

    #[error("Terminal I/O failed: {0}")]
    Io(#[from] std::io::Error),
}
