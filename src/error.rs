use thiserror::Error;

#[derive(Error, Debug)]
pub enum DashboardError {
    /// The startup data source could not be fetched or parsed.
    #[error("data unavailable from {source_name}: {reason}")]
    DataUnavailable { source_name: String, reason: String },

    /// A row failed validation while `on_invalid_row = "fail"`.
    #[error("invalid row {line}: {reason}")]
    InvalidRow { line: u64, reason: String },

    /// A selection index that does not address a row of the emitted table state.
    #[error("selection index {index} out of range for {len} visible rows")]
    SelectionIndexOutOfRange { index: usize, len: usize },

    #[error("session {0} not found")]
    SessionNotFound(uuid::Uuid),

    /// A view deriver could not produce a specification.
    #[error("failed to derive {view} view: {reason}")]
    Derivation { view: &'static str, reason: String },
}

impl DashboardError {
    pub fn data_unavailable(source_name: impl Into<String>, reason: impl ToString) -> Self {
        DashboardError::DataUnavailable {
            source_name: source_name.into(),
            reason: reason.to_string(),
        }
    }
}

pub type DashboardResult<T> = Result<T, DashboardError>;
