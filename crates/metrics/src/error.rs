use crate::snapshot::InstrumentKind;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("metric '{name}' is already registered")]
    DuplicateMetric { name: String },
    #[error("metric '{name}' is registered as {found}, not {expected}")]
    KindMismatch {
        name: String,
        expected: InstrumentKind,
        found: InstrumentKind,
    },
    #[error("metric name must not be empty")]
    EmptyName,
}

pub type Result<T> = std::result::Result<T, Error>;
