//! Error types shared by the force, measurement and driver layers.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MdError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("invalid config: {0}")]
    Config(String),

    #[error("{what}: expected {expected} values, found {found}")]
    ParameterCount {
        what: String,
        expected: usize,
        found: usize,
    },

    #[error("atom {atom} has {count} neighbors, partial-force capacity is {capacity}")]
    NeighborCapacity {
        atom: usize,
        count: usize,
        capacity: usize,
    },

    #[error("eigenvector file mismatch: {0}")]
    ModeMismatch(String),

    #[error("moment of inertia tensor is singular; cannot remove angular momentum")]
    SingularInertia,

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yml::Error),
}

pub type MdResult<T> = Result<T, MdError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parameter_count_message_names_both_counts() {
        let err = MdError::ParameterCount {
            what: "SW parameters for 2 types".into(),
            expected: 31,
            found: 30,
        };
        let msg = err.to_string();
        assert!(msg.contains("31"));
        assert!(msg.contains("30"));
    }

    #[test]
    fn io_errors_convert() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "eigenvector.in");
        let err: MdError = io.into();
        assert!(matches!(err, MdError::Io(_)));
    }
}
