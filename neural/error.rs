use thiserror::Error;

/// Errors raised by the neural primitives.
#[derive(Debug, Error)]
pub enum NeuralError {
    /// Network was configured with impossible dimensions. Fatal at
    /// construction time; there is no creature to corrupt yet.
    #[error("invalid architecture: {0}")]
    InvalidArchitecture(String),

    /// An input vector did not match the configured dimension. This is a
    /// coordinator-ordering bug and must fail fast rather than be papered
    /// over.
    #[error("shape mismatch in {context}: expected {expected}, got {got}")]
    ShapeMismatch {
        /// Which call detected the mismatch.
        context: &'static str,
        /// Dimension the network was built for.
        expected: usize,
        /// Dimension actually supplied.
        got: usize,
    },

    /// A loss or gradient came out non-finite. The update is skipped and
    /// the previous weights stay in effect.
    #[error("non-finite {quantity} during training step")]
    NumericInstability {
        /// Which quantity exploded (loss, gradient, ...).
        quantity: &'static str,
    },

    /// A serialized snapshot does not fit the architecture it is being
    /// restored into.
    #[error("snapshot mismatch: {0}")]
    SnapshotMismatch(String),
}

impl NeuralError {
    /// Shorthand for a shape-mismatch error.
    #[must_use]
    pub const fn shape(context: &'static str, expected: usize, got: usize) -> Self {
        Self::ShapeMismatch {
            context,
            expected,
            got,
        }
    }
}
