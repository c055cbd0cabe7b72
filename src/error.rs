use thiserror::Error;

use crate::config::BlockKind;

/// Failures raised while assembling a network or loading its parameters.
///
/// None of these are recoverable: a bad descriptor or a checkpoint that
/// disagrees with the assembled architecture aborts the construction that
/// triggered it.
#[derive(Debug, Error)]
pub enum ResNetError {
    #[error("stage {stage} has no blocks; every stage needs at least one")]
    EmptyStage { stage: usize },

    #[error("the classifier head needs at least one output class")]
    NoClasses,

    #[error("descriptor specifies {requested:?} blocks but the network was built for {expected:?}")]
    BlockKindMismatch {
        requested: BlockKind,
        expected: BlockKind,
    },

    /// A checkpoint's tensors disagree with the assembled architecture.
    /// Mismatched entries are never silently skipped.
    #[error("checkpoint shape mismatch: {0}")]
    ShapeMismatch(String),

    /// Network or filesystem failure while fetching a checkpoint. The
    /// crate does not retry; callers own any retry policy.
    #[cfg(feature = "pretrained")]
    #[error("failed to fetch pretrained weights from {url}")]
    Fetch {
        url: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}
