use serde::{Deserialize, Serialize};

use crate::error::ResNetError;

/// Which residual block a network is built from.
///
/// Shallow ResNets (18/34 layers) use [`BasicBlock`](crate::block::BasicBlock),
/// deeper ones (50+) use [`Bottleneck`](crate::block::Bottleneck).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockKind {
    Basic,
    Bottleneck,
}

impl BlockKind {
    /// Multiplier from a stage's base width to its blocks' output width.
    pub fn expansion(self) -> usize {
        match self {
            BlockKind::Basic => 1,
            BlockKind::Bottleneck => 4,
        }
    }
}

/// Compact description of one ResNet instance: block variant, per-stage
/// repeat counts and the classifier width. Fully determines the network;
/// channel bookkeeping is derived from it at construction time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchitectureDescriptor {
    pub block: BlockKind,
    pub repeats: [usize; 4],
    pub num_classes: usize,
}

impl ArchitectureDescriptor {
    pub fn new(block: BlockKind, repeats: [usize; 4], num_classes: usize) -> Self {
        Self {
            block,
            repeats,
            num_classes,
        }
    }

    /// The 18-layer variant: basic blocks, two per stage.
    pub fn resnet18(num_classes: usize) -> Self {
        Self::new(BlockKind::Basic, [2, 2, 2, 2], num_classes)
    }

    pub fn resnet34(num_classes: usize) -> Self {
        Self::new(BlockKind::Basic, [3, 4, 6, 3], num_classes)
    }

    pub fn resnet50(num_classes: usize) -> Self {
        Self::new(BlockKind::Bottleneck, [3, 4, 6, 3], num_classes)
    }

    pub fn resnet101(num_classes: usize) -> Self {
        Self::new(BlockKind::Bottleneck, [3, 4, 23, 3], num_classes)
    }

    pub fn resnet152(num_classes: usize) -> Self {
        Self::new(BlockKind::Bottleneck, [3, 8, 36, 3], num_classes)
    }

    /// Rejects descriptors no network can be assembled from. Runs before
    /// any layer is allocated; a failure here is fatal to construction.
    pub fn validate(&self) -> Result<(), ResNetError> {
        for (stage, &repeats) in self.repeats.iter().enumerate() {
            if repeats == 0 {
                return Err(ResNetError::EmptyStage { stage: stage + 1 });
            }
        }
        if self.num_classes == 0 {
            return Err(ResNetError::NoClasses);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_match_the_reference_tables() {
        let d = ArchitectureDescriptor::resnet18(1000);
        assert_eq!(d.block, BlockKind::Basic);
        assert_eq!(d.repeats, [2, 2, 2, 2]);

        let d = ArchitectureDescriptor::resnet50(1000);
        assert_eq!(d.block, BlockKind::Bottleneck);
        assert_eq!(d.repeats, [3, 4, 6, 3]);
        assert_eq!(d.block.expansion(), 4);
    }

    #[test]
    fn zero_repeats_is_rejected() {
        let d = ArchitectureDescriptor::new(BlockKind::Basic, [2, 0, 2, 2], 10);
        assert!(matches!(
            d.validate(),
            Err(ResNetError::EmptyStage { stage: 2 })
        ));
    }

    #[test]
    fn zero_classes_is_rejected() {
        let d = ArchitectureDescriptor::new(BlockKind::Bottleneck, [3, 4, 6, 3], 0);
        assert!(matches!(d.validate(), Err(ResNetError::NoClasses)));
    }

    #[test]
    fn descriptor_round_trips_through_json() {
        let d = ArchitectureDescriptor::resnet34(21);
        let json = serde_json::to_string(&d).unwrap();
        let back: ArchitectureDescriptor = serde_json::from_str(&json).unwrap();
        assert_eq!(back, d);
    }
}
