use burn::{
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig},
        BatchNorm, BatchNormConfig, Linear, LinearConfig, PaddingConfig2d, Relu,
    },
    tensor::{backend::Backend, Device, Tensor},
};

use crate::{
    block::{BasicBlock, Bottleneck, LayerBlock, ResidualBlock},
    config::ArchitectureDescriptor,
    conv::conv_initializer,
    error::ResNetError,
};

/// Base widths of the four stages; fixed across the whole ResNet family.
const STAGE_PLANES: [usize; 4] = [64, 128, 256, 512];

/// A ResNet classifier: fixed stem, four residual stages, pooled linear
/// head. Generic over the residual block `M`, which the presets pin.
///
/// Once assembled (and optionally loaded with pretrained parameters) the
/// network is immutable; forward evaluation is reentrant and safe to share
/// across threads.
#[derive(Module, Debug)]
pub struct ResNet<B: Backend, M> {
    conv1: Conv2d<B>,
    bn1: BatchNorm<B, 2>,
    relu: Relu,
    maxpool: MaxPool2d,
    layer1: LayerBlock<B, M>,
    layer2: LayerBlock<B, M>,
    layer3: LayerBlock<B, M>,
    layer4: LayerBlock<B, M>,
    avgpool: AdaptiveAvgPool2d,
    fc: Linear<B>,
}

impl<B: Backend, M: ResidualBlock<B>> ResNet<B, M> {
    fn new(repeats: [usize; 4], num_classes: usize, device: &Device<B>) -> Self {
        // Stem: 7x7 conv /2, then 3x3 max-pool /2.
        let conv1 = Conv2dConfig::new([3, 64], [7, 7])
            .with_stride([2, 2])
            .with_padding(PaddingConfig2d::Explicit(3, 3))
            .with_bias(false)
            .with_initializer(conv_initializer())
            .init(device);
        let bn1 = BatchNormConfig::new(64).init(device);
        let maxpool = MaxPool2dConfig::new([3, 3])
            .with_strides([2, 2])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .init();

        // The counter starts at the stem's width and is carried from each
        // stage into the next. Stage 1 keeps stride 1; the stem has
        // already downsampled twice.
        let mut channels = 64;
        let layer1 = LayerBlock::new(repeats[0], &mut channels, STAGE_PLANES[0], 1, device);
        let layer2 = LayerBlock::new(repeats[1], &mut channels, STAGE_PLANES[1], 2, device);
        let layer3 = LayerBlock::new(repeats[2], &mut channels, STAGE_PLANES[2], 2, device);
        let layer4 = LayerBlock::new(repeats[3], &mut channels, STAGE_PLANES[3], 2, device);

        // Head: collapse to 1x1 whatever spatial size is left, then map
        // `512 * expansion` features to class scores.
        let avgpool = AdaptiveAvgPool2dConfig::new([1, 1]).init();
        let fc = LinearConfig::new(channels, num_classes).init(device);

        Self {
            conv1,
            bn1,
            relu: Relu::new(),
            maxpool,
            layer1,
            layer2,
            layer3,
            layer4,
            avgpool,
            fc,
        }
    }

    /// Assembles a network from a runtime descriptor.
    ///
    /// The descriptor's block kind must match `M`; a descriptor that names
    /// the other variant (or an empty stage, or zero classes) is rejected
    /// before any layer is allocated.
    pub fn from_descriptor(
        descriptor: &ArchitectureDescriptor,
        device: &Device<B>,
    ) -> Result<Self, ResNetError> {
        descriptor.validate()?;
        if descriptor.block != M::KIND {
            return Err(ResNetError::BlockKindMismatch {
                requested: descriptor.block,
                expected: M::KIND,
            });
        }
        Ok(Self::new(descriptor.repeats, descriptor.num_classes, device))
    }

    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 2> {
        let out = self.conv1.forward(input);
        let out = self.bn1.forward(out);
        let out = self.relu.forward(out);
        let out = self.maxpool.forward(out);

        let out = self.layer1.forward(out);
        let out = self.layer2.forward(out);
        let out = self.layer3.forward(out);
        let out = self.layer4.forward(out);

        let out = self.avgpool.forward(out);
        // [N, C, 1, 1] -> [N, C]
        let out = out.flatten(1, 3);

        self.fc.forward(out)
    }

    /// Applies a checkpoint record to the assembled network.
    ///
    /// A record whose classifier head disagrees with this network is
    /// refused outright; mismatched entries are never dropped or padded.
    pub fn load_checkpoint(self, record: ResNetRecord<B, M>) -> Result<Self, ResNetError> {
        let record_depths = [
            record.layer1.blocks.len(),
            record.layer2.blocks.len(),
            record.layer3.blocks.len(),
            record.layer4.blocks.len(),
        ];
        for (index, (stage, depth)) in self.stages().iter().zip(record_depths).enumerate() {
            if stage.num_blocks() != depth {
                return Err(ResNetError::ShapeMismatch(format!(
                    "stage {} has {} blocks, checkpoint provides {}",
                    index + 1,
                    stage.num_blocks(),
                    depth
                )));
            }
        }

        let expected = self.fc.weight.dims();
        let found = record.fc.weight.dims();
        if expected != found {
            return Err(ResNetError::ShapeMismatch(format!(
                "classifier head expects {expected:?}, checkpoint provides {found:?}"
            )));
        }
        Ok(self.load_record(record))
    }

    /// Replaces the classifier head, e.g. to fine-tune pretrained features
    /// on a different label set. The rest of the network is untouched.
    pub fn with_classes(mut self, num_classes: usize) -> Self {
        let [in_features, _] = self.fc.weight.dims();
        let device = self.fc.weight.device();
        self.fc = LinearConfig::new(in_features, num_classes).init(&device);
        self
    }

    /// Width of the feature vector entering the classifier head.
    pub fn num_features(&self) -> usize {
        self.fc.weight.dims()[0]
    }

    /// The four residual stages, in execution order.
    pub fn stages(&self) -> [&LayerBlock<B, M>; 4] {
        [&self.layer1, &self.layer2, &self.layer3, &self.layer4]
    }
}

impl<B: Backend> ResNet<B, BasicBlock<B>> {
    /// ResNet-18.
    pub fn resnet18(num_classes: usize, device: &Device<B>) -> Self {
        Self::new([2, 2, 2, 2], num_classes, device)
    }

    /// ResNet-34.
    pub fn resnet34(num_classes: usize, device: &Device<B>) -> Self {
        Self::new([3, 4, 6, 3], num_classes, device)
    }
}

impl<B: Backend> ResNet<B, Bottleneck<B>> {
    /// ResNet-50.
    pub fn resnet50(num_classes: usize, device: &Device<B>) -> Self {
        Self::new([3, 4, 6, 3], num_classes, device)
    }

    /// ResNet-101.
    pub fn resnet101(num_classes: usize, device: &Device<B>) -> Self {
        Self::new([3, 4, 23, 3], num_classes, device)
    }

    /// ResNet-152.
    pub fn resnet152(num_classes: usize, device: &Device<B>) -> Self {
        Self::new([3, 8, 36, 3], num_classes, device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BlockKind;
    use burn::backend::NdArray;

    type B = NdArray;

    #[test]
    fn stage_block_counts_follow_the_descriptor() {
        let device = Default::default();
        let descriptor = ArchitectureDescriptor::new(BlockKind::Bottleneck, [3, 4, 6, 3], 10);
        let net = ResNet::<B, Bottleneck<B>>::from_descriptor(&descriptor, &device).unwrap();

        let counts: Vec<usize> = net.stages().iter().map(|s| s.num_blocks()).collect();
        assert_eq!(counts, vec![3, 4, 6, 3]);
    }

    #[test]
    fn resnet18_head_maps_512_features() {
        let device = Default::default();
        let net = ResNet::<B, BasicBlock<B>>::resnet18(1000, &device);

        let counts: Vec<usize> = net.stages().iter().map(|s| s.num_blocks()).collect();
        assert_eq!(counts, vec![2, 2, 2, 2]);
        assert_eq!(net.num_features(), 512);
        assert_eq!(net.fc.weight.dims(), [512, 1000]);
    }

    #[test]
    fn resnet50_head_maps_2048_features() {
        let device = Default::default();
        let net = ResNet::<B, Bottleneck<B>>::resnet50(1000, &device);
        assert_eq!(net.num_features(), 2048);
        assert_eq!(net.fc.weight.dims(), [2048, 1000]);
    }

    #[test]
    fn basic_projections_sit_on_widening_stages_only() {
        let device = Default::default();
        let net = ResNet::<B, BasicBlock<B>>::resnet18(10, &device);

        for (index, stage) in net.stages().iter().enumerate() {
            for (position, block) in stage.blocks().iter().enumerate() {
                // Stage 1 starts at the stem's 64 channels with stride 1,
                // so even its first block keeps the bare identity. Stages
                // 2-4 stride and widen, so their first block projects.
                let expected = position == 0 && index > 0;
                assert_eq!(block.has_projection(), expected);
            }
        }
    }

    #[test]
    fn bottleneck_projections_sit_on_every_first_block() {
        let device = Default::default();
        let net = ResNet::<B, Bottleneck<B>>::resnet50(10, &device);

        for stage in net.stages() {
            for (position, block) in stage.blocks().iter().enumerate() {
                // 64 != 64 * 4: stage 1's first block must project despite
                // stride 1.
                assert_eq!(block.has_projection(), position == 0);
            }
        }
    }

    #[test]
    fn forward_produces_class_scores_for_both_variants() {
        let device = Default::default();
        let input = Tensor::<B, 4>::ones([2, 3, 64, 64], &device);

        let net = ResNet::<B, BasicBlock<B>>::resnet18(10, &device);
        assert_eq!(net.forward(input.clone()).dims(), [2, 10]);

        let net = ResNet::<B, Bottleneck<B>>::resnet50(10, &device);
        assert_eq!(net.forward(input).dims(), [2, 10]);
    }

    #[test]
    fn forward_is_idempotent() {
        let device = Default::default();
        let net = ResNet::<B, BasicBlock<B>>::resnet18(10, &device);
        let input = Tensor::<B, 4>::ones([1, 3, 64, 64], &device);

        let first = net.forward(input.clone()).into_data();
        let second = net.forward(input).into_data();
        assert_eq!(first, second);
    }

    #[test]
    fn mismatched_block_kind_is_rejected() {
        let device = Default::default();
        let descriptor = ArchitectureDescriptor::resnet50(10);
        let err = ResNet::<B, BasicBlock<B>>::from_descriptor(&descriptor, &device).unwrap_err();
        assert!(matches!(err, ResNetError::BlockKindMismatch { .. }));
    }

    #[test]
    fn empty_stage_descriptor_is_rejected() {
        let device = Default::default();
        let descriptor = ArchitectureDescriptor::new(BlockKind::Basic, [2, 2, 0, 2], 10);
        let err = ResNet::<B, BasicBlock<B>>::from_descriptor(&descriptor, &device).unwrap_err();
        assert!(matches!(err, ResNetError::EmptyStage { stage: 3 }));
    }

    #[test]
    fn checkpoint_with_mismatched_head_is_refused() {
        let device = Default::default();
        let donor = ResNet::<B, BasicBlock<B>>::resnet18(1000, &device).into_record();
        let net = ResNet::<B, BasicBlock<B>>::resnet18(10, &device);

        let err = net.load_checkpoint(donor).unwrap_err();
        assert!(matches!(err, ResNetError::ShapeMismatch(_)));
    }

    #[test]
    fn checkpoint_with_mismatched_depth_is_refused() {
        let device = Default::default();
        // Same block kind and head width as resnet18, different repeats.
        let donor = ResNet::<B, BasicBlock<B>>::resnet34(10, &device).into_record();
        let net = ResNet::<B, BasicBlock<B>>::resnet18(10, &device);

        let err = net.load_checkpoint(donor).unwrap_err();
        assert!(matches!(err, ResNetError::ShapeMismatch(_)));
    }

    #[test]
    fn checkpoint_with_matching_shapes_is_applied() {
        let device = Default::default();
        let donor = ResNet::<B, BasicBlock<B>>::resnet18(10, &device);
        let input = Tensor::<B, 4>::ones([1, 3, 64, 64], &device);
        let donor_scores = donor.forward(input.clone()).into_data();

        let net = ResNet::<B, BasicBlock<B>>::resnet18(10, &device)
            .load_checkpoint(donor.into_record())
            .unwrap();
        // The receiving network now computes the donor's function.
        assert_eq!(net.forward(input).into_data(), donor_scores);
    }

    #[test]
    fn with_classes_swaps_only_the_head() {
        let device = Default::default();
        let net = ResNet::<B, BasicBlock<B>>::resnet18(1000, &device).with_classes(7);
        assert_eq!(net.fc.weight.dims(), [512, 7]);

        let input = Tensor::<B, 4>::ones([1, 3, 64, 64], &device);
        assert_eq!(net.forward(input).dims(), [1, 7]);
    }
}
