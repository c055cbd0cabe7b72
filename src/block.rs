use core::marker::PhantomData;

use burn::{
    module::{Module, ModuleDisplay},
    nn::{conv::Conv2d, BatchNorm, BatchNormConfig, Relu},
    tensor::{backend::Backend, Device, Tensor},
};

use crate::{
    config::BlockKind,
    conv::{conv1x1, conv3x3},
};

/// One residual unit: transform the input, add the (possibly projected)
/// identity, then activate.
pub trait ResidualBlock<B: Backend>: Module<B> + ModuleDisplay {
    /// Which variant this is; fixes the expansion factor.
    const KIND: BlockKind;

    fn new(in_channels: usize, planes: usize, stride: usize, device: &Device<B>) -> Self;

    fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4>;

    /// Output width for a given base width, `planes * expansion`.
    fn out_channels(planes: usize) -> usize {
        planes * Self::KIND.expansion()
    }

    /// Whether this block carries a projection shortcut.
    fn has_projection(&self) -> bool;
}

/// Projection shortcut: a strided 1x1 convolution plus batch norm that
/// reshapes the identity to the main path's output so the element-wise
/// addition is well-formed.
#[derive(Module, Debug)]
pub struct Downsample<B: Backend> {
    conv: Conv2d<B>,
    bn: BatchNorm<B, 2>,
}

impl<B: Backend> Downsample<B> {
    /// Shortcut selector. A projection is needed exactly when the block
    /// changes the spatial size or the channel count; otherwise the
    /// identity passes through untouched.
    pub fn for_block(
        in_channels: usize,
        out_channels: usize,
        stride: usize,
        device: &Device<B>,
    ) -> Option<Self> {
        if stride != 1 || in_channels != out_channels {
            Some(Self {
                conv: conv1x1(in_channels, out_channels, stride).init(device),
                bn: BatchNormConfig::new(out_channels).init(device),
            })
        } else {
            None
        }
    }

    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let out = self.conv.forward(input);
        self.bn.forward(out)
    }
}

/// Two 3x3 convolutions; the block used by ResNet-18/34.
#[derive(Module, Debug)]
pub struct BasicBlock<B: Backend> {
    conv1: Conv2d<B>,
    bn1: BatchNorm<B, 2>,
    conv2: Conv2d<B>,
    bn2: BatchNorm<B, 2>,
    relu: Relu,
    downsample: Option<Downsample<B>>,
}

impl<B: Backend> ResidualBlock<B> for BasicBlock<B> {
    const KIND: BlockKind = BlockKind::Basic;

    fn new(in_channels: usize, planes: usize, stride: usize, device: &Device<B>) -> Self {
        let out_channels = Self::out_channels(planes);
        Self {
            conv1: conv3x3(in_channels, planes, stride).init(device),
            bn1: BatchNormConfig::new(planes).init(device),
            conv2: conv3x3(planes, planes, 1).init(device),
            bn2: BatchNormConfig::new(planes).init(device),
            relu: Relu::new(),
            downsample: Downsample::for_block(in_channels, out_channels, stride, device),
        }
    }

    fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let identity = input.clone();

        let out = self.conv1.forward(input);
        let out = self.bn1.forward(out);
        let out = self.relu.forward(out);
        let out = self.conv2.forward(out);
        let out = self.bn2.forward(out);

        let identity = match &self.downsample {
            Some(projection) => projection.forward(identity),
            None => identity,
        };

        // Activation goes after the addition; the residual sum itself is
        // kept linear.
        self.relu.forward(out + identity)
    }

    fn has_projection(&self) -> bool {
        self.downsample.is_some()
    }
}

/// 1x1 reduce, 3x3 spatial, 1x1 expand; the block used by ResNet-50+.
///
/// The reduce/expand pair keeps the expensive 3x3 convolution at the
/// narrow width while the block still emits `4 * planes` channels.
#[derive(Module, Debug)]
pub struct Bottleneck<B: Backend> {
    conv1: Conv2d<B>,
    bn1: BatchNorm<B, 2>,
    conv2: Conv2d<B>,
    bn2: BatchNorm<B, 2>,
    conv3: Conv2d<B>,
    bn3: BatchNorm<B, 2>,
    relu: Relu,
    downsample: Option<Downsample<B>>,
}

impl<B: Backend> ResidualBlock<B> for Bottleneck<B> {
    const KIND: BlockKind = BlockKind::Bottleneck;

    fn new(in_channels: usize, planes: usize, stride: usize, device: &Device<B>) -> Self {
        let out_channels = Self::out_channels(planes);
        Self {
            conv1: conv1x1(in_channels, planes, 1).init(device),
            bn1: BatchNormConfig::new(planes).init(device),
            conv2: conv3x3(planes, planes, stride).init(device),
            bn2: BatchNormConfig::new(planes).init(device),
            conv3: conv1x1(planes, out_channels, 1).init(device),
            bn3: BatchNormConfig::new(out_channels).init(device),
            relu: Relu::new(),
            downsample: Downsample::for_block(in_channels, out_channels, stride, device),
        }
    }

    fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let identity = input.clone();

        let out = self.conv1.forward(input);
        let out = self.bn1.forward(out);
        let out = self.relu.forward(out);
        let out = self.conv2.forward(out);
        let out = self.bn2.forward(out);
        let out = self.relu.forward(out);
        let out = self.conv3.forward(out);
        let out = self.bn3.forward(out);

        let identity = match &self.downsample {
            Some(projection) => projection.forward(identity),
            None => identity,
        };

        self.relu.forward(out + identity)
    }

    fn has_projection(&self) -> bool {
        self.downsample.is_some()
    }
}

/// One network stage: `num_blocks` residual blocks at a single base width.
#[derive(Module, Debug)]
pub struct LayerBlock<B: Backend, M> {
    blocks: Vec<M>,
    _backend: PhantomData<B>,
}

impl<B: Backend, M: ResidualBlock<B>> LayerBlock<B, M> {
    /// Builds a stage of `num_blocks` blocks at width `planes`.
    ///
    /// `channels` is the running input-width counter for the whole network
    /// build; it leaves here at the stage's output width.
    pub fn new(
        num_blocks: usize,
        channels: &mut usize,
        planes: usize,
        stride: usize,
        device: &Device<B>,
    ) -> Self {
        let mut blocks = Vec::with_capacity(num_blocks);

        blocks.push(M::new(*channels, planes, stride, device));
        *channels = M::out_channels(planes);

        for _ in 1..num_blocks {
            blocks.push(M::new(*channels, planes, 1, device));
        }

        Self {
            blocks,
            _backend: PhantomData,
        }
    }

    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        self.blocks
            .iter()
            .fold(input, |x, block| block.forward(x))
    }

    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    /// The stage's blocks, in execution order.
    pub fn blocks(&self) -> &[M] {
        &self.blocks
    }
}
