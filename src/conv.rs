use core::f64::consts::SQRT_2;

use burn::nn::{conv::Conv2dConfig, Initializer, PaddingConfig2d};

/// Conv weights follow the fan-out variance-scaling scheme with the relu
/// gain, matching the reference torchvision initialization.
pub(crate) fn conv_initializer() -> Initializer {
    Initializer::KaimingNormal {
        gain: SQRT_2,
        fan_out_only: true,
    }
}

/// 3x3 convolution with padding 1.
///
/// No bias: every convolution here is followed by a batch norm, which
/// carries its own learned shift.
pub fn conv3x3(in_channels: usize, out_channels: usize, stride: usize) -> Conv2dConfig {
    Conv2dConfig::new([in_channels, out_channels], [3, 3])
        .with_stride([stride, stride])
        .with_padding(PaddingConfig2d::Explicit(1, 1))
        .with_bias(false)
        .with_initializer(conv_initializer())
}

/// 1x1 convolution, used to move between channel widths (bottleneck
/// reduce/expand) and for the projection shortcut.
pub fn conv1x1(in_channels: usize, out_channels: usize, stride: usize) -> Conv2dConfig {
    Conv2dConfig::new([in_channels, out_channels], [1, 1])
        .with_stride([stride, stride])
        .with_bias(false)
        .with_initializer(conv_initializer())
}
