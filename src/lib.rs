//! ResNet image classifiers on [burn](https://burn.dev).
//!
//! Presets cover ResNet-18/34/50/101/152; the `pretrained` feature adds
//! the torchvision ImageNet checkpoints.
//!
//! ```no_run
//! use burn::backend::NdArray;
//! use burn::tensor::Tensor;
//! use resnet_model::{BasicBlock, ResNet};
//!
//! let device = Default::default();
//! let model = ResNet::<NdArray, BasicBlock<NdArray>>::resnet18(1000, &device);
//! let images = Tensor::<NdArray, 4>::zeros([1, 3, 224, 224], &device);
//! let scores = model.forward(images); // [1, 1000]
//! ```

pub mod block;
pub mod config;
pub mod conv;
pub mod error;
pub mod resnet;
pub mod weights;

pub use block::{BasicBlock, Bottleneck, LayerBlock, ResidualBlock};
pub use config::{ArchitectureDescriptor, BlockKind};
pub use error::ResNetError;
pub use resnet::ResNet;
