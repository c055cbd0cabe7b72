//! Pretrained ImageNet checkpoints for the named architectures.
//!
//! The metadata (URLs, classifier width) is always available; actually
//! fetching and decoding a checkpoint needs the `pretrained` feature,
//! which pulls in the HTTP client and the torch-format recorder.

use serde::{Deserialize, Serialize};

/// Where a checkpoint lives and what head it was trained with.
#[derive(Debug, Clone, Copy)]
pub struct WeightsSource {
    pub url: &'static str,
    pub num_classes: usize,
}

/// Maps a named weights selection to its source.
pub trait PretrainedWeights {
    fn source(&self) -> WeightsSource;
}

macro_rules! torchvision_weights {
    ($(#[$doc:meta])* $name:ident, $url:literal) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, Serialize, Deserialize)]
        pub enum $name {
            /// Original torchvision ImageNet-1k training run.
            ImageNet1k,
        }

        impl PretrainedWeights for $name {
            fn source(&self) -> WeightsSource {
                WeightsSource {
                    url: $url,
                    num_classes: 1000,
                }
            }
        }
    };
}

torchvision_weights!(
    /// ResNet-18 checkpoints.
    ResNet18Weights,
    "https://download.pytorch.org/models/resnet18-5c106cde.pth"
);
torchvision_weights!(
    /// ResNet-34 checkpoints.
    ResNet34Weights,
    "https://download.pytorch.org/models/resnet34-333f7ec4.pth"
);
torchvision_weights!(
    /// ResNet-50 checkpoints.
    ResNet50Weights,
    "https://download.pytorch.org/models/resnet50-19c8e357.pth"
);
torchvision_weights!(
    /// ResNet-101 checkpoints.
    ResNet101Weights,
    "https://download.pytorch.org/models/resnet101-5d3b4d8f.pth"
);
torchvision_weights!(
    /// ResNet-152 checkpoints.
    ResNet152Weights,
    "https://download.pytorch.org/models/resnet152-b121ed2d.pth"
);

#[cfg(feature = "pretrained")]
mod fetch {
    use std::{fs, io, path::PathBuf};

    use crate::error::ResNetError;

    fn fetch_error(url: &str, source: impl std::error::Error + Send + Sync + 'static) -> ResNetError {
        ResNetError::Fetch {
            url: url.to_owned(),
            source: Box::new(source),
        }
    }

    /// Downloads `url` into the user cache directory, reusing an earlier
    /// download when present. Returns the local path.
    pub(super) fn download(url: &str) -> Result<PathBuf, ResNetError> {
        let cache = dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("resnet-model");
        fs::create_dir_all(&cache).map_err(|e| fetch_error(url, e))?;

        let file_name = url.rsplit('/').next().unwrap_or("checkpoint.pth");
        let path = cache.join(file_name);
        if path.exists() {
            log::debug!("using cached checkpoint {}", path.display());
            return Ok(path);
        }

        log::info!("downloading {url}");
        let mut response = reqwest::blocking::get(url)
            .and_then(reqwest::blocking::Response::error_for_status)
            .map_err(|e| fetch_error(url, e))?;

        // Write through a temp name so an interrupted download never
        // poses as a valid cache entry.
        let partial = path.with_extension("partial");
        let mut file = fs::File::create(&partial).map_err(|e| fetch_error(url, e))?;
        io::copy(&mut response, &mut file).map_err(|e| fetch_error(url, e))?;
        fs::rename(&partial, &path).map_err(|e| fetch_error(url, e))?;

        log::info!("checkpoint stored at {}", path.display());
        Ok(path)
    }
}

#[cfg(feature = "pretrained")]
mod load {
    use burn::{
        record::{FullPrecisionSettings, Recorder},
        tensor::{backend::Backend, Device},
    };
    use burn_import::pytorch::{LoadArgs, PyTorchFileRecorder};

    use super::{fetch, PretrainedWeights, WeightsSource};
    use crate::{
        block::{BasicBlock, Bottleneck, ResidualBlock},
        error::ResNetError,
        resnet::{ResNet, ResNetRecord},
    };

    /// Fetches and decodes a torchvision checkpoint into a record with
    /// this crate's module layout.
    fn load_record<B: Backend, M: ResidualBlock<B>>(
        source: &WeightsSource,
        device: &Device<B>,
    ) -> Result<ResNetRecord<B, M>, ResNetError> {
        let path = fetch::download(source.url)?;

        // torchvision names stage blocks `layerN.i` and the projection
        // pair `downsample.0` / `downsample.1`.
        let args = LoadArgs::new(path)
            .with_key_remap("layer([1-4])\\.([0-9]+)", "layer$1.blocks.$2")
            .with_key_remap("downsample\\.0", "downsample.conv")
            .with_key_remap("downsample\\.1", "downsample.bn");

        PyTorchFileRecorder::<FullPrecisionSettings>::new()
            .load(args, device)
            .map_err(|e| ResNetError::ShapeMismatch(e.to_string()))
    }

    impl<B: Backend> ResNet<B, BasicBlock<B>> {
        /// ResNet-18 with pretrained parameters.
        pub fn resnet18_pretrained(
            weights: super::ResNet18Weights,
            device: &Device<B>,
        ) -> Result<Self, ResNetError> {
            let source = weights.source();
            let record = load_record(&source, device)?;
            Self::resnet18(source.num_classes, device).load_checkpoint(record)
        }

        /// ResNet-34 with pretrained parameters.
        pub fn resnet34_pretrained(
            weights: super::ResNet34Weights,
            device: &Device<B>,
        ) -> Result<Self, ResNetError> {
            let source = weights.source();
            let record = load_record(&source, device)?;
            Self::resnet34(source.num_classes, device).load_checkpoint(record)
        }
    }

    impl<B: Backend> ResNet<B, Bottleneck<B>> {
        /// ResNet-50 with pretrained parameters.
        pub fn resnet50_pretrained(
            weights: super::ResNet50Weights,
            device: &Device<B>,
        ) -> Result<Self, ResNetError> {
            let source = weights.source();
            let record = load_record(&source, device)?;
            Self::resnet50(source.num_classes, device).load_checkpoint(record)
        }

        /// ResNet-101 with pretrained parameters.
        pub fn resnet101_pretrained(
            weights: super::ResNet101Weights,
            device: &Device<B>,
        ) -> Result<Self, ResNetError> {
            let source = weights.source();
            let record = load_record(&source, device)?;
            Self::resnet101(source.num_classes, device).load_checkpoint(record)
        }

        /// ResNet-152 with pretrained parameters.
        pub fn resnet152_pretrained(
            weights: super::ResNet152Weights,
            device: &Device<B>,
        ) -> Result<Self, ResNetError> {
            let source = weights.source();
            let record = load_record(&source, device)?;
            Self::resnet152(source.num_classes, device).load_checkpoint(record)
        }
    }
}
