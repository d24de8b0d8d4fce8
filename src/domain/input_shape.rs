// ============================================================
// Layer 3 - Input Shape, Architecture and Backend
// ============================================================
// InputShape keeps the (height, width, channels) order used when
// describing images. The ML layer lays tensors out channels-first
// ([batch, channels, height, width]) because that is what the
// convolution modules expect.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Height, width and channel count of one model input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputShape {
    pub height: usize,
    pub width: usize,
    pub channels: usize,
}

impl InputShape {
    pub const fn new(height: usize, width: usize, channels: usize) -> Self {
        Self {
            height,
            width,
            channels,
        }
    }

    /// Number of scalars in one image.
    pub fn volume(&self) -> usize {
        self.height * self.width * self.channels
    }
}

/// 150x150 RGB, the resolution every image is resized to.
impl Default for InputShape {
    fn default() -> Self {
        Self::new(150, 150, 3)
    }
}

impl fmt::Display for InputShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.height, self.width, self.channels)
    }
}

/// Which of the two classifier variants to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Architecture {
    /// Two convolutions, two poolings and a small dense head
    #[default]
    Shallow,
    /// ResNet-50 backbone with a tapered dense head
    Transfer,
}

impl Architecture {
    /// Epochs to train when none are requested.
    pub fn default_epochs(self) -> usize {
        match self {
            Architecture::Shallow => 1,
            Architecture::Transfer => 5,
        }
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Architecture::Shallow => write!(f, "shallow"),
            Architecture::Transfer => write!(f, "transfer"),
        }
    }
}

/// Which burn backend runs the tensors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComputeBackend {
    /// GPU through wgpu
    #[default]
    Wgpu,
    /// CPU through ndarray
    NdArray,
}

impl fmt::Display for ComputeBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComputeBackend::Wgpu => write!(f, "wgpu"),
            ComputeBackend::NdArray => write!(f, "ndarray"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_shape() {
        let s = InputShape::default();
        assert_eq!((s.height, s.width, s.channels), (150, 150, 3));
        assert_eq!(s.volume(), 67_500);
        assert_eq!(s.to_string(), "(150, 150, 3)");
    }

    #[test]
    fn test_default_epochs_per_architecture() {
        assert_eq!(Architecture::Shallow.default_epochs(), 1);
        assert_eq!(Architecture::Transfer.default_epochs(), 5);
    }

    #[test]
    fn test_architecture_serialises_snake_case() {
        let json = serde_json::to_string(&Architecture::Transfer).unwrap();
        assert_eq!(json, "\"transfer\"");
    }
}
