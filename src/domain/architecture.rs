// ============================================================
// Layer 3 - Architecture and Optimizer Choices
// ============================================================
// The two free-form CLI strings (--architecture, --optimizer)
// are resolved here into closed enums. Everything downstream
// matches on the enum, never on the raw string.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Highest EfficientNet compound-scaling level supported (B7)
pub const MAX_EFFICIENTNET_LEVEL: u8 = 7;

// EfficientNet native input resolution per level B0..B7
const EFFICIENTNET_RESOLUTION: [usize; 8] = [224, 240, 260, 300, 380, 456, 528, 600];

/// Supported classifier backbones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Architecture {
    /// ResNet-50 with a replaced final linear layer
    ResNet50,
    /// EfficientNet-B{level} re-headed for the target class count
    EfficientNet { level: u8 },
}

impl Architecture {
    /// Resolve the `--architecture` / `--efftlevel` flag pair.
    ///
    /// Only an efficient-net name selects EfficientNet; every other
    /// value (including the historical default `resent`) is ResNet-50.
    pub fn from_flag(name: &str, efft_level: u8) -> Result<Self> {
        let lowered = name.trim().to_ascii_lowercase();

        if let Some(rest) = lowered.strip_prefix("efficientnet") {
            // Accept "efficientnet", "efficientNet" and "efficientnet-b3"
            let level = match rest.trim_start_matches('-').strip_prefix('b') {
                Some(digits) if !digits.is_empty() => digits.parse::<u8>()?,
                _ => efft_level,
            };
            if level > MAX_EFFICIENTNET_LEVEL {
                bail!("EfficientNet level must be 0..={MAX_EFFICIENTNET_LEVEL}, got {level}");
            }
            return Ok(Self::EfficientNet { level });
        }

        if !matches!(lowered.as_str(), "resnet" | "resnet50" | "resnet-50" | "resent") {
            tracing::warn!("Unknown architecture '{}', falling back to ResNet-50", name);
        }
        Ok(Self::ResNet50)
    }

    /// Square input resolution the backbone expects
    pub fn input_size(&self) -> usize {
        match self {
            Self::ResNet50                => 224,
            Self::EfficientNet { level }  => EFFICIENTNET_RESOLUTION[*level as usize],
        }
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ResNet50               => write!(f, "resnet50"),
            Self::EfficientNet { level } => write!(f, "efficientnet-b{level}"),
        }
    }
}

// ─── OptimizerKind ────────────────────────────────────────────────────────────
/// Parameter update rule used for fine-tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptimizerKind {
    /// Adaptive per-parameter learning rates
    Adam,
    /// Stochastic gradient descent with momentum
    Sgd,
}

impl OptimizerKind {
    /// Learning rate shared by both rules
    pub const LEARNING_RATE: f64 = 1e-3;
    /// Momentum used by the SGD rule
    pub const SGD_MOMENTUM: f64 = 0.9;

    /// Exactly "Adam" selects Adam; any other value falls back to SGD.
    pub fn from_flag(name: &str) -> Self {
        if name == "Adam" {
            Self::Adam
        } else {
            Self::Sgd
        }
    }
}

impl fmt::Display for OptimizerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Adam => write!(f, "Adam"),
            Self::Sgd  => write!(f, "SGD"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn efficientnet_flag_uses_level() {
        let a = Architecture::from_flag("efficientNet", 3).unwrap();
        assert_eq!(a, Architecture::EfficientNet { level: 3 });
        assert_eq!(a.input_size(), 300);
        assert_eq!(a.to_string(), "efficientnet-b3");
    }

    #[test]
    fn efficientnet_name_with_level_suffix() {
        let a = Architecture::from_flag("efficientnet-b1", 0).unwrap();
        assert_eq!(a, Architecture::EfficientNet { level: 1 });
    }

    #[test]
    fn level_out_of_range_is_rejected() {
        assert!(Architecture::from_flag("efficientNet", 8).is_err());
    }

    #[test]
    fn anything_else_is_resnet() {
        for name in ["resent", "resnet", "", "vgg"] {
            assert_eq!(Architecture::from_flag(name, 5).unwrap(), Architecture::ResNet50);
        }
        assert_eq!(Architecture::ResNet50.input_size(), 224);
    }

    #[test]
    fn only_exact_adam_selects_adam() {
        assert_eq!(OptimizerKind::from_flag("Adam"), OptimizerKind::Adam);
        assert_eq!(OptimizerKind::from_flag("SGD"), OptimizerKind::Sgd);
        assert_eq!(OptimizerKind::from_flag("adam"), OptimizerKind::Sgd);
        assert_eq!(OptimizerKind::from_flag(""), OptimizerKind::Sgd);
    }

    #[test]
    fn optimizer_hyperparameters() {
        assert_eq!(OptimizerKind::LEARNING_RATE, 1e-3);
        assert_eq!(OptimizerKind::SGD_MOMENTUM, 0.9);
    }
}
