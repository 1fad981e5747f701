// ============================================================
// Layer 4 - Data Pipeline
// ============================================================
// From an image folder on disk to device-resident tensor batches:
//
//   root/{train,val}/<class>/*.jpg
//       │
//       ▼
//   ImageFolder         → sorted class list, labelled file paths
//       │
//       ▼
//   preprocess          → resize, center crop, CHW floats
//       │
//       ▼
//   ImageFolderDataset  → implements Burn's Dataset trait
//       │
//       ▼
//   ImageBatcher        → stacks items, ImageNet normalisation
//       │
//       ▼
//   PhaseLoader         → BatchSource the training loop iterates

/// Scans class directories for labelled images
pub mod folder;

/// Decoding, resizing and cropping of single images
pub mod preprocess;

/// Implements Burn's Dataset trait over an image folder
pub mod dataset;

/// Implements Burn's Batcher trait to create tensor batches
pub mod batcher;

/// The BatchSource seam the training loop consumes
pub mod source;

/// Per-phase loaders and the get_loader entry point
pub mod loader;
