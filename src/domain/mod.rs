// ============================================================
// Layer 3 - Domain Layer
// ============================================================
// Plain Rust types that describe a fine-tuning run.
//
// Rules for this layer:
//   - NO Burn framework types allowed here
//   - NO file I/O
//   - Only structs, enums, and traits
//
// Everything here is testable without a GPU.

// Train / validate phases and per-epoch metrics
pub mod phase;

// Best validation-accuracy snapshot
pub mod best_state;

// Closed enums for the architecture and optimizer flags
pub mod architecture;

// Seams the training loop talks to
pub mod traits;
