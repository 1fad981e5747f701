// ============================================================
// Layer 6 - Infrastructure Layer
// ============================================================
// Durable outputs of a run:
//
//   checkpoint.rs - best (model, optimizer) record and the run
//                   config prediction rebuilds the model from
//
//   metrics.rs    - CSV-backed MetricsSink for the per-epoch
//                   loss / accuracy series

/// Checkpoint and run config persistence
pub mod checkpoint;

/// Scalar metrics CSV writer
pub mod metrics;
