// ============================================================
// Layer 2 - Application / Use Cases
// ============================================================
// Orchestrates the other layers to accomplish one goal:
// fine-tune a classifier, or classify one image with it.
//
// No tensor math and no printing of results here; the CLI
// layer decides how a summary or prediction is shown.

// The fine-tuning workflow
pub mod train_use_case;

// The single-image prediction workflow
pub mod predict_use_case;
