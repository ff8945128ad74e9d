// ============================================================
// Layer 6: Infrastructure Layer
// ============================================================
// File-system concerns shared by the training and evaluation
// workflows:
//
//   checkpoint.rs - model weights (named MessagePack records,
//                   full precision) plus the JSON configs needed
//                   to rebuild the model before loading them
//
//   metrics.rs    - per-epoch CSV log of loss and accuracy
//
// Reference: Burn Book §5 (Checkpointing)

/// Model checkpoint saving and loading
pub mod checkpoint;

/// Training metrics CSV logger
pub mod metrics;
