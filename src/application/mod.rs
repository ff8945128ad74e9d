// ============================================================
// Layer 2: Application / Use Cases
// ============================================================
// Orchestrates the other layers to accomplish one goal
// (pretraining, or using a trained checkpoint).
//
// Rules for this layer:
//   - No model math here
//   - No argument parsing or printing here (that's Layer 1)
//   - Only workflow coordination
//
// Reference: Clean Architecture pattern

/// The pretraining workflow
pub mod pretrain_use_case;

/// Evaluation and fill-mask on a saved checkpoint
pub mod evaluate_use_case;
