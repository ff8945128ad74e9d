// ============================================================
// Layer 4: Data Pipeline
// ============================================================
// From a pre-tokenised JSONL file to padded tensor batches:
//
//   examples.jsonl
//       │
//       ▼
//   JsonlLoader       → PretrainExample per line
//       │
//       ▼
//   Preprocessor      → drops invalid rows, truncates to max length
//       │
//       ▼
//   split_train_val   → seeded train / validation split
//       │
//       ▼
//   Masker            → 80/10/10 corruption, prediction targets
//       │
//       ▼
//   PretrainDataset   → implements Burn's Dataset trait
//       │
//       ▼
//   PretrainBatcher   → pads and stacks into PretrainBatch
//       │
//       ▼
//   DataLoader        → feeds batches to the training loop
//
// Reference: Burn Book §4 (Datasets and Dataloaders)

/// Reads pre-tokenised examples from JSONL
pub mod loader;

/// Validates and truncates examples
pub mod preprocessor;

/// BERT masked-LM corruption
pub mod masking;

/// Implements Burn's Dataset trait for masked examples
pub mod dataset;

/// Implements Burn's Batcher trait with per-batch padding
pub mod batcher;

/// Shuffles and splits data into train/validation sets
pub mod splitter;
