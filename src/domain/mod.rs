// ============================================================
// Layer 3: Domain Layer
// ============================================================
// Plain Rust types shared by every other layer:
//   - no tensor types
//   - no file I/O
//
// Reference: Rust Book §5 (Structs), §10 (Traits)

/// Typed errors raised by the encoder core
pub mod error;

/// Pre-tokenised and masked pretraining examples
pub mod example;

/// Abstractions implemented by the data layer
pub mod traits;
