// ============================================================
// Layer 3: Core Traits (Abstractions)
// ============================================================
// The application layer loads examples through this trait so
// the storage format (JSONL today) stays swappable.

use anyhow::Result;
use crate::domain::example::PretrainExample;

// ─── ExampleSource ────────────────────────────────────────────────────────────
/// Any component that can produce pre-tokenised pretraining examples.
///
/// Implementations:
///   - JsonlLoader → one JSON object per line
pub trait ExampleSource {
    /// Load every available example from this source.
    fn load_all(&self) -> Result<Vec<PretrainExample>>;
}
