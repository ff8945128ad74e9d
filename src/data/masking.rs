// ============================================================
// Layer 4: Masked-LM Corruption
// ============================================================
// Chooses which tokens the model must reconstruct, BERT style:
//
//   1. Candidates = every non-special position
//   2. Pick round(candidates × mask_prob) of them (at least 1,
//      at most max_predictions), uniformly at random
//   3. For each pick:
//        80% → replace with [MASK]
//        10% → replace with a random vocabulary id
//        10% → keep the original token
//   4. Record (position, original id) as the training target
//
// Masking is static: done once per example with a seeded RNG,
// so a run is reproducible from its seed.
//
// Reference: Devlin et al. (2019) BERT, §3.1 Task #1

use rand::{rngs::StdRng, seq::SliceRandom, Rng, SeedableRng};

use crate::domain::error::{BertError, Result};
use crate::domain::example::{special, MaskedExample, PretrainExample};

#[derive(Debug, Clone, PartialEq)]
pub struct MaskingConfig {
    pub vocab_size:      usize,
    pub mask_prob:       f64,
    pub max_predictions: usize,
    pub seed:            u64,
}

impl MaskingConfig {
    pub fn new(vocab_size: usize) -> Self {
        Self { vocab_size, mask_prob: 0.15, max_predictions: 20, seed: 42 }
    }

    pub fn with_mask_prob(mut self, mask_prob: f64) -> Self {
        self.mask_prob = mask_prob;
        self
    }

    pub fn with_max_predictions(mut self, max_predictions: usize) -> Self {
        self.max_predictions = max_predictions;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// [MASK] is written into the inputs, so the vocabulary must contain it.
    pub fn validate(&self) -> Result<()> {
        if self.vocab_size <= special::MASK as usize {
            return Err(BertError::InvalidConfig(format!(
                "vocab_size {} does not contain the [MASK] id {}",
                self.vocab_size,
                special::MASK
            )));
        }
        if !(0.0..=1.0).contains(&self.mask_prob) {
            return Err(BertError::InvalidConfig(format!(
                "mask_prob must lie in [0, 1], got {}",
                self.mask_prob
            )));
        }
        Ok(())
    }
}

pub struct Masker {
    cfg: MaskingConfig,
    rng: StdRng,
}

impl Masker {
    pub fn new(cfg: MaskingConfig) -> Result<Self> {
        cfg.validate()?;
        let rng = StdRng::seed_from_u64(cfg.seed);
        Ok(Self { cfg, rng })
    }

    pub fn mask(&mut self, example: &PretrainExample) -> MaskedExample {
        let mut input_ids = example.input_ids.clone();

        let mut candidates: Vec<usize> = input_ids
            .iter()
            .enumerate()
            .filter(|(_, &id)| !special::is_special(id))
            .map(|(i, _)| i)
            .collect();

        let to_predict = if candidates.is_empty() {
            0
        } else {
            let wanted = (candidates.len() as f64 * self.cfg.mask_prob).round() as usize;
            wanted.max(1).min(self.cfg.max_predictions)
        };

        candidates.shuffle(&mut self.rng);
        let mut positions: Vec<usize> = candidates.into_iter().take(to_predict).collect();
        positions.sort_unstable();

        let mut labels = Vec::with_capacity(positions.len());
        for &pos in &positions {
            labels.push(input_ids[pos]);
            let roll: f64 = self.rng.gen();
            if roll < 0.8 {
                input_ids[pos] = special::MASK;
            } else if roll < 0.9 {
                input_ids[pos] = self.rng.gen_range(0..self.cfg.vocab_size) as u32;
            }
        }

        let segment_ids = (0..input_ids.len()).map(|i| example.segment_at(i)).collect();
        MaskedExample {
            input_ids,
            segment_ids,
            next_sentence_label: example.next_sentence_label,
            masked_positions: positions,
            masked_labels: labels,
        }
    }

    pub fn mask_all(&mut self, examples: &[PretrainExample]) -> Vec<MaskedExample> {
        let masked: Vec<_> = examples.iter().map(|ex| self.mask(ex)).collect();
        let predictions: usize = masked.iter().map(MaskedExample::num_predictions).sum();
        tracing::debug!("Masked {} examples, {} prediction targets", masked.len(), predictions);
        masked
    }
}
