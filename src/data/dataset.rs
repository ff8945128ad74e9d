use burn::data::dataset::Dataset;

use crate::domain::example::MaskedExample;

/// In-memory set of masked examples, ready for Burn's DataLoader.
pub struct PretrainDataset {
    examples: Vec<MaskedExample>,
}

impl PretrainDataset {
    pub fn new(examples: Vec<MaskedExample>) -> Self { Self { examples } }

    pub fn prediction_count(&self) -> usize {
        self.examples.iter().map(MaskedExample::num_predictions).sum()
    }
}

impl Dataset<MaskedExample> for PretrainDataset {
    fn get(&self, index: usize) -> Option<MaskedExample> {
        self.examples.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.examples.len()
    }
}
