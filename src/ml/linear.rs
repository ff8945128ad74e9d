use burn::{
    nn::{Initializer, Linear, LinearConfig},
    prelude::*,
};

use crate::ml::config::BertConfig;

/// Dense layer with BERT initialisation: normal(0, initializer_range)
/// weights, zero bias.
pub fn bert_linear<B: Backend>(cfg: &BertConfig, d_input: usize, d_output: usize, device: &B::Device) -> Linear<B> {
    let mut linear = LinearConfig::new(d_input, d_output)
        .with_initializer(cfg.weight_initializer())
        .init(device);
    linear.bias = Some(Initializer::Zeros.init([d_output], device));
    linear
}
