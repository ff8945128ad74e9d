// Shared helpers for the model unit tests.

use burn::prelude::*;

use crate::ml::config::{BertConfig, NormPlacement};

pub type TestBackend = burn::backend::NdArray;
pub type TestAutodiffBackend = burn::backend::Autodiff<TestBackend>;

/// 1 layer, 2 heads, hidden 4: the smallest model that exercises every path.
pub fn tiny_config(norm_placement: NormPlacement) -> BertConfig {
    BertConfig::new(16)
        .with_hidden_size(4)
        .with_num_heads(2)
        .with_num_layers(1)
        .with_feed_forward_size(8)
        .with_max_position_count(8)
        .with_type_vocab_size(2)
        .with_dropout_rate(0.0)
        .with_attention_dropout_rate(0.0)
        .with_norm_placement(norm_placement)
        // Larger than BERT's 0.02 so tiny-model gradients stay well above f32 noise.
        .with_initializer_range(0.5)
}

pub fn to_vec<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Vec<f32> {
    tensor.into_data().convert::<f32>().to_vec::<f32>().unwrap()
}

pub fn assert_close(actual: &[f32], expected: &[f32], tol: f32) {
    assert_eq!(actual.len(), expected.len(), "length mismatch");
    for (i, (a, e)) in actual.iter().zip(expected).enumerate() {
        assert!((a - e).abs() <= tol, "index {i}: {a} vs {e} (tol {tol})");
    }
}

pub fn ids<B: Backend>(rows: &[&[i32]], device: &B::Device) -> Tensor<B, 2, Int> {
    let width = rows[0].len();
    let flat: Vec<i32> = rows.iter().flat_map(|r| r.iter().copied()).collect();
    Tensor::<B, 1, Int>::from_ints(flat.as_slice(), device).reshape([rows.len(), width])
}
