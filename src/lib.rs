#![recursion_limit = "256"]

//! A BERT encoder with masked-LM and next-sentence pretraining, built on Burn.
//!
//! Layers, outermost first:
//!
//! - [`cli`]: argument parsing and printing
//! - [`application`]: pretraining / evaluation workflows
//! - [`data`]: JSONL loading, masking, batching
//! - [`ml`]: the model, losses, trainer and evaluator
//! - [`infra`]: checkpoints and metrics files
//! - [`domain`]: plain example and error types

pub mod application;
pub mod cli;
pub mod data;
pub mod domain;
pub mod infra;
pub mod ml;
