// ============================================================
// Layer 4: JSONL Example Loader
// ============================================================
// Reads pre-tokenised pretraining examples, one JSON object per
// line:
//
//   {"input_ids": [101, 2023, 102], "segment_ids": [0, 0, 0], "next_sentence_label": 0}
//
// `segment_ids` and `next_sentence_label` may be omitted.
// Blank lines are skipped; a malformed line fails the whole load
// with its line number, since silently dropping rows would
// shift every later example.

use anyhow::{Context, Result};
use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::PathBuf,
};

use crate::domain::example::PretrainExample;
use crate::domain::traits::ExampleSource;

/// Loads `PretrainExample`s from a `.jsonl` file.
pub struct JsonlLoader {
    path: PathBuf,
}

impl JsonlLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ExampleSource for JsonlLoader {
    fn load_all(&self) -> Result<Vec<PretrainExample>> {
        let file = File::open(&self.path)
            .with_context(|| format!("Cannot open example file '{}'", self.path.display()))?;

        let mut examples = Vec::new();
        for (index, line) in BufReader::new(file).lines().enumerate() {
            let line = line.with_context(|| {
                format!("Cannot read line {} of '{}'", index + 1, self.path.display())
            })?;
            if line.trim().is_empty() {
                continue;
            }
            let example: PretrainExample = serde_json::from_str(&line).with_context(|| {
                format!("Malformed example on line {} of '{}'", index + 1, self.path.display())
            })?;
            examples.push(example);
        }

        tracing::info!("Loaded {} examples from '{}'", examples.len(), self.path.display());
        Ok(examples)
    }
}
