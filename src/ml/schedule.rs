// ============================================================
// Layer 5: Learning-Rate Schedule
// ============================================================
// BERT's schedule: linear warmup from 0 to `peak_lr`, then
// linear decay back to 0 at `total_steps`.
//
//   lr
//    │    /\
//    │   /  \
//    │  /    \
//    │ /      \
//    └─────────────── step
//      warmup  total
//
// Steps are 0-based; the first step already gets a non-zero lr.

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearWarmupDecay {
    peak_lr:      f64,
    warmup_steps: usize,
    total_steps:  usize,
}

impl LinearWarmupDecay {
    pub fn new(peak_lr: f64, warmup_steps: usize, total_steps: usize) -> Self {
        Self {
            peak_lr,
            warmup_steps: warmup_steps.min(total_steps),
            total_steps,
        }
    }

    pub fn lr_at(&self, step: usize) -> f64 {
        if step < self.warmup_steps {
            return self.peak_lr * (step + 1) as f64 / self.warmup_steps as f64;
        }
        if step >= self.total_steps {
            return 0.0;
        }
        let decay_steps = (self.total_steps - self.warmup_steps) as f64;
        let remaining   = (self.total_steps - step) as f64;
        self.peak_lr * remaining / decay_steps
    }
}
