/// Train/inference switch passed explicitly to every forward call.
///
/// Dropout only fires in [`Mode::Train`]; [`Mode::Eval`] forward passes
/// are deterministic on every backend, autodiff included.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    Train,
    #[default]
    Eval,
}

impl Mode {
    pub fn is_train(self) -> bool {
        matches!(self, Mode::Train)
    }
}
