// Host-side range checks on integer inputs. Each call syncs the
// tensor back to the host once, so they run at model entry only.

use burn::prelude::*;

/// Smallest and largest id in a non-empty integer tensor.
pub(crate) fn int_bounds<B: Backend, const D: usize>(t: &Tensor<B, D, Int>) -> (i64, i64) {
    let min = t.clone().min().into_scalar().elem::<i64>();
    let max = t.clone().max().into_scalar().elem::<i64>();
    (min, max)
}

/// The offending id when any element falls outside `[0, upper)`.
pub(crate) fn first_out_of_range<B: Backend, const D: usize>(
    t:     &Tensor<B, D, Int>,
    upper: usize,
) -> Option<i64> {
    let (min, max) = int_bounds(t);
    if min < 0 {
        Some(min)
    } else if max >= upper as i64 {
        Some(max)
    } else {
        None
    }
}
