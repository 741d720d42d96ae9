//! Helpers shared by the workspace's integration tests.
//!
//! [`generators`] produces reproducible coordinates and channel values from a
//! seed, [`fixtures`] holds named regions and scratch directories, and the two
//! macros below compare floats with a tolerance.

pub mod fixtures;
pub mod generators;

pub use fixtures::*;
pub use generators::*;

/// Assert that two numbers differ by at most `epsilon`.
///
/// Both sides are widened to `f64`, so `f32` features can be compared
/// against literals directly.
#[macro_export]
macro_rules! assert_approx_eq {
    ($left:expr, $right:expr, $epsilon:expr) => {{
        let (left, right, epsilon) = ($left as f64, $right as f64, $epsilon as f64);
        let diff = (left - right).abs();
        if diff > epsilon || diff.is_nan() {
            panic!(
                "approx assertion failed: {} vs {} (|diff| = {}, epsilon = {})",
                left, right, diff, epsilon
            );
        }
    }};
}

/// Approximate equality of two slices, element by element.
///
/// NaN on both sides counts as equal.
#[macro_export]
macro_rules! assert_slices_approx_eq {
    ($left:expr, $right:expr, $epsilon:expr) => {{
        let left = &$left;
        let right = &$right;
        assert_eq!(left.len(), right.len(), "slice lengths differ");
        for (i, (l, r)) in left.iter().zip(right.iter()).enumerate() {
            let (l, r) = (*l as f64, *r as f64);
            if l.is_nan() && r.is_nan() {
                continue;
            }
            if (l - r).abs() > $epsilon as f64 {
                panic!("approx assertion failed at index {}: {} vs {}", i, l, r);
            }
        }
    }};
}
