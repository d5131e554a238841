//! Equality comparers.
//!
//! A comparer decides whether a new value counts as a change. When it says
//! "equal", a write is dropped and a recomputation keeps the old version, so
//! nothing downstream re-runs.
//!
//! # Example
//! ```
//! use trellis_core::equality::{default_equals, float_equals};
//!
//! assert!(default_equals(&42, &42));
//! assert!(float_equals(&f64::NAN, &f64::NAN));
//! ```

use std::rc::Rc;

/// Structural equality via `PartialEq`. The default comparer.
pub fn default_equals<T: PartialEq>(a: &T, b: &T) -> bool {
    a == b
}

/// Treats every value as new. Useful for values without a meaningful
/// equality, or to force a notification on every write.
pub fn never_equals<T>(_a: &T, _b: &T) -> bool {
    false
}

/// `f64` equality under which `NaN` equals `NaN`.
///
/// With plain `==` a `NaN` value would never settle: each write of `NaN`
/// would look like a change.
pub fn float_equals(a: &f64, b: &f64) -> bool {
    if a.is_nan() {
        return b.is_nan();
    }
    a == b
}

/// Identity of shared values.
pub fn rc_ptr_equals<T: ?Sized>(a: &Rc<T>, b: &Rc<T>) -> bool {
    Rc::ptr_eq(a, b)
}

/// Compare two slices element-wise with `item_equals`.
pub fn slice_equals_by<T>(a: &[T], b: &[T], item_equals: impl Fn(&T, &T) -> bool) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| item_equals(x, y))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn float_equality_handles_nan() {
        assert!(float_equals(&1.0, &1.0));
        assert!(!float_equals(&1.0, &2.0));
        assert!(float_equals(&f64::NAN, &f64::NAN));
        assert!(!float_equals(&f64::NAN, &1.0));
        assert!(!float_equals(&1.0, &f64::NAN));
    }

    #[test]
    fn never_equals_even_for_same_value() {
        assert!(!never_equals(&1, &1));
    }

    #[test]
    fn rc_identity() {
        let a = Rc::new(vec![1]);
        let b = Rc::new(vec![1]);
        assert!(rc_ptr_equals(&a, &a.clone()));
        assert!(!rc_ptr_equals(&a, &b));
    }

    #[test]
    fn slices_by_item_comparer() {
        let a = [1.0, f64::NAN];
        let b = [1.0, f64::NAN];
        assert!(slice_equals_by(&a, &b, float_equals));
        assert!(!slice_equals_by(&a, &b[..1], float_equals));
    }
}
