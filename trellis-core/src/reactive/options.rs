//! Construction options shared by observables and derived values.

use std::fmt;
use std::rc::Rc;

use super::equality::default_equals;

/// Debug name, comparer and laziness of a node.
pub struct Options<T> {
    pub(crate) name: Option<Rc<str>>,
    pub(crate) equals: Rc<dyn Fn(&T, &T) -> bool>,
    pub(crate) lazy: bool,
}

impl<T: PartialEq + 'static> Default for Options<T> {
    fn default() -> Self {
        Self::with_equals(default_equals::<T>)
    }
}

impl<T: 'static> Options<T> {
    /// Options with a custom comparer. Works for types without `PartialEq`.
    pub fn with_equals(equals: impl Fn(&T, &T) -> bool + 'static) -> Self {
        Self {
            name: None,
            equals: Rc::new(equals),
            lazy: false,
        }
    }

    /// Debug name shown in errors, logs and trace records.
    pub fn name(mut self, name: impl AsRef<str>) -> Self {
        self.name = Some(Rc::from(name.as_ref()));
        self
    }

    pub fn equals(mut self, equals: impl Fn(&T, &T) -> bool + 'static) -> Self {
        self.equals = Rc::new(equals);
        self
    }

    /// Observables only: while nobody depends on the observable, changed
    /// values are stored without propagation.
    pub fn lazy(mut self) -> Self {
        self.lazy = true;
        self
    }
}

impl<T> fmt::Debug for Options<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("name", &self.name)
            .field("lazy", &self.lazy)
            .finish()
    }
}
