#![forbid(unsafe_code)]

//! Plain shared cells for scripted expressions.

use std::cell::RefCell;
use std::fmt;
use std::mem;
use std::rc::Rc;

/// A shared, untracked value.
///
/// Pair it with [`ManualReactor`](crate::ManualReactor): set the value, then
/// call `notify`.
pub struct Source<T> {
    value: Rc<RefCell<T>>,
}

impl<T> Clone for Source<T> {
    fn clone(&self) -> Self {
        Self {
            value: Rc::clone(&self.value),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Source<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Source").field(&*self.value.borrow()).finish()
    }
}

impl<T: Default> Default for Source<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> Source<T> {
    pub fn new(value: T) -> Self {
        Self {
            value: Rc::new(RefCell::new(value)),
        }
    }

    pub fn set(&self, value: T) {
        *self.value.borrow_mut() = value;
    }

    /// Store `value` and return the previous one.
    pub fn replace(&self, value: T) -> T {
        mem::replace(&mut *self.value.borrow_mut(), value)
    }

    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.value.borrow())
    }
}

impl<T: Clone> Source<T> {
    #[must_use]
    pub fn get(&self) -> T {
        self.value.borrow().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_between_clones() {
        let a = Source::new(1);
        let b = a.clone();
        b.set(2);
        assert_eq!(a.get(), 2);
        assert_eq!(a.replace(3), 2);
        assert_eq!(b.with(|v| *v), 3);
    }
}
