//! The unit of stealable work (C6, spec.md §4.5).

/// A task is a boxed closure plus the two callbacks spec.md §4.5 names:
/// `on_die` fires exactly once, when the task finishes running, carrying
/// whether its *parent's* continuation stayed local (`true`) or was
/// resumed by a thief (`false`). Grounded on `ito_pattern_workfirst` in
/// `original_source/ityr/ito_pattern.hpp`, the clearest surviving
/// description of when these fire.
pub struct Task {
    pub(crate) body: Option<Box<dyn FnOnce() + Send>>,
    pub(crate) on_die: Option<Box<dyn FnOnce(bool) + Send>>,
    /// The rank this task was created on; compared at join time to detect
    /// migration (the "Initial-rank check").
    pub(crate) origin_rank: usize,
}

impl Task {
    pub fn new(origin_rank: usize, body: impl FnOnce() + Send + 'static) -> Self {
        Task { body: Some(Box::new(body)), on_die: None, origin_rank }
    }

    /// Build a task from a closure that borrows data with a shorter
    /// lifetime than `'static`.
    ///
    /// # Safety
    /// The caller must guarantee the task is run (or dropped) before the
    /// borrowed data it closes over goes out of scope. [`super::join`]
    /// upholds this: it blocks until the task it pushes has actually run,
    /// the same invariant `std::thread::scope` relies on for scoped
    /// threads.
    pub unsafe fn new_scoped<'a>(origin_rank: usize, body: impl FnOnce() + Send + 'a) -> Self {
        let boxed: Box<dyn FnOnce() + Send + 'a> = Box::new(body);
        let boxed: Box<dyn FnOnce() + Send + 'static> = std::mem::transmute(boxed);
        Task { body: Some(boxed), on_die: None, origin_rank }
    }

    pub fn with_on_die(mut self, on_die: impl FnOnce(bool) + Send + 'static) -> Self {
        self.on_die = Some(Box::new(on_die));
        self
    }

    pub fn run(mut self, continuation_stayed_local: bool) {
        if let Some(body) = self.body.take() {
            body();
        }
        if let Some(on_die) = self.on_die.take() {
            on_die(continuation_stayed_local);
        }
    }
}
