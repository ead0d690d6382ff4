use std::ops::{Deref, DerefMut};

use super::Engine;

// ---------------------------------------------------------------------------
// Scoped diagnostic suppression
// ---------------------------------------------------------------------------

/// Engine borrowed with its diagnostic output silenced for the lifetime of
/// the scope. The previous setting is restored on drop, so every exit path
/// (including `?` and unwinding) puts the channel back.
///
/// The status flag travels through the call's return value, never through
/// the silenced channel, so failures are still seen while quiet.
pub struct QuietScope<'a, E: Engine + ?Sized> {
    engine: &'a mut E,
    previous: bool,
}

impl<'a, E: Engine + ?Sized> QuietScope<'a, E> {
    /// Silence `engine` unless `verbose` is set.
    pub fn engage(engine: &'a mut E, verbose: bool) -> Self {
        let previous = engine.set_quiet(!verbose);
        Self { engine, previous }
    }
}

impl<E: Engine + ?Sized> Deref for QuietScope<'_, E> {
    type Target = E;

    fn deref(&self) -> &E {
        self.engine
    }
}

impl<E: Engine + ?Sized> DerefMut for QuietScope<'_, E> {
    fn deref_mut(&mut self) -> &mut E {
        self.engine
    }
}

impl<E: Engine + ?Sized> Drop for QuietScope<'_, E> {
    fn drop(&mut self) {
        self.engine.set_quiet(self.previous);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MemoryEngine;

    #[test]
    fn restores_previous_setting_on_drop() {
        let mut engine = MemoryEngine::new();
        assert!(!engine.is_quiet());
        {
            let scope = QuietScope::engage(&mut engine, false);
            assert!(scope.is_quiet());
        }
        assert!(!engine.is_quiet());
    }

    #[test]
    fn verbose_leaves_output_alone() {
        let mut engine = MemoryEngine::new();
        let scope = QuietScope::engage(&mut engine, true);
        assert!(!scope.is_quiet());
    }

    #[test]
    fn nested_scopes_unwind_in_order() {
        let mut engine = MemoryEngine::new();
        {
            let mut outer = QuietScope::engage(&mut engine, false);
            {
                let inner = QuietScope::engage(&mut *outer, true);
                assert!(!inner.is_quiet());
            }
            assert!(outer.is_quiet());
        }
        assert!(!engine.is_quiet());
    }

    #[test]
    fn restores_when_unwinding() {
        let mut engine = MemoryEngine::new();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _scope = QuietScope::engage(&mut engine, false);
            panic!("engine call blew up");
        }));
        assert!(result.is_err());
        assert!(!engine.is_quiet());
    }
}
