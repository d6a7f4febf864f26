//! Core building blocks shared by every other module

pub mod time;

use std::any::Any;

/// Upcast helper for trait objects that need typed lookup
///
/// Implemented for every `'static` type, so plugin traits only have to list
/// it as a supertrait.
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
