//! Thread locals that come back after they have been destroyed.
//!
//! A `phoenix_tls!` static is a lazily created, reference counted heap value owned by the thread.
//! Reclamation callbacks can run from other thread local destructors, after the thread's
//! reclamation state is gone. Accessing the static then builds a short lived replacement through
//! `Default`, which registers, does its work, and unregisters again when the last handle drops.
//!
//! The value is told when it starts and stops living at a fixed address through `PhoenixTarget`.

use core::{cell::Cell, marker::PhantomData, mem::ManuallyDrop, ops::Deref, ptr::NonNull};

/// Hooks for values stored in a `phoenix_tls!` static.
///
/// The value does not move between `subscribe` and `unsubscribe`.
pub trait PhoenixTarget: Default {
    #[inline]
    fn subscribe(&mut self) {}

    #[inline]
    fn unsubscribe(&mut self) {}
}

/// The heap allocation behind every `Phoenix` handle. `value` must stay the first field, handles
/// are rebuilt from a pointer to it.
#[derive(Debug)]
#[repr(C)]
struct Shared<T> {
    value:      T,
    handles:    Cell<usize>,
    /// Forgets the cached thread local pointer, if this value is the thread's.
    forget_tls: Option<fn()>,
}

/// A handle to a thread's phoenix value. Not `Send`, the count is not atomic.
#[derive(Debug)]
pub struct Phoenix<T: 'static + PhoenixTarget> {
    shared:  NonNull<Shared<T>>,
    phantom: PhantomData<Shared<T>>,
}

impl<T: 'static + PhoenixTarget> Default for Phoenix<T> {
    #[inline(never)]
    #[cold]
    fn default() -> Self {
        Phoenix::new(None)
    }
}

impl<T: 'static + PhoenixTarget> Clone for Phoenix<T> {
    #[inline]
    fn clone(&self) -> Self {
        let handles = &self.shared().handles;
        debug_assert!(handles.get() > 0, "cloned a released `Phoenix`");
        let count = handles.get() + 1;
        handles.set(count);
        // reachable with enough `mem::forget`
        if unlikely!(count == usize::max_value()) {
            std::process::abort()
        }
        Phoenix {
            shared:  self.shared,
            phantom: PhantomData,
        }
    }
}

impl<T: 'static + PhoenixTarget> Drop for Phoenix<T> {
    #[inline]
    fn drop(&mut self) {
        let handles = &self.shared().handles;
        let count = handles.get();
        debug_assert!(count > 0, "released a `Phoenix` twice");
        handles.set(count - 1);
        if unlikely!(count == 1) {
            unsafe { release(self.shared) }
        }
    }
}

#[inline(never)]
#[cold]
unsafe fn release<T: 'static + PhoenixTarget>(shared: NonNull<Shared<T>>) {
    let mut shared = Box::from_raw(shared.as_ptr());
    // the thread local must stop handing out this value before it is mutated
    if let Some(forget_tls) = shared.forget_tls {
        forget_tls()
    }
    shared.value.unsubscribe();
}

impl<T: 'static + PhoenixTarget> Phoenix<T> {
    /// Creates and subscribes a new value. `forget_tls` is called when the last handle is dropped.
    #[inline(never)]
    #[cold]
    pub fn new(forget_tls: Option<fn()>) -> Self {
        let mut shared = Box::new(Shared {
            value: T::default(),
            handles: Cell::new(1),
            forget_tls,
        });
        shared.value.subscribe();
        Phoenix {
            shared:  NonNull::from(Box::leak(shared)),
            phantom: PhantomData,
        }
    }

    /// Creates a new handle from a pointer to the value of a live `Phoenix`.
    #[inline]
    pub unsafe fn clone_raw(value: NonNull<T>) -> Self {
        let borrowed = ManuallyDrop::new(Phoenix {
            shared:  value.cast::<Shared<T>>(),
            phantom: PhantomData,
        });
        (*borrowed).clone()
    }

    #[inline]
    fn shared(&self) -> &Shared<T> {
        // at least one handle, self, is alive
        unsafe { self.shared.as_ref() }
    }
}

impl<T: 'static + PhoenixTarget> Deref for Phoenix<T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        &self.shared().value
    }
}

/// Declares a `static NAME: T` with a `get` returning a `Phoenix<T>`, and a `with` borrowing the
/// value. `T` must implement `PhoenixTarget`.
macro_rules! phoenix_tls {
    ($(#[$attr:meta])* $vis:vis static $name:ident: $t:ty) => (
        #[allow(non_camel_case_types)]
        $vis struct $name;

        impl $name {
            #[inline]
            $vis fn get(self) -> $crate::internal::phoenix_tls::Phoenix<$t> {
                self.with(|value| unsafe {
                    $crate::internal::phoenix_tls::Phoenix::clone_raw(value.into())
                })
            }

            #[inline]
            $vis fn with<F: FnOnce(&$t) -> O, O>(self, f: F) -> O {
                type Cached = core::cell::Cell<Option<core::ptr::NonNull<$t>>>;

                // owns the thread's value, dropped with the thread locals
                thread_local!{
                    $(#[$attr])* static OWNER: $crate::internal::phoenix_tls::Phoenix<$t> =
                        $crate::internal::phoenix_tls::Phoenix::new(Some(|| {
                            CACHED.with(|cached| cached.set(None))
                        }));
                }

                // a pointer into OWNER, readable without touching a destructor-bearing local
                thread_local!{
                    static CACHED: Cached = core::cell::Cell::new(None);
                }

                #[inline(never)]
                #[cold]
                unsafe fn first_access<F: FnOnce(&$t) -> O, O>(f: F) -> O {
                    let owned = OWNER.try_with(|owner| {
                        let value: core::ptr::NonNull<$t> = (&**owner).into();
                        CACHED.with(|cached| cached.set(Some(value)));
                        value
                    });
                    match owned {
                        Ok(value) => f(value.as_ref()),
                        // OWNER is already destroyed
                        Err(_) => f(&*$crate::internal::phoenix_tls::Phoenix::<$t>::default()),
                    }
                }

                CACHED.with(|cached| unsafe {
                    match cached.get() {
                        Some(value) => f(value.as_ref()),
                        None => first_access(f),
                    }
                })
            }
        }
    );
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering::Relaxed};

    static LIVE: AtomicUsize = AtomicUsize::new(0);

    #[derive(Default)]
    struct Counted;

    impl PhoenixTarget for Counted {
        fn subscribe(&mut self) {
            LIVE.fetch_add(1, Relaxed);
        }

        fn unsubscribe(&mut self) {
            LIVE.fetch_sub(1, Relaxed);
        }
    }

    phoenix_tls! {
        static COUNTED: Counted
    }

    #[test]
    fn subscribe_once_per_thread() {
        std::thread::spawn(|| {
            let a = COUNTED.get();
            let b = COUNTED.get();
            assert!(std::ptr::eq(&*a, &*b));
            assert!(LIVE.load(Relaxed) >= 1);
        })
        .join()
        .unwrap();
        assert_eq!(LIVE.load(Relaxed), 0);
    }
}
