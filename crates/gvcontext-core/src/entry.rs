//! Entry bindings
//!
//! An entry binding is the function a built context runs on its first
//! switch, together with its arguments. Arguments are fixed when the binding
//! is created and moved into a boxed closure, so the argument list cannot
//! disagree with the callee's signature and nothing is marshalled through
//! raw registers.
//!
//! ```ignore
//! fn cf(i: i32, j: i32) { /* ... */ }
//!
//! let a = EntryBinding::with_args(cf, (78, 274));
//! let b = EntryBinding::new(move || cf(78, 274));
//! ```

use core::fmt;

/// A statically declared argument list (a tuple of up to six values).
pub trait EntryArgs: 'static {
    /// Number of arguments in the list
    const ARITY: usize;
}

/// A callable with a statically declared argument list `Args`.
pub trait EntryFn<Args>: 'static {
    /// Consume the callable and its arguments
    fn call_with(self, args: Args);
}

macro_rules! impl_entry_fn {
    ($($arg:ident),*) => {
        impl<$($arg: 'static,)*> EntryArgs for ($($arg,)*) {
            const ARITY: usize = {
                let names: &[&str] = &[$(stringify!($arg)),*];
                names.len()
            };
        }

        impl<Func, $($arg,)*> EntryFn<($($arg,)*)> for Func
        where
            Func: FnOnce($($arg),*) + 'static,
        {
            #[allow(non_snake_case)]
            #[inline]
            fn call_with(self, ($($arg,)*): ($($arg,)*)) {
                (self)($($arg),*)
            }
        }
    };
}

impl_entry_fn!();
impl_entry_fn!(A);
impl_entry_fn!(A, B);
impl_entry_fn!(A, B, C);
impl_entry_fn!(A, B, C, D);
impl_entry_fn!(A, B, C, D, E);
impl_entry_fn!(A, B, C, D, E, F);

/// Entry function plus bound arguments, invoked at most once
pub struct EntryBinding {
    run: Box<dyn FnOnce()>,
    arity: usize,
}

impl EntryBinding {
    /// Bind a closure that captures its own arguments
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce() + 'static,
    {
        Self { run: Box::new(f), arity: 0 }
    }

    /// Bind a function to an argument tuple
    pub fn with_args<F, Args>(f: F, args: Args) -> Self
    where
        F: EntryFn<Args>,
        Args: EntryArgs,
    {
        Self {
            run: Box::new(move || f.call_with(args)),
            arity: Args::ARITY,
        }
    }

    /// Number of bound arguments (0 for closures)
    #[inline]
    pub fn arity(&self) -> usize {
        self.arity
    }

    /// Run the entry, consuming the binding
    #[inline]
    pub fn invoke(self) {
        (self.run)()
    }
}

impl fmt::Debug for EntryBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntryBinding").field("arity", &self.arity).finish_non_exhaustive()
    }
}
