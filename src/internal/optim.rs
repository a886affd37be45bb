//! Branch hints usable on stable. A call to a `#[cold]` function on the unlikely side of a branch
//! is enough for llvm to lay the branch out the way we want.

#[doc(hidden)]
#[inline(always)]
#[cold]
pub fn _cold() {}

#[doc(hidden)]
#[inline(always)]
pub fn _unlikely(b: bool) -> bool {
    if b {
        _cold()
    }
    b
}

#[inline(always)]
#[doc(hidden)]
pub fn _likely(b: bool) -> bool {
    if !b {
        _cold()
    }
    b
}

macro_rules! unlikely {
    ($e:expr) => {
        $crate::internal::optim::_unlikely($e)
    };
}

macro_rules! likely {
    ($e:expr) => {{
        $crate::internal::optim::_likely($e)
    }};
}

#[cfg(test)]
mod test {
    #[test]
    fn hints_are_transparent() {
        assert!(likely!(true));
        assert!(!likely!(false));
        assert!(unlikely!(true));
        assert!(!unlikely!(false));
    }
}
