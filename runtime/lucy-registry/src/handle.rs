use std::ffi::c_void;
use std::fmt;
use std::num::NonZeroUsize;

/// Opaque, pointer-sized reference to a registry slot.
///
/// Index 0 terminates the free list, so a handle is never zero and
/// `Option<Handle>` stays pointer-sized.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct Handle(NonZeroUsize);

impl Handle {
    pub(crate) fn from_index(index: usize) -> Self {
        match NonZeroUsize::new(index) {
            Some(index) => Self(index),
            None => unreachable!("slot 0 is the free-list sentinel"),
        }
    }

    pub(crate) fn index(self) -> usize {
        self.0.get()
    }

    /// Rebuild a handle from the integer native code handed back.
    pub fn from_raw(raw: usize) -> Option<Self> {
        NonZeroUsize::new(raw).map(Self)
    }

    pub fn into_raw(self) -> usize {
        self.0.get()
    }

    /// Encode the handle for a native `void *` field. The pointer is never
    /// dereferenced; it only carries the slot index.
    pub fn as_ptr(self) -> *mut c_void {
        std::ptr::without_provenance_mut(self.0.get())
    }

    pub fn from_ptr(ptr: *const c_void) -> Option<Self> {
        Self::from_raw(ptr.addr())
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}
