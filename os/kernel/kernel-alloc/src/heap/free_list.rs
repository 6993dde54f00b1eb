use core::ptr::NonNull;

/// A node that can be threaded onto an [`IntrusiveStack`].
///
/// The link lives inside the node's own memory, so pushing a block costs no
/// storage beyond the block itself.
///
/// # Safety
/// `link` must return a pointer to a properly aligned
/// `Option<NonNull<Self>>` field inside `*this`, and must not read `*this`.
pub(super) unsafe trait Linked: Sized {
    /// # Safety
    /// `this` must be valid for reads and writes of `Self`.
    unsafe fn link(this: *mut Self) -> *mut Option<NonNull<Self>>;
}

/// Header stored at the beginning of every **free** object.
///
/// ```text
/// +-----------------+----------------------------+
/// | next (header)   |  rest of the object ...    |
/// +-----------------+----------------------------+
/// ^ object address
/// ```
///
/// The header only exists while the object is on a free list; once handed
/// out, the whole object belongs to the caller.
#[repr(C)]
pub(super) struct FreeObject {
    next: Option<NonNull<FreeObject>>,
}

unsafe impl Linked for FreeObject {
    unsafe fn link(this: *mut Self) -> *mut Option<NonNull<Self>> {
        unsafe { &raw mut (*this).next }
    }
}

/// LIFO list of blocks linked through their own memory.
///
/// # Invariants
/// - Every node on the stack is valid, exclusively owned by the stack, and
///   appears exactly once.
/// - `len` equals the number of nodes reachable from `head`.
pub(super) struct IntrusiveStack<T: Linked> {
    head: Option<NonNull<T>>,
    len: usize,
}

impl<T: Linked> IntrusiveStack<T> {
    pub(super) const fn new() -> Self {
        Self { head: None, len: 0 }
    }

    pub(super) const fn len(&self) -> usize {
        self.len
    }

    pub(super) const fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Pushes `node`, overwriting its link field.
    ///
    /// # Safety
    /// - `node` must be valid for writes of `T` and aligned for `T`.
    /// - Nothing else may access `node` until it is popped again.
    pub(super) unsafe fn push(&mut self, node: NonNull<T>) {
        unsafe {
            T::link(node.as_ptr()).write(self.head);
        }
        self.head = Some(node);
        self.len += 1;
    }

    pub(super) fn pop(&mut self) -> Option<NonNull<T>> {
        let node = self.head?;
        // SAFETY: nodes on the stack are valid per `push`.
        self.head = unsafe { T::link(node.as_ptr()).read() };
        self.len -= 1;
        Some(node)
    }

    /// Walks the stack from the top.
    pub(super) fn iter(&self) -> impl Iterator<Item = NonNull<T>> + '_ {
        let mut cursor = self.head;
        core::iter::from_fn(move || {
            let node = cursor?;
            cursor = unsafe { T::link(node.as_ptr()).read() };
            Some(node)
        })
    }
}
