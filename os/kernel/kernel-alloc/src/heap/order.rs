//! Size classes.
//!
//! A request of `s` bytes is served from the power-of-two class
//! `2^order >= s`, clamped below at [`MIN_ORDER`]. Anything above
//! `2^MAX_ORDER` bypasses the slub layer entirely.

use core::fmt;

/// Smallest object size is `2^MIN_ORDER` (16) bytes.
pub const MIN_ORDER: u8 = 4;

/// Largest slub-served object size is `2^MAX_ORDER` (one page).
pub const MAX_ORDER: u8 = 12;

/// Number of raw order values, `0..=MAX_ORDER`. Also the raw order reported
/// for requests that bypass the slub layer.
pub const SLUB_ORDERS: usize = MAX_ORDER as usize + 1;

/// Number of distinct slub-served orders.
pub const ORDER_COUNT: usize = (MAX_ORDER - MIN_ORDER + 1) as usize;

/// A slub-served size class, `MIN_ORDER..=MAX_ORDER`.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Order(u8);

impl Order {
    pub const MIN: Self = Self(MIN_ORDER);
    pub const MAX: Self = Self(MAX_ORDER);

    /// Returns `None` outside `MIN_ORDER..=MAX_ORDER`.
    #[must_use]
    pub const fn new(order: u8) -> Option<Self> {
        if order >= MIN_ORDER && order <= MAX_ORDER {
            Some(Self(order))
        } else {
            None
        }
    }

    #[must_use]
    pub const fn get(self) -> u8 {
        self.0
    }

    /// Object size of this class in bytes.
    #[must_use]
    pub const fn size(self) -> usize {
        1 << self.0
    }

    /// Slot in per-order tables.
    pub(crate) const fn slot(self) -> usize {
        (self.0 - MIN_ORDER) as usize
    }

    /// All orders, smallest first.
    pub fn all() -> impl Iterator<Item = Self> {
        (MIN_ORDER..=MAX_ORDER).map(Self)
    }
}

impl fmt::Debug for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Order({}, {} B)", self.0, self.size())
    }
}

/// Where a request of a given size is served from.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SizeClass {
    Slub(Order),
    /// Larger than `2^MAX_ORDER`: goes straight to the physical allocator.
    Bypass,
}

impl SizeClass {
    /// Classifies a request of `size` bytes.
    ///
    /// ```
    /// use kernel_alloc::heap::{Order, SizeClass};
    ///
    /// assert_eq!(SizeClass::of(1), SizeClass::Slub(Order::MIN));
    /// assert_eq!(SizeClass::of(32).order().map(Order::get), Some(5));
    /// assert_eq!(SizeClass::of(33).order().map(Order::get), Some(6));
    /// assert_eq!(SizeClass::of(4096), SizeClass::Slub(Order::MAX));
    /// assert_eq!(SizeClass::of(4097), SizeClass::Bypass);
    /// ```
    #[must_use]
    pub const fn of(size: usize) -> Self {
        if size > Order::MAX.size() {
            return Self::Bypass;
        }
        let size = if size < Order::MIN.size() {
            Order::MIN.size()
        } else {
            size
        };
        #[allow(clippy::cast_possible_truncation)]
        let order = size.next_power_of_two().trailing_zeros() as u8;
        Self::Slub(Order(order))
    }

    #[must_use]
    pub const fn order(self) -> Option<Order> {
        match self {
            Self::Slub(order) => Some(order),
            Self::Bypass => None,
        }
    }

    /// The raw order, with [`SLUB_ORDERS`] standing for "bypass".
    #[must_use]
    pub const fn raw_order(self) -> usize {
        match self {
            Self::Slub(order) => order.0 as usize,
            Self::Bypass => SLUB_ORDERS,
        }
    }
}
