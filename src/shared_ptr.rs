//! About shared pointers. Re-export the [`archery`] crate.
//!
//! Frozen trie nodes are shared between versions, maps and stores through
//! an [`archery::SharedPointer`], so the pointer flavour is a type parameter
//! of every collection in this crate.
//!
//! [`archery`]: https://docs.rs/archery/latest/

pub use archery::{ArcK, RcK, SharedPointer, SharedPointerKind};

#[cfg(feature = "triomphe")]
pub use archery::ArcTK;

#[cfg(not(feature = "triomphe"))]
/// Default shared pointer used for frozen nodes. This alias points to [`ArcK`] if `triomphe` is
/// disabled, [`ArcTK`] otherwise. Both let a [`Version`] cross threads; pick [`RcK`] for a
/// single-threaded store with cheaper reference counting.
///
/// [`Version`]: ../struct.Version.html
/// [`ArcK`]: https://docs.rs/archery/latest/archery/shared_pointer/kind/struct.ArcK.html
/// [`ArcTK`]: https://docs.rs/archery/latest/archery/shared_pointer/kind/struct.ArcTK.html
pub type DefaultSharedPtr = ArcK;

#[cfg(feature = "triomphe")]
/// Default shared pointer used for frozen nodes. This alias points to [`ArcK`] if `triomphe` is
/// disabled, [`ArcTK`] otherwise. Both let a [`Version`] cross threads; pick [`RcK`] for a
/// single-threaded store with cheaper reference counting.
///
/// [`Version`]: ../struct.Version.html
/// [`ArcK`]: https://docs.rs/archery/latest/archery/shared_pointer/kind/struct.ArcK.html
/// [`ArcTK`]: https://docs.rs/archery/latest/archery/shared_pointer/kind/struct.ArcTK.html
pub type DefaultSharedPtr = ArcTK;
