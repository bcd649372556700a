// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

// Every codebase needs a `util` module.

use archery::{SharedPointer, SharedPointerKind};

/// Take the value out of a shared pointer if we hold the only reference,
/// otherwise map over a borrow of it.
pub(crate) fn take_or_else<A, B, P, F, G>(r: SharedPointer<A, P>, take: F, borrow: G) -> B
where
    P: SharedPointerKind,
    F: FnOnce(A) -> B,
    G: FnOnce(&A) -> B,
{
    match SharedPointer::try_unwrap(r) {
        Ok(value) => take(value),
        Err(shared) => borrow(&shared),
    }
}

#[cfg(test)]
macro_rules! assert_covariant {
    ($name:ident<$($gen:tt),*> in $param:ident) => {
        #[allow(dead_code, unused_assignments, unused_variables)]
        const _: () = {
            type Tmp<$param> = $name<$($gen),*>;
            fn assign<'a, 'b: 'a>(src: Tmp<&'b i32>, mut dst: Tmp<&'a i32>) {
                dst = src;
            }
        };
    }
}
