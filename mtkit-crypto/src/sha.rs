//! Hash helpers. Both macros hash the concatenation of their arguments
//! without building the concatenated buffer.

/// SHA-1 over the concatenation of one or more byte slices → `[u8; 20]`.
#[macro_export]
macro_rules! sha1 {
    ( $( $x:expr ),+ $(,)? ) => {{
        use $crate::__private::sha1::{Digest, Sha1};
        let mut h = Sha1::new();
        $( h.update($x); )+
        let out: [u8; 20] = h.finalize().into();
        out
    }};
}

/// SHA-256 over the concatenation of one or more byte slices → `[u8; 32]`.
#[macro_export]
macro_rules! sha256 {
    ( $( $x:expr ),+ $(,)? ) => {{
        use $crate::__private::sha2::{Digest, Sha256};
        let mut h = Sha256::new();
        $( h.update($x); )+
        let out: [u8; 32] = h.finalize().into();
        out
    }};
}
