//! The expression/statement analyzer: pass 1 (C5), pass 2 (C6), and the
//! statement analyzer (C7), kept as three submodules matching spec.md's
//! own three-way split of §4.5/§4.6/§4.7.

pub mod pass1;
pub mod pass2;
pub mod stmt;
