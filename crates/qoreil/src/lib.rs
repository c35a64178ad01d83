#![doc = include_str!("../../../README.md")]

pub mod analyzer;
pub mod ast;
pub mod builder;
pub mod conv;
pub mod error;
pub mod interp;
pub mod ir;
pub mod op;
pub mod scope;
pub mod ty;
pub mod typed;
pub mod value;
