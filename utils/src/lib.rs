#![no_std]
extern crate alloc;

pub mod align;
pub mod id;
pub mod types;

pub use ::abi as abi;
pub use ::abi::consts;
pub use ::abi::errors;
