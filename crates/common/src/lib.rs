//! Shared primitives for the drip faucet workspace.

pub mod error;
pub mod types;
pub mod utils;

pub use error::{CommonError, CommonResult};
pub use types::{Address, ChainId, Hash, ADDRESS_LENGTH, HASH_LENGTH};
