//! Cross-cutting primitives: binary codec, transactions, file locks.

pub mod codec;
pub mod lock;
pub mod transaction;

pub use transaction::{Pending, Transaction, TransactionChain};
