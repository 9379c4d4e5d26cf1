pub mod aptos;
pub mod traits;

pub use aptos::AptosRestClient;
pub use traits::{coerce_u64, LedgerClient};
