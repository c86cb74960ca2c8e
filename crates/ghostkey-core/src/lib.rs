pub mod armor;
pub mod crypto;
pub mod delegate;
pub mod error;
pub mod traits;
pub mod types;

pub use crypto::*;
pub use delegate::*;
pub use error::*;
pub use traits::*;
pub use types::*;
