pub mod core;
pub mod router;
pub mod types;

pub use crate::core::ClipShelf;
pub use crate::core::coordination::{ContextKind, DatabaseHub, OpenOptions};
pub use crate::core::error::{ErrorKind, ShelfError};
pub use router::{Request, RequestRouter, Response};
