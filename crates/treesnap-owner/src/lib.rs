//! Owner and author resolution for treesnap.
//!
//! A file's owner comes from the first source that yields one:
//!
//! 1. the author recorded in the file itself, read by the [`AuthorStrategy`]
//!    registered for its extension class in the [`StrategyRegistry`];
//! 2. the filesystem owner reported by an [`OwnerSource`], retried with
//!    exponential backoff on transient failures.
//!
//! Failures degrade to the sentinels of [`treesnap_core::Owner`] instead of
//! propagating. All blocking reads run through a shared [`IoGate`].

pub mod error;
pub mod formats;
pub mod gate;
pub mod registry;
pub mod resolver;
pub mod retry;
pub mod source;
pub mod strategy;

pub use error::{StrategyError, is_transient_kind};
pub use formats::{MediaTagStrategy, OfficeStrategy, PdfInfoStrategy};
pub use gate::{GateError, IoGate};
pub use registry::StrategyRegistry;
pub use resolver::AttributeResolver;
pub use retry::{RetryError, RetryPolicy};
pub use source::{FsOwnerSource, normalize_account};
pub use strategy::{AuthorStrategy, OwnerSource};
