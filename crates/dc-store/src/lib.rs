pub mod bootstrap;
pub mod error;
pub mod gateway;
pub mod summary;

pub use bootstrap::{Runtime, ShutdownGuard, due, init, init_from_env, init_with_injector};
pub use error::{Result, StoreError};
pub use gateway::{LoadOutcome, load_or_create, load_state, persist, persist_state};
pub use summary::{FileSummary, FileSummaryBuilder, OutputFormat, render_bibtex, render_text};
