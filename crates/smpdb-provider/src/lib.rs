pub mod client;
pub mod error;
pub mod inputs;
pub mod normalize;
pub mod types;

pub use client::{ProviderClient, ProviderSettings};
pub use error::ProviderError;
pub use inputs::build_inputs;
pub use normalize::{normalize_record, normalize_records};
pub use types::{ProviderInput, SnapshotHandle, SnapshotStatus};
