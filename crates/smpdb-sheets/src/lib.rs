pub mod adapter;
pub mod client;
pub mod columns;
pub mod error;

pub use adapter::SheetWorkItems;
pub use client::{SheetsClient, SheetsSettings};
pub use columns::{CellState, COLLECTING_SENTINEL, UNCOLLECTABLE_SENTINEL};
pub use error::SheetsError;
