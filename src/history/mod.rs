pub mod store;

pub use store::{HistoryEntry, HistoryQuery, HistoryStore, NewHistoryEntry};
