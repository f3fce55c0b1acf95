pub mod alerts;
pub mod app;
pub mod config;
pub mod errors;
pub mod export;
pub mod handlers;
pub mod models;
pub mod records;
pub mod state;
pub mod storage;
pub mod summary;
pub mod tracker;

pub use app::router;
pub use config::TrackerConfig;
pub use state::AppState;
pub use storage::{LogStore, open_store};
pub use summary::{AccountingPolicy, DateWindow, SummaryEngine, UserSummary, compute_streak};
pub use tracker::Tracker;
