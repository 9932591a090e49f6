//! Management HTTP API.
//!
//! Endpoints:
//! - `GET /api/active_task/rank?window=&limit=` - activity ranking
//! - `GET /api/active_task/stats` - store summary
//! - `GET /api/active_task/history?start_time=&end_time=&user_id=&limit=` - alert records
//! - `POST /api/active_task/record` - record a request forwarded by a gateway
//! - `GET /health` - liveness
//! - `GET /metrics` - Prometheus metrics, when enabled
//!
//! Query parameters are clamped here, before they reach the slot store.

pub mod handlers;
pub mod response;
pub mod server;
mod state;

pub use handlers::{
    route, HISTORY_PATH, MODEL_HEADER, RANK_PATH, RECORD_PATH, REQUEST_PATH_HEADER, STATS_PATH,
    USERNAME_HEADER, USER_ID_HEADER,
};
pub use server::serve;
pub use state::ApiState;
