//! HTTP surface of the dashboard: handlers under `/api/v1` and their response models.

pub mod handlers;
pub mod models;
