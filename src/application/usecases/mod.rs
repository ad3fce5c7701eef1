//! 애플리케이션 유스케이스 모음.

pub mod ingest_event;
pub mod inspect_config;
pub mod list_dead_letters;
pub mod review_pr;
pub mod run_worker;
pub mod submit_feedback;
