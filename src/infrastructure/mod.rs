//! Infrastructure layer
//! 외부 시스템(GitHub/LLM API/파일시스템/큐 저장소)과 직접 통신하는 구현체 집합.

pub mod adapters;
pub mod config;
pub mod providers;
pub mod queue;
pub mod recorder;
pub mod render;
pub mod vcs;
