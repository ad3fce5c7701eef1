//! Interface layer
//! CLI와 HTTP 진입점, 그리고 의존성 조립(composition root).

pub mod cli;
pub mod composition;
pub mod http;
