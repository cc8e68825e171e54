//! 릴레이 서버 공통 유틸리티 모듈
//!
//! 에러 처리 등 계층 공통 기능을 제공합니다.

pub mod error;

pub use error::{ErrorHandler, ErrorSeverity, RelayError, RelayResult};
