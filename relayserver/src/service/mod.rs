//! 릴레이 서비스 레이어
//!
//! 방, 멤버, 레지스트리와 빈 방 정리 작업을 정의합니다.
//!
//! # 서비스 구조
//!
//! ```text
//! Service Layer
//! ├── RoomRegistry (방 디렉토리)
//! │   ├── 이름별 방 생성/조회
//! │   └── 빈 방 정리
//! ├── Room (방 루프)
//! │   ├── join / leave
//! │   ├── 브로드캐스트 팬아웃
//! │   └── 느린 멤버 퇴출
//! ├── Member (연결별 참가자)
//! │   ├── 수신 펌프
//! │   └── 송신 펌프
//! └── RoomReaper (선택적 주기 정리)
//! ```

pub mod member;
pub mod reaper;
pub mod registry;
pub mod room;

pub use member::{Member, MemberReport, PumpOptions, StopReason};
pub use reaper::{ReaperStats, RoomReaper};
pub use registry::RoomRegistry;
pub use room::{MemberId, MemberSlot, MemberSummary, RoomHandle, RoomSnapshot};
