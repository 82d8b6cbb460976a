//! 图形后端模块
//!
//! - DirectX 12：Windows 平台的真实后端
//! - Null：在 CPU 上模拟 GPU 时间线，用于无窗口运行和测试
//!
//! 两个后端都实现了统一的 `GraphicsBackend` trait，帧同步循环只依赖这个 trait。

pub mod backend;
pub mod null;
#[cfg(target_os = "windows")]
pub mod dx12;

pub use backend::GraphicsBackend;
pub use null::NullBackend;
#[cfg(target_os = "windows")]
pub use dx12::Dx12Context;
