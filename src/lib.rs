//! frame_ring - Direct3D 12 帧同步循环
//!
//! 每个交换链缓冲对应一个帧槽（命令分配器 + fence）。每帧等待帧槽的上一次提交
//! 完成后才重置它的命令分配器，录制、提交、signal，然后呈现。
//!
//! # 模块结构
//!
//! - `core`: 配置、日志、错误处理
//! - `renderer`: 帧同步循环、资源状态跟踪、一次性提交、网格上传、渲染通道
//! - `gfx`: 图形后端抽象层（DirectX 12 和模拟后端）
//!
//! # 使用示例
//!
//! ```no_run
//! use frame_ring::core::Config;
//! use frame_ring::renderer::Renderer;
//!
//! let mut config = Config::default();
//! config.apply_args(["--null", "--offscreen"]);
//!
//! let mut renderer = Renderer::headless(&config)?;
//! for _ in 0..60 {
//!     renderer.draw()?;
//! }
//! renderer.flush()?;
//! # Ok::<(), frame_ring::core::FrameRingError>(())
//! ```

pub mod core;
pub mod renderer;
pub mod gfx;
