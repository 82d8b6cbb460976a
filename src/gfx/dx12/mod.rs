//! DirectX 12 图形 API 实现模块
//!
//! - Context: 窗口、设备、命令队列、交换链、帧槽资源的创建
//! - Backend: `GraphicsBackend` 的实现，HRESULT 到错误类型的映射
//! - Descriptor: RTV 描述符堆

pub mod context;
pub mod backend;
pub mod descriptor;

// 重新导出常用类型
pub use context::Dx12Context;
