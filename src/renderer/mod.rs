//! 渲染器模块
//!
//! 应用程序通过 `Renderer` 驱动帧循环，而不需要关心具体使用的是哪个后端。
//!
//! # 架构设计
//!
//! - `Renderer`：统一的渲染器接口，对外提供一致的 API
//! - `Backend`：内部枚举，按后端持有一个 `FrameRenderer`
//! - `cycle`：帧同步循环（等待 fence → 重置 → 录制 → 提交 → signal → 呈现）
//! - 底层实现在 `gfx` 模块中

use tracing::info;
use winit::event_loop::EventLoop;
use winit::window::Window;

use crate::core::config::GraphicsBackend as BackendKind;
use crate::core::error::Result;
use crate::core::Config;
#[cfg(target_os = "windows")]
use crate::gfx::dx12::Dx12Context;
use crate::gfx::null::NullBackend;

pub mod sync;
pub mod resource;
pub mod command;
pub mod immediate;
pub mod cycle;
pub mod mesh;
pub mod passes;
pub mod metrics;

use cycle::FrameInfo;
use metrics::FrameStats;
use passes::FrameRenderer;

/// 图形后端枚举
///
/// 帧循环对后端泛型，这里在运行时选择其中一个实例化。
enum Backend {
    #[cfg(target_os = "windows")]
    Dx12(FrameRenderer<Dx12Context>),
    Null(FrameRenderer<NullBackend>),
}

pub struct Renderer {
    backend: Backend,
}

impl Renderer {
    /// 按配置创建渲染器
    ///
    /// DirectX 12 后端会创建窗口；模拟后端没有窗口。
    #[cfg_attr(not(target_os = "windows"), allow(unused_variables))]
    pub fn new(event_loop: &EventLoop<()>, config: &Config) -> Result<Self> {
        match config.graphics.backend {
            #[cfg(target_os = "windows")]
            BackendKind::Dx12 => {
                info!("Initializing DX12 Backend");
                let context = Dx12Context::new(event_loop, config)?;
                let renderer = FrameRenderer::new(context, &config.graphics, &config.scene)?;
                Ok(Self { backend: Backend::Dx12(renderer) })
            }
            #[cfg(not(target_os = "windows"))]
            BackendKind::Dx12 => Err(crate::core::error::FrameRingError::Initialization(
                "DX12 backend is only available on Windows".to_string(),
            )),
            BackendKind::Null => Self::headless(config),
        }
    }

    /// 创建使用模拟后端的无窗口渲染器
    pub fn headless(config: &Config) -> Result<Self> {
        info!(gpu_latency = config.null.gpu_latency, "Initializing Null Backend");
        let backend = NullBackend::new(
            config.graphics.frame_count,
            config.window.width,
            config.window.height,
            config.null.gpu_latency,
        );
        let renderer = FrameRenderer::new(backend, &config.graphics, &config.scene)?;
        Ok(Self { backend: Backend::Null(renderer) })
    }

    /// 绘制一帧，暂停时返回 `Ok(None)`
    pub fn draw(&mut self) -> Result<Option<FrameInfo>> {
        match &mut self.backend {
            #[cfg(target_os = "windows")]
            Backend::Dx12(r) => r.draw(),
            Backend::Null(r) => r.draw(),
        }
    }

    pub fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        match &mut self.backend {
            #[cfg(target_os = "windows")]
            Backend::Dx12(r) => r.resize(width, height),
            Backend::Null(r) => r.resize(width, height),
        }
    }

    /// 等待 GPU 空闲
    pub fn flush(&mut self) -> Result<()> {
        match &mut self.backend {
            #[cfg(target_os = "windows")]
            Backend::Dx12(r) => r.flush(),
            Backend::Null(r) => r.flush(),
        }
    }

    pub fn stats(&self) -> &FrameStats {
        match &self.backend {
            #[cfg(target_os = "windows")]
            Backend::Dx12(r) => r.stats(),
            Backend::Null(r) => r.stats(),
        }
    }

    pub fn backend_name(&self) -> &str {
        match &self.backend {
            #[cfg(target_os = "windows")]
            Backend::Dx12(r) => r.backend_name(),
            Backend::Null(r) => r.backend_name(),
        }
    }

    /// 渲染窗口（模拟后端没有窗口）
    pub fn window(&self) -> Option<&Window> {
        match &self.backend {
            #[cfg(target_os = "windows")]
            Backend::Dx12(r) => Some(r.cycle().backend().window()),
            Backend::Null(_) => None,
        }
    }

    pub fn request_redraw(&self) {
        if let Some(window) = self.window() {
            window.request_redraw();
        }
    }
}
