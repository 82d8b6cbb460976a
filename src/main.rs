//! frame_ring - Direct3D 12 帧同步循环演示
//!
//! 可以通过配置文件或命令行参数选择后端和帧节奏。
//!
//! # 使用方法
//!
//! ```bash
//! # 使用配置文件
//! cargo run
//!
//! # 三个帧槽，流水线帧节奏，先绘制到离屏纹理
//! cargo run -- --dx12 --frames 3 --pipelined --offscreen
//!
//! # 无窗口运行模拟后端 600 帧
//! cargo run -- --null --headless-frames 600
//! ```
//!
//! # 架构概览
//!
//! ```text
//! ┌─────────────┐
//! │   main.rs   │  应用程序入口
//! └──────┬──────┘
//!        │
//! ┌──────▼──────┐
//! │  Renderer   │  统一渲染接口
//! └──────┬──────┘
//!        │
//! ┌──────▼──────┐
//! │ FrameCycle  │  等待 → 重置 → 录制 → 提交 → signal → 呈现
//! └──────┬──────┘
//!        │
//!   ┌────┴────┐
//!   │         │
//! ┌─▼──┐   ┌──▼─┐
//! │DX12│   │Null│  具体后端实现
//! └────┘   └────┘
//! ```

use anyhow::Context;
use tracing::{debug, error, info};
use winit::event::{Event, WindowEvent};
use winit::event_loop::EventLoop;

use frame_ring::core::config::GraphicsBackend;
use frame_ring::core::{log, Config, FrameRingError};
use frame_ring::renderer::Renderer;

/// 应用程序入口点
///
/// # 初始化流程
///
/// 1. 加载配置文件（config.toml，不存在时使用默认值，解析失败时退出）
/// 2. 应用命令行参数覆盖
/// 3. 验证配置
/// 4. 初始化日志系统
/// 5. 按后端进入窗口循环或无窗口循环
///
/// # 命令行参数
///
/// - `--dx12` / `--null`: 选择后端
/// - `--width <value>` / `--height <value>`: 窗口尺寸
/// - `--frames <value>`: 帧槽数量（2 或 3）
/// - `--pipelined`: 流水线帧节奏
/// - `--offscreen`: 离屏渲染通道
/// - `--headless-frames <value>`: 模拟后端运行的帧数
fn main() -> anyhow::Result<()> {
    let mut config = Config::from_file_or_default("config.toml").context("Failed to load config.toml")?;
    config.apply_args(std::env::args().skip(1));
    config.validate().context("Invalid configuration")?;

    let log_file = if config.logging.file_output {
        Some(config.logging.log_file.as_str())
    } else {
        None
    };
    log::init_logger(config.logging.level, config.logging.file_output, log_file)
        .context("Failed to initialize logging")?;

    info!(version = env!("CARGO_PKG_VERSION"), "frame_ring starting...");
    info!(
        backend = config.graphics.backend.name(),
        width = config.window.width,
        height = config.window.height,
        frames = config.graphics.frame_count,
        pacing = ?config.graphics.pacing,
        offscreen = config.graphics.render_to_texture,
        "Graphics configuration"
    );

    match config.graphics.backend {
        GraphicsBackend::Null => run_headless(&config),
        GraphicsBackend::Dx12 => run_windowed(&config),
    }
}

/// 模拟后端：固定帧数的无窗口循环
fn run_headless(config: &Config) -> anyhow::Result<()> {
    let mut renderer = Renderer::headless(config).context("Failed to initialize renderer")?;

    for _ in 0..config.null.frames {
        renderer.draw().context("Draw failed")?;
    }
    renderer.flush().context("Failed to flush GPU")?;

    log_stats(&renderer);
    Ok(())
}

/// DirectX 12 后端：winit 事件循环
///
/// - `WindowEvent::CloseRequested`：退出
/// - `WindowEvent::Resized`：调整交换链尺寸，尺寸为 0 时暂停绘制
/// - `WindowEvent::RedrawRequested`：绘制一帧
/// - `Event::AboutToWait`：请求下一次重绘
fn run_windowed(config: &Config) -> anyhow::Result<()> {
    let event_loop = EventLoop::new().context("Failed to create event loop")?;
    let mut renderer = Renderer::new(&event_loop, config).context("Failed to initialize renderer")?;
    let mut failure: Option<FrameRingError> = None;

    info!("Entering main loop...");

    event_loop.run(|event, elwt| match event {
        Event::WindowEvent { event, .. } => match event {
            WindowEvent::CloseRequested => {
                info!("Close requested, shutting down...");
                elwt.exit();
            }
            WindowEvent::Resized(size) => {
                debug!(width = size.width, height = size.height, "Window resized");
                if let Err(e) = renderer.resize(size.width, size.height) {
                    error!("Resize failed: {}", e);
                    failure = Some(e);
                    elwt.exit();
                }
            }
            WindowEvent::RedrawRequested => {
                if let Err(e) = renderer.draw() {
                    if e.is_device_lost() {
                        error!("GPU device lost: {}", e);
                    } else {
                        error!("Draw failed: {}", e);
                    }
                    failure = Some(e);
                    elwt.exit();
                }
            }
            _ => (),
        },
        Event::AboutToWait => renderer.request_redraw(),
        _ => (),
    }).context("Event loop failed")?;

    log_stats(&renderer);
    match failure {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}

fn log_stats(renderer: &Renderer) {
    let stats = renderer.stats();
    info!(
        backend = renderer.backend_name(),
        frames = stats.total_frames(),
        fps = stats.fps(),
        gpu_waits = stats.gpu_waits(),
        avg_wait_ms = stats.average_wait_ms(),
        "Frame statistics"
    );
}
