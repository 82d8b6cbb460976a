//! 每帧录制的渲染通道
//!
//! - 直接模式：清除后台缓冲
//! - 离屏模式：清除离屏纹理，再整体拷贝到后台缓冲
//!
//! 启用深度缓冲时每帧在颜色清除之后把深度清为 1.0。深度缓冲常驻 DepthWrite，
//! 不需要屏障，窗口尺寸变化时重建。启用网格上传时，初始化阶段把一个三角形的
//! 顶点/索引缓冲上传到默认堆。
//!
//! 离屏纹理常驻 CopySource 状态，每帧的屏障序列：
//!
//! ```text
//! 离屏纹理  CopySource   → RenderTarget，清除，RenderTarget → CopySource
//! 后台缓冲  RenderTarget → CopyDest，拷贝，CopyDest → RenderTarget
//! ```

use tracing::{debug, info, warn};

use crate::core::config::{GraphicsConfig, SceneConfig};
use crate::core::error::Result;
use crate::gfx::backend::GraphicsBackend;
use super::cycle::{Frame, FrameCycle, FrameInfo};
use super::mesh::{Mesh, MeshData};
use super::metrics::FrameStats;
use super::resource::{ResourceId, ResourceState};

/// 清屏颜色红色分量每帧的增量
const RED_STEP: f64 = 0.0001;

/// 深度缓冲每帧的清除值
const DEPTH_CLEAR: f32 = 1.0;

/// 帧渲染器
pub struct FrameRenderer<B: GraphicsBackend> {
    cycle: FrameCycle<B>,
    scene: SceneConfig,
    offscreen: Option<ResourceId>,
    depth: Option<ResourceId>,
    mesh: Option<Mesh>,
    paused: bool,
}

impl<B: GraphicsBackend> FrameRenderer<B> {
    /// 创建帧渲染器
    pub fn new(backend: B, graphics: &GraphicsConfig, scene: &SceneConfig) -> Result<Self> {
        let mut cycle = FrameCycle::new(backend, graphics.pacing, graphics.vsync)?;

        let offscreen = if graphics.render_to_texture {
            Some(create_offscreen(&mut cycle)?)
        } else {
            None
        };
        let depth = if scene.depth_buffer {
            Some(create_depth(&mut cycle)?)
        } else {
            None
        };
        let mesh = if scene.upload_mesh {
            Some(Mesh::upload(&mut cycle, &MeshData::triangle())?)
        } else {
            None
        };

        info!(
            backend = cycle.backend().backend_name(),
            frames = cycle.ring().slot_count(),
            pacing = ?graphics.pacing,
            offscreen = offscreen.is_some(),
            depth = depth.is_some(),
            mesh = mesh.is_some(),
            "Frame renderer ready"
        );

        Ok(Self {
            cycle,
            scene: scene.clone(),
            offscreen,
            depth,
            mesh,
            paused: false,
        })
    }

    /// 绘制一帧
    ///
    /// 窗口最小化时返回 `Ok(None)`。
    pub fn draw(&mut self) -> Result<Option<FrameInfo>> {
        if self.paused {
            return Ok(None);
        }

        let color = self.clear_color(self.cycle.frame_number());
        let offscreen = self.offscreen;
        let depth = self.depth;

        let info = self.cycle.render_frame(|frame| match offscreen {
            Some(texture) => record_offscreen(frame, texture, depth, color),
            None => record_direct(frame, depth, color),
        })?;
        Ok(Some(info))
    }

    /// 窗口尺寸变化
    ///
    /// 尺寸为 0 时暂停绘制，直到下一次非零的尺寸变化。
    pub fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        if width == 0 || height == 0 {
            if !self.paused {
                debug!("Drawing paused");
            }
            self.paused = true;
            return Ok(());
        }

        self.paused = false;
        if self.cycle.backend().extent() == (width, height) {
            return Ok(());
        }

        self.cycle.resize(width, height)?;

        if let Some(texture) = self.offscreen.take() {
            self.cycle.release_resource(texture)?;
            self.offscreen = Some(create_offscreen(&mut self.cycle)?);
        }
        if let Some(depth) = self.depth.take() {
            self.cycle.release_resource(depth)?;
            self.depth = Some(create_depth(&mut self.cycle)?);
        }
        Ok(())
    }

    /// 第 `frame_number` 帧的清屏颜色
    ///
    /// 红色分量超过 1.0 之后回绕，正好等于 1.0 时保持不变。
    pub fn clear_color(&self, frame_number: u64) -> [f32; 4] {
        let mut color = self.scene.clear_color;
        if self.scene.animate {
            let red = color[0] as f64 + frame_number as f64 * RED_STEP;
            let red = if red > 1.0 { red % 1.0 } else { red };
            color[0] = red as f32;
        }
        color
    }

    /// 等待 GPU 空闲
    pub fn flush(&mut self) -> Result<()> {
        self.cycle.flush()
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn offscreen(&self) -> Option<ResourceId> {
        self.offscreen
    }

    pub fn depth(&self) -> Option<ResourceId> {
        self.depth
    }

    pub fn mesh(&self) -> Option<&Mesh> {
        self.mesh.as_ref()
    }

    pub fn stats(&self) -> &FrameStats {
        self.cycle.stats()
    }

    pub fn cycle(&self) -> &FrameCycle<B> {
        &self.cycle
    }

    pub fn backend_name(&self) -> &str {
        self.cycle.backend().backend_name()
    }
}

impl<B: GraphicsBackend> Drop for FrameRenderer<B> {
    fn drop(&mut self) {
        let resources = self.offscreen.take().into_iter().chain(self.depth.take());
        for resource in resources {
            if let Err(e) = self.cycle.release_resource(resource) {
                warn!("Failed to release {}: {}", resource, e);
            }
        }
        if let Some(mesh) = self.mesh.take() {
            if let Err(e) = mesh.release(&mut self.cycle) {
                warn!("Failed to release mesh: {}", e);
            }
        }
    }
}

/// 创建与后台缓冲同尺寸的离屏纹理，并转换到 CopySource
fn create_offscreen<B: GraphicsBackend>(cycle: &mut FrameCycle<B>) -> Result<ResourceId> {
    let (width, height) = cycle.backend().extent();
    let texture = cycle.create_render_texture(width, height)?;
    cycle.run_immediate(|cmd| cmd.transition(texture, ResourceState::CopySource))?;
    debug!(%texture, width, height, "Offscreen target created");
    Ok(texture)
}

/// 创建与后台缓冲同尺寸的深度缓冲
fn create_depth<B: GraphicsBackend>(cycle: &mut FrameCycle<B>) -> Result<ResourceId> {
    let (width, height) = cycle.backend().extent();
    let depth = cycle.create_depth_target(width, height)?;
    debug!(%depth, width, height, "Depth buffer created");
    Ok(depth)
}

fn record_direct<B: GraphicsBackend>(
    frame: &mut Frame<'_, B>,
    depth: Option<ResourceId>,
    color: [f32; 4],
) -> Result<()> {
    let target = frame.back_buffer();
    frame.clear(target, color)?;
    if let Some(depth) = depth {
        frame.clear_depth(depth, DEPTH_CLEAR)?;
    }
    Ok(())
}

fn record_offscreen<B: GraphicsBackend>(
    frame: &mut Frame<'_, B>,
    texture: ResourceId,
    depth: Option<ResourceId>,
    color: [f32; 4],
) -> Result<()> {
    let back_buffer = frame.back_buffer();

    frame.transition(texture, ResourceState::RenderTarget)?;
    frame.clear(texture, color)?;
    if let Some(depth) = depth {
        frame.clear_depth(depth, DEPTH_CLEAR)?;
    }
    frame.transition(texture, ResourceState::CopySource)?;

    frame.transition(back_buffer, ResourceState::CopyDest)?;
    frame.copy(texture, back_buffer)?;
    frame.transition(back_buffer, ResourceState::RenderTarget)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::{Config, FramePacing};
    use crate::gfx::null::{NullBackend, NullEvent};
    use crate::renderer::resource::Transition;

    fn renderer(render_to_texture: bool) -> FrameRenderer<NullBackend> {
        let mut config = Config::default();
        config.graphics.render_to_texture = render_to_texture;
        config.graphics.pacing = FramePacing::Pipelined;
        let backend = NullBackend::new(2, 64, 48, 1);
        FrameRenderer::new(backend, &config.graphics, &config.scene).unwrap()
    }

    fn barrier(resource: ResourceId, before: ResourceState, after: ResourceState) -> NullEvent {
        NullEvent::Barrier(Transition { resource, before, after })
    }

    #[test]
    fn test_direct_clear() {
        let mut renderer = renderer(false);
        let info = renderer.draw().unwrap().unwrap();
        let back = ResourceId::BackBuffer(info.slot);

        let depth = renderer.depth().unwrap();

        let expected = vec![
            barrier(back, ResourceState::Present, ResourceState::RenderTarget),
            NullEvent::Clear { target: back, color: renderer.clear_color(0) },
            NullEvent::ClearDepth { target: depth, depth: 1.0 },
            barrier(back, ResourceState::RenderTarget, ResourceState::Present),
        ];
        assert_eq!(renderer.cycle().backend().last_submission(), expected.as_slice());
    }

    #[test]
    fn test_offscreen_barrier_sequence() {
        let mut renderer = renderer(true);
        let texture = renderer.offscreen().unwrap();
        assert_eq!(renderer.cycle().tracker().state(texture), Some(ResourceState::CopySource));

        let info = renderer.draw().unwrap().unwrap();
        let back = ResourceId::BackBuffer(info.slot);
        let depth = renderer.depth().unwrap();

        let expected = vec![
            barrier(back, ResourceState::Present, ResourceState::RenderTarget),
            barrier(texture, ResourceState::CopySource, ResourceState::RenderTarget),
            NullEvent::Clear { target: texture, color: renderer.clear_color(0) },
            NullEvent::ClearDepth { target: depth, depth: 1.0 },
            barrier(texture, ResourceState::RenderTarget, ResourceState::CopySource),
            barrier(back, ResourceState::RenderTarget, ResourceState::CopyDest),
            NullEvent::Copy { src: texture, dst: back },
            barrier(back, ResourceState::CopyDest, ResourceState::RenderTarget),
            barrier(back, ResourceState::RenderTarget, ResourceState::Present),
        ];
        assert_eq!(renderer.cycle().backend().last_submission(), expected.as_slice());
    }

    #[test]
    fn test_zero_size_pauses() {
        let mut renderer = renderer(false);
        renderer.resize(0, 48).unwrap();
        assert!(renderer.is_paused());
        assert_eq!(renderer.draw().unwrap(), None);

        renderer.resize(64, 48).unwrap();
        assert!(!renderer.is_paused());
        assert!(renderer.draw().unwrap().is_some());
    }

    #[test]
    fn test_resize_recreates_offscreen() {
        let mut renderer = renderer(true);
        renderer.draw().unwrap();
        let old = renderer.offscreen().unwrap();

        renderer.resize(128, 96).unwrap();
        let new = renderer.offscreen().unwrap();
        assert_ne!(old, new);
        assert_eq!(renderer.cycle().tracker().state(old), None);
        assert_eq!(renderer.cycle().tracker().state(new), Some(ResourceState::CopySource));
        assert_eq!(renderer.cycle().backend().texture_count(), 1);

        renderer.draw().unwrap();
    }

    #[test]
    fn test_resize_recreates_depth() {
        let mut renderer = renderer(false);
        let old = renderer.depth().unwrap();
        assert_eq!(renderer.cycle().tracker().state(old), Some(ResourceState::DepthWrite));

        renderer.resize(128, 96).unwrap();
        let new = renderer.depth().unwrap();
        assert_ne!(old, new);
        assert_eq!(renderer.cycle().backend().depth_extent(old), None);
        assert_eq!(renderer.cycle().backend().depth_extent(new), Some((128, 96)));
        assert_eq!(renderer.cycle().tracker().state(new), Some(ResourceState::DepthWrite));

        let info = renderer.draw().unwrap().unwrap();
        assert!(renderer.cycle().backend().last_submission().contains(&NullEvent::ClearDepth { target: new, depth: 1.0 }));
        assert_eq!(info.frame_number, 0);
    }

    #[test]
    fn test_mesh_uploaded_at_startup() {
        let renderer = renderer(false);
        let mesh = renderer.mesh().unwrap();
        let tracker = renderer.cycle().tracker();
        assert_eq!(tracker.state(mesh.vertex_buffer()), Some(ResourceState::VertexAndConstantBuffer));
        assert_eq!(tracker.state(mesh.index_buffer()), Some(ResourceState::IndexBuffer));
        assert_eq!(mesh.index_count(), 3);
        assert_eq!(renderer.cycle().backend().pending_signals(), 0);
    }

    #[test]
    fn test_depth_and_mesh_disabled() {
        let mut config = Config::default();
        config.scene.depth_buffer = false;
        config.scene.upload_mesh = false;
        let backend = NullBackend::new(2, 64, 48, 1);
        let mut renderer = FrameRenderer::new(backend, &config.graphics, &config.scene).unwrap();

        assert_eq!(renderer.depth(), None);
        assert!(renderer.mesh().is_none());
        assert_eq!(renderer.cycle().backend().resource_count(), 0);

        renderer.draw().unwrap();
        assert_eq!(renderer.cycle().backend().last_submission().len(), 3);
    }

    #[test]
    fn test_clear_color_animation() {
        let mut renderer = renderer(false);
        assert_eq!(renderer.clear_color(0), [0.0, 0.2, 0.4, 1.0]);
        assert!((renderer.clear_color(5000)[0] - 0.5).abs() < 1e-4);
        assert!(renderer.clear_color(10_001)[0] < 0.01);

        // 1.0 不回绕
        renderer.scene.clear_color[0] = 1.0;
        assert_eq!(renderer.clear_color(0)[0], 1.0);
        assert!(renderer.clear_color(1)[0] < 0.01);
        renderer.scene.clear_color[0] = 0.0;

        renderer.scene.animate = false;
        assert_eq!(renderer.clear_color(5000), [0.0, 0.2, 0.4, 1.0]);
    }

    #[test]
    fn test_frames_counted() {
        let mut renderer = renderer(true);
        for _ in 0..5 {
            renderer.draw().unwrap();
        }
        renderer.flush().unwrap();
        assert_eq!(renderer.stats().total_frames(), 5);
    }
}
