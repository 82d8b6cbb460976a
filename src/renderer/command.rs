//! 命令录制模块
//!
//! - `CommandEncoder`：命令列表的状态机，拒绝错误顺序的 reset/close/submit
//! - `CommandRecorder`：录制闭包拿到的接口，屏障由资源状态跟踪器推导，清除、
//!   拷贝和上传在录制前检查资源状态

use crate::core::error::{GraphicsError, Result};
use crate::gfx::backend::GraphicsBackend;
use super::resource::{ResourceId, ResourceState, ResourceStateTracker};

/// 命令列表状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandListState {
    /// 初始状态（创建后已关闭）
    Initial,
    /// 正在记录
    Recording,
    /// 已完成记录
    Executable,
    /// 已提交，GPU 可能仍在执行
    Pending,
}

/// 命令编码器
///
/// 只跟踪状态，实际的命令列表在后端中。
#[derive(Debug)]
pub struct CommandEncoder {
    state: CommandListState,
}

impl Default for CommandEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandEncoder {
    /// 创建新的命令编码器
    pub fn new() -> Self {
        Self {
            state: CommandListState::Initial,
        }
    }

    /// 开始记录命令
    ///
    /// D3D12 命令列表提交后即可重置，所以 Pending 也允许。
    pub fn begin(&mut self) -> Result<()> {
        match self.state {
            CommandListState::Initial | CommandListState::Executable | CommandListState::Pending => {
                self.state = CommandListState::Recording;
                Ok(())
            }
            CommandListState::Recording => Err(GraphicsError::CommandExecution(
                "Command list is already recording".to_string(),
            ).into()),
        }
    }

    /// 结束记录命令
    pub fn end(&mut self) -> Result<()> {
        match self.state {
            CommandListState::Recording => {
                self.state = CommandListState::Executable;
                Ok(())
            }
            state => Err(GraphicsError::CommandExecution(
                format!("Cannot close command list in state {:?}", state),
            ).into()),
        }
    }

    /// 标记已提交
    pub fn submit(&mut self) -> Result<()> {
        match self.state {
            CommandListState::Executable => {
                self.state = CommandListState::Pending;
                Ok(())
            }
            state => Err(GraphicsError::CommandExecution(
                format!("Cannot submit command list in state {:?}", state),
            ).into()),
        }
    }

    /// 放弃当前录制
    pub fn reset(&mut self) {
        self.state = CommandListState::Initial;
    }

    /// 获取当前状态
    pub fn state(&self) -> CommandListState {
        self.state
    }

    /// 是否正在录制
    pub fn is_recording(&self) -> bool {
        self.state == CommandListState::Recording
    }
}

/// 命令录制器
///
/// 帧录制和一次性提交共用。
pub struct CommandRecorder<'a, B: GraphicsBackend> {
    backend: &'a mut B,
    tracker: &'a mut ResourceStateTracker,
}

impl<'a, B: GraphicsBackend> CommandRecorder<'a, B> {
    pub(crate) fn new(backend: &'a mut B, tracker: &'a mut ResourceStateTracker) -> Self {
        Self { backend, tracker }
    }

    /// 把资源转换到 `after` 状态（已经处于该状态时不录制屏障）
    pub fn transition(&mut self, resource: ResourceId, after: ResourceState) -> Result<()> {
        if let Some(transition) = self.tracker.transition(resource, after)? {
            self.backend.resource_barrier(transition)?;
        }
        Ok(())
    }

    /// 清除渲染目标
    pub fn clear(&mut self, target: ResourceId, color: [f32; 4]) -> Result<()> {
        self.tracker.require(target, ResourceState::RenderTarget)?;
        self.backend.clear_render_target(target, color)
    }

    /// 清除深度缓冲
    pub fn clear_depth(&mut self, target: ResourceId, depth: f32) -> Result<()> {
        self.tracker.require(target, ResourceState::DepthWrite)?;
        self.backend.clear_depth(target, depth)
    }

    /// 拷贝整个纹理
    pub fn copy(&mut self, src: ResourceId, dst: ResourceId) -> Result<()> {
        self.tracker.require(src, ResourceState::CopySource)?;
        self.tracker.require(dst, ResourceState::CopyDest)?;
        self.backend.copy_texture(src, dst)
    }

    /// 经由暂存缓冲把 `data` 拷贝到缓冲开头（缓冲需处于 CopyDest）
    pub fn upload(&mut self, dst: ResourceId, data: &[u8]) -> Result<()> {
        self.tracker.require(dst, ResourceState::CopyDest)?;
        self.backend.upload_buffer(dst, data)
    }

    /// 资源当前状态
    pub fn state(&self, resource: ResourceId) -> Option<ResourceState> {
        self.tracker.state(resource)
    }
}
