//! 资源管理模块
//!
//! - `ResourceId` / `ResourceState`：与图形 API 无关的资源句柄和资源状态
//!   （后台缓冲、离屏纹理、深度缓冲、顶点/索引缓冲）
//! - `ResourceStateTracker`：记录每个资源当前所处的状态，用来生成转换屏障并
//!   检查操作的前置状态
//! - `FrameSlot` / `FrameRing`：每个交换链缓冲对应一个帧槽（命令分配器 + fence）

use std::collections::HashMap;
use std::fmt;

use crate::core::error::{ConfigError, GraphicsError, Result};
use super::sync::{FenceValue, SlotFence};

/// 资源句柄
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceId {
    /// 交换链的第 n 个后台缓冲
    BackBuffer(usize),
    /// 后端创建的离屏纹理
    Texture(u32),
    /// 默认堆上的缓冲（顶点、索引）
    Buffer(u32),
    /// 深度缓冲
    Depth(u32),
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceId::BackBuffer(i) => write!(f, "back buffer {}", i),
            ResourceId::Texture(n) => write!(f, "texture {}", n),
            ResourceId::Buffer(n) => write!(f, "buffer {}", n),
            ResourceId::Depth(n) => write!(f, "depth buffer {}", n),
        }
    }
}

/// 资源状态
///
/// 对应 D3D12_RESOURCE_STATES 中本项目用到的几个状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceState {
    /// 刚创建的资源
    Common,
    /// 可以呈现
    Present,
    /// 输出合并阶段的渲染目标
    RenderTarget,
    /// 拷贝源
    CopySource,
    /// 拷贝目标
    CopyDest,
    /// 顶点缓冲或常量缓冲
    VertexAndConstantBuffer,
    /// 索引缓冲
    IndexBuffer,
    /// 可写的深度缓冲
    DepthWrite,
}

/// 一次状态转换
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub resource: ResourceId,
    pub before: ResourceState,
    pub after: ResourceState,
}

/// 资源状态跟踪器
#[derive(Debug, Clone, Default)]
pub struct ResourceStateTracker {
    states: HashMap<ResourceId, ResourceState>,
}

impl ResourceStateTracker {
    /// 创建空的跟踪器
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记资源及其当前状态（已登记的会被覆盖）
    pub fn register(&mut self, resource: ResourceId, state: ResourceState) {
        self.states.insert(resource, state);
    }

    /// 移除资源
    pub fn remove(&mut self, resource: ResourceId) -> Option<ResourceState> {
        self.states.remove(&resource)
    }

    /// 移除所有后台缓冲
    pub fn remove_back_buffers(&mut self) {
        self.states.retain(|id, _| !matches!(id, ResourceId::BackBuffer(_)));
    }

    /// 查询资源当前状态
    pub fn state(&self, resource: ResourceId) -> Option<ResourceState> {
        self.states.get(&resource).copied()
    }

    /// 把资源转换到 `after`
    ///
    /// 资源已处于 `after` 时返回 `Ok(None)`，不需要屏障。
    pub fn transition(&mut self, resource: ResourceId, after: ResourceState) -> Result<Option<Transition>> {
        let before = self.states.get_mut(&resource).ok_or(GraphicsError::InvalidResourceState {
            resource,
            expected: after,
            actual: None,
        })?;

        if *before == after {
            return Ok(None);
        }

        let transition = Transition { resource, before: *before, after };
        *before = after;
        Ok(Some(transition))
    }

    /// 检查资源处于 `expected` 状态
    pub fn require(&self, resource: ResourceId, expected: ResourceState) -> Result<()> {
        match self.state(resource) {
            Some(actual) if actual == expected => Ok(()),
            actual => Err(GraphicsError::InvalidResourceState { resource, expected, actual }.into()),
        }
    }
}

/// 帧槽
///
/// 每个交换链缓冲一个：持有一个命令分配器（在后端中）和一个 fence。
#[derive(Debug, Clone)]
pub struct FrameSlot {
    /// 帧槽索引
    pub index: usize,
    /// 该帧槽的 fence 记录
    pub fence: SlotFence,
    /// 该帧槽的提交被录制的次数
    pub submissions: u64,
}

impl FrameSlot {
    /// 创建新的帧槽
    pub fn new(index: usize) -> Self {
        Self {
            index,
            fence: SlotFence::new(),
            submissions: 0,
        }
    }

    /// 记录一次提交
    pub fn mark_submitted(&mut self, value: FenceValue) {
        self.fence.mark_signaled(value);
        self.submissions += 1;
    }
}

/// 帧槽环
///
/// 按交换链后台缓冲索引访问，而不是按顺序轮转：下一个帧槽由呈现引擎决定。
#[derive(Debug)]
pub struct FrameRing {
    slots: Vec<FrameSlot>,
}

impl FrameRing {
    /// 最少帧槽数
    pub const MIN_FRAMES: usize = 2;
    /// 最多帧槽数
    pub const MAX_FRAMES: usize = 3;

    /// 创建帧槽环
    ///
    /// # 参数
    ///
    /// * `count` - 帧槽数量（2 或 3）
    pub fn new(count: usize) -> Result<Self> {
        if !(Self::MIN_FRAMES..=Self::MAX_FRAMES).contains(&count) {
            return Err(ConfigError::InvalidValue {
                field: "frame_count".to_string(),
                reason: format!("{} frame slots requested, expected 2 or 3", count),
            }.into());
        }

        Ok(Self {
            slots: (0..count).map(FrameSlot::new).collect(),
        })
    }

    /// 帧槽数量
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// 检查索引有效
    pub fn check(&self, slot: usize) -> Result<usize> {
        if slot < self.slots.len() {
            Ok(slot)
        } else {
            Err(GraphicsError::InvalidFrameSlot { slot, frame_count: self.slots.len() }.into())
        }
    }

    /// 获取帧槽，索引越界时返回错误
    pub fn slot(&self, slot: usize) -> Result<&FrameSlot> {
        let frame_count = self.slots.len();
        self.slots.get(slot).ok_or_else(|| GraphicsError::InvalidFrameSlot { slot, frame_count }.into())
    }

    /// 获取帧槽的可变引用，索引越界时返回错误
    pub fn slot_mut(&mut self, slot: usize) -> Result<&mut FrameSlot> {
        let frame_count = self.slots.len();
        self.slots.get_mut(slot).ok_or_else(|| GraphicsError::InvalidFrameSlot { slot, frame_count }.into())
    }

    /// 根据索引获取帧槽
    pub fn get(&self, slot: usize) -> Option<&FrameSlot> {
        self.slots.get(slot)
    }

    /// 遍历所有帧槽
    pub fn iter(&self) -> impl Iterator<Item = &FrameSlot> {
        self.slots.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracker_transition() {
        let mut tracker = ResourceStateTracker::new();
        let back = ResourceId::BackBuffer(0);
        tracker.register(back, ResourceState::Present);

        let t = tracker.transition(back, ResourceState::RenderTarget).unwrap().unwrap();
        assert_eq!(t.before, ResourceState::Present);
        assert_eq!(t.after, ResourceState::RenderTarget);
        assert_eq!(tracker.state(back), Some(ResourceState::RenderTarget));

        // 已经在目标状态，不需要屏障
        assert!(tracker.transition(back, ResourceState::RenderTarget).unwrap().is_none());
    }

    #[test]
    fn test_tracker_untracked_resource() {
        let mut tracker = ResourceStateTracker::new();
        assert!(tracker.transition(ResourceId::Texture(3), ResourceState::CopyDest).is_err());
        assert!(tracker.require(ResourceId::Texture(3), ResourceState::CopyDest).is_err());
    }

    #[test]
    fn test_tracker_require() {
        let mut tracker = ResourceStateTracker::new();
        let tex = ResourceId::Texture(0);
        tracker.register(tex, ResourceState::CopySource);
        assert!(tracker.require(tex, ResourceState::CopySource).is_ok());
        assert!(tracker.require(tex, ResourceState::RenderTarget).is_err());
    }

    #[test]
    fn test_remove_back_buffers() {
        let mut tracker = ResourceStateTracker::new();
        tracker.register(ResourceId::BackBuffer(0), ResourceState::Present);
        tracker.register(ResourceId::BackBuffer(1), ResourceState::Present);
        tracker.register(ResourceId::Texture(0), ResourceState::CopySource);

        tracker.remove_back_buffers();
        assert_eq!(tracker.state(ResourceId::BackBuffer(0)), None);
        assert_eq!(tracker.state(ResourceId::Texture(0)), Some(ResourceState::CopySource));
    }

    #[test]
    fn test_resource_display() {
        assert_eq!(ResourceId::Buffer(2).to_string(), "buffer 2");
        assert_eq!(ResourceId::Depth(0).to_string(), "depth buffer 0");
    }

    #[test]
    fn test_frame_ring_bounds() {
        assert!(FrameRing::new(1).is_err());
        assert!(FrameRing::new(4).is_err());

        let ring = FrameRing::new(3).unwrap();
        assert_eq!(ring.slot_count(), 3);
        assert!(ring.check(2).is_ok());
        assert!(ring.check(3).is_err());
        assert_eq!(ring.get(1).map(|s| s.index), Some(1));
    }

    #[test]
    fn test_frame_slot_submission() {
        let mut ring = FrameRing::new(2).unwrap();
        let slot = ring.slot_mut(0).unwrap();
        let value = slot.fence.advance();
        slot.mark_submitted(value);

        assert_eq!(slot.submissions, 1);
        assert_eq!(slot.fence.signaled(), FenceValue::new(1));
    }
}
