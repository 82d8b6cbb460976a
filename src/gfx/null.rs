//! 模拟图形后端
//!
//! 没有窗口、也不访问 GPU：提交的命令只被记录下来，fence 的完成由一个
//! CPU 上的先进先出队列模拟。队列中未完成的 signal 超过 `gpu_latency` 个时，
//! 最早的一个被"执行完毕"；CPU 等待某个 fence 值时，队列被依次排空直到到达该值。
//!
//! 上传到缓冲的数据在一次性命令列表"执行"时才写入缓冲，可以用
//! `buffer_contents` 检查。
//!
//! 和 D3D12 调试层一样，这个后端会拒绝在帧槽提交未完成时重置它的命令分配器，
//! 也会拒绝在 GPU 忙碌时调整交换链尺寸。等待一个从未 signal 的值会立即返回
//! `FenceNeverSignaled`，而不是永远阻塞。

use std::collections::{HashMap, VecDeque};

use tracing::{debug, trace};

use crate::core::error::{GraphicsError, Result};
use crate::gfx::backend::GraphicsBackend;
use crate::renderer::resource::{ResourceId, Transition};
use crate::renderer::sync::FenceValue;

/// 历史记录最多保留的事件数
const HISTORY_LIMIT: usize = 1024;

/// 模拟后端记录的事件
#[derive(Debug, Clone, PartialEq)]
pub enum NullEvent {
    /// 帧槽命令分配器被重置
    Reset { slot: usize },
    /// 一次性命令列表开始录制
    BeginImmediate,
    /// 状态转换屏障
    Barrier(Transition),
    /// 清除渲染目标
    Clear { target: ResourceId, color: [f32; 4] },
    /// 清除深度缓冲
    ClearDepth { target: ResourceId, depth: f32 },
    /// 纹理拷贝
    Copy { src: ResourceId, dst: ResourceId },
    /// 从暂存缓冲拷贝到缓冲
    Upload { dst: ResourceId, bytes: usize },
    /// 命令列表被提交
    Execute { commands: usize },
    /// 帧槽 fence 被 signal
    Signal { slot: usize, value: FenceValue },
    /// CPU 阻塞等待
    Wait { slot: usize, value: FenceValue },
    /// 呈现
    Present { back_buffer: usize },
    /// 交换链尺寸变化
    Resize { width: u32, height: u32 },
}

/// 队列中的 signal
#[derive(Debug, Clone, Copy)]
enum PendingSignal {
    Slot { slot: usize, value: FenceValue },
    Immediate { value: FenceValue },
}

/// 当前录制的命令列表
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Recording {
    Frame(usize),
    Immediate,
}

/// 模拟后端
pub struct NullBackend {
    frame_count: usize,
    width: u32,
    height: u32,
    back_buffer_index: usize,
    gpu_latency: usize,

    completed: Vec<FenceValue>,
    signaled: Vec<FenceValue>,
    queue: VecDeque<PendingSignal>,

    immediate_completed: FenceValue,
    immediate_signaled: FenceValue,

    recording: Option<Recording>,
    current_commands: Vec<NullEvent>,
    last_submission: Vec<NullEvent>,

    textures: HashMap<u32, (u32, u32)>,
    buffers: HashMap<u32, Vec<u8>>,
    depth_targets: HashMap<u32, (u32, u32)>,
    pending_uploads: Vec<(u32, Vec<u8>)>,
    next_resource: u32,

    history: VecDeque<NullEvent>,
    wait_count: u64,
    max_in_flight: usize,
}

impl NullBackend {
    /// 创建模拟后端
    ///
    /// # 参数
    ///
    /// * `frame_count` - 交换链缓冲数量
    /// * `width` / `height` - 后台缓冲尺寸
    /// * `gpu_latency` - 允许多少个 signal 保持未完成
    pub fn new(frame_count: usize, width: u32, height: u32, gpu_latency: usize) -> Self {
        debug!(frame_count, width, height, gpu_latency, "Null backend created");

        Self {
            frame_count,
            width,
            height,
            back_buffer_index: 0,
            gpu_latency,
            completed: vec![FenceValue::INITIAL; frame_count],
            signaled: vec![FenceValue::INITIAL; frame_count],
            queue: VecDeque::new(),
            immediate_completed: FenceValue::INITIAL,
            immediate_signaled: FenceValue::INITIAL,
            recording: None,
            current_commands: Vec::new(),
            last_submission: Vec::new(),
            textures: HashMap::new(),
            buffers: HashMap::new(),
            depth_targets: HashMap::new(),
            pending_uploads: Vec::new(),
            next_resource: 0,
            history: VecDeque::new(),
            wait_count: 0,
            max_in_flight: 0,
        }
    }

    /// 最近的事件（最多保留 1024 条）
    pub fn history(&self) -> impl Iterator<Item = &NullEvent> {
        self.history.iter()
    }

    /// 清空事件历史
    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    /// 最后一次提交的命令
    pub fn last_submission(&self) -> &[NullEvent] {
        &self.last_submission
    }

    /// CPU 实际阻塞等待的次数
    pub fn wait_count(&self) -> u64 {
        self.wait_count
    }

    /// 曾经同时未完成的帧提交数量的最大值
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight
    }

    /// 当前未完成的 signal 数量
    pub fn pending_signals(&self) -> usize {
        self.queue.len()
    }

    /// 存活的离屏纹理数量
    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    /// 存活的纹理、缓冲和深度缓冲总数
    pub fn resource_count(&self) -> usize {
        self.textures.len() + self.buffers.len() + self.depth_targets.len()
    }

    /// 缓冲当前的内容
    pub fn buffer_contents(&self, buffer: ResourceId) -> Option<&[u8]> {
        match buffer {
            ResourceId::Buffer(id) => self.buffers.get(&id).map(Vec::as_slice),
            _ => None,
        }
    }

    /// 深度缓冲尺寸
    pub fn depth_extent(&self, depth: ResourceId) -> Option<(u32, u32)> {
        match depth {
            ResourceId::Depth(id) => self.depth_targets.get(&id).copied(),
            _ => None,
        }
    }

    fn log(&mut self, event: NullEvent) {
        if self.history.len() == HISTORY_LIMIT {
            self.history.pop_front();
        }
        self.history.push_back(event);
    }

    fn record(&mut self, event: NullEvent) -> Result<()> {
        if self.recording.is_none() {
            return Err(GraphicsError::CommandExecution(
                format!("{:?} recorded outside of a command list", event),
            ).into());
        }
        self.current_commands.push(event.clone());
        self.log(event);
        Ok(())
    }

    fn check_slot(&self, slot: usize) -> Result<()> {
        if slot < self.frame_count {
            Ok(())
        } else {
            Err(GraphicsError::InvalidFrameSlot { slot, frame_count: self.frame_count }.into())
        }
    }

    fn check_resource(&self, resource: ResourceId) -> Result<()> {
        let known = match resource {
            ResourceId::BackBuffer(i) => i < self.frame_count,
            ResourceId::Texture(n) => self.textures.contains_key(&n),
            ResourceId::Buffer(n) => self.buffers.contains_key(&n),
            ResourceId::Depth(n) => self.depth_targets.contains_key(&n),
        };
        if known {
            Ok(())
        } else {
            Err(GraphicsError::CommandExecution(format!("Unknown resource: {}", resource)).into())
        }
    }

    /// "执行"队列中最早的一个 signal
    fn retire_one(&mut self) -> bool {
        match self.queue.pop_front() {
            Some(PendingSignal::Slot { slot, value }) => {
                self.completed[slot] = value;
                true
            }
            Some(PendingSignal::Immediate { value }) => {
                self.immediate_completed = value;
                true
            }
            None => false,
        }
    }

    fn retire_to_latency(&mut self) {
        while self.queue.len() > self.gpu_latency {
            self.retire_one();
        }
    }

    fn is_idle(&self) -> bool {
        self.queue.is_empty()
    }

    fn allocate_id(&mut self) -> u32 {
        let id = self.next_resource;
        self.next_resource += 1;
        id
    }

    fn finish_recording(&mut self) -> Result<Recording> {
        let recording = self.recording.take().ok_or_else(|| {
            GraphicsError::CommandExecution("No command list is recording".to_string())
        })?;
        self.last_submission = std::mem::take(&mut self.current_commands);
        self.log(NullEvent::Execute { commands: self.last_submission.len() });
        Ok(recording)
    }
}

impl GraphicsBackend for NullBackend {
    fn backend_name(&self) -> &str {
        "Null"
    }

    fn frame_count(&self) -> usize {
        self.frame_count
    }

    fn extent(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn current_back_buffer_index(&self) -> usize {
        self.back_buffer_index
    }

    fn completed_value(&self, slot: usize) -> Result<FenceValue> {
        self.check_slot(slot)?;
        Ok(self.completed[slot])
    }

    fn wait_for_value(&mut self, slot: usize, value: FenceValue) -> Result<()> {
        self.check_slot(slot)?;
        self.wait_count += 1;
        self.log(NullEvent::Wait { slot, value });

        while self.completed[slot] < value {
            if !self.retire_one() {
                return Err(GraphicsError::FenceNeverSignaled {
                    slot,
                    value: value.value(),
                    completed: self.completed[slot].value(),
                }.into());
            }
        }
        Ok(())
    }

    fn reset_command_list(&mut self, slot: usize) -> Result<()> {
        self.check_slot(slot)?;
        if self.completed[slot] < self.signaled[slot] {
            return Err(GraphicsError::SlotInFlight {
                slot,
                signaled: self.signaled[slot].value(),
                completed: self.completed[slot].value(),
            }.into());
        }
        if self.recording.is_some() {
            return Err(GraphicsError::CommandExecution(
                "Command list reset while still recording".to_string(),
            ).into());
        }

        self.recording = Some(Recording::Frame(slot));
        self.current_commands.clear();
        self.log(NullEvent::Reset { slot });
        Ok(())
    }

    fn resource_barrier(&mut self, transition: Transition) -> Result<()> {
        self.check_resource(transition.resource)?;
        self.record(NullEvent::Barrier(transition))
    }

    fn clear_render_target(&mut self, target: ResourceId, color: [f32; 4]) -> Result<()> {
        self.check_resource(target)?;
        self.record(NullEvent::Clear { target, color })
    }

    fn clear_depth(&mut self, target: ResourceId, depth: f32) -> Result<()> {
        self.check_resource(target)?;
        self.record(NullEvent::ClearDepth { target, depth })
    }

    fn copy_texture(&mut self, src: ResourceId, dst: ResourceId) -> Result<()> {
        self.check_resource(src)?;
        self.check_resource(dst)?;
        self.record(NullEvent::Copy { src, dst })
    }

    fn upload_buffer(&mut self, dst: ResourceId, data: &[u8]) -> Result<()> {
        if self.recording != Some(Recording::Immediate) {
            return Err(GraphicsError::CommandExecution(
                "Buffer uploads must be recorded into an immediate command list".to_string(),
            ).into());
        }
        let id = match dst {
            ResourceId::Buffer(id) => id,
            _ => return Err(GraphicsError::CommandExecution(format!("{} is not a buffer", dst)).into()),
        };
        let size = self.buffers.get(&id)
            .ok_or_else(|| GraphicsError::CommandExecution(format!("Unknown resource: {}", dst)))?
            .len();
        if data.len() > size {
            return Err(GraphicsError::CommandExecution(format!(
                "{} bytes uploaded into {} of {} bytes",
                data.len(),
                dst,
                size
            )).into());
        }

        self.pending_uploads.push((id, data.to_vec()));
        self.record(NullEvent::Upload { dst, bytes: data.len() })
    }

    fn close_and_execute(&mut self) -> Result<()> {
        match self.recording {
            Some(Recording::Frame(_)) => self.finish_recording().map(|_| ()),
            _ => Err(GraphicsError::CommandExecution(
                "No frame command list is recording".to_string(),
            ).into()),
        }
    }

    fn discard_command_list(&mut self) -> Result<()> {
        let recording = self.recording.take().ok_or_else(|| {
            GraphicsError::CommandExecution("No command list is recording".to_string())
        })?;
        self.current_commands.clear();
        self.pending_uploads.clear();
        debug!(?recording, "Null command list discarded");
        Ok(())
    }

    fn signal(&mut self, slot: usize, value: FenceValue) -> Result<()> {
        self.check_slot(slot)?;
        if value <= self.signaled[slot] {
            return Err(GraphicsError::CommandExecution(format!(
                "Fence of slot {} signaled with {} after {}",
                slot,
                value.value(),
                self.signaled[slot].value()
            )).into());
        }

        self.signaled[slot] = value;
        self.queue.push_back(PendingSignal::Slot { slot, value });
        self.log(NullEvent::Signal { slot, value });

        let in_flight = self.queue.iter()
            .filter(|s| matches!(s, PendingSignal::Slot { .. }))
            .count();
        self.max_in_flight = self.max_in_flight.max(in_flight);

        self.retire_to_latency();
        Ok(())
    }

    fn present(&mut self, _vsync: bool) -> Result<()> {
        if self.recording.is_some() {
            return Err(GraphicsError::SwapchainError(
                "Present while a command list is still recording".to_string(),
            ).into());
        }

        self.log(NullEvent::Present { back_buffer: self.back_buffer_index });
        self.back_buffer_index = (self.back_buffer_index + 1) % self.frame_count;
        trace!(next = self.back_buffer_index, "Null present");
        Ok(())
    }

    fn begin_immediate(&mut self) -> Result<()> {
        if self.recording.is_some() {
            return Err(GraphicsError::CommandExecution(
                "Immediate submission while another command list is recording".to_string(),
            ).into());
        }
        self.recording = Some(Recording::Immediate);
        self.current_commands.clear();
        self.pending_uploads.clear();
        self.log(NullEvent::BeginImmediate);
        Ok(())
    }

    fn finish_immediate(&mut self) -> Result<()> {
        match self.recording {
            Some(Recording::Immediate) => {}
            _ => {
                return Err(GraphicsError::CommandExecution(
                    "No immediate command list is recording".to_string(),
                ).into())
            }
        }
        self.finish_recording()?;

        self.immediate_signaled.increment();
        let value = self.immediate_signaled;
        self.queue.push_back(PendingSignal::Immediate { value });

        while self.immediate_completed < value {
            self.retire_one();
        }

        for (id, data) in std::mem::take(&mut self.pending_uploads) {
            if let Some(buffer) = self.buffers.get_mut(&id) {
                buffer[..data.len()].copy_from_slice(&data);
            }
        }
        Ok(())
    }

    fn create_render_texture(&mut self, width: u32, height: u32) -> Result<ResourceId> {
        if width == 0 || height == 0 {
            return Err(GraphicsError::ResourceCreation(
                format!("Render texture of size {}x{}", width, height),
            ).into());
        }
        let id = self.allocate_id();
        self.textures.insert(id, (width, height));
        Ok(ResourceId::Texture(id))
    }

    fn create_buffer(&mut self, size: u64) -> Result<ResourceId> {
        if size == 0 {
            return Err(GraphicsError::ResourceCreation("Buffer of size 0".to_string()).into());
        }
        let id = self.allocate_id();
        self.buffers.insert(id, vec![0; size as usize]);
        Ok(ResourceId::Buffer(id))
    }

    fn create_depth_target(&mut self, width: u32, height: u32) -> Result<ResourceId> {
        if width == 0 || height == 0 {
            return Err(GraphicsError::ResourceCreation(
                format!("Depth buffer of size {}x{}", width, height),
            ).into());
        }
        let id = self.allocate_id();
        self.depth_targets.insert(id, (width, height));
        Ok(ResourceId::Depth(id))
    }

    fn release_resource(&mut self, resource: ResourceId) {
        match resource {
            ResourceId::Texture(id) => {
                self.textures.remove(&id);
            }
            ResourceId::Buffer(id) => {
                self.buffers.remove(&id);
            }
            ResourceId::Depth(id) => {
                self.depth_targets.remove(&id);
            }
            ResourceId::BackBuffer(_) => {}
        }
    }

    fn resize_buffers(&mut self, width: u32, height: u32) -> Result<()> {
        if !self.is_idle() {
            return Err(GraphicsError::SwapchainError(
                "Swapchain resized while the GPU still references its buffers".to_string(),
            ).into());
        }

        self.width = width;
        self.height = height;
        self.back_buffer_index = 0;
        self.log(NullEvent::Resize { width, height });
        Ok(())
    }
}
