//! 帧同步循环
//!
//! 每帧的提交流程：
//!
//! 1. 读取帧槽 fence 的已完成值，小于该帧槽最后一次 signal 的值时阻塞等待
//! 2. 递增帧槽的预期 fence 值
//! 3. 从交换链读取当前后台缓冲索引，作为新的活动帧槽（不一定按顺序）
//! 4. 重置帧槽的命令分配器和命令列表
//! 5. 后台缓冲 Present → RenderTarget，执行录制闭包，再 RenderTarget → Present
//! 6. 关闭并提交命令列表，用预期值 signal 帧槽 fence，呈现
//!
//! 1 和 3 的先后由 [`FramePacing`] 决定。无论哪种顺序，重置命令分配器之前都会
//! 再检查一次新帧槽的 fence：等待返回后 fence 仍未到达时返回
//! `GraphicsError::SlotInFlight`，不会复用 GPU 仍在读取的命令内存。

use std::time::Instant;

use tracing::{debug, trace, warn};

use crate::core::config::FramePacing;
use crate::core::error::{GraphicsError, Result};
use crate::gfx::backend::GraphicsBackend;
use super::command::{CommandEncoder, CommandRecorder};
use super::immediate;
use super::metrics::FrameStats;
use super::resource::{FrameRing, ResourceId, ResourceState, ResourceStateTracker};
use super::sync::FenceValue;

/// 一帧提交后的信息
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameInfo {
    /// 本帧使用的帧槽
    pub slot: usize,
    /// 本帧 signal 的 fence 值
    pub fence_value: FenceValue,
    /// 帧序号（从 0 开始）
    pub frame_number: u64,
}

/// 录制闭包拿到的帧
///
/// 进入闭包时后台缓冲已经处于 RenderTarget 状态。
pub struct Frame<'a, B: GraphicsBackend> {
    recorder: CommandRecorder<'a, B>,
    slot: usize,
    frame_number: u64,
}

impl<'a, B: GraphicsBackend> Frame<'a, B> {
    /// 活动帧槽
    pub fn slot(&self) -> usize {
        self.slot
    }

    /// 本帧的后台缓冲
    pub fn back_buffer(&self) -> ResourceId {
        ResourceId::BackBuffer(self.slot)
    }

    /// 帧序号
    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    /// 状态转换
    pub fn transition(&mut self, resource: ResourceId, after: ResourceState) -> Result<()> {
        self.recorder.transition(resource, after)
    }

    /// 清除渲染目标
    pub fn clear(&mut self, target: ResourceId, color: [f32; 4]) -> Result<()> {
        self.recorder.clear(target, color)
    }

    /// 清除深度缓冲
    pub fn clear_depth(&mut self, target: ResourceId, depth: f32) -> Result<()> {
        self.recorder.clear_depth(target, depth)
    }

    /// 拷贝纹理
    pub fn copy(&mut self, src: ResourceId, dst: ResourceId) -> Result<()> {
        self.recorder.copy(src, dst)
    }

    /// 资源当前状态
    pub fn state(&self, resource: ResourceId) -> Option<ResourceState> {
        self.recorder.state(resource)
    }
}

/// 帧同步循环
pub struct FrameCycle<B: GraphicsBackend> {
    backend: B,
    ring: FrameRing,
    tracker: ResourceStateTracker,
    encoder: CommandEncoder,
    active_slot: usize,
    pacing: FramePacing,
    vsync: bool,
    frame_number: u64,
    stats: FrameStats,
}

impl<B: GraphicsBackend> FrameCycle<B> {
    /// 创建帧同步循环
    ///
    /// 帧槽数量取自后端的交换链缓冲数，所有后台缓冲登记为 Present 状态。
    pub fn new(backend: B, pacing: FramePacing, vsync: bool) -> Result<Self> {
        let ring = FrameRing::new(backend.frame_count())?;
        let active_slot = ring.check(backend.current_back_buffer_index())?;

        let mut tracker = ResourceStateTracker::new();
        for slot in 0..ring.slot_count() {
            tracker.register(ResourceId::BackBuffer(slot), ResourceState::Present);
        }

        debug!(
            backend = backend.backend_name(),
            frames = ring.slot_count(),
            ?pacing,
            active_slot,
            "Frame cycle created"
        );

        Ok(Self {
            backend,
            ring,
            tracker,
            encoder: CommandEncoder::new(),
            active_slot,
            pacing,
            vsync,
            frame_number: 0,
            stats: FrameStats::new(),
        })
    }

    /// 录制并提交一帧
    ///
    /// 录制闭包返回错误时命令列表被丢弃而不提交，资源状态和帧槽的预期 fence 值
    /// 回滚，帧槽保持空闲。
    pub fn render_frame<F>(&mut self, record: F) -> Result<FrameInfo>
    where
        F: FnOnce(&mut Frame<'_, B>) -> Result<()>,
    {
        // 1-3
        let slot = match self.pacing {
            FramePacing::WaitPrevious => {
                self.wait_for_slot(self.active_slot)?;
                self.ring.check(self.backend.current_back_buffer_index())?
            }
            FramePacing::Pipelined => self.ring.check(self.backend.current_back_buffer_index())?,
        };
        self.ensure_slot_idle(slot)?;
        self.active_slot = slot;
        let fence_before = self.ring.slot(slot)?.fence;
        let fence_value = self.ring.slot_mut(slot)?.fence.advance();

        trace!(frame = self.frame_number, slot, fence = fence_value.value(), "Begin frame");

        // 4
        self.backend.reset_command_list(slot)?;
        self.encoder.begin()?;

        // 5
        let snapshot = self.tracker.clone();
        let recorded = Self::record_frame(
            &mut self.backend,
            &mut self.tracker,
            slot,
            self.frame_number,
            record,
        );
        if let Err(e) = recorded {
            self.tracker = snapshot;
            self.ring.slot_mut(slot)?.fence = fence_before;
            self.encoder.reset();
            if let Err(discard) = self.backend.discard_command_list() {
                warn!("Failed to discard frame command list: {}", discard);
            }
            return Err(e);
        }

        // 6
        self.encoder.end()?;
        self.backend.close_and_execute()?;
        self.encoder.submit()?;
        self.backend.signal(slot, fence_value)?;
        self.ring.slot_mut(slot)?.mark_submitted(fence_value);
        self.backend.present(self.vsync)?;

        let info = FrameInfo {
            slot,
            fence_value,
            frame_number: self.frame_number,
        };
        self.frame_number += 1;
        self.stats.record_frame();

        Ok(info)
    }

    fn record_frame<F>(
        backend: &mut B,
        tracker: &mut ResourceStateTracker,
        slot: usize,
        frame_number: u64,
        record: F,
    ) -> Result<()>
    where
        F: FnOnce(&mut Frame<'_, B>) -> Result<()>,
    {
        let mut frame = Frame {
            recorder: CommandRecorder::new(backend, tracker),
            slot,
            frame_number,
        };
        let back_buffer = frame.back_buffer();

        frame.transition(back_buffer, ResourceState::RenderTarget)?;
        record(&mut frame)?;
        frame.transition(back_buffer, ResourceState::Present)
    }

    /// 帧槽有未完成的提交时阻塞等待
    fn wait_for_slot(&mut self, slot: usize) -> Result<()> {
        let fence = self.ring.slot(slot)?.fence;
        let completed = self.backend.completed_value(slot)?;
        if !fence.needs_wait(completed) {
            return Ok(());
        }

        debug!(
            slot,
            value = fence.signaled().value(),
            completed = completed.value(),
            "Waiting for frame slot"
        );
        let start = Instant::now();
        self.backend.wait_for_value(slot, fence.signaled())?;
        self.stats.record_wait(start.elapsed());
        Ok(())
    }

    /// 等待帧槽空闲，等待后仍未完成则报错
    fn ensure_slot_idle(&mut self, slot: usize) -> Result<()> {
        self.wait_for_slot(slot)?;

        let signaled = self.ring.slot(slot)?.fence.signaled();
        let completed = self.backend.completed_value(slot)?;
        if completed < signaled {
            return Err(GraphicsError::SlotInFlight {
                slot,
                signaled: signaled.value(),
                completed: completed.value(),
            }.into());
        }
        Ok(())
    }

    /// 等待所有帧槽的提交完成
    pub fn flush(&mut self) -> Result<()> {
        for slot in 0..self.ring.slot_count() {
            self.ensure_slot_idle(slot)?;
        }
        trace!("GPU flushed");
        Ok(())
    }

    /// 调整交换链尺寸
    ///
    /// 先刷新 GPU，调整后重新登记后台缓冲并重新读取活动帧槽。
    pub fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        self.flush()?;
        self.backend.resize_buffers(width, height)?;

        self.tracker.remove_back_buffers();
        for slot in 0..self.ring.slot_count() {
            self.tracker.register(ResourceId::BackBuffer(slot), ResourceState::Present);
        }
        self.active_slot = self.ring.check(self.backend.current_back_buffer_index())?;

        debug!(width, height, active_slot = self.active_slot, "Swapchain resized");
        Ok(())
    }

    /// 一次性提交命令并等待完成
    pub fn run_immediate<F>(&mut self, record: F) -> Result<()>
    where
        F: FnOnce(&mut CommandRecorder<'_, B>) -> Result<()>,
    {
        immediate::run_commands(&mut self.backend, &mut self.tracker, record)
    }

    /// 创建离屏渲染目标，并登记为 Common 状态
    pub fn create_render_texture(&mut self, width: u32, height: u32) -> Result<ResourceId> {
        let texture = self.backend.create_render_texture(width, height)?;
        self.tracker.register(texture, ResourceState::Common);
        Ok(texture)
    }

    /// 创建深度缓冲，并登记为 DepthWrite 状态
    pub fn create_depth_target(&mut self, width: u32, height: u32) -> Result<ResourceId> {
        let depth = self.backend.create_depth_target(width, height)?;
        self.tracker.register(depth, ResourceState::DepthWrite);
        Ok(depth)
    }

    /// 创建默认堆缓冲并上传 `data`，完成后缓冲处于 `final_state`
    ///
    /// 一次性提交：Common → CopyDest，从暂存缓冲拷贝，CopyDest → `final_state`。
    /// 返回时 GPU 已经执行完毕。
    pub fn create_buffer_with_data(&mut self, data: &[u8], final_state: ResourceState) -> Result<ResourceId> {
        let buffer = self.create_buffer(data.len() as u64)?;
        let uploaded = self.run_immediate(|cmd| upload_into(cmd, buffer, data, final_state));
        if let Err(e) = uploaded {
            self.tracker.remove(buffer);
            self.backend.release_resource(buffer);
            return Err(e);
        }
        debug!(%buffer, bytes = data.len(), ?final_state, "Buffer uploaded");
        Ok(buffer)
    }

    /// 创建默认堆缓冲，并登记为 Common 状态
    pub fn create_buffer(&mut self, size: u64) -> Result<ResourceId> {
        let buffer = self.backend.create_buffer(size)?;
        self.tracker.register(buffer, ResourceState::Common);
        Ok(buffer)
    }

    /// 释放纹理、缓冲或深度缓冲（先刷新 GPU）
    pub fn release_resource(&mut self, resource: ResourceId) -> Result<()> {
        self.flush()?;
        self.tracker.remove(resource);
        self.backend.release_resource(resource);
        Ok(())
    }

    /// 当前活动帧槽
    pub fn active_slot(&self) -> usize {
        self.active_slot
    }

    /// 帧同步策略
    pub fn pacing(&self) -> FramePacing {
        self.pacing
    }

    /// 已提交的帧数
    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    pub fn ring(&self) -> &FrameRing {
        &self.ring
    }

    pub fn tracker(&self) -> &ResourceStateTracker {
        &self.tracker
    }

    pub fn stats(&self) -> &FrameStats {
        &self.stats
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }
}

/// 录制一次缓冲上传：Common → CopyDest，拷贝，CopyDest → `final_state`
pub(crate) fn upload_into<B: GraphicsBackend>(
    cmd: &mut CommandRecorder<'_, B>,
    buffer: ResourceId,
    data: &[u8],
    final_state: ResourceState,
) -> Result<()> {
    cmd.transition(buffer, ResourceState::CopyDest)?;
    cmd.upload(buffer, data)?;
    cmd.transition(buffer, final_state)
}

impl<B: GraphicsBackend> Drop for FrameCycle<B> {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            warn!("Failed to flush GPU on shutdown: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::null::{NullBackend, NullEvent};
    use crate::renderer::resource::Transition;

    fn cycle(frames: usize, latency: usize, pacing: FramePacing) -> FrameCycle<NullBackend> {
        FrameCycle::new(NullBackend::new(frames, 64, 64, latency), pacing, true).unwrap()
    }

    fn clear_frame(frame: &mut Frame<'_, NullBackend>) -> Result<()> {
        let target = frame.back_buffer();
        frame.clear(target, [0.0, 0.2, 0.4, 1.0])
    }

    #[test]
    fn test_fence_values_increase_per_slot() {
        let mut cycle = cycle(3, 1, FramePacing::WaitPrevious);
        let mut last = vec![FenceValue::INITIAL; 3];

        for _ in 0..12 {
            let info = cycle.render_frame(clear_frame).unwrap();
            assert!(info.fence_value > last[info.slot]);
            last[info.slot] = info.fence_value;
        }

        // 每个帧槽都被轮到 4 次
        assert!(last.iter().all(|v| v.value() == 4));
    }

    #[test]
    fn test_slot_follows_back_buffer_index() {
        let mut cycle = cycle(3, 1, FramePacing::Pipelined);
        let slots: Vec<usize> = (0..6)
            .map(|_| cycle.render_frame(clear_frame).unwrap().slot)
            .collect();
        assert_eq!(slots, vec![0, 1, 2, 0, 1, 2]);
    }

    #[test]
    fn test_wait_previous_one_frame_in_flight() {
        let mut cycle = cycle(3, 8, FramePacing::WaitPrevious);
        for _ in 0..10 {
            cycle.render_frame(clear_frame).unwrap();
        }
        assert_eq!(cycle.backend().max_in_flight(), 1);
        // 第一帧之后每帧都要等待上一帧
        assert_eq!(cycle.stats().gpu_waits(), 9);
    }

    #[test]
    fn test_pipelined_bounded_by_frame_count() {
        for frames in [2, 3] {
            let mut cycle = cycle(frames, 8, FramePacing::Pipelined);
            for _ in 0..10 {
                cycle.render_frame(clear_frame).unwrap();
            }
            assert_eq!(cycle.backend().max_in_flight(), frames);
        }
    }

    #[test]
    fn test_pipelined_low_latency_never_waits() {
        let mut cycle = cycle(2, 1, FramePacing::Pipelined);
        for _ in 0..10 {
            cycle.render_frame(clear_frame).unwrap();
        }
        assert_eq!(cycle.stats().gpu_waits(), 0);
    }

    #[test]
    fn test_no_reset_while_in_flight() {
        // 模拟后端在帧槽未完成时拒绝重置，循环跑完说明没有发生
        for pacing in [FramePacing::WaitPrevious, FramePacing::Pipelined] {
            for latency in [0, 1, 2, 5] {
                let mut cycle = cycle(2, latency, pacing);
                for _ in 0..20 {
                    cycle.render_frame(clear_frame).unwrap();
                }
            }
        }
    }

    #[test]
    fn test_frame_barrier_order() {
        let mut cycle = cycle(2, 1, FramePacing::WaitPrevious);
        let info = cycle.render_frame(clear_frame).unwrap();
        let back = ResourceId::BackBuffer(info.slot);

        let commands = cycle.backend().last_submission();
        assert_eq!(
            commands.first(),
            Some(&NullEvent::Barrier(Transition {
                resource: back,
                before: ResourceState::Present,
                after: ResourceState::RenderTarget,
            }))
        );
        assert_eq!(
            commands.last(),
            Some(&NullEvent::Barrier(Transition {
                resource: back,
                before: ResourceState::RenderTarget,
                after: ResourceState::Present,
            }))
        );
        assert_eq!(cycle.tracker().state(back), Some(ResourceState::Present));
    }

    #[test]
    fn test_submit_order() {
        let mut cycle = cycle(2, 1, FramePacing::WaitPrevious);
        cycle.backend_mut().clear_history();
        cycle.render_frame(clear_frame).unwrap();

        let kinds: Vec<&str> = cycle.backend().history()
            .map(|e| match e {
                NullEvent::Reset { .. } => "reset",
                NullEvent::Barrier(_) => "barrier",
                NullEvent::Clear { .. } => "clear",
                NullEvent::Execute { .. } => "execute",
                NullEvent::Signal { .. } => "signal",
                NullEvent::Present { .. } => "present",
                _ => "other",
            })
            .collect();
        assert_eq!(kinds, vec!["reset", "barrier", "clear", "barrier", "execute", "signal", "present"]);
    }

    /// 等待立即返回、不推进 fence 的后端
    struct NoWaitBackend(NullBackend);

    impl GraphicsBackend for NoWaitBackend {
        fn backend_name(&self) -> &str { "NoWait" }
        fn frame_count(&self) -> usize { self.0.frame_count() }
        fn extent(&self) -> (u32, u32) { self.0.extent() }
        fn current_back_buffer_index(&self) -> usize { self.0.current_back_buffer_index() }
        fn completed_value(&self, slot: usize) -> Result<FenceValue> { self.0.completed_value(slot) }
        fn wait_for_value(&mut self, _slot: usize, _value: FenceValue) -> Result<()> { Ok(()) }
        fn reset_command_list(&mut self, slot: usize) -> Result<()> { self.0.reset_command_list(slot) }
        fn resource_barrier(&mut self, transition: Transition) -> Result<()> { self.0.resource_barrier(transition) }
        fn clear_render_target(&mut self, target: ResourceId, color: [f32; 4]) -> Result<()> {
            self.0.clear_render_target(target, color)
        }
        fn clear_depth(&mut self, target: ResourceId, depth: f32) -> Result<()> { self.0.clear_depth(target, depth) }
        fn copy_texture(&mut self, src: ResourceId, dst: ResourceId) -> Result<()> { self.0.copy_texture(src, dst) }
        fn upload_buffer(&mut self, dst: ResourceId, data: &[u8]) -> Result<()> { self.0.upload_buffer(dst, data) }
        fn close_and_execute(&mut self) -> Result<()> { self.0.close_and_execute() }
        fn discard_command_list(&mut self) -> Result<()> { self.0.discard_command_list() }
        fn signal(&mut self, slot: usize, value: FenceValue) -> Result<()> { self.0.signal(slot, value) }
        fn present(&mut self, vsync: bool) -> Result<()> { self.0.present(vsync) }
        fn begin_immediate(&mut self) -> Result<()> { self.0.begin_immediate() }
        fn finish_immediate(&mut self) -> Result<()> { self.0.finish_immediate() }
        fn create_render_texture(&mut self, width: u32, height: u32) -> Result<ResourceId> {
            self.0.create_render_texture(width, height)
        }
        fn create_buffer(&mut self, size: u64) -> Result<ResourceId> { self.0.create_buffer(size) }
        fn create_depth_target(&mut self, width: u32, height: u32) -> Result<ResourceId> {
            self.0.create_depth_target(width, height)
        }
        fn release_resource(&mut self, resource: ResourceId) { self.0.release_resource(resource) }
        fn resize_buffers(&mut self, width: u32, height: u32) -> Result<()> { self.0.resize_buffers(width, height) }
    }

    fn clear_no_wait(frame: &mut Frame<'_, NoWaitBackend>) -> Result<()> {
        let target = frame.back_buffer();
        frame.clear(target, [0.0; 4])
    }

    #[test]
    fn test_slot_in_flight_after_wait_rejected() {
        let backend = NoWaitBackend(NullBackend::new(2, 64, 64, 8));
        let mut cycle = FrameCycle::new(backend, FramePacing::Pipelined, true).unwrap();

        assert_eq!(cycle.render_frame(clear_no_wait).unwrap().slot, 0);
        assert_eq!(cycle.render_frame(clear_no_wait).unwrap().slot, 1);
        cycle.backend_mut().0.clear_history();

        // 回到帧槽 0：等待没有推进 fence，不能重置分配器
        let err = cycle.render_frame(clear_no_wait).unwrap_err();
        assert!(matches!(
            err,
            crate::core::error::FrameRingError::Graphics(GraphicsError::SlotInFlight {
                slot: 0,
                signaled: 1,
                completed: 0,
            })
        ));
        assert!(!cycle.backend().0.history().any(|e| matches!(e, NullEvent::Reset { .. })));
        assert_eq!(cycle.frame_number(), 2);
        assert_eq!(cycle.ring().slot(0).unwrap().fence.expected(), FenceValue::new(1));
    }

    #[test]
    fn test_failed_recording_keeps_fence_value() {
        let mut cycle = cycle(2, 1, FramePacing::WaitPrevious);
        let failed = cycle.render_frame(|frame| {
            let back = frame.back_buffer();
            frame.copy(back, back)
        });
        assert!(failed.is_err());
        assert_eq!(cycle.ring().slot(0).unwrap().fence.expected(), FenceValue::INITIAL);

        let info = cycle.render_frame(clear_frame).unwrap();
        assert_eq!(info.slot, 0);
        assert_eq!(info.fence_value, FenceValue::new(1));
    }

    #[test]
    fn test_buffer_upload_barrier_sequence() {
        let mut cycle = cycle(2, 4, FramePacing::Pipelined);
        let data = [7u8; 12];
        let buffer = cycle.create_buffer_with_data(&data, ResourceState::IndexBuffer).unwrap();

        let expected = vec![
            NullEvent::Barrier(Transition {
                resource: buffer,
                before: ResourceState::Common,
                after: ResourceState::CopyDest,
            }),
            NullEvent::Upload { dst: buffer, bytes: 12 },
            NullEvent::Barrier(Transition {
                resource: buffer,
                before: ResourceState::CopyDest,
                after: ResourceState::IndexBuffer,
            }),
        ];
        assert_eq!(cycle.backend().last_submission(), expected.as_slice());
        assert_eq!(cycle.backend().buffer_contents(buffer), Some(&data[..]));
        assert_eq!(cycle.tracker().state(buffer), Some(ResourceState::IndexBuffer));
        assert_eq!(cycle.backend().pending_signals(), 0);
    }

    #[test]
    fn test_failed_upload_releases_buffer() {
        let mut cycle = cycle(2, 4, FramePacing::Pipelined);
        // 空数据无法创建缓冲
        assert!(cycle.create_buffer_with_data(&[], ResourceState::VertexAndConstantBuffer).is_err());
        assert_eq!(cycle.backend().resource_count(), 0);

        let buffer = cycle.create_buffer(4).unwrap();
        let result = cycle.run_immediate(|cmd| {
            cmd.transition(buffer, ResourceState::CopyDest)?;
            cmd.upload(buffer, &[1; 8])
        });
        assert!(result.is_err());
        assert_eq!(cycle.tracker().state(buffer), Some(ResourceState::Common));
        cycle.release_resource(buffer).unwrap();
        assert_eq!(cycle.backend().resource_count(), 0);
    }

    #[test]
    fn test_invalid_state_not_submitted() {
        let mut cycle = cycle(2, 1, FramePacing::WaitPrevious);
        cycle.backend_mut().clear_history();

        let result = cycle.render_frame(|frame| {
            let back = frame.back_buffer();
            frame.transition(back, ResourceState::CopyDest)?;
            frame.clear(back, [1.0; 4])
        });

        let err = result.unwrap_err();
        assert!(err.to_string().contains("operation requires RenderTarget"));
        assert!(!cycle.backend().history().any(|e| matches!(e, NullEvent::Execute { .. } | NullEvent::Present { .. })));
        assert_eq!(cycle.tracker().state(ResourceId::BackBuffer(0)), Some(ResourceState::Present));
        assert_eq!(cycle.frame_number(), 0);

        // 失败之后循环仍可继续
        let info = cycle.render_frame(clear_frame).unwrap();
        assert_eq!(info.frame_number, 0);
    }

    #[test]
    fn test_flush_leaves_slots_complete() {
        let mut cycle = cycle(3, 8, FramePacing::Pipelined);
        for _ in 0..5 {
            cycle.render_frame(clear_frame).unwrap();
        }
        assert!(cycle.backend().pending_signals() > 0);

        cycle.flush().unwrap();
        assert_eq!(cycle.backend().pending_signals(), 0);
        for slot in cycle.ring().iter() {
            let completed = cycle.backend().completed_value(slot.index).unwrap();
            assert!(!slot.fence.needs_wait(completed));
        }
    }

    #[test]
    fn test_resize_reregisters_back_buffers() {
        let mut cycle = cycle(2, 4, FramePacing::Pipelined);
        cycle.render_frame(clear_frame).unwrap();
        assert_eq!(cycle.active_slot(), 0);

        cycle.resize(128, 96).unwrap();
        assert_eq!(cycle.backend().extent(), (128, 96));
        assert_eq!(cycle.active_slot(), 0);
        for slot in 0..2 {
            assert_eq!(cycle.tracker().state(ResourceId::BackBuffer(slot)), Some(ResourceState::Present));
        }

        cycle.render_frame(clear_frame).unwrap();
    }

    #[test]
    fn test_immediate_through_cycle() {
        let mut cycle = cycle(2, 4, FramePacing::Pipelined);
        let tex = cycle.create_render_texture(32, 32).unwrap();
        cycle.run_immediate(|cmd| cmd.transition(tex, ResourceState::CopySource)).unwrap();
        assert_eq!(cycle.tracker().state(tex), Some(ResourceState::CopySource));

        cycle.release_resource(tex).unwrap();
        assert_eq!(cycle.tracker().state(tex), None);
        assert_eq!(cycle.backend().texture_count(), 0);
    }

    #[test]
    fn test_wrong_frame_count_rejected() {
        let backend = NullBackend::new(4, 64, 64, 1);
        assert!(FrameCycle::new(backend, FramePacing::WaitPrevious, true).is_err());
    }
}
