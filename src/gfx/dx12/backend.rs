//! DirectX 12 的 `GraphicsBackend` 实现

use tracing::{debug, trace, warn};
use windows::{
    core::Interface,
    Win32::Foundation::CloseHandle,
    Win32::Graphics::Direct3D12::*,
    Win32::Graphics::Dxgi::Common::*,
    Win32::Graphics::Dxgi::*,
    Win32::System::Threading::{WaitForSingleObject, INFINITE},
};

use crate::core::error::{GraphicsError, Result};
use crate::gfx::backend::GraphicsBackend;
use crate::renderer::resource::{ResourceId, ResourceState, Transition};
use crate::renderer::sync::FenceValue;
use super::context::{DepthTarget, Dx12Context, ListKind, RenderTexture, BACK_BUFFER_FORMAT, DEPTH_FORMAT};
use super::descriptor::DescriptorHeap;

fn d3d12_state(state: ResourceState) -> D3D12_RESOURCE_STATES {
    match state {
        ResourceState::Common => D3D12_RESOURCE_STATE_COMMON,
        ResourceState::Present => D3D12_RESOURCE_STATE_PRESENT,
        ResourceState::RenderTarget => D3D12_RESOURCE_STATE_RENDER_TARGET,
        ResourceState::CopySource => D3D12_RESOURCE_STATE_COPY_SOURCE,
        ResourceState::CopyDest => D3D12_RESOURCE_STATE_COPY_DEST,
        ResourceState::VertexAndConstantBuffer => D3D12_RESOURCE_STATE_VERTEX_AND_CONSTANT_BUFFER,
        ResourceState::IndexBuffer => D3D12_RESOURCE_STATE_INDEX_BUFFER,
        ResourceState::DepthWrite => D3D12_RESOURCE_STATE_DEPTH_WRITE,
    }
}

fn buffer_desc(size: u64) -> D3D12_RESOURCE_DESC {
    D3D12_RESOURCE_DESC {
        Dimension: D3D12_RESOURCE_DIMENSION_BUFFER,
        Alignment: 0,
        Width: size,
        Height: 1,
        DepthOrArraySize: 1,
        MipLevels: 1,
        Format: DXGI_FORMAT_UNKNOWN,
        SampleDesc: DXGI_SAMPLE_DESC { Count: 1, Quality: 0 },
        Layout: D3D12_TEXTURE_LAYOUT_ROW_MAJOR,
        Flags: D3D12_RESOURCE_FLAG_NONE,
    }
}

fn transition_barrier(
    resource: &ID3D12Resource,
    before: D3D12_RESOURCE_STATES,
    after: D3D12_RESOURCE_STATES,
) -> D3D12_RESOURCE_BARRIER {
    D3D12_RESOURCE_BARRIER {
        Type: D3D12_RESOURCE_BARRIER_TYPE_TRANSITION,
        Flags: D3D12_RESOURCE_BARRIER_FLAG_NONE,
        Anonymous: D3D12_RESOURCE_BARRIER_0 {
            Transition: std::mem::ManuallyDrop::new(D3D12_RESOURCE_TRANSITION_BARRIER {
                // 不增加引用计数，barrier 不会被 drop
                pResource: unsafe { std::mem::transmute_copy(resource) },
                Subresource: D3D12_RESOURCE_BARRIER_ALL_SUBRESOURCES,
                StateBefore: before,
                StateAfter: after,
            }),
        },
    }
}

impl Dx12Context {
    /// 阻塞直到 `fence` 到达 `value`
    fn wait_fence(&self, fence: &ID3D12Fence, value: u64, what: &str) -> Result<()> {
        unsafe {
            if fence.GetCompletedValue() >= value {
                return Ok(());
            }
            self.check(
                fence.SetEventOnCompletion(value, self.fence_event),
                what,
                GraphicsError::CommandExecution,
            )?;
            WaitForSingleObject(self.fence_event, INFINITE);
        }
        Ok(())
    }

    fn create_committed(
        &self,
        heap: D3D12_HEAP_TYPE,
        desc: &D3D12_RESOURCE_DESC,
        state: D3D12_RESOURCE_STATES,
        clear_value: Option<&D3D12_CLEAR_VALUE>,
    ) -> Result<ID3D12Resource> {
        let heap_props = D3D12_HEAP_PROPERTIES {
            Type: heap,
            ..Default::default()
        };
        let mut resource: Option<ID3D12Resource> = None;
        unsafe {
            self.check(
                self.device.CreateCommittedResource(
                    &heap_props,
                    D3D12_HEAP_FLAG_NONE,
                    desc,
                    state,
                    clear_value.map(|v| v as *const _),
                    &mut resource,
                ),
                "CreateCommittedResource",
                GraphicsError::ResourceCreation,
            )?;
        }
        resource.ok_or_else(|| {
            GraphicsError::ResourceCreation("CreateCommittedResource returned no resource".to_string()).into()
        })
    }

    /// 上传堆上的暂存缓冲，写入 `data`
    fn create_staging(&self, data: &[u8]) -> Result<ID3D12Resource> {
        let staging = self.create_committed(
            D3D12_HEAP_TYPE_UPLOAD,
            &buffer_desc(data.len() as u64),
            D3D12_RESOURCE_STATE_GENERIC_READ,
            None,
        )?;
        unsafe {
            let mut mapped = std::ptr::null_mut();
            self.check(staging.Map(0, None, Some(&mut mapped)), "Map staging buffer", GraphicsError::ResourceCreation)?;
            std::ptr::copy_nonoverlapping(data.as_ptr(), mapped as *mut u8, data.len());
            staging.Unmap(0, None);
        }
        Ok(staging)
    }

    fn execute(&self, list: &ID3D12GraphicsCommandList) -> Result<()> {
        unsafe {
            self.check(list.Close(), "Close command list", GraphicsError::CommandExecution)?;
            let list: ID3D12CommandList = self.check(list.cast(), "Cast command list", GraphicsError::CommandExecution)?;
            self.command_queue.ExecuteCommandLists(&[Some(list)]);
        }
        Ok(())
    }
}

impl GraphicsBackend for Dx12Context {
    fn backend_name(&self) -> &str {
        "DirectX 12"
    }

    fn frame_count(&self) -> usize {
        self.frame_count
    }

    fn extent(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn current_back_buffer_index(&self) -> usize {
        unsafe { self.swap_chain.GetCurrentBackBufferIndex() as usize }
    }

    fn completed_value(&self, slot: usize) -> Result<FenceValue> {
        let fence = self.fences.get(slot).ok_or(GraphicsError::InvalidFrameSlot {
            slot,
            frame_count: self.frame_count,
        })?;
        Ok(FenceValue::new(unsafe { fence.GetCompletedValue() }))
    }

    fn wait_for_value(&mut self, slot: usize, value: FenceValue) -> Result<()> {
        let fence = self.fences.get(slot).ok_or(GraphicsError::InvalidFrameSlot {
            slot,
            frame_count: self.frame_count,
        })?;
        self.wait_fence(fence, value.value(), "SetEventOnCompletion")
    }

    fn reset_command_list(&mut self, slot: usize) -> Result<()> {
        if self.recording.is_some() {
            return Err(GraphicsError::CommandExecution(
                "Command list reset while still recording".to_string(),
            ).into());
        }
        let allocator = self.allocators.get(slot).ok_or(GraphicsError::InvalidFrameSlot {
            slot,
            frame_count: self.frame_count,
        })?;

        unsafe {
            self.check(allocator.Reset(), "Reset command allocator", GraphicsError::CommandExecution)?;
            self.check(
                self.command_list.Reset(allocator, None),
                "Reset command list",
                GraphicsError::CommandExecution,
            )?;
        }
        self.recording = Some(ListKind::Frame(slot));
        Ok(())
    }

    fn resource_barrier(&mut self, transition: Transition) -> Result<()> {
        let list = self.recording_list()?;
        let resource = self.resource(transition.resource)?;
        let barrier = transition_barrier(resource, d3d12_state(transition.before), d3d12_state(transition.after));
        unsafe { list.ResourceBarrier(&[barrier]) };
        Ok(())
    }

    fn clear_render_target(&mut self, target: ResourceId, color: [f32; 4]) -> Result<()> {
        let list = self.recording_list()?;
        let rtv = self.rtv(target)?;
        unsafe { list.ClearRenderTargetView(rtv, &color, None) };
        Ok(())
    }

    fn clear_depth(&mut self, target: ResourceId, depth: f32) -> Result<()> {
        let list = self.recording_list()?;
        let dsv = self.dsv(target)?;
        unsafe { list.ClearDepthStencilView(dsv, D3D12_CLEAR_FLAG_DEPTH, depth, 0, None) };
        Ok(())
    }

    fn copy_texture(&mut self, src: ResourceId, dst: ResourceId) -> Result<()> {
        let list = self.recording_list()?;
        let src = self.resource(src)?;
        let dst = self.resource(dst)?;
        unsafe { list.CopyResource(dst, src) };
        Ok(())
    }

    fn upload_buffer(&mut self, dst: ResourceId, data: &[u8]) -> Result<()> {
        if self.recording != Some(ListKind::Immediate) {
            return Err(GraphicsError::CommandExecution(
                "Buffer uploads must be recorded into an immediate command list".to_string(),
            ).into());
        }
        if !matches!(dst, ResourceId::Buffer(_)) {
            return Err(GraphicsError::CommandExecution(format!("{} is not a buffer", dst)).into());
        }

        let staging = self.create_staging(data)?;
        {
            let list = self.recording_list()?;
            let dst = self.resource(dst)?;
            unsafe { list.CopyBufferRegion(dst, 0, &staging, 0, data.len() as u64) };
        }
        self.immediate.staging.push(staging);
        Ok(())
    }

    fn close_and_execute(&mut self) -> Result<()> {
        match self.recording {
            Some(ListKind::Frame(slot)) => {
                self.execute(&self.command_list)?;
                self.recording = None;
                trace!(slot, "Frame command list executed");
                Ok(())
            }
            _ => Err(GraphicsError::CommandExecution("No frame command list is recording".to_string()).into()),
        }
    }

    fn discard_command_list(&mut self) -> Result<()> {
        let list = self.recording_list()?.clone();
        self.recording = None;
        // 未提交，暂存缓冲可以直接释放
        self.immediate.staging.clear();
        unsafe { self.check(list.Close(), "Close command list", GraphicsError::CommandExecution) }
    }

    fn signal(&mut self, slot: usize, value: FenceValue) -> Result<()> {
        let fence = self.fences.get(slot).ok_or(GraphicsError::InvalidFrameSlot {
            slot,
            frame_count: self.frame_count,
        })?;
        unsafe {
            self.check(
                self.command_queue.Signal(fence, value.value()),
                "Signal",
                GraphicsError::CommandExecution,
            )
        }
    }

    fn present(&mut self, vsync: bool) -> Result<()> {
        let sync_interval = if vsync { 1 } else { 0 };
        unsafe {
            self.check(
                self.swap_chain.Present(sync_interval, DXGI_PRESENT(0)).ok(),
                "Present",
                GraphicsError::SwapchainError,
            )
        }
    }

    fn begin_immediate(&mut self) -> Result<()> {
        if self.recording.is_some() {
            return Err(GraphicsError::CommandExecution(
                "Immediate submission while another command list is recording".to_string(),
            ).into());
        }
        unsafe {
            // 上一次一次性提交已经同步等待完成
            self.check(self.immediate.allocator.Reset(), "Reset command allocator", GraphicsError::CommandExecution)?;
            self.check(
                self.immediate.list.Reset(&self.immediate.allocator, None),
                "Reset command list",
                GraphicsError::CommandExecution,
            )?;
        }
        self.recording = Some(ListKind::Immediate);
        Ok(())
    }

    fn finish_immediate(&mut self) -> Result<()> {
        if self.recording != Some(ListKind::Immediate) {
            return Err(GraphicsError::CommandExecution("No immediate command list is recording".to_string()).into());
        }
        self.execute(&self.immediate.list)?;
        self.recording = None;

        // 每次提交用一个新的 fence，signal 1 后等待
        let fence: ID3D12Fence = unsafe {
            self.check(
                self.device.CreateFence(0, D3D12_FENCE_FLAG_NONE),
                "Create fence",
                GraphicsError::ResourceCreation,
            )?
        };
        unsafe {
            self.check(self.command_queue.Signal(&fence, 1), "Signal", GraphicsError::CommandExecution)?;
        }
        self.wait_fence(&fence, 1, "SetEventOnCompletion")?;
        self.immediate.staging.clear();
        debug!("Immediate command list completed");
        Ok(())
    }

    fn create_render_texture(&mut self, width: u32, height: u32) -> Result<ResourceId> {
        let desc = D3D12_RESOURCE_DESC {
            Dimension: D3D12_RESOURCE_DIMENSION_TEXTURE2D,
            Width: width as u64,
            Height: height,
            DepthOrArraySize: 1,
            MipLevels: 1,
            Format: BACK_BUFFER_FORMAT,
            SampleDesc: DXGI_SAMPLE_DESC { Count: 1, Quality: 0 },
            Layout: D3D12_TEXTURE_LAYOUT_UNKNOWN,
            Flags: D3D12_RESOURCE_FLAG_ALLOW_RENDER_TARGET,
            ..Default::default()
        };
        let resource = self.create_committed(D3D12_HEAP_TYPE_DEFAULT, &desc, D3D12_RESOURCE_STATE_COMMON, None)?;

        let rtv = DescriptorHeap::rtv(&self.device, 1)?;
        rtv.create_rtv(&self.device, &resource, 0);

        let id = self.allocate_id();
        self.textures.insert(id, RenderTexture { resource, rtv });
        debug!(id, width, height, "Render texture created");
        Ok(ResourceId::Texture(id))
    }

    fn create_buffer(&mut self, size: u64) -> Result<ResourceId> {
        if size == 0 {
            return Err(GraphicsError::ResourceCreation("Buffer of size 0".to_string()).into());
        }
        let resource = self.create_committed(
            D3D12_HEAP_TYPE_DEFAULT,
            &buffer_desc(size),
            D3D12_RESOURCE_STATE_COMMON,
            None,
        )?;

        let id = self.allocate_id();
        self.buffers.insert(id, resource);
        debug!(id, size, "Buffer created");
        Ok(ResourceId::Buffer(id))
    }

    fn create_depth_target(&mut self, width: u32, height: u32) -> Result<ResourceId> {
        let desc = D3D12_RESOURCE_DESC {
            Dimension: D3D12_RESOURCE_DIMENSION_TEXTURE2D,
            Width: width as u64,
            Height: height,
            DepthOrArraySize: 1,
            MipLevels: 1,
            Format: DEPTH_FORMAT,
            SampleDesc: DXGI_SAMPLE_DESC { Count: 1, Quality: 0 },
            Layout: D3D12_TEXTURE_LAYOUT_UNKNOWN,
            Flags: D3D12_RESOURCE_FLAG_ALLOW_DEPTH_STENCIL,
            ..Default::default()
        };
        let clear_value = D3D12_CLEAR_VALUE {
            Format: DEPTH_FORMAT,
            Anonymous: D3D12_CLEAR_VALUE_0 {
                DepthStencil: D3D12_DEPTH_STENCIL_VALUE {
                    Depth: 1.0,
                    Stencil: 0,
                },
            },
        };
        let resource = self.create_committed(
            D3D12_HEAP_TYPE_DEFAULT,
            &desc,
            D3D12_RESOURCE_STATE_DEPTH_WRITE,
            Some(&clear_value),
        )?;

        let dsv = DescriptorHeap::dsv(&self.device, 1)?;
        dsv.create_dsv(&self.device, &resource, DEPTH_FORMAT, 0);

        let id = self.allocate_id();
        self.depth_targets.insert(id, DepthTarget { resource, dsv });
        debug!(id, width, height, "Depth buffer created");
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
        // 交换链缓冲的所有引用都要先释放
        self.back_buffers.clear();
        unsafe {
            self.check(
                self.swap_chain.ResizeBuffers(
                    self.frame_count as u32,
                    width,
                    height,
                    BACK_BUFFER_FORMAT,
                    DXGI_SWAP_CHAIN_FLAG(0),
                ),
                "ResizeBuffers",
                GraphicsError::SwapchainError,
            )?;
        }
        self.recreate_back_buffers()?;
        self.width = width;
        self.height = height;
        Ok(())
    }
}

impl Drop for Dx12Context {
    fn drop(&mut self) {
        // GPU 已由帧同步循环刷新
        unsafe {
            if let Err(e) = CloseHandle(self.fence_event) {
                warn!("Failed to close fence event: {}", e);
            }
        }
        debug!("DX12 context dropped");
    }
}
