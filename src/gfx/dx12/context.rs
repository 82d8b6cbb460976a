//! DirectX 12 设备、队列和交换链的创建
//!
//! # 初始化流程
//!
//! 1. 创建窗口
//! 2. 启用调试层（`graphics.debug_layer`）
//! 3. 创建 DXGI 工厂，按 `graphics.adapter` 选择适配器
//! 4. 创建 D3D12 设备和直接命令队列
//! 5. 创建交换链（`frame_count` 个缓冲，FLIP_DISCARD），禁用 Alt+Enter
//! 6. 创建 RTV 堆和后台缓冲的渲染目标视图
//! 7. 每个帧槽创建一个命令分配器和一个 fence，共用一个命令列表和一个等待事件
//! 8. 创建一次性提交用的命令分配器和命令列表
//!
//! 离屏纹理、缓冲和深度缓冲在之后按需创建，分别登记在各自的表里。

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, warn};
use windows::{
    core::*,
    Win32::Foundation::{E_OUTOFMEMORY, HANDLE, HWND},
    Win32::Graphics::Direct3D::*,
    Win32::Graphics::Direct3D12::*,
    Win32::Graphics::Dxgi::Common::*,
    Win32::Graphics::Dxgi::*,
    Win32::System::Threading::CreateEventA,
};
use winit::dpi::LogicalSize;
use winit::event_loop::EventLoop;
use raw_window_handle::{HasWindowHandle, RawWindowHandle};
use winit::window::{Window, WindowBuilder};

use crate::core::config::{AdapterPreference, Config};
use crate::core::error::{FrameRingError, GraphicsError, Result};
use super::descriptor::DescriptorHeap;

/// 交换链和离屏纹理的格式
pub(crate) const BACK_BUFFER_FORMAT: DXGI_FORMAT = DXGI_FORMAT_R8G8B8A8_UNORM;

/// 深度缓冲格式
pub(crate) const DEPTH_FORMAT: DXGI_FORMAT = DXGI_FORMAT_D32_FLOAT;

/// 离屏渲染目标
pub(crate) struct RenderTexture {
    pub(crate) resource: ID3D12Resource,
    pub(crate) rtv: DescriptorHeap,
}

/// 深度缓冲
pub(crate) struct DepthTarget {
    pub(crate) resource: ID3D12Resource,
    pub(crate) dsv: DescriptorHeap,
}

/// 当前录制的命令列表
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ListKind {
    Frame(usize),
    Immediate,
}

/// 一次性提交用的命令分配器和命令列表
///
/// `staging` 保存本次录制用到的上传堆暂存缓冲，GPU 执行完之后才释放。
pub(crate) struct ImmediateContext {
    pub(crate) allocator: ID3D12CommandAllocator,
    pub(crate) list: ID3D12GraphicsCommandList,
    pub(crate) staging: Vec<ID3D12Resource>,
}

/// DirectX 12 后端
///
/// # 字段说明
///
/// - `allocators` / `fences`：每个帧槽一个，按后台缓冲索引访问
/// - `command_list`：所有帧槽共用，每帧用活动帧槽的分配器重置
/// - `fence_event`：所有 fence 共用的等待事件，同一时刻只等待一个 fence
/// - `recording`：当前哪个命令列表处于录制状态，屏障、清除和拷贝录制到它
pub struct Dx12Context {
    pub(crate) window: Arc<Window>,
    pub(crate) device: ID3D12Device,
    pub(crate) command_queue: ID3D12CommandQueue,
    pub(crate) swap_chain: IDXGISwapChain3,
    pub(crate) rtv_heap: DescriptorHeap,
    pub(crate) back_buffers: Vec<ID3D12Resource>,
    pub(crate) allocators: Vec<ID3D12CommandAllocator>,
    pub(crate) command_list: ID3D12GraphicsCommandList,
    pub(crate) fences: Vec<ID3D12Fence>,
    pub(crate) fence_event: HANDLE,
    pub(crate) immediate: ImmediateContext,
    pub(crate) textures: HashMap<u32, RenderTexture>,
    pub(crate) buffers: HashMap<u32, ID3D12Resource>,
    pub(crate) depth_targets: HashMap<u32, DepthTarget>,
    pub(crate) next_resource: u32,
    pub(crate) recording: Option<ListKind>,
    pub(crate) frame_count: usize,
    pub(crate) width: u32,
    pub(crate) height: u32,
}

impl Dx12Context {
    /// 创建窗口并初始化 DirectX 12
    ///
    /// # 参数
    ///
    /// * `event_loop` - winit 事件循环，用于创建窗口
    /// * `config` - 窗口尺寸、帧槽数量、适配器选择等
    pub fn new(event_loop: &EventLoop<()>, config: &Config) -> Result<Self> {
        let window = Arc::new(
            WindowBuilder::new()
                .with_title(format!("{} [{}]", config.window.title, config.graphics.backend.name()))
                .with_inner_size(LogicalSize::new(config.window.width, config.window.height))
                .with_resizable(config.window.resizable)
                .build(event_loop)
                .map_err(|e| FrameRingError::Initialization(format!("Failed to create window: {}", e)))?,
        );
        let size = window.inner_size();
        let (width, height) = (size.width.max(1), size.height.max(1));
        let frame_count = config.graphics.frame_count;

        unsafe {
            // 1. 调试层
            let factory_flags = if config.graphics.debug_layer {
                enable_debug_layer()
            } else {
                DXGI_CREATE_FACTORY_FLAGS(0)
            };

            // 2. 工厂和适配器
            let factory: IDXGIFactory4 = CreateDXGIFactory2(factory_flags)
                .map_err(|e| GraphicsError::DeviceCreation(format!("Failed to create DXGI factory: {}", e)))?;
            let adapter = select_adapter(&factory, config.graphics.adapter)?;

            // 3. 设备
            let mut device: Option<ID3D12Device> = None;
            D3D12CreateDevice(&adapter, D3D_FEATURE_LEVEL_11_0, &mut device)
                .map_err(|e| GraphicsError::DeviceCreation(format!("D3D12CreateDevice failed: {}", e)))?;
            let device = device.ok_or_else(|| {
                GraphicsError::DeviceCreation("D3D12CreateDevice returned no device".to_string())
            })?;

            // 4. 命令队列
            let queue_desc = D3D12_COMMAND_QUEUE_DESC {
                Type: D3D12_COMMAND_LIST_TYPE_DIRECT,
                Flags: D3D12_COMMAND_QUEUE_FLAG_NONE,
                ..Default::default()
            };
            let command_queue: ID3D12CommandQueue = device.CreateCommandQueue(&queue_desc)
                .map_err(|e| GraphicsError::DeviceCreation(format!("Failed to create command queue: {}", e)))?;

            // 5. 交换链
            let hwnd = window_hwnd(&window)?;
            let swap_chain_desc = DXGI_SWAP_CHAIN_DESC1 {
                Width: width,
                Height: height,
                Format: BACK_BUFFER_FORMAT,
                SampleDesc: DXGI_SAMPLE_DESC {
                    Count: 1,
                    ..Default::default()
                },
                BufferUsage: DXGI_USAGE_RENDER_TARGET_OUTPUT,
                BufferCount: frame_count as u32,
                SwapEffect: DXGI_SWAP_EFFECT_FLIP_DISCARD,
                ..Default::default()
            };
            let swap_chain: IDXGISwapChain1 = factory
                .CreateSwapChainForHwnd(&command_queue, hwnd, &swap_chain_desc, None, None)
                .map_err(|e| GraphicsError::SwapchainError(format!("Failed to create swap chain: {}", e)))?;
            factory.MakeWindowAssociation(hwnd, DXGI_MWA_NO_ALT_ENTER)
                .map_err(|e| GraphicsError::SwapchainError(format!("MakeWindowAssociation failed: {}", e)))?;
            let swap_chain: IDXGISwapChain3 = swap_chain.cast()
                .map_err(|e| GraphicsError::SwapchainError(format!("IDXGISwapChain3 unavailable: {}", e)))?;

            info!(width, height, buffers = frame_count, "Swap chain created");

            // 6. 后台缓冲的 RTV
            let rtv_heap = DescriptorHeap::rtv(&device, frame_count as u32)?;
            let back_buffers = create_back_buffer_views(&device, &swap_chain, &rtv_heap, frame_count)?;

            // 7. 帧槽资源
            let allocators = (0..frame_count)
                .map(|_| device.CreateCommandAllocator::<ID3D12CommandAllocator>(D3D12_COMMAND_LIST_TYPE_DIRECT))
                .collect::<windows::core::Result<Vec<_>>>()
                .map_err(|e| GraphicsError::ResourceCreation(format!("Failed to create command allocator: {}", e)))?;

            let command_list: ID3D12GraphicsCommandList = device
                .CreateCommandList(0, D3D12_COMMAND_LIST_TYPE_DIRECT, &allocators[0], None)
                .map_err(|e| GraphicsError::ResourceCreation(format!("Failed to create command list: {}", e)))?;
            // 创建时处于录制状态，第一帧重置之前必须先关闭
            command_list.Close()
                .map_err(|e| GraphicsError::CommandExecution(format!("Failed to close command list: {}", e)))?;

            let fences = (0..frame_count)
                .map(|_| device.CreateFence::<ID3D12Fence>(0, D3D12_FENCE_FLAG_NONE))
                .collect::<windows::core::Result<Vec<_>>>()
                .map_err(|e| GraphicsError::ResourceCreation(format!("Failed to create fence: {}", e)))?;

            let fence_event = CreateEventA(None, false, false, None)
                .map_err(|e| FrameRingError::Initialization(format!("Failed to create fence event: {}", e)))?;

            debug!(frame_count, "Frame slots created");

            // 8. 一次性提交
            let immediate_allocator: ID3D12CommandAllocator = device
                .CreateCommandAllocator(D3D12_COMMAND_LIST_TYPE_DIRECT)
                .map_err(|e| GraphicsError::ResourceCreation(format!("Failed to create command allocator: {}", e)))?;
            let immediate_list: ID3D12GraphicsCommandList = device
                .CreateCommandList(0, D3D12_COMMAND_LIST_TYPE_DIRECT, &immediate_allocator, None)
                .map_err(|e| GraphicsError::ResourceCreation(format!("Failed to create command list: {}", e)))?;
            immediate_list.Close()
                .map_err(|e| GraphicsError::CommandExecution(format!("Failed to close command list: {}", e)))?;

            info!("DX12 backend initialization complete");

            Ok(Self {
                window,
                device,
                command_queue,
                swap_chain,
                rtv_heap,
                back_buffers,
                allocators,
                command_list,
                fences,
                fence_event,
                immediate: ImmediateContext {
                    allocator: immediate_allocator,
                    list: immediate_list,
                    staging: Vec::new(),
                },
                textures: HashMap::new(),
                buffers: HashMap::new(),
                depth_targets: HashMap::new(),
                next_resource: 0,
                recording: None,
                frame_count,
                width,
                height,
            })
        }
    }

    /// 窗口引用
    pub fn window(&self) -> &Window {
        &self.window
    }

    /// 把 windows-rs 的错误归类
    ///
    /// 设备移除/重置/挂起归为 `DeviceLost` 并附带移除原因，内存不足归为
    /// `OutOfMemory`，其余按调用方给定的类别。
    pub(crate) fn check<T>(
        &self,
        result: windows::core::Result<T>,
        what: &str,
        kind: fn(String) -> GraphicsError,
    ) -> Result<T> {
        result.map_err(|e| {
            let code = e.code();
            if code == DXGI_ERROR_DEVICE_REMOVED || code == DXGI_ERROR_DEVICE_RESET || code == DXGI_ERROR_DEVICE_HUNG {
                let reason = unsafe { self.device.GetDeviceRemovedReason() };
                GraphicsError::DeviceLost(format!("{}: {} (removed reason: {:?})", what, e, reason)).into()
            } else if code == E_OUTOFMEMORY {
                GraphicsError::OutOfMemory(format!("{}: {}", what, e)).into()
            } else {
                kind(format!("{}: {}", what, e)).into()
            }
        })
    }

    /// 当前录制的命令列表
    pub(crate) fn recording_list(&self) -> Result<&ID3D12GraphicsCommandList> {
        match self.recording {
            Some(ListKind::Frame(_)) => Ok(&self.command_list),
            Some(ListKind::Immediate) => Ok(&self.immediate.list),
            None => Err(GraphicsError::CommandExecution("No command list is recording".to_string()).into()),
        }
    }

    /// 资源句柄对应的 D3D12 资源
    pub(crate) fn resource(&self, id: crate::renderer::resource::ResourceId) -> Result<&ID3D12Resource> {
        use crate::renderer::resource::ResourceId;

        let resource = match id {
            ResourceId::BackBuffer(i) => self.back_buffers.get(i),
            ResourceId::Texture(n) => self.textures.get(&n).map(|t| &t.resource),
            ResourceId::Buffer(n) => self.buffers.get(&n),
            ResourceId::Depth(n) => self.depth_targets.get(&n).map(|d| &d.resource),
        };
        resource.ok_or_else(|| GraphicsError::CommandExecution(format!("Unknown resource: {}", id)).into())
    }

    /// 资源句柄对应的 RTV
    pub(crate) fn rtv(&self, id: crate::renderer::resource::ResourceId) -> Result<D3D12_CPU_DESCRIPTOR_HANDLE> {
        use crate::renderer::resource::ResourceId;

        match id {
            ResourceId::BackBuffer(i) if i < self.back_buffers.len() => Ok(self.rtv_heap.handle(i)),
            ResourceId::Texture(n) => self.textures.get(&n)
                .map(|t| t.rtv.handle(0))
                .ok_or_else(|| GraphicsError::CommandExecution(format!("Unknown resource: {}", id)).into()),
            _ => Err(GraphicsError::CommandExecution(format!("Unknown resource: {}", id)).into()),
        }
    }

    /// 资源句柄对应的 DSV
    pub(crate) fn dsv(&self, id: crate::renderer::resource::ResourceId) -> Result<D3D12_CPU_DESCRIPTOR_HANDLE> {
        use crate::renderer::resource::ResourceId;

        match id {
            ResourceId::Depth(n) => self.depth_targets.get(&n)
                .map(|d| d.dsv.handle(0))
                .ok_or_else(|| GraphicsError::CommandExecution(format!("Unknown resource: {}", id)).into()),
            _ => Err(GraphicsError::CommandExecution(format!("{} is not a depth buffer", id)).into()),
        }
    }

    /// 分配一个新的资源编号
    pub(crate) fn allocate_id(&mut self) -> u32 {
        let id = self.next_resource;
        self.next_resource += 1;
        id
    }

    /// 重新获取交换链缓冲并创建 RTV（调整尺寸后调用）
    pub(crate) fn recreate_back_buffers(&mut self) -> Result<()> {
        self.back_buffers = create_back_buffer_views(&self.device, &self.swap_chain, &self.rtv_heap, self.frame_count)?;
        Ok(())
    }
}

/// 启用 D3D12 调试层，返回创建 DXGI 工厂用的标志
unsafe fn enable_debug_layer() -> DXGI_CREATE_FACTORY_FLAGS {
    let mut debug: Option<ID3D12Debug> = None;
    match D3D12GetDebugInterface(&mut debug) {
        Ok(()) => match debug {
            Some(debug) => {
                debug.EnableDebugLayer();
                debug!("DX12 debug layer enabled");
                DXGI_CREATE_FACTORY_DEBUG
            }
            None => DXGI_CREATE_FACTORY_FLAGS(0),
        },
        Err(e) => {
            warn!("Failed to enable DX12 debug layer: {}", e);
            DXGI_CREATE_FACTORY_FLAGS(0)
        }
    }
}

/// 选择适配器
///
/// `Hardware`：第一个支持 11.0 特性级别的非软件适配器；`Warp`：WARP 软件适配器。
unsafe fn select_adapter(factory: &IDXGIFactory4, preference: AdapterPreference) -> Result<IDXGIAdapter1> {
    if preference == AdapterPreference::Warp {
        let adapter: IDXGIAdapter1 = factory.EnumWarpAdapter()
            .map_err(|e| GraphicsError::AdapterNotFound(format!("WARP adapter unavailable: {}", e)))?;
        info!("Using WARP adapter");
        return Ok(adapter);
    }

    for i in 0.. {
        let adapter = match factory.EnumAdapters1(i) {
            Ok(adapter) => adapter,
            Err(e) if e.code() == DXGI_ERROR_NOT_FOUND => break,
            Err(e) => return Err(GraphicsError::AdapterNotFound(format!("EnumAdapters1 failed: {}", e)).into()),
        };

        let desc = match adapter.GetDesc1() {
            Ok(desc) => desc,
            Err(e) => {
                warn!(index = i, "GetDesc1 failed: {}", e);
                continue;
            }
        };
        let name = String::from_utf16_lossy(&desc.Description);
        let name = name.trim_end_matches('\0');

        if (DXGI_ADAPTER_FLAG(desc.Flags as i32) & DXGI_ADAPTER_FLAG_SOFTWARE) != DXGI_ADAPTER_FLAG_NONE {
            debug!(index = i, adapter = name, "Skipping software adapter");
            continue;
        }

        // 只检查是否支持，不创建设备
        if D3D12CreateDevice(&adapter, D3D_FEATURE_LEVEL_11_0, std::ptr::null_mut::<Option<ID3D12Device>>()).is_ok() {
            info!(index = i, adapter = name, "Selected hardware adapter");
            return Ok(adapter);
        }
        debug!(index = i, adapter = name, "Adapter does not support feature level 11.0");
    }

    Err(GraphicsError::AdapterNotFound("No hardware adapter supports Direct3D 12".to_string()).into())
}

/// 从 winit 窗口获取 HWND
fn window_hwnd(window: &Window) -> Result<HWND> {
    let handle = window.window_handle()
        .map_err(|e| FrameRingError::Initialization(format!("Failed to get window handle: {}", e)))?;
    match handle.as_raw() {
        RawWindowHandle::Win32(win32) => Ok(HWND(win32.hwnd.get() as *mut std::ffi::c_void)),
        _ => Err(FrameRingError::Initialization("Expected a Win32 window handle".to_string())),
    }
}

fn create_back_buffer_views(
    device: &ID3D12Device,
    swap_chain: &IDXGISwapChain3,
    rtv_heap: &DescriptorHeap,
    frame_count: usize,
) -> Result<Vec<ID3D12Resource>> {
    (0..frame_count)
        .map(|i| {
            let buffer: ID3D12Resource = unsafe { swap_chain.GetBuffer(i as u32) }
                .map_err(|e| GraphicsError::SwapchainError(format!("Failed to get back buffer {}: {}", i, e)))?;
            rtv_heap.create_rtv(device, &buffer, i);
            Ok(buffer)
        })
        .collect()
}
