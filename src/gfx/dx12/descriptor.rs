//! DirectX 12 描述符堆
//!
//! 本项目只需要 CPU 可见的视图：交换链后台缓冲和离屏纹理的渲染目标视图，
//! 以及深度缓冲的深度模板视图。

use windows::Win32::Graphics::Direct3D12::*;
use windows::Win32::Graphics::Dxgi::Common::DXGI_FORMAT;

use crate::core::error::{GraphicsError, Result};

/// RTV 或 DSV 描述符堆
pub struct DescriptorHeap {
    // 视图引用堆中的内存，堆必须和视图一样长寿
    _heap: ID3D12DescriptorHeap,
    increment_size: usize,
    cpu_start: usize,
    num_descriptors: u32,
}

impl DescriptorHeap {
    /// 创建含 `num_descriptors` 个描述符的 RTV 堆
    pub fn rtv(device: &ID3D12Device, num_descriptors: u32) -> Result<Self> {
        Self::new(device, D3D12_DESCRIPTOR_HEAP_TYPE_RTV, num_descriptors)
    }

    /// 创建含 `num_descriptors` 个描述符的 DSV 堆
    pub fn dsv(device: &ID3D12Device, num_descriptors: u32) -> Result<Self> {
        Self::new(device, D3D12_DESCRIPTOR_HEAP_TYPE_DSV, num_descriptors)
    }

    fn new(device: &ID3D12Device, kind: D3D12_DESCRIPTOR_HEAP_TYPE, num_descriptors: u32) -> Result<Self> {
        unsafe {
            let heap_desc = D3D12_DESCRIPTOR_HEAP_DESC {
                Type: kind,
                NumDescriptors: num_descriptors,
                Flags: D3D12_DESCRIPTOR_HEAP_FLAG_NONE,
                NodeMask: 0,
            };

            let heap: ID3D12DescriptorHeap = device
                .CreateDescriptorHeap(&heap_desc)
                .map_err(|e| {
                    GraphicsError::ResourceCreation(format!("Failed to create {:?} descriptor heap: {:?}", kind, e))
                })?;

            let increment_size = device.GetDescriptorHandleIncrementSize(kind) as usize;
            let cpu_start = heap.GetCPUDescriptorHandleForHeapStart().ptr;

            Ok(Self {
                _heap: heap,
                increment_size,
                cpu_start,
                num_descriptors,
            })
        }
    }

    /// 第 `index` 个描述符的 CPU 句柄
    pub fn handle(&self, index: usize) -> D3D12_CPU_DESCRIPTOR_HANDLE {
        debug_assert!(index < self.num_descriptors as usize, "descriptor index out of range");
        D3D12_CPU_DESCRIPTOR_HANDLE {
            ptr: self.cpu_start + index * self.increment_size,
        }
    }

    /// 在第 `index` 个描述符处为 `resource` 创建渲染目标视图
    pub fn create_rtv(&self, device: &ID3D12Device, resource: &ID3D12Resource, index: usize) {
        unsafe {
            device.CreateRenderTargetView(resource, None, self.handle(index));
        }
    }

    /// 在第 `index` 个描述符处为二维深度纹理创建深度模板视图
    pub fn create_dsv(&self, device: &ID3D12Device, resource: &ID3D12Resource, format: DXGI_FORMAT, index: usize) {
        let desc = D3D12_DEPTH_STENCIL_VIEW_DESC {
            Format: format,
            ViewDimension: D3D12_DSV_DIMENSION_TEXTURE2D,
            Flags: D3D12_DSV_FLAG_NONE,
            Anonymous: D3D12_DEPTH_STENCIL_VIEW_DESC_0 {
                Texture2D: D3D12_TEX2D_DSV { MipSlice: 0 },
            },
        };
        unsafe {
            device.CreateDepthStencilView(resource, Some(&desc), self.handle(index));
        }
    }
}
