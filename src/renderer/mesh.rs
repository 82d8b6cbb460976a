//! 网格数据及其上传
//!
//! 顶点和索引数据在一次性命令列表中从暂存缓冲拷贝到默认堆：
//!
//! ```text
//! 顶点缓冲  Common → CopyDest，拷贝，CopyDest → VertexAndConstantBuffer
//! 索引缓冲  Common → CopyDest，拷贝，CopyDest → IndexBuffer
//! ```
//!
//! 两个缓冲录制到同一个命令列表，只等待一次。

use bytemuck::{Pod, Zeroable};
use tracing::debug;

use crate::core::error::{GraphicsError, Result};
use crate::gfx::backend::GraphicsBackend;
use super::cycle::{upload_into, FrameCycle};
use super::resource::{ResourceId, ResourceState};

/// 顶点
///
/// # 内存布局
///
/// - `position`：前 12 字节（3 个 f32）
/// - `color`：后 16 字节（RGBA）
#[repr(C)]
#[derive(Default, Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub color: [f32; 4],
}

impl Vertex {
    pub fn new(position: [f32; 3], color: [f32; 4]) -> Self {
        Self { position, color }
    }
}

/// CPU 上的网格数据（16 位索引）
#[derive(Debug, Clone, Default)]
pub struct MeshData {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u16>,
}

impl MeshData {
    /// 红绿蓝三色三角形
    pub fn triangle() -> Self {
        Self {
            vertices: vec![
                Vertex::new([0.0, 0.5, 0.5], [1.0, 0.0, 0.0, 1.0]),
                Vertex::new([0.5, -0.5, 0.5], [0.0, 1.0, 0.0, 1.0]),
                Vertex::new([-0.5, -0.5, 0.5], [0.0, 0.0, 1.0, 1.0]),
            ],
            indices: vec![0, 1, 2],
        }
    }

    /// 检查数据非空且索引不越界
    pub fn validate(&self) -> Result<()> {
        if self.vertices.is_empty() || self.indices.is_empty() {
            return Err(GraphicsError::ResourceCreation("Mesh has no vertices or indices".to_string()).into());
        }
        if let Some(index) = self.indices.iter().find(|&&i| i as usize >= self.vertices.len()) {
            return Err(GraphicsError::ResourceCreation(format!(
                "Index {} out of range ({} vertices)",
                index,
                self.vertices.len()
            )).into());
        }
        Ok(())
    }
}

/// GPU 上的网格
#[derive(Debug, PartialEq, Eq)]
pub struct Mesh {
    vertex_buffer: ResourceId,
    index_buffer: ResourceId,
    vertex_count: u32,
    index_count: u32,
}

impl Mesh {
    /// 每个顶点的字节数
    pub const VERTEX_STRIDE: u32 = std::mem::size_of::<Vertex>() as u32;

    /// 创建顶点/索引缓冲并上传数据，返回时 GPU 已拷贝完成
    pub fn upload<B: GraphicsBackend>(cycle: &mut FrameCycle<B>, data: &MeshData) -> Result<Self> {
        data.validate()?;
        let vertex_bytes: &[u8] = bytemuck::cast_slice(&data.vertices);
        let index_bytes: &[u8] = bytemuck::cast_slice(&data.indices);

        let vertex_buffer = cycle.create_buffer(vertex_bytes.len() as u64)?;
        let index_buffer = match cycle.create_buffer(index_bytes.len() as u64) {
            Ok(buffer) => buffer,
            Err(e) => {
                cycle.release_resource(vertex_buffer)?;
                return Err(e);
            }
        };

        let uploaded = cycle.run_immediate(|cmd| {
            upload_into(cmd, vertex_buffer, vertex_bytes, ResourceState::VertexAndConstantBuffer)?;
            upload_into(cmd, index_buffer, index_bytes, ResourceState::IndexBuffer)
        });
        if let Err(e) = uploaded {
            cycle.release_resource(vertex_buffer)?;
            cycle.release_resource(index_buffer)?;
            return Err(e);
        }

        debug!(
            vertices = data.vertices.len(),
            indices = data.indices.len(),
            "Mesh uploaded"
        );

        Ok(Self {
            vertex_buffer,
            index_buffer,
            vertex_count: data.vertices.len() as u32,
            index_count: data.indices.len() as u32,
        })
    }

    /// 释放两个缓冲（先刷新 GPU）
    pub fn release<B: GraphicsBackend>(self, cycle: &mut FrameCycle<B>) -> Result<()> {
        cycle.release_resource(self.vertex_buffer)?;
        cycle.release_resource(self.index_buffer)
    }

    pub fn vertex_buffer(&self) -> ResourceId {
        self.vertex_buffer
    }

    pub fn index_buffer(&self) -> ResourceId {
        self.index_buffer
    }

    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    pub fn index_count(&self) -> u32 {
        self.index_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::FramePacing;
    use crate::gfx::null::{NullBackend, NullEvent};
    use crate::renderer::resource::Transition;

    fn cycle() -> FrameCycle<NullBackend> {
        FrameCycle::new(NullBackend::new(2, 64, 64, 2), FramePacing::Pipelined, true).unwrap()
    }

    #[test]
    fn test_vertex_layout() {
        assert_eq!(Mesh::VERTEX_STRIDE, 28);
    }

    #[test]
    fn test_triangle_upload() {
        let mut cycle = cycle();
        let data = MeshData::triangle();
        let mesh = Mesh::upload(&mut cycle, &data).unwrap();

        let vb = mesh.vertex_buffer();
        let ib = mesh.index_buffer();
        let barrier = |resource, before, after| NullEvent::Barrier(Transition { resource, before, after });
        let expected = vec![
            barrier(vb, ResourceState::Common, ResourceState::CopyDest),
            NullEvent::Upload { dst: vb, bytes: 84 },
            barrier(vb, ResourceState::CopyDest, ResourceState::VertexAndConstantBuffer),
            barrier(ib, ResourceState::Common, ResourceState::CopyDest),
            NullEvent::Upload { dst: ib, bytes: 6 },
            barrier(ib, ResourceState::CopyDest, ResourceState::IndexBuffer),
        ];
        assert_eq!(cycle.backend().last_submission(), expected.as_slice());

        // 一次提交
        let executes = cycle.backend().history().filter(|e| matches!(e, NullEvent::Execute { .. })).count();
        assert_eq!(executes, 1);

        assert_eq!(cycle.backend().buffer_contents(ib), Some(&[0u8, 0, 1, 0, 2, 0][..]));
        let vertex_bytes: &[u8] = bytemuck::cast_slice(&data.vertices);
        assert_eq!(cycle.backend().buffer_contents(vb), Some(vertex_bytes));
        assert_eq!(mesh.index_count(), 3);

        mesh.release(&mut cycle).unwrap();
        assert_eq!(cycle.backend().resource_count(), 0);
    }

    #[test]
    fn test_bad_mesh_rejected() {
        let mut cycle = cycle();
        let mut data = MeshData::triangle();
        data.indices.push(3);
        assert!(Mesh::upload(&mut cycle, &data).is_err());
        assert!(Mesh::upload(&mut cycle, &MeshData::default()).is_err());
        assert_eq!(cycle.backend().resource_count(), 0);
    }
}
