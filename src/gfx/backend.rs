//! 图形后端的统一抽象接口
//!
//! 帧同步循环（`renderer::cycle`）只通过这个 trait 访问 GPU。DirectX 12 后端
//! 把每个方法映射到对应的 D3D12/DXGI 调用；模拟后端用一个 CPU 上的队列模拟
//! GPU 时间线，用于无窗口运行和测试。
//!
//! 所有方法都返回 `Result`，失败按 `GraphicsError` 分类。

use crate::core::error::Result;
use crate::renderer::resource::{ResourceId, Transition};
use crate::renderer::sync::FenceValue;

/// 图形后端的统一接口
pub trait GraphicsBackend {
    /// 后端名称，用于日志输出
    fn backend_name(&self) -> &str;

    /// 交换链缓冲数量，也就是帧槽数量
    fn frame_count(&self) -> usize;

    /// 后台缓冲尺寸
    fn extent(&self) -> (u32, u32);

    /// 交换链当前的后台缓冲索引
    ///
    /// 由呈现引擎决定，不一定按顺序递增。
    fn current_back_buffer_index(&self) -> usize;

    /// 帧槽 fence 的已完成值
    fn completed_value(&self, slot: usize) -> Result<FenceValue>;

    /// 阻塞直到帧槽 fence 到达 `value`
    fn wait_for_value(&mut self, slot: usize, value: FenceValue) -> Result<()>;

    /// 重置帧槽的命令分配器，并让命令列表进入录制状态
    ///
    /// 调用方保证该帧槽上一次提交已经完成。
    fn reset_command_list(&mut self, slot: usize) -> Result<()>;

    /// 在当前录制的命令列表中记录一个状态转换屏障
    fn resource_barrier(&mut self, transition: Transition) -> Result<()>;

    /// 清除渲染目标（资源需处于 RenderTarget 状态）
    fn clear_render_target(&mut self, target: ResourceId, color: [f32; 4]) -> Result<()>;

    /// 清除深度缓冲（资源需处于 DepthWrite 状态）
    fn clear_depth(&mut self, target: ResourceId, depth: f32) -> Result<()>;

    /// 整体拷贝纹理（源需处于 CopySource，目标需处于 CopyDest）
    fn copy_texture(&mut self, src: ResourceId, dst: ResourceId) -> Result<()>;

    /// 把 `data` 写入一个上传堆暂存缓冲，并录制从它到 `dst` 的拷贝
    ///
    /// 只能录制到一次性命令列表：暂存缓冲在一次性提交完成后释放。
    fn upload_buffer(&mut self, dst: ResourceId, data: &[u8]) -> Result<()>;

    /// 关闭帧命令列表并提交到队列
    fn close_and_execute(&mut self) -> Result<()>;

    /// 关闭正在录制的命令列表（帧或一次性）但不提交，录制失败时调用
    fn discard_command_list(&mut self) -> Result<()>;

    /// 在队列上 signal 帧槽 fence
    fn signal(&mut self, slot: usize, value: FenceValue) -> Result<()>;

    /// 呈现
    fn present(&mut self, vsync: bool) -> Result<()>;

    /// 开始一次性命令列表（之后的屏障/清除/拷贝都录制到这里）
    fn begin_immediate(&mut self) -> Result<()>;

    /// 提交一次性命令列表并阻塞直到 GPU 执行完毕
    fn finish_immediate(&mut self) -> Result<()>;

    /// 创建与后台缓冲格式相同的离屏渲染目标，初始状态为 Common
    fn create_render_texture(&mut self, width: u32, height: u32) -> Result<ResourceId>;

    /// 在默认堆上创建 `size` 字节的缓冲，初始状态为 Common
    fn create_buffer(&mut self, size: u64) -> Result<ResourceId>;

    /// 创建 32 位浮点深度缓冲，初始状态为 DepthWrite
    fn create_depth_target(&mut self, width: u32, height: u32) -> Result<ResourceId>;

    /// 释放离屏纹理、缓冲或深度缓冲（调用方保证 GPU 不再使用它）
    fn release_resource(&mut self, resource: ResourceId);

    /// 调整交换链缓冲尺寸（调用方保证 GPU 空闲）
    fn resize_buffers(&mut self, width: u32, height: u32) -> Result<()>;
}
