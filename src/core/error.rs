//! 错误处理模块
//!
//! 定义了 frame_ring 中使用的统一错误类型。
//!
//! 每一个图形调用都返回 `Result`，失败被归类：设备丢失、显存不足、交换链错误、
//! 资源状态错误、帧槽仍在 GPU 上执行等。调用方用 `?` 传播，应用层记录日志后退出。

use std::fmt;

use crate::renderer::resource::{ResourceId, ResourceState};

/// 统一的 Result 类型
pub type Result<T> = std::result::Result<T, FrameRingError>;

/// frame_ring 的错误类型
#[derive(Debug)]
pub enum FrameRingError {
    /// 配置错误
    Config(ConfigError),

    /// 图形 API 错误
    Graphics(GraphicsError),

    /// IO 错误
    Io(std::io::Error),

    /// 日志系统错误
    Log(String),

    /// 初始化错误
    Initialization(String),
}

/// 配置相关的错误
#[derive(Debug)]
pub enum ConfigError {
    /// 配置文件未找到
    FileNotFound(String),

    /// 配置文件解析失败
    ParseError(String),

    /// 配置值无效
    InvalidValue { field: String, reason: String },
}

/// 图形 API 相关的错误
#[derive(Debug)]
pub enum GraphicsError {
    /// 没有可用的适配器
    AdapterNotFound(String),

    /// 设备创建失败
    DeviceCreation(String),

    /// 设备被移除、重置或挂起
    DeviceLost(String),

    /// 显存或系统内存不足
    OutOfMemory(String),

    /// 交换链错误
    SwapchainError(String),

    /// 资源创建失败
    ResourceCreation(String),

    /// 渲染命令执行失败
    CommandExecution(String),

    /// 资源不处于操作要求的状态
    InvalidResourceState {
        resource: ResourceId,
        expected: ResourceState,
        actual: Option<ResourceState>,
    },

    /// 交换链返回的帧槽超出范围
    InvalidFrameSlot { slot: usize, frame_count: usize },

    /// 帧槽上一次提交尚未完成就要复用
    SlotInFlight { slot: usize, signaled: u64, completed: u64 },

    /// 等待一个永远不会到达的 fence 值
    FenceNeverSignaled { slot: usize, value: u64, completed: u64 },
}

impl fmt::Display for FrameRingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameRingError::Config(e) => write!(f, "Configuration error: {}", e),
            FrameRingError::Graphics(e) => write!(f, "Graphics error: {}", e),
            FrameRingError::Io(e) => write!(f, "IO error: {}", e),
            FrameRingError::Log(msg) => write!(f, "Log error: {}", msg),
            FrameRingError::Initialization(msg) => write!(f, "Initialization error: {}", msg),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::FileNotFound(path) => write!(f, "Config file not found: {}", path),
            ConfigError::ParseError(msg) => write!(f, "Failed to parse config: {}", msg),
            ConfigError::InvalidValue { field, reason } => {
                write!(f, "Invalid value for '{}': {}", field, reason)
            }
        }
    }
}

impl fmt::Display for GraphicsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphicsError::AdapterNotFound(msg) => write!(f, "No suitable adapter: {}", msg),
            GraphicsError::DeviceCreation(msg) => write!(f, "Device creation failed: {}", msg),
            GraphicsError::DeviceLost(msg) => write!(f, "Device lost: {}", msg),
            GraphicsError::OutOfMemory(msg) => write!(f, "Out of memory: {}", msg),
            GraphicsError::SwapchainError(msg) => write!(f, "Swapchain error: {}", msg),
            GraphicsError::ResourceCreation(msg) => write!(f, "Resource creation failed: {}", msg),
            GraphicsError::CommandExecution(msg) => write!(f, "Command execution failed: {}", msg),
            GraphicsError::InvalidResourceState { resource, expected, actual } => match actual {
                Some(actual) => write!(
                    f,
                    "{} is in state {:?}, operation requires {:?}",
                    resource, actual, expected
                ),
                None => write!(f, "{} is not tracked, operation requires {:?}", resource, expected),
            },
            GraphicsError::InvalidFrameSlot { slot, frame_count } => {
                write!(f, "Frame slot {} out of range (frame count {})", slot, frame_count)
            }
            GraphicsError::SlotInFlight { slot, signaled, completed } => write!(
                f,
                "Frame slot {} still in flight (signaled {}, completed {})",
                slot, signaled, completed
            ),
            GraphicsError::FenceNeverSignaled { slot, value, completed } => write!(
                f,
                "Fence of slot {} will never reach {} (completed {}, nothing pending)",
                slot, value, completed
            ),
        }
    }
}

impl std::error::Error for FrameRingError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FrameRingError::Io(e) => Some(e),
            FrameRingError::Config(e) => Some(e),
            FrameRingError::Graphics(e) => Some(e),
            _ => None,
        }
    }
}

impl std::error::Error for ConfigError {}
impl std::error::Error for GraphicsError {}

impl From<std::io::Error> for FrameRingError {
    fn from(err: std::io::Error) -> Self {
        FrameRingError::Io(err)
    }
}

impl From<ConfigError> for FrameRingError {
    fn from(err: ConfigError) -> Self {
        FrameRingError::Config(err)
    }
}

impl From<GraphicsError> for FrameRingError {
    fn from(err: GraphicsError) -> Self {
        FrameRingError::Graphics(err)
    }
}

impl FrameRingError {
    /// 是否为设备丢失（调用方不应再继续提交）
    pub fn is_device_lost(&self) -> bool {
        matches!(self, FrameRingError::Graphics(GraphicsError::DeviceLost(_)))
    }
}
