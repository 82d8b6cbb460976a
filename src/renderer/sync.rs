//! GPU 同步机制模块
//!
//! 每个帧槽拥有一个 fence。CPU 通过比较 fence 的已完成值和该帧槽最后一次
//! signal 的值来判断帧槽上的提交是否执行完毕。
//!
//! # 使用场景
//!
//! 1. **帧同步**：复用帧槽的命令分配器之前，确认 GPU 已经完成该帧槽的上一次提交
//! 2. **一次性提交**：上传或状态转换这类命令提交后立即等待完成
//! 3. **刷新**：调整交换链大小或销毁之前等待 GPU 空闲

/// Fence 值
///
/// 用于 CPU-GPU 同步的单调递增值。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FenceValue(u64);

impl FenceValue {
    /// fence 创建时的初始值
    pub const INITIAL: FenceValue = FenceValue(0);

    /// 创建新的 Fence 值
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// 获取内部值
    pub fn value(&self) -> u64 {
        self.0
    }

    /// 递增 Fence 值
    pub fn increment(&mut self) {
        self.0 += 1;
    }
}

/// Fence 状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FenceStatus {
    /// 最后一次 signal 的值已经到达
    Idle,
    /// GPU 还没有执行到最后一次 signal
    Pending,
}

/// 单个帧槽的 fence 记录
///
/// - `expected`：下一次在该帧槽提交时要 signal 的值
/// - `signaled`：最后一次实际 signal 的值
///
/// `expected` 只增不减，且总是不小于 `signaled`。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SlotFence {
    expected: FenceValue,
    signaled: FenceValue,
}

impl SlotFence {
    /// 创建新的记录，两个值都等于 fence 的初始值
    pub fn new() -> Self {
        Self::default()
    }

    /// 下一次 signal 的值
    pub fn expected(&self) -> FenceValue {
        self.expected
    }

    /// 最后一次 signal 的值
    pub fn signaled(&self) -> FenceValue {
        self.signaled
    }

    /// 递增下一次 signal 的值并返回
    pub fn advance(&mut self) -> FenceValue {
        self.expected.increment();
        self.expected
    }

    /// 记录一次 signal
    pub fn mark_signaled(&mut self, value: FenceValue) {
        debug_assert!(value > self.signaled, "fence values must increase");
        self.signaled = value;
        if self.expected < value {
            self.expected = value;
        }
    }

    /// 根据 GPU 已完成的值判断状态
    pub fn status(&self, completed: FenceValue) -> FenceStatus {
        if completed >= self.signaled {
            FenceStatus::Idle
        } else {
            FenceStatus::Pending
        }
    }

    /// 是否需要阻塞等待
    pub fn needs_wait(&self, completed: FenceValue) -> bool {
        self.status(completed) == FenceStatus::Pending
    }
}
