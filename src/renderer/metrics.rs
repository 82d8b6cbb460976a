//! 帧统计模块
//!
//! FrameStats 跟踪帧数、帧率，以及 CPU 在 fence 上阻塞的次数和时间。

use std::time::{Duration, Instant};

/// 帧统计
#[derive(Debug, Clone)]
pub struct FrameStats {
    total_frames: u64,
    window_frames: u32,
    last_update: Instant,
    fps: f32,
    frame_time_ms: f32,
    gpu_waits: u64,
    wait_time: Duration,
}

impl Default for FrameStats {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameStats {
    /// 创建新的统计器
    pub fn new() -> Self {
        Self {
            total_frames: 0,
            window_frames: 0,
            last_update: Instant::now(),
            fps: 0.0,
            frame_time_ms: 0.0,
            gpu_waits: 0,
            wait_time: Duration::ZERO,
        }
    }

    /// 记录一帧
    pub fn record_frame(&mut self) {
        self.total_frames += 1;
        self.window_frames += 1;
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_update);

        // 每秒更新一次 FPS
        if elapsed >= Duration::from_secs(1) {
            self.fps = self.window_frames as f32 / elapsed.as_secs_f32();
            self.frame_time_ms = 1000.0 / self.fps;
            self.window_frames = 0;
            self.last_update = now;
        }
    }

    /// 记录一次 fence 等待
    pub fn record_wait(&mut self, duration: Duration) {
        self.gpu_waits += 1;
        self.wait_time += duration;
    }

    /// 已提交的帧数
    pub fn total_frames(&self) -> u64 {
        self.total_frames
    }

    /// 获取当前 FPS
    pub fn fps(&self) -> f32 {
        self.fps
    }

    /// 获取当前帧时间（毫秒）
    pub fn frame_time_ms(&self) -> f32 {
        self.frame_time_ms
    }

    /// CPU 阻塞等待 GPU 的次数
    pub fn gpu_waits(&self) -> u64 {
        self.gpu_waits
    }

    /// 累计等待时间
    pub fn wait_time(&self) -> Duration {
        self.wait_time
    }

    /// 平均每帧的等待时间（毫秒）
    pub fn average_wait_ms(&self) -> f64 {
        if self.total_frames == 0 {
            0.0
        } else {
            self.wait_time.as_secs_f64() * 1000.0 / self.total_frames as f64
        }
    }
}
