//! 配置管理模块
//!
//! 提供配置的加载、解析和管理功能。
//! 支持从 TOML 配置文件加载，也支持命令行参数覆盖。
//!
//! # 配置文件格式 (config.toml)
//!
//! ```toml
//! [window]
//! width = 800
//! height = 600
//! title = "frame_ring"
//! resizable = true
//!
//! [graphics]
//! backend = "dx12"          # 或 "null"
//! frame_count = 2           # 2 或 3
//! vsync = true
//! pacing = "wait_previous"  # 或 "pipelined"
//! adapter = "hardware"      # 或 "warp"
//! debug_layer = false
//! render_to_texture = false
//!
//! [scene]
//! clear_color = [0.0, 0.2, 0.4, 1.0]
//! animate = true
//! depth_buffer = true
//! upload_mesh = true
//!
//! [null]
//! gpu_latency = 1
//! frames = 120
//!
//! [logging]
//! level = "info"      # trace, debug, info, warn, error
//! file_output = false
//! ```

use serde::Deserialize;
use std::path::Path;

use super::error::{ConfigError, FrameRingError, Result};

/// 配置
///
/// 可以从配置文件加载，也可以通过代码构建。缺省的段落和字段都有默认值。
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// 窗口配置
    #[serde(default)]
    pub window: WindowConfig,

    /// 图形配置
    #[serde(default)]
    pub graphics: GraphicsConfig,

    /// 每帧绘制内容
    #[serde(default)]
    pub scene: SceneConfig,

    /// 模拟后端配置
    #[serde(default)]
    pub null: NullConfig,

    /// 日志配置
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// 窗口配置
#[derive(Debug, Clone, Deserialize)]
pub struct WindowConfig {
    /// 窗口宽度
    #[serde(default = "default_width")]
    pub width: u32,

    /// 窗口高度
    #[serde(default = "default_height")]
    pub height: u32,

    /// 窗口标题
    #[serde(default = "default_title")]
    pub title: String,

    /// 是否可调整大小
    #[serde(default = "default_resizable")]
    pub resizable: bool,
}

/// 图形配置
#[derive(Debug, Clone, Deserialize)]
pub struct GraphicsConfig {
    /// 图形后端选择
    #[serde(default = "default_backend")]
    pub backend: GraphicsBackend,

    /// 交换链缓冲数量，也就是帧槽数量
    #[serde(default = "default_frame_count")]
    pub frame_count: usize,

    /// 垂直同步
    #[serde(default = "default_vsync")]
    pub vsync: bool,

    /// 录制前等待哪个帧槽
    #[serde(default = "default_pacing")]
    pub pacing: FramePacing,

    /// 适配器选择
    #[serde(default = "default_adapter")]
    pub adapter: AdapterPreference,

    /// 启用 D3D12 调试层
    #[serde(default)]
    pub debug_layer: bool,

    /// 先绘制到离屏纹理，再拷贝到后台缓冲
    #[serde(default)]
    pub render_to_texture: bool,
}

/// 图形后端类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GraphicsBackend {
    /// DirectX 12 后端
    Dx12,
    /// CPU 模拟的 GPU 时间线，无窗口
    Null,
}

/// 帧节奏
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FramePacing {
    /// 等待上一帧完成后再查询新的帧槽（同一时刻最多一帧在途）
    WaitPrevious,
    /// 先查询新的帧槽，只等待该帧槽上一次的提交
    Pipelined,
}

/// 适配器选择
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdapterPreference {
    /// 第一个支持 feature level 11.0 的硬件适配器
    Hardware,
    /// WARP 软件光栅化器
    Warp,
}

/// 每帧绘制内容
#[derive(Debug, Clone, Deserialize)]
pub struct SceneConfig {
    /// 清屏颜色 RGBA
    #[serde(default = "default_clear_color")]
    pub clear_color: [f32; 4],

    /// 随帧号改变清屏颜色
    #[serde(default = "default_animate")]
    pub animate: bool,

    /// 创建深度缓冲并每帧清除
    #[serde(default = "default_depth_buffer")]
    pub depth_buffer: bool,

    /// 初始化时上传三角形的顶点/索引缓冲
    #[serde(default = "default_upload_mesh")]
    pub upload_mesh: bool,
}

/// 模拟后端配置
#[derive(Debug, Clone, Deserialize)]
pub struct NullConfig {
    /// 队列中保留多少个未完成的 signal 才开始完成最早的一个
    #[serde(default = "default_gpu_latency")]
    pub gpu_latency: usize,

    /// 无窗口运行的帧数
    #[serde(default = "default_null_frames")]
    pub frames: u64,
}

/// 日志配置
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// 日志级别
    #[serde(default = "default_log_level")]
    pub level: LogLevel,

    /// 是否输出到文件
    #[serde(default = "default_file_output")]
    pub file_output: bool,

    /// 日志文件路径
    #[serde(default = "default_log_file")]
    pub log_file: String,
}

/// 日志级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

// 默认值函数
fn default_width() -> u32 { 800 }
fn default_height() -> u32 { 600 }
fn default_title() -> String { "frame_ring".to_string() }
fn default_resizable() -> bool { true }
fn default_backend() -> GraphicsBackend { GraphicsBackend::Dx12 }
fn default_frame_count() -> usize { 2 }
fn default_vsync() -> bool { true }
fn default_pacing() -> FramePacing { FramePacing::WaitPrevious }
fn default_adapter() -> AdapterPreference { AdapterPreference::Hardware }
fn default_clear_color() -> [f32; 4] { [0.0, 0.2, 0.4, 1.0] }
fn default_animate() -> bool { true }
fn default_depth_buffer() -> bool { true }
fn default_upload_mesh() -> bool { true }
fn default_gpu_latency() -> usize { 1 }
fn default_null_frames() -> u64 { 120 }
fn default_log_level() -> LogLevel { LogLevel::Info }
fn default_file_output() -> bool { false }
fn default_log_file() -> String { "frame_ring.log".to_string() }

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            title: default_title(),
            resizable: default_resizable(),
        }
    }
}

impl Default for GraphicsConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            frame_count: default_frame_count(),
            vsync: default_vsync(),
            pacing: default_pacing(),
            adapter: default_adapter(),
            debug_layer: false,
            render_to_texture: false,
        }
    }
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            clear_color: default_clear_color(),
            animate: default_animate(),
            depth_buffer: default_depth_buffer(),
            upload_mesh: default_upload_mesh(),
        }
    }
}

impl Default for NullConfig {
    fn default() -> Self {
        Self {
            gpu_latency: default_gpu_latency(),
            frames: default_null_frames(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file_output: default_file_output(),
            log_file: default_log_file(),
        }
    }
}

impl Config {
    /// 从配置文件加载
    ///
    /// # 示例
    ///
    /// ```no_run
    /// use frame_ring::core::Config;
    ///
    /// let config = Config::from_file("config.toml")?;
    /// # Ok::<(), frame_ring::core::FrameRingError>(())
    /// ```
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_str = path.as_ref().to_string_lossy().to_string();

        let contents = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ConfigError::FileNotFound(path_str).into(),
            _ => FrameRingError::Io(e),
        })?;

        Self::from_toml_str(&contents)
    }

    /// 从 TOML 字符串解析
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents)
            .map_err(|e| ConfigError::ParseError(e.to_string()).into())
    }

    /// 从配置文件加载，文件不存在时使用默认配置
    ///
    /// 文件存在但无法读取或解析时返回错误，不会退回默认值。
    pub fn from_file_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        match Self::from_file(path) {
            Err(FrameRingError::Config(ConfigError::FileNotFound(_))) => Ok(Self::default()),
            result => result,
        }
    }

    /// 从命令行参数覆盖配置
    ///
    /// 支持的参数：
    /// - `--dx12` / `--null`: 选择后端
    /// - `--width <value>` / `--height <value>`: 窗口尺寸
    /// - `--frames <value>`: 帧槽数量
    /// - `--pipelined`: 使用流水线帧节奏
    /// - `--offscreen`: 启用离屏渲染通道
    /// - `--headless-frames <value>`: 模拟后端运行的帧数
    pub fn apply_args<I>(&mut self, args: I)
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let args: Vec<String> = args.into_iter().map(|s| s.as_ref().to_string()).collect();

        if args.iter().any(|a| a == "--dx12") {
            self.graphics.backend = GraphicsBackend::Dx12;
        }

        if args.iter().any(|a| a == "--null") {
            self.graphics.backend = GraphicsBackend::Null;
        }

        if args.iter().any(|a| a == "--pipelined") {
            self.graphics.pacing = FramePacing::Pipelined;
        }

        if args.iter().any(|a| a == "--offscreen") {
            self.graphics.render_to_texture = true;
        }

        if let Some(width) = arg_value(&args, "--width") {
            self.window.width = width;
        }

        if let Some(height) = arg_value(&args, "--height") {
            self.window.height = height;
        }

        if let Some(frame_count) = arg_value(&args, "--frames") {
            self.graphics.frame_count = frame_count;
        }

        if let Some(frames) = arg_value(&args, "--headless-frames") {
            self.null.frames = frames;
        }
    }

    /// 验证配置的有效性
    pub fn validate(&self) -> Result<()> {
        if self.window.width == 0 || self.window.height == 0 {
            return Err(ConfigError::InvalidValue {
                field: "window.width/height".to_string(),
                reason: "Window dimensions must be greater than 0".to_string(),
            }.into());
        }

        if !(2..=3).contains(&self.graphics.frame_count) {
            return Err(ConfigError::InvalidValue {
                field: "graphics.frame_count".to_string(),
                reason: "Frame count must be 2 or 3".to_string(),
            }.into());
        }

        if self.scene.clear_color.iter().any(|c| !(0.0..=1.0).contains(c)) {
            return Err(ConfigError::InvalidValue {
                field: "scene.clear_color".to_string(),
                reason: "Color components must be within [0, 1]".to_string(),
            }.into());
        }

        if self.null.frames == 0 {
            return Err(ConfigError::InvalidValue {
                field: "null.frames".to_string(),
                reason: "Headless runs need at least one frame".to_string(),
            }.into());
        }

        Ok(())
    }
}

fn arg_value<T: std::str::FromStr>(args: &[String], flag: &str) -> Option<T> {
    let idx = args.iter().position(|a| a == flag)?;
    args.get(idx + 1)?.parse().ok()
}

impl GraphicsBackend {
    /// 获取后端名称
    pub fn name(&self) -> &'static str {
        match self {
            GraphicsBackend::Dx12 => "DirectX 12",
            GraphicsBackend::Null => "Null",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.window.width, 800);
        assert_eq!(config.window.height, 600);
        assert_eq!(config.graphics.backend, GraphicsBackend::Dx12);
        assert_eq!(config.graphics.frame_count, 2);
        assert_eq!(config.graphics.pacing, FramePacing::WaitPrevious);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        config.window.width = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.graphics.frame_count = 4;
        assert!(config.validate().is_err());
        config.graphics.frame_count = 1;
        assert!(config.validate().is_err());
        config.graphics.frame_count = 3;
        assert!(config.validate().is_ok());

        let mut config = Config::default();
        config.scene.clear_color = [1.5, 0.0, 0.0, 1.0];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml() {
        let config = Config::from_toml_str(
            r#"
            [graphics]
            backend = "null"
            pacing = "pipelined"
            frame_count = 3

            [null]
            frames = 10
            "#,
        )
        .unwrap();

        assert_eq!(config.graphics.backend, GraphicsBackend::Null);
        assert_eq!(config.graphics.pacing, FramePacing::Pipelined);
        assert_eq!(config.graphics.frame_count, 3);
        assert!(config.graphics.vsync);
        assert_eq!(config.null.frames, 10);
        assert_eq!(config.null.gpu_latency, 1);
        assert_eq!(config.window.title, "frame_ring");
        assert!(config.scene.depth_buffer);
        assert!(config.scene.upload_mesh);
    }

    #[test]
    fn test_sample_config_file() {
        let config = Config::from_toml_str(include_str!("../../config.toml")).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.graphics.pacing, FramePacing::WaitPrevious);
        assert_eq!(config.logging.log_file, "frame_ring.log");
    }

    #[test]
    fn test_bad_toml() {
        let err = Config::from_toml_str("[graphics]\nbackend = \"vulkan\"").unwrap_err();
        assert!(err.to_string().starts_with("Configuration error: Failed to parse config"));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let path = std::env::temp_dir().join("frame_ring_missing_config.toml");
        let _ = std::fs::remove_file(&path);

        let config = Config::from_file_or_default(&path).unwrap();
        assert_eq!(config.graphics.backend, GraphicsBackend::Dx12);
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let path = std::env::temp_dir().join(format!("frame_ring_bad_config_{}.toml", std::process::id()));
        std::fs::write(&path, "[graphics]\nbackend = \"null\"\npacing = \"pipelind\"\n").unwrap();

        let result = Config::from_file_or_default(&path);
        std::fs::remove_file(&path).unwrap();

        let err = result.unwrap_err();
        assert!(matches!(err, FrameRingError::Config(ConfigError::ParseError(_))));
        assert!(err.to_string().contains("pipelind"));
    }

    #[test]
    fn test_apply_args() {
        let mut config = Config::default();
        config.apply_args([
            "frame_ring",
            "--null",
            "--pipelined",
            "--offscreen",
            "--width",
            "1024",
            "--frames",
            "3",
            "--headless-frames",
            "5",
        ]);

        assert_eq!(config.graphics.backend, GraphicsBackend::Null);
        assert_eq!(config.graphics.pacing, FramePacing::Pipelined);
        assert!(config.graphics.render_to_texture);
        assert_eq!(config.window.width, 1024);
        assert_eq!(config.window.height, 600);
        assert_eq!(config.graphics.frame_count, 3);
        assert_eq!(config.null.frames, 5);
    }

    #[test]
    fn test_apply_args_ignores_bad_numbers() {
        let mut config = Config::default();
        config.apply_args(["frame_ring", "--width", "wide", "--frames"]);
        assert_eq!(config.window.width, 800);
        assert_eq!(config.graphics.frame_count, 2);
    }
}
