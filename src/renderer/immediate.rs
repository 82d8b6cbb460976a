//! 一次性命令提交
//!
//! 录制到独立的命令分配器/命令列表，提交后立即阻塞直到 GPU 执行完毕。
//! 用于初始化阶段的状态转换，例如把新建的离屏纹理从 Common 转换到
//! 它常驻的 CopySource 状态，以及顶点/索引缓冲的数据上传（上传只能录制到
//! 这里，暂存缓冲在等待结束后释放）。不占用任何帧槽。

use tracing::{debug, warn};

use crate::core::error::Result;
use crate::gfx::backend::GraphicsBackend;
use super::command::CommandRecorder;
use super::resource::ResourceStateTracker;

/// 录制并同步执行一次性命令
///
/// 录制闭包失败时命令列表不会被提交，资源状态回滚到调用前。
pub fn run_commands<B, F>(backend: &mut B, tracker: &mut ResourceStateTracker, record: F) -> Result<()>
where
    B: GraphicsBackend,
    F: FnOnce(&mut CommandRecorder<'_, B>) -> Result<()>,
{
    let snapshot = tracker.clone();
    backend.begin_immediate()?;

    let recorded = {
        let mut recorder = CommandRecorder::new(backend, tracker);
        record(&mut recorder)
    };

    match recorded {
        Ok(()) => {
            backend.finish_immediate()?;
            debug!(backend = backend.backend_name(), "Immediate commands completed");
            Ok(())
        }
        Err(e) => {
            *tracker = snapshot;
            // 不能提交一个录制到一半的命令列表
            if let Err(discard) = backend.discard_command_list() {
                warn!("Failed to discard immediate command list: {}", discard);
            }
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::null::{NullBackend, NullEvent};
    use crate::renderer::resource::{ResourceId, ResourceState};

    #[test]
    fn test_transition_new_texture() {
        let mut backend = NullBackend::new(2, 64, 64, 8);
        let mut tracker = ResourceStateTracker::new();
        let tex = backend.create_render_texture(64, 64).unwrap();
        tracker.register(tex, ResourceState::Common);

        run_commands(&mut backend, &mut tracker, |cmd| {
            cmd.transition(tex, ResourceState::CopySource)
        }).unwrap();

        assert_eq!(tracker.state(tex), Some(ResourceState::CopySource));
        assert_eq!(backend.pending_signals(), 0);
        assert!(matches!(
            backend.last_submission(),
            [NullEvent::Barrier(t)] if t.before == ResourceState::Common && t.after == ResourceState::CopySource
        ));
    }

    #[test]
    fn test_failed_recording_not_submitted() {
        let mut backend = NullBackend::new(2, 64, 64, 8);
        let mut tracker = ResourceStateTracker::new();
        let tex = backend.create_render_texture(64, 64).unwrap();
        tracker.register(tex, ResourceState::Common);

        let result = run_commands(&mut backend, &mut tracker, |cmd| {
            cmd.transition(tex, ResourceState::CopyDest)?;
            // 纹理不在 RenderTarget 状态
            cmd.clear(tex, [1.0, 1.0, 1.0, 1.0])
        });

        assert!(result.is_err());
        assert_eq!(tracker.state(tex), Some(ResourceState::Common));
        assert!(!backend.history().any(|e| matches!(e, NullEvent::Execute { .. })));

        // 后端可以继续使用
        run_commands(&mut backend, &mut tracker, |cmd| {
            cmd.transition(tex, ResourceState::RenderTarget)?;
            cmd.clear(ResourceId::Texture(0), [0.0; 4])
        }).unwrap();
    }
}
