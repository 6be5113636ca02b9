//! 无 GPU 的渲染器：记录资源与绘制调用

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use super::{DrawFrame, GpuTexture, Renderer, SurfaceHandle, SurfaceSize};
use crate::texture::Texture;
use crate::RenderError;

/// 一次绘制的记录
#[derive(Clone, Debug, PartialEq)]
pub struct DrawRecord {
    pub surface: SurfaceHandle,
    pub texture_count: usize,
    pub opacity: f32,
    pub mvp: [f32; 16],
}

#[derive(Debug, Default)]
struct HeadlessState {
    next_id: u64,
    live_surfaces: BTreeSet<u64>,
    live_textures: BTreeSet<u64>,
    draws: Vec<DrawRecord>,
    created_surfaces: usize,
    fail_next_surface: bool,
    fail_draw: bool,
}

/// 记录型渲染器
///
/// 克隆体共享同一份状态，方便在把渲染器交给运行时之后继续观察。
#[derive(Clone, Debug, Default)]
pub struct HeadlessRenderer {
    state: Arc<Mutex<HeadlessState>>,
}

impl HeadlessRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut HeadlessState) -> R) -> Option<R> {
        self.state.lock().ok().map(|mut s| f(&mut s))
    }

    pub fn live_surface_count(&self) -> usize {
        self.with_state(|s| s.live_surfaces.len()).unwrap_or(0)
    }

    pub fn live_texture_count(&self) -> usize {
        self.with_state(|s| s.live_textures.len()).unwrap_or(0)
    }

    /// 累计创建过的渲染目标数
    pub fn created_surface_count(&self) -> usize {
        self.with_state(|s| s.created_surfaces).unwrap_or(0)
    }

    pub fn draws(&self) -> Vec<DrawRecord> {
        self.with_state(|s| s.draws.clone()).unwrap_or_default()
    }

    /// 让下一次 create_surface 失败
    pub fn fail_next_surface(&self) {
        self.with_state(|s| s.fail_next_surface = true);
    }

    pub fn set_fail_draw(&self, fail: bool) {
        self.with_state(|s| s.fail_draw = fail);
    }
}

impl Renderer for HeadlessRenderer {
    fn create_surface(&mut self, size: SurfaceSize) -> Result<SurfaceHandle, RenderError> {
        let mut state = self
            .state
            .lock()
            .map_err(|e| RenderError::Draw(e.to_string()))?;
        if state.fail_next_surface || size.width == 0 || size.height == 0 {
            state.fail_next_surface = false;
            return Err(RenderError::SurfaceCreation {
                width: size.width,
                height: size.height,
                reason: "headless surface rejected".to_string(),
            });
        }
        state.next_id += 1;
        let id = state.next_id;
        state.live_surfaces.insert(id);
        state.created_surfaces += 1;
        Ok(SurfaceHandle { id, size })
    }

    fn release_surface(&mut self, surface: SurfaceHandle) {
        self.with_state(|s| s.live_surfaces.remove(&surface.id));
    }

    fn upload_texture(&mut self, slot: usize, texture: &Texture) -> Result<GpuTexture, RenderError> {
        if texture.data.is_empty() {
            return Err(RenderError::TextureUpload {
                slot,
                reason: "empty texture".to_string(),
            });
        }
        let mut state = self
            .state
            .lock()
            .map_err(|e| RenderError::Draw(e.to_string()))?;
        state.next_id += 1;
        let id = state.next_id;
        state.live_textures.insert(id);
        Ok(GpuTexture { id, slot })
    }

    fn release_texture(&mut self, texture: GpuTexture) {
        self.with_state(|s| s.live_textures.remove(&texture.id));
    }

    fn draw(&mut self, frame: &DrawFrame<'_>) -> Result<(), RenderError> {
        let mut state = self
            .state
            .lock()
            .map_err(|e| RenderError::Draw(e.to_string()))?;
        if state.fail_draw {
            return Err(RenderError::Draw("headless draw failure".to_string()));
        }
        if !state.live_surfaces.contains(&frame.surface.id) {
            return Err(RenderError::Draw(format!("surface {} was released", frame.surface.id)));
        }
        state.draws.push(DrawRecord {
            surface: *frame.surface,
            texture_count: frame.textures.len(),
            opacity: frame.opacity,
            mvp: frame.mvp.to_cols_array(),
        });
        Ok(())
    }
}
