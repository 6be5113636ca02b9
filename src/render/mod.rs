//! 渲染协作方接口与渲染目标管理

mod headless;

pub use headless::{DrawRecord, HeadlessRenderer};

use std::sync::Arc;

use glam::Mat4;

use crate::model::Model;
use crate::texture::Texture;
use crate::RenderError;

/// 渲染目标尺寸（像素）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SurfaceSize {
    pub width: u32,
    pub height: u32,
}

impl SurfaceSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// 渲染器分配的渲染目标句柄
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SurfaceHandle {
    pub id: u64,
    pub size: SurfaceSize,
}

/// 上传到 GPU 的纹理句柄
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GpuTexture {
    pub id: u64,
    pub slot: usize,
}

/// 单帧绘制输入
pub struct DrawFrame<'a> {
    pub model: &'a Model,
    pub surface: &'a SurfaceHandle,
    pub textures: &'a [GpuTexture],
    /// view-projection × 模型矩阵
    pub mvp: Mat4,
    pub opacity: f32,
}

/// 渲染协作方
pub trait Renderer: Send {
    fn create_surface(&mut self, size: SurfaceSize) -> Result<SurfaceHandle, RenderError>;

    fn release_surface(&mut self, surface: SurfaceHandle);

    fn upload_texture(&mut self, slot: usize, texture: &Texture) -> Result<GpuTexture, RenderError>;

    fn release_texture(&mut self, texture: GpuTexture);

    fn draw(&mut self, frame: &DrawFrame<'_>) -> Result<(), RenderError>;
}

/// 渲染目标与 GPU 纹理，整体创建、整体替换
#[derive(Debug)]
pub(crate) struct RenderResources {
    pub surface: SurfaceHandle,
    pub textures: Vec<GpuTexture>,
    released: bool,
}

impl RenderResources {
    /// 创建全部 GPU 资源；任何一步失败都会释放已创建的部分
    pub fn create(
        renderer: &mut dyn Renderer,
        size: SurfaceSize,
        textures: &[Arc<Texture>],
    ) -> Result<Self, RenderError> {
        let surface = renderer.create_surface(size)?;
        let mut uploaded = Vec::with_capacity(textures.len());

        for (slot, texture) in textures.iter().enumerate() {
            match renderer.upload_texture(slot, texture) {
                Ok(gpu) => uploaded.push(gpu),
                Err(e) => {
                    for gpu in uploaded {
                        renderer.release_texture(gpu);
                    }
                    renderer.release_surface(surface);
                    return Err(e);
                }
            }
        }

        Ok(Self {
            surface,
            textures: uploaded,
            released: false,
        })
    }

    /// 释放全部 GPU 资源，重复调用无副作用
    pub fn release(&mut self, renderer: &mut dyn Renderer) {
        for gpu in self.textures.drain(..) {
            renderer.release_texture(gpu);
        }
        if !self.released {
            renderer.release_surface(self.surface);
            self.released = true;
        }
    }
}
