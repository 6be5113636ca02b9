//! Cubism 用户模型运行时
//!
//! 持有模型实例、动作/表情状态、待机效果和渲染目标。
//! `update` 与 `draw` 每帧在同一线程上按顺序调用一次；所有可变操作都需要 `&mut self`。

use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use std::sync::Arc;

use glam::{Mat4, Vec2, Vec3};
use rand::rngs::StdRng;
use rand::SeedableRng;

use super::loader::{self, LoadedAssets};
use super::{HitAreaIndex, Model, ModelUserData};
use crate::config::{RuntimeConfig, RuntimeOptions};
use crate::effect::{Breath, DragFollow, EyeBlink, Physics, Pose};
use crate::id::IdentifierSet;
use crate::motion::{ExpressionManager, MotionEvent, MotionHandle, MotionLibrary, MotionQueueManager, MotionState};
use crate::platform::{ByteLoader, ModelConsistencyCheck};
use crate::render::{DrawFrame, RenderResources, Renderer, SurfaceSize};
use crate::setting::ModelSetting;
use crate::texture::Texture;
use crate::{LoadError, RenderError};

/// 已加载的模型
pub struct UserModel {
    setting: ModelSetting,
    model: Model,
    ids: IdentifierSet,
    textures: Vec<Arc<Texture>>,
    model_matrix: Mat4,

    library: MotionLibrary,
    motions: MotionQueueManager,
    expressions: ExpressionManager,

    eye_blink: Option<EyeBlink>,
    breath: Option<Breath>,
    drag: DragFollow,
    physics: Option<Physics>,
    pose: Option<Pose>,

    user_data: ModelUserData,
    hit_areas: HitAreaIndex,

    byte_loader: Arc<dyn ByteLoader>,
    consistency_check: Arc<dyn ModelConsistencyCheck>,
    renderer: Box<dyn Renderer>,
    render: RenderResources,
    surface_size: SurfaceSize,

    events: Vec<MotionEvent>,
    event_sender: Option<Sender<MotionEvent>>,
    options: RuntimeOptions,
    rng: StdRng,

    // 连续状态，只由 update 推进
    user_time: f32,
    opacity: f32,
    acceleration: Vec3,
    lip_sync_value: Option<f32>,
    updated: bool,
}

impl UserModel {
    /// 加载模型目录中的 `*.model3.json`
    pub fn load(config: RuntimeConfig, home_dir: impl AsRef<Path>) -> Result<Self, LoadError> {
        Self::load_inner(config, home_dir.as_ref(), None)
    }

    /// 加载指定名称的清单
    pub fn load_with_manifest(
        config: RuntimeConfig,
        home_dir: impl AsRef<Path>,
        manifest_name: &str,
    ) -> Result<Self, LoadError> {
        Self::load_inner(config, home_dir.as_ref(), Some(manifest_name))
    }

    fn load_inner(config: RuntimeConfig, home_dir: &Path, manifest_name: Option<&str>) -> Result<Self, LoadError> {
        let LoadedAssets {
            setting,
            mut model,
            ids,
            textures,
            library,
            physics,
            pose,
            user_data,
            hit_areas,
            surface_size,
        } = loader::load_assets(&config, home_dir, manifest_name)?;

        let RuntimeConfig {
            byte_loader,
            consistency_check,
            mut renderer,
            event_sender,
            options,
            ..
        } = config;

        let render = RenderResources::create(renderer.as_mut(), surface_size, &textures)?;

        if let Some(pose) = &pose {
            pose.reset(&mut model);
        }
        model.save_parameters();

        let eye_blink = (options.eye_blink.enabled && !ids.eye_blink.is_empty())
            .then(|| EyeBlink::new(ids.eye_blink.clone(), options.eye_blink.clone()));
        let breath = options
            .breath
            .enabled
            .then(|| Breath::new(&model, &options.breath.parameters));
        let physics = physics.filter(|_| options.physics.enabled);
        let rng = match options.random_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        Ok(Self {
            model_matrix: model.model_matrix(setting.layout()),
            setting,
            model,
            ids,
            textures,
            library,
            motions: MotionQueueManager::new(),
            expressions: ExpressionManager::new(),
            eye_blink,
            breath,
            drag: DragFollow::new(options.drag.clone()),
            physics,
            pose,
            user_data,
            hit_areas,
            byte_loader,
            consistency_check,
            renderer,
            render,
            surface_size,
            events: Vec::new(),
            event_sender,
            options,
            rng,
            user_time: 0.0,
            opacity: 1.0,
            acceleration: Vec3::ZERO,
            lip_sync_value: None,
            updated: false,
        })
    }

    // ========== 每帧 ==========

    /// 推进 dt 秒并按固定顺序合成参数
    ///
    /// 动作 → 表情 → 眨眼 → 口型 → 呼吸 → 拖拽 → 物理 → 姿势 → 变形。
    pub fn update(&mut self, dt: f32) {
        let dt = if dt.is_finite() { dt.max(0.0) } else { 0.0 };
        self.user_time += dt;
        self.drag.update(dt);

        self.model.load_parameters();
        if self.motions.is_finished() {
            self.start_idle_motion();
        }
        let mut events = Vec::new();
        let (motion_updated, opacity) =
            self.motions
                .update(self.user_time, &mut self.model, &self.ids, &mut events);
        if let Some(opacity) = opacity {
            self.opacity = opacity.clamp(0.0, 1.0);
        }
        self.model.save_parameters();

        self.expressions.update(self.user_time, &mut self.model);

        let blink_suppressed = motion_updated && self.options.eye_blink.only_without_motion;
        if let Some(eye_blink) = self.eye_blink.as_mut().filter(|_| !blink_suppressed) {
            let lip_sync_active = self.lip_sync_value.is_some();
            let ids = &self.ids;
            eye_blink.update(&mut self.model, dt, &mut self.rng, |id| {
                lip_sync_active && ids.is_lip_sync(id)
            });
        }

        if let Some(value) = self.lip_sync_value {
            for &id in &self.ids.lip_sync {
                self.model.add_parameter_value(id, value, self.options.lip_sync.weight);
            }
        }

        if let Some(breath) = &mut self.breath {
            breath.update(&mut self.model, dt);
        }

        self.drag.apply(&mut self.model, &self.ids);

        if let Some(physics) = &mut self.physics {
            physics.set_external_force(Vec2::new(self.acceleration.x, self.acceleration.y));
            physics.update(&mut self.model, dt);
        }

        if let Some(pose) = &self.pose {
            pose.update(&mut self.model, dt);
        }

        self.model.update();
        self.updated = true;
        self.dispatch(events);
    }

    /// 绘制到当前渲染目标
    ///
    /// `view_projection` 为列主序 4x4 矩阵。每次 `update` 之后只能成功绘制一次，
    /// 否则返回 [`RenderError::NotUpdated`]；绘制失败时可以重试。
    pub fn draw(&mut self, view_projection: [f32; 16]) -> Result<(), RenderError> {
        if !self.updated {
            return Err(RenderError::NotUpdated);
        }
        let mvp = Mat4::from_cols_array(&view_projection) * self.model_matrix;
        self.renderer.draw(&DrawFrame {
            model: &self.model,
            surface: &self.render.surface,
            textures: &self.render.textures,
            mvp,
            opacity: self.opacity,
        })?;
        self.updated = false;
        Ok(())
    }

    fn dispatch(&mut self, events: Vec<MotionEvent>) {
        match &self.event_sender {
            Some(sender) => {
                for event in events {
                    if sender.send(event).is_err() {
                        log::debug!("motion event receiver dropped");
                        break;
                    }
                }
            }
            None => self.events.extend(events),
        }
    }

    /// 取出缓存的生命周期事件
    pub fn drain_events(&mut self) -> Vec<MotionEvent> {
        std::mem::take(&mut self.events)
    }

    // ========== 动作与表情 ==========

    /// 启动 group 中第 index 个动作
    ///
    /// 未知的组或序号、延迟加载失败、被更高优先级阻挡时返回 [`MotionHandle::INVALID`]。
    pub fn start_motion(&mut self, group: &str, index: usize, priority: i32) -> MotionHandle {
        let setting = &self.setting;
        let model = &self.model;
        let byte_loader = self.byte_loader.as_ref();
        let options = &self.options.motion;
        let motion = self.library.get_or_load(group, index, |ms| {
            loader::load_motion(byte_loader, setting, ms, model, options)
        });

        match motion {
            Some(motion) => self.motions.start(motion, group, index, priority),
            None => {
                log::debug!("unknown motion {}[{}]", group, index);
                MotionHandle::INVALID
            }
        }
    }

    /// 在组内随机启动一个动作；空组或未知组返回 INVALID
    pub fn start_random_motion(&mut self, group: &str, priority: i32) -> MotionHandle {
        match self.library.random_index(group, &mut self.rng) {
            Some(index) => self.start_motion(group, index, priority),
            None => MotionHandle::INVALID,
        }
    }

    fn start_idle_motion(&mut self) {
        let Some(group) = self.options.motion.idle_group.clone() else {
            return;
        };
        if self.library.motion_count(&group) > 0 {
            let priority = self.options.motion.idle_priority;
            self.start_random_motion(&group, priority);
        }
    }

    pub fn set_expression(&mut self, name: &str) -> MotionHandle {
        match self.library.expression(name) {
            Some(expression) => self.expressions.start(name, expression),
            None => {
                log::debug!("unknown expression '{}'", name);
                MotionHandle::INVALID
            }
        }
    }

    pub fn set_random_expression(&mut self) -> MotionHandle {
        let picked = self
            .library
            .random_expression(&mut self.rng)
            .map(|(name, expression)| (name.to_string(), expression));
        match picked {
            Some((name, expression)) => self.expressions.start(&name, expression),
            None => MotionHandle::INVALID,
        }
    }

    pub fn is_motion_finished(&self) -> bool {
        self.motions.is_finished()
    }

    pub fn motion_state(&self, handle: MotionHandle) -> Option<MotionState> {
        self.motions.state(handle)
    }

    pub fn current_expression(&self) -> Option<&str> {
        self.expressions.current()
    }

    pub fn motion_group_names(&self) -> Vec<&str> {
        self.library.group_names()
    }

    pub fn motion_count(&self, group: &str) -> usize {
        self.library.motion_count(group)
    }

    pub fn expression_names(&self) -> Vec<&str> {
        self.library.expression_names()
    }

    /// 动作关联的音频文件路径
    pub fn motion_sound(&self, group: &str, index: usize) -> Option<PathBuf> {
        self.library
            .setting(group, index)
            .and_then(|s| s.sound.as_deref())
            .map(|sound| self.setting.resolve_path(sound))
    }

    // ========== 输入 ==========

    /// 拖拽位置，各分量 [-1, 1]
    pub fn set_dragging(&mut self, x: f32, y: f32) {
        self.drag.set_target(x, y);
    }

    /// 平滑后的拖拽位置
    pub fn drag(&self) -> Vec2 {
        self.drag.current()
    }

    pub fn set_acceleration(&mut self, x: f32, y: f32, z: f32) {
        self.acceleration = Vec3::new(x, y, z);
    }

    pub fn acceleration(&self) -> Vec3 {
        self.acceleration
    }

    /// 口型值；None 停止口型同步并恢复眨眼对口型参数的控制
    pub fn set_lip_sync_value(&mut self, value: Option<f32>) {
        self.lip_sync_value = value;
    }

    // ========== 查询 ==========

    /// 视图坐标是否落在命名碰撞区域内；未知名称返回 false
    pub fn hit_test(&self, area_name: &str, x: f32, y: f32) -> bool {
        self.hit_areas
            .hit_test(area_name, x, y, &self.model, &self.model_matrix)
    }

    pub fn hit_area_names(&self) -> Vec<&str> {
        self.hit_areas.names().collect()
    }

    /// 相对模型目录的模型二进制是否通过结构检查
    pub fn has_consistent_model(&self, file: &str) -> bool {
        loader::has_consistent_model(
            self.byte_loader.as_ref(),
            self.consistency_check.as_ref(),
            &self.setting.resolve_path(file),
        )
    }

    pub fn opacity(&self) -> f32 {
        self.opacity
    }

    pub fn user_time(&self) -> f32 {
        self.user_time
    }

    pub fn parameter_value(&self, id: &str) -> Option<f32> {
        self.model.parameter_index(id).map(|p| self.model.parameter_value(p))
    }

    pub fn part_opacity(&self, id: &str) -> Option<f32> {
        self.model.part_index(id).map(|p| self.model.part_opacity(p))
    }

    /// ArtMesh 上附加的用户数据
    pub fn user_data(&self, drawable_id: &str) -> Vec<&str> {
        self.user_data.art_mesh_values(drawable_id)
    }

    pub fn surface_size(&self) -> SurfaceSize {
        self.render.surface.size
    }

    pub fn model_matrix(&self) -> Mat4 {
        self.model_matrix
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn setting(&self) -> &ModelSetting {
        &self.setting
    }

    pub fn identifiers(&self) -> &IdentifierSet {
        &self.ids
    }

    // ========== 渲染资源 ==========

    /// 重新创建渲染目标和 GPU 纹理
    ///
    /// 新资源全部创建成功后才替换旧资源；失败时旧资源保持可用。
    /// 动作、表情和效果状态不受影响。
    pub fn reload_renderer(&mut self) -> Result<(), RenderError> {
        let fresh = RenderResources::create(self.renderer.as_mut(), self.surface_size, &self.textures)?;
        let mut old = std::mem::replace(&mut self.render, fresh);
        old.release(self.renderer.as_mut());
        log::debug!(
            "render surface recreated at {}x{}",
            self.surface_size.width,
            self.surface_size.height
        );
        Ok(())
    }

    /// 是否有物理
    pub fn has_physics(&self) -> bool {
        self.physics.is_some()
    }

    pub fn reset_physics(&mut self) {
        if let Some(physics) = &mut self.physics {
            physics.reset();
        }
    }
}

impl Drop for UserModel {
    fn drop(&mut self) {
        self.render.release(self.renderer.as_mut());
    }
}

impl std::fmt::Debug for UserModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserModel")
            .field("manifest", &self.setting.file_name())
            .field("model", &self.model)
            .field("textures", &self.textures.len())
            .field("user_time", &self.user_time)
            .field("surface", &self.surface_size)
            .finish()
    }
}
