//! Cubism 模型运行时管理

mod hit_area;
mod loader;
mod runtime;
mod user_data;

pub use hit_area::{HitArea, HitAreaIndex, Rect};
pub use loader::has_consistent_model;
pub use runtime::UserModel;
pub use user_data::{ModelUserData, UserDataEntry};

use std::collections::BTreeMap;

use glam::{Mat4, Vec2, Vec3};

use crate::id::{DrawableId, IdTable, ParameterId, PartId};

/// 画布信息
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CanvasInfo {
    /// 画布像素尺寸
    pub size_in_pixels: Vec2,
    /// 原点（像素）
    pub origin_in_pixels: Vec2,
    /// 每单位像素数
    pub pixels_per_unit: f32,
}

impl CanvasInfo {
    /// 画布的模型单位尺寸
    pub fn size_in_units(&self) -> Vec2 {
        if self.pixels_per_unit > 0.0 {
            self.size_in_pixels / self.pixels_per_unit
        } else {
            self.size_in_pixels
        }
    }
}

/// 参数定义
#[derive(Clone, Debug)]
pub struct ParameterInfo {
    pub id: String,
    pub minimum: f32,
    pub maximum: f32,
    pub default: f32,
}

impl ParameterInfo {
    pub fn new(id: impl Into<String>, minimum: f32, maximum: f32, default: f32) -> Self {
        Self {
            id: id.into(),
            minimum,
            maximum,
            default,
        }
    }
}

/// 部件定义
#[derive(Clone, Debug)]
pub struct PartInfo {
    pub id: String,
    pub opacity: f32,
}

/// 可绘制对象（ArtMesh）
#[derive(Clone, Debug)]
pub struct Drawable {
    pub id: String,
    pub texture_index: usize,
    pub parent_part: Option<PartId>,
    /// 参考姿势顶点
    pub rest_vertices: Vec<Vec2>,
    /// 当前帧变形后的顶点
    pub vertices: Vec<Vec2>,
    pub indices: Vec<u16>,
}

impl Drawable {
    pub fn new(id: impl Into<String>, texture_index: usize, rest_vertices: Vec<Vec2>) -> Self {
        Self {
            id: id.into(),
            texture_index,
            parent_part: None,
            vertices: rest_vertices.clone(),
            rest_vertices,
            indices: Vec::new(),
        }
    }
}

/// 变形协作方
///
/// 根据当前参数和部件不透明度计算可绘制对象的顶点。变形算法不在本 crate 内实现。
pub trait Deformer: Send {
    fn deform(&mut self, parameters: &[f32], part_opacities: &[f32], drawables: &mut [Drawable]);
}

/// 不做变形，始终保持参考姿势
#[derive(Clone, Copy, Debug, Default)]
pub struct RestPoseDeformer;

impl Deformer for RestPoseDeformer {
    fn deform(&mut self, _parameters: &[f32], _part_opacities: &[f32], drawables: &mut [Drawable]) {
        for drawable in drawables {
            drawable.vertices.clone_from(&drawable.rest_vertices);
        }
    }
}

/// 解码后的模型实例
pub struct Model {
    canvas: CanvasInfo,

    parameter_ids: IdTable<ParameterId>,
    parameter_values: Vec<f32>,
    parameter_minimums: Vec<f32>,
    parameter_maximums: Vec<f32>,
    parameter_defaults: Vec<f32>,
    saved_parameters: Vec<f32>,

    part_ids: IdTable<PartId>,
    part_opacities: Vec<f32>,

    drawable_ids: IdTable<DrawableId>,
    drawables: Vec<Drawable>,

    deformer: Box<dyn Deformer>,
}

impl Model {
    /// 由解码结果构建模型
    pub fn new(
        canvas: CanvasInfo,
        parameters: Vec<ParameterInfo>,
        parts: Vec<PartInfo>,
        drawables: Vec<Drawable>,
        deformer: Box<dyn Deformer>,
    ) -> Self {
        let parameter_ids = parameters.iter().map(|p| p.id.clone()).collect();
        let part_ids = parts.iter().map(|p| p.id.clone()).collect();
        let drawable_ids = drawables.iter().map(|d| d.id.clone()).collect();
        let defaults: Vec<f32> = parameters.iter().map(|p| p.default).collect();

        Self {
            canvas,
            parameter_ids,
            parameter_values: defaults.clone(),
            parameter_minimums: parameters.iter().map(|p| p.minimum.min(p.maximum)).collect(),
            parameter_maximums: parameters.iter().map(|p| p.maximum.max(p.minimum)).collect(),
            saved_parameters: defaults.clone(),
            parameter_defaults: defaults,
            part_ids,
            part_opacities: parts.iter().map(|p| p.opacity).collect(),
            drawable_ids,
            drawables,
            deformer,
        }
    }

    pub fn canvas(&self) -> &CanvasInfo {
        &self.canvas
    }

    // ========== 参数 ==========

    pub fn parameter_ids(&self) -> &IdTable<ParameterId> {
        &self.parameter_ids
    }

    pub fn parameter_index(&self, name: &str) -> Option<ParameterId> {
        self.parameter_ids.get(name)
    }

    pub fn parameter_count(&self) -> usize {
        self.parameter_values.len()
    }

    pub fn parameter_values(&self) -> &[f32] {
        &self.parameter_values
    }

    pub fn parameter_value(&self, id: ParameterId) -> f32 {
        self.parameter_values.get(id.index()).copied().unwrap_or(0.0)
    }

    pub fn parameter_minimum(&self, id: ParameterId) -> f32 {
        self.parameter_minimums.get(id.index()).copied().unwrap_or(0.0)
    }

    pub fn parameter_maximum(&self, id: ParameterId) -> f32 {
        self.parameter_maximums.get(id.index()).copied().unwrap_or(0.0)
    }

    pub fn parameter_default(&self, id: ParameterId) -> f32 {
        self.parameter_defaults.get(id.index()).copied().unwrap_or(0.0)
    }

    /// 设置参数值（按 weight 混合，结果限制在参数范围内）
    pub fn set_parameter_value(&mut self, id: ParameterId, value: f32, weight: f32) {
        let index = id.index();
        if index >= self.parameter_values.len() {
            return;
        }
        let current = self.parameter_values[index];
        let blended = if weight >= 1.0 {
            value
        } else {
            current * (1.0 - weight) + value * weight
        };
        self.parameter_values[index] =
            blended.clamp(self.parameter_minimums[index], self.parameter_maximums[index]);
    }

    /// 在当前值上叠加
    pub fn add_parameter_value(&mut self, id: ParameterId, value: f32, weight: f32) {
        let current = self.parameter_value(id);
        self.set_parameter_value(id, current + value * weight, 1.0);
    }

    /// 在当前值上相乘
    pub fn multiply_parameter_value(&mut self, id: ParameterId, value: f32, weight: f32) {
        let current = self.parameter_value(id);
        self.set_parameter_value(id, current * (1.0 + (value - 1.0) * weight), 1.0);
    }

    /// 保存当前参数，作为下一帧的基准
    pub fn save_parameters(&mut self) {
        self.saved_parameters.clone_from(&self.parameter_values);
    }

    /// 恢复上一次保存的参数
    pub fn load_parameters(&mut self) {
        self.parameter_values.clone_from(&self.saved_parameters);
    }

    // ========== 部件 ==========

    pub fn part_index(&self, name: &str) -> Option<PartId> {
        self.part_ids.get(name)
    }

    pub fn part_count(&self) -> usize {
        self.part_opacities.len()
    }

    pub fn part_opacity(&self, id: PartId) -> f32 {
        self.part_opacities.get(id.index()).copied().unwrap_or(0.0)
    }

    pub fn set_part_opacity(&mut self, id: PartId, opacity: f32) {
        if let Some(slot) = self.part_opacities.get_mut(id.index()) {
            *slot = opacity.clamp(0.0, 1.0);
        }
    }

    // ========== 可绘制对象 ==========

    pub fn drawable_index(&self, name: &str) -> Option<DrawableId> {
        self.drawable_ids.get(name)
    }

    pub fn drawable(&self, id: DrawableId) -> Option<&Drawable> {
        self.drawables.get(id.index())
    }

    pub fn drawables(&self) -> &[Drawable] {
        &self.drawables
    }

    pub fn drawables_mut(&mut self) -> &mut [Drawable] {
        &mut self.drawables
    }

    /// 当前帧变形后的顶点
    pub fn drawable_vertices(&self, id: DrawableId) -> &[Vec2] {
        self.drawables
            .get(id.index())
            .map(|d| d.vertices.as_slice())
            .unwrap_or(&[])
    }

    /// 最大引用的纹理槽位数
    pub fn texture_slot_count(&self) -> usize {
        self.drawables
            .iter()
            .map(|d| d.texture_index + 1)
            .max()
            .unwrap_or(0)
    }

    /// 根据参数计算顶点
    pub fn update(&mut self) {
        self.deformer
            .deform(&self.parameter_values, &self.part_opacities, &mut self.drawables);
    }

    /// 画布到视图空间的模型矩阵
    ///
    /// 高度归一化到 2.0，画布原点对齐视图原点；清单 Layout 可覆盖尺寸与位置。
    pub fn model_matrix(&self, layout: &BTreeMap<String, f32>) -> Mat4 {
        let units = self.canvas.size_in_units();
        let width = units.x.max(f32::EPSILON);
        let height = units.y.max(f32::EPSILON);

        let mut scale = 2.0 / height;
        if let Some(w) = layout.get("Width") {
            scale = *w / width;
        }
        if let Some(h) = layout.get("Height") {
            scale = *h / height;
        }

        let tx = layout.get("CenterX").or_else(|| layout.get("X")).copied().unwrap_or(0.0);
        let ty = layout.get("CenterY").or_else(|| layout.get("Y")).copied().unwrap_or(0.0);

        Mat4::from_translation(Vec3::new(tx, ty, 0.0)) * Mat4::from_scale(Vec3::new(scale, scale, 1.0))
    }
}

impl std::fmt::Debug for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Model")
            .field("canvas", &self.canvas)
            .field("parameters", &self.parameter_values.len())
            .field("parts", &self.part_opacities.len())
            .field("drawables", &self.drawables.len())
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub fn sample_model() -> Model {
        let canvas = CanvasInfo {
            size_in_pixels: Vec2::new(200.0, 200.0),
            origin_in_pixels: Vec2::new(100.0, 100.0),
            pixels_per_unit: 100.0,
        };
        let parameters = vec![
            ParameterInfo::new("ParamAngleX", -30.0, 30.0, 0.0),
            ParameterInfo::new("ParamEyeLOpen", 0.0, 1.0, 1.0),
            ParameterInfo::new("ParamMouthOpenY", 0.0, 1.0, 0.0),
        ];
        let parts = vec![PartInfo {
            id: "PartBody".into(),
            opacity: 1.0,
        }];
        let drawables = vec![Drawable::new(
            "ArtMesh0",
            0,
            vec![Vec2::new(-0.5, -0.5), Vec2::new(0.5, 0.5)],
        )];
        Model::new(canvas, parameters, parts, drawables, Box::new(RestPoseDeformer))
    }

    #[test]
    fn test_set_parameter_clamps() {
        let mut model = sample_model();
        let id = model.parameter_index("ParamAngleX").unwrap();
        model.set_parameter_value(id, 100.0, 1.0);
        assert_eq!(model.parameter_value(id), 30.0);
        model.set_parameter_value(id, 0.0, 0.5);
        assert_eq!(model.parameter_value(id), 15.0);
    }

    #[test]
    fn test_save_and_load_parameters() {
        let mut model = sample_model();
        let id = model.parameter_index("ParamAngleX").unwrap();
        model.set_parameter_value(id, 10.0, 1.0);
        model.save_parameters();
        model.add_parameter_value(id, 5.0, 1.0);
        assert_eq!(model.parameter_value(id), 15.0);
        model.load_parameters();
        assert_eq!(model.parameter_value(id), 10.0);
    }

    #[test]
    fn test_model_matrix_normalizes_height() {
        let model = sample_model();
        let m = model.model_matrix(&Default::default());
        // 画布 2x2 单位，高度归一化到 2.0
        let p = m.transform_point3(Vec3::new(1.0, 1.0, 0.0));
        assert!((p.x - 1.0).abs() < 1e-5);
        assert!((p.y - 1.0).abs() < 1e-5);
    }
}
