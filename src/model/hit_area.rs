//! 碰撞区域

use std::collections::HashMap;

use glam::{Mat4, Vec2, Vec3};

use super::Model;
use crate::id::DrawableId;
use crate::setting::HitAreaSetting;

/// 轴对齐矩形（模型单位）
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Rect {
    pub min: Vec2,
    pub max: Vec2,
}

impl Rect {
    /// 点集的包围盒；空集返回 None
    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a Vec2>) -> Option<Self> {
        let mut iter = points.into_iter();
        let first = *iter.next()?;
        let (min, max) = iter.fold((first, first), |(min, max), p| (min.min(*p), max.max(*p)));
        Some(Self { min, max })
    }

    pub fn contains(&self, point: Vec2) -> bool {
        point.x >= self.min.x && point.x <= self.max.x && point.y >= self.min.y && point.y <= self.max.y
    }

    pub fn width(&self) -> f32 {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> f32 {
        self.max.y - self.min.y
    }
}

/// 一个命名的碰撞区域
#[derive(Clone, Debug)]
pub struct HitArea {
    pub name: String,
    pub drawable: DrawableId,
    /// None 表示使用可绘制对象的全部顶点
    pub vertices: Option<Vec<usize>>,
    /// 参考姿势下的包围盒
    pub rest_bounds: Option<Rect>,
}

impl HitArea {
    /// 用当前帧的顶点重新计算包围盒
    pub fn bounds(&self, model: &Model) -> Option<Rect> {
        let vertices = model.drawable_vertices(self.drawable);
        match &self.vertices {
            Some(indices) => Rect::from_points(indices.iter().filter_map(|&i| vertices.get(i))),
            None => Rect::from_points(vertices),
        }
    }
}

/// 名称 → 碰撞区域
#[derive(Clone, Debug, Default)]
pub struct HitAreaIndex {
    areas: Vec<HitArea>,
    by_name: HashMap<String, usize>,
}

impl HitAreaIndex {
    /// 根据清单和模型的参考姿势建立索引
    ///
    /// 引用不存在的可绘制对象的条目被跳过；越界的顶点序号被丢弃。
    pub fn build(settings: &[HitAreaSetting], model: &Model) -> Self {
        let mut index = Self::default();
        for setting in settings {
            let Some(drawable) = model.drawable_index(&setting.id) else {
                log::warn!("hit area '{}' refers to unknown drawable '{}'", setting.name, setting.id);
                continue;
            };
            let rest = model.drawable(drawable).map(|d| d.rest_vertices.as_slice()).unwrap_or(&[]);

            let vertices = setting.vertices.as_ref().map(|list| {
                let kept: Vec<usize> = list
                    .iter()
                    .map(|&v| v as usize)
                    .filter(|&v| v < rest.len())
                    .collect();
                if kept.len() != list.len() {
                    log::warn!(
                        "hit area '{}': {} vertex indices out of range",
                        setting.name,
                        list.len() - kept.len()
                    );
                }
                kept
            });

            let rest_bounds = match &vertices {
                Some(list) => Rect::from_points(list.iter().filter_map(|&i| rest.get(i))),
                None => Rect::from_points(rest),
            };

            if index.by_name.contains_key(&setting.name) {
                log::warn!("duplicate hit area '{}', keeping the first", setting.name);
                continue;
            }
            index.by_name.insert(setting.name.clone(), index.areas.len());
            index.areas.push(HitArea {
                name: setting.name.clone(),
                drawable,
                vertices,
                rest_bounds,
            });
        }
        index
    }

    pub fn get(&self, name: &str) -> Option<&HitArea> {
        self.by_name.get(name).map(|&i| &self.areas[i])
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.areas.iter().map(|a| a.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.areas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.areas.is_empty()
    }

    /// 视图坐标 (x, y) 是否落在区域当前的包围盒内
    ///
    /// 点先经模型矩阵的逆变换到模型坐标。未知名称返回 false。
    pub fn hit_test(&self, name: &str, x: f32, y: f32, model: &Model, model_matrix: &Mat4) -> bool {
        let Some(area) = self.get(name) else {
            return false;
        };
        let Some(bounds) = area.bounds(model) else {
            return false;
        };
        let local = model_matrix.inverse().transform_point3(Vec3::new(x, y, 0.0));
        bounds.contains(Vec2::new(local.x, local.y))
    }
}
