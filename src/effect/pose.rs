//! pose3.json 部件互斥组

use serde::Deserialize;
use thiserror::Error;

use crate::id::{ParameterId, PartId};
use crate::model::Model;

const EPSILON: f32 = 0.001;
/// 不透明度曲线的转折点
const PHI: f32 = 0.5;
/// 背景部件允许透出的上限
const BACK_OPACITY_THRESHOLD: f32 = 0.15;

#[derive(Error, Debug, Clone, PartialEq)]
#[error("pose json: {0}")]
pub struct PoseError(pub String);

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Pose3Json {
    #[serde(default)]
    fade_in_time: Option<f32>,
    #[serde(default)]
    groups: Vec<Vec<PartJson>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PartJson {
    id: String,
    #[serde(default)]
    link: Vec<String>,
}

#[derive(Clone, Debug)]
struct PosePart {
    part: PartId,
    /// 与部件同名的可见性参数
    parameter: Option<ParameterId>,
    links: Vec<PartId>,
}

/// 互斥部件组
///
/// 组内可见性参数大于 0 的第一个部件淡入，其余部件按曲线淡出。
pub struct Pose {
    groups: Vec<Vec<PosePart>>,
    fade_in: f32,
}

impl Pose {
    pub fn from_json(bytes: &[u8], model: &Model, default_fade_in: f32) -> Result<Self, PoseError> {
        let json: Pose3Json = serde_json::from_slice(bytes).map_err(|e| PoseError(e.to_string()))?;

        let groups = json
            .groups
            .into_iter()
            .map(|group| {
                group
                    .into_iter()
                    .filter_map(|p| {
                        let Some(part) = model.part_index(&p.id) else {
                            log::debug!("pose part '{}' not present in model", p.id);
                            return None;
                        };
                        Some(PosePart {
                            part,
                            parameter: model.parameter_index(&p.id),
                            links: p.link.iter().filter_map(|l| model.part_index(l)).collect(),
                        })
                    })
                    .collect::<Vec<_>>()
            })
            .filter(|g| !g.is_empty())
            .collect();

        Ok(Self {
            groups,
            fade_in: json.fade_in_time.filter(|t| *t >= 0.0).unwrap_or(default_fade_in),
        })
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// 每组第一个部件可见，其余隐藏
    pub fn reset(&self, model: &mut Model) {
        for group in &self.groups {
            for (i, p) in group.iter().enumerate() {
                let value = if i == 0 { 1.0 } else { 0.0 };
                model.set_part_opacity(p.part, value);
                if let Some(param) = p.parameter {
                    model.set_parameter_value(param, value, 1.0);
                }
                for &link in &p.links {
                    model.set_part_opacity(link, value);
                }
            }
        }
    }

    pub fn update(&self, model: &mut Model, dt: f32) {
        let dt = dt.max(0.0);
        for group in &self.groups {
            self.fade_group(model, group, dt);
            for p in group {
                let opacity = model.part_opacity(p.part);
                for &link in &p.links {
                    model.set_part_opacity(link, opacity);
                }
            }
        }
    }

    fn fade_group(&self, model: &mut Model, group: &[PosePart], dt: f32) {
        let mut visible = None;
        let mut new_opacity = 1.0;

        for (i, p) in group.iter().enumerate() {
            let shown = p.parameter.map_or(false, |id| model.parameter_value(id) > EPSILON);
            if !shown {
                continue;
            }
            if visible.is_some() {
                break;
            }
            visible = Some(i);
            new_opacity = if self.fade_in <= 0.0 {
                1.0
            } else {
                (model.part_opacity(p.part) + dt / self.fade_in).min(1.0)
            };
        }

        let visible = visible.unwrap_or_else(|| {
            new_opacity = 1.0;
            0
        });

        for (i, p) in group.iter().enumerate() {
            if i == visible {
                model.set_part_opacity(p.part, new_opacity);
                continue;
            }
            let mut opacity = model.part_opacity(p.part);
            let mut a1 = if new_opacity < PHI {
                new_opacity * (PHI - 1.0) / PHI + 1.0
            } else {
                (1.0 - new_opacity) * PHI / (1.0 - PHI)
            };
            let back = (1.0 - a1) * (1.0 - new_opacity);
            if back > BACK_OPACITY_THRESHOLD {
                a1 = 1.0 - BACK_OPACITY_THRESHOLD / (1.0 - new_opacity);
            }
            if opacity > a1 {
                opacity = a1;
            }
            model.set_part_opacity(p.part, opacity);
        }
    }
}
