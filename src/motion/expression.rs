//! exp3.json 表情与表情混合

use std::sync::Arc;

use serde::Deserialize;

use super::{easing_sine, MotionError, MotionHandle};
use crate::config::MotionOptions;
use crate::id::ParameterId;
use crate::model::Model;

/// 表情参数的混合方式
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Default)]
pub enum ExpressionBlend {
    #[default]
    Add,
    Multiply,
    Overwrite,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Exp3Json {
    #[serde(default)]
    fade_in_time: Option<f32>,
    #[serde(default)]
    fade_out_time: Option<f32>,
    #[serde(default)]
    parameters: Vec<ExpressionParameterJson>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ExpressionParameterJson {
    id: String,
    value: f32,
    #[serde(default)]
    blend: ExpressionBlend,
}

#[derive(Clone, Debug, PartialEq)]
struct ExpressionParameter {
    id: ParameterId,
    value: f32,
    blend: ExpressionBlend,
}

/// 表情：一组参数增量
#[derive(Clone, Debug)]
pub struct Expression {
    fade_in: f32,
    fade_out: f32,
    parameters: Vec<ExpressionParameter>,
}

impl Expression {
    pub fn from_json(bytes: &[u8], model: &Model, options: &MotionOptions) -> Result<Self, MotionError> {
        let json: Exp3Json = serde_json::from_slice(bytes).map_err(|e| MotionError::Json(e.to_string()))?;

        let parameters = json
            .parameters
            .into_iter()
            .filter_map(|p| match model.parameter_index(&p.id) {
                Some(id) => Some(ExpressionParameter { id, value: p.value, blend: p.blend }),
                None => {
                    log::debug!("expression parameter '{}' not present in model", p.id);
                    None
                }
            })
            .collect();

        Ok(Self {
            fade_in: json.fade_in_time.filter(|t| *t >= 0.0).unwrap_or(options.default_fade_in),
            fade_out: json.fade_out_time.filter(|t| *t >= 0.0).unwrap_or(options.default_fade_out),
            parameters,
        })
    }

    pub fn fade_in(&self) -> f32 {
        self.fade_in
    }

    pub fn fade_out(&self) -> f32 {
        self.fade_out
    }

    pub fn parameter_count(&self) -> usize {
        self.parameters.len()
    }

    fn parameter(&self, id: ParameterId) -> Option<&ExpressionParameter> {
        self.parameters.iter().find(|p| p.id == id)
    }
}

struct ExpressionEntry {
    handle: MotionHandle,
    name: String,
    expression: Arc<Expression>,
    start_time: Option<f32>,
    /// 被新表情取代后的淡出结束时间
    end_time: Option<f32>,
}

impl ExpressionEntry {
    fn weight(&self, user_time: f32) -> f32 {
        let Some(start) = self.start_time else {
            return 0.0;
        };
        let fade_in = if self.expression.fade_in <= 0.0 {
            1.0
        } else {
            easing_sine((user_time - start) / self.expression.fade_in)
        };
        let fade_out = match self.end_time {
            None => 1.0,
            Some(_) if self.expression.fade_out <= 0.0 => 0.0,
            Some(end) => easing_sine((end - user_time) / self.expression.fade_out),
        };
        fade_in * fade_out
    }

    fn is_expired(&self, user_time: f32) -> bool {
        self.end_time.is_some_and(|end| end <= user_time)
    }
}

/// 表情队列
///
/// 新表情在旧表情之上淡入，旧表情按各自的淡出时长淡出；
/// 淡出结束或最新的表情完全淡入后移除更早的条目。
/// 每个参数累积加法、乘法、覆盖三个分量，最终值为 (覆盖 + 加法) × 乘法。
pub struct ExpressionManager {
    entries: Vec<ExpressionEntry>,
    user_time: f32,
    next_handle: i64,
}

impl ExpressionManager {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            user_time: 0.0,
            next_handle: 0,
        }
    }

    pub fn start(&mut self, name: &str, expression: Arc<Expression>) -> MotionHandle {
        let user_time = self.user_time;
        for entry in self.entries.iter_mut().filter(|e| e.end_time.is_none()) {
            entry.end_time = Some(user_time + entry.expression.fade_out);
        }

        let handle = MotionHandle::new(self.next_handle);
        self.next_handle += 1;
        self.entries.push(ExpressionEntry {
            handle,
            name: name.to_string(),
            expression,
            start_time: None,
            end_time: None,
        });
        handle
    }

    /// 最新设置的表情名
    pub fn current(&self) -> Option<&str> {
        self.entries.last().map(|e| e.name.as_str())
    }

    pub fn current_handle(&self) -> Option<MotionHandle> {
        self.entries.last().map(|e| e.handle)
    }

    pub fn update(&mut self, user_time: f32, model: &mut Model) -> bool {
        self.user_time = user_time;
        self.entries.retain(|e| !e.is_expired(user_time));
        if self.entries.is_empty() {
            return false;
        }

        let mut ids: Vec<ParameterId> = Vec::new();
        for entry in &mut self.entries {
            entry.start_time.get_or_insert(user_time);
            for p in &entry.expression.parameters {
                if !ids.contains(&p.id) {
                    ids.push(p.id);
                }
            }
        }

        let weights: Vec<f32> = self.entries.iter().map(|e| e.weight(user_time)).collect();

        for &id in &ids {
            let current = model.parameter_value(id);
            let mut additive = 0.0;
            let mut multiply = 1.0;
            let mut overwrite = current;

            for (entry, &w) in self.entries.iter().zip(&weights) {
                let (add, mul, over) = match entry.expression.parameter(id) {
                    Some(p) => match p.blend {
                        ExpressionBlend::Add => (p.value, 1.0, current),
                        ExpressionBlend::Multiply => (0.0, p.value, current),
                        ExpressionBlend::Overwrite => (0.0, 1.0, p.value),
                    },
                    None => (0.0, 1.0, current),
                };
                additive += (add - additive) * w;
                multiply += (mul - multiply) * w;
                overwrite += (over - overwrite) * w;
            }

            model.set_parameter_value(id, (overwrite + additive) * multiply, 1.0);
        }

        if weights.last().copied().unwrap_or(0.0) >= 1.0 && self.entries.len() > 1 {
            let keep = self.entries.len() - 1;
            self.entries.drain(..keep);
        }
        true
    }
}

impl Default for ExpressionManager {
    fn default() -> Self {
        Self::new()
    }
}
