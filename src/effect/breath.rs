//! 呼吸

use std::f32::consts::TAU;

use crate::config::BreathParameter;
use crate::id::ParameterId;
use crate::model::Model;

struct BoundBreath {
    id: ParameterId,
    offset: f32,
    peak: f32,
    cycle: f32,
    weight: f32,
}

/// 周期性地在参数上叠加正弦值
pub struct Breath {
    parameters: Vec<BoundBreath>,
    current_time: f32,
}

impl Breath {
    /// 模型中不存在的参数被忽略
    pub fn new(model: &Model, parameters: &[BreathParameter]) -> Self {
        let parameters = parameters
            .iter()
            .filter_map(|p| {
                let id = model.parameter_index(&p.id)?;
                Some(BoundBreath {
                    id,
                    offset: p.offset,
                    peak: p.peak,
                    cycle: p.cycle,
                    weight: p.weight,
                })
            })
            .collect();
        Self {
            parameters,
            current_time: 0.0,
        }
    }

    pub fn parameter_count(&self) -> usize {
        self.parameters.len()
    }

    pub fn update(&mut self, model: &mut Model, dt: f32) {
        self.current_time += dt.max(0.0);
        let phase = self.current_time * TAU;
        for p in &self.parameters {
            let value = if p.cycle > 0.0 {
                p.offset + p.peak * (phase / p.cycle).sin()
            } else {
                p.offset
            };
            model.add_parameter_value(p.id, value, p.weight);
        }
    }
}
