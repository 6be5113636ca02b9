//! 拖拽跟随

use glam::Vec2;

use crate::config::DragOptions;
use crate::id::IdentifierSet;
use crate::model::Model;

/// 把拖拽位置平滑地映射到头部、身体和眼球参数
pub struct DragFollow {
    options: DragOptions,
    target: Vec2,
    current: Vec2,
}

impl DragFollow {
    pub fn new(options: DragOptions) -> Self {
        Self {
            options,
            target: Vec2::ZERO,
            current: Vec2::ZERO,
        }
    }

    /// 目标位置，各分量限制在 [-1, 1]
    pub fn set_target(&mut self, x: f32, y: f32) {
        self.target = Vec2::new(x, y).clamp(Vec2::splat(-1.0), Vec2::splat(1.0));
    }

    pub fn target(&self) -> Vec2 {
        self.target
    }

    /// 平滑后的当前位置
    pub fn current(&self) -> Vec2 {
        self.current
    }

    /// 指数平滑逼近目标
    pub fn update(&mut self, dt: f32) {
        let dt = dt.max(0.0);
        if self.options.smoothing_time <= 0.0 {
            self.current = self.target;
            return;
        }
        let alpha = 1.0 - (-dt / self.options.smoothing_time).exp();
        self.current += (self.target - self.current) * alpha;
    }

    pub fn apply(&self, model: &mut Model, ids: &IdentifierSet) {
        let Vec2 { x, y } = self.current;
        let angle = self.options.max_angle;
        let body = self.options.max_body_angle;
        let eye = self.options.max_eye_ball;

        let writes = [
            (ids.angle_x, x * angle),
            (ids.angle_y, y * angle),
            (ids.angle_z, -x * y * angle),
            (ids.body_angle_x, x * body),
            (ids.eye_ball_x, x * eye),
            (ids.eye_ball_y, y * eye),
        ];
        for (id, value) in writes {
            if let Some(id) = id {
                model.add_parameter_value(id, value, 1.0);
            }
        }
    }
}
