//! 自动眨眼

use rand::Rng;

use crate::config::EyeBlinkOptions;
use crate::id::ParameterId;
use crate::model::Model;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EyeBlinkState {
    /// 尚未更新过
    First,
    /// 睁眼，等待下一次眨眼
    Interval,
    Closing,
    Closed,
    Opening,
}

/// 眨眼状态机
///
/// 参数值 1 为睁眼，0 为闭眼。
pub struct EyeBlink {
    ids: Vec<ParameterId>,
    options: EyeBlinkOptions,
    state: EyeBlinkState,
    user_time: f32,
    state_start: f32,
    next_blink: f32,
}

impl EyeBlink {
    pub fn new(ids: Vec<ParameterId>, options: EyeBlinkOptions) -> Self {
        Self {
            ids,
            options,
            state: EyeBlinkState::First,
            user_time: 0.0,
            state_start: 0.0,
            next_blink: 0.0,
        }
    }

    pub fn state(&self) -> EyeBlinkState {
        self.state
    }

    fn next_blink_time<R: Rng + ?Sized>(&self, rng: &mut R) -> f32 {
        let r: f32 = rng.random::<f32>();
        self.user_time + r * (2.0 * self.options.interval - 1.0)
    }

    /// 推进 dt 秒并写入眨眼参数；`skip` 返回 true 的参数不写
    pub fn update<R: Rng + ?Sized>(
        &mut self,
        model: &mut Model,
        dt: f32,
        rng: &mut R,
        skip: impl Fn(ParameterId) -> bool,
    ) {
        self.user_time += dt.max(0.0);

        let value = match self.state {
            EyeBlinkState::First => {
                self.state = EyeBlinkState::Interval;
                self.next_blink = self.next_blink_time(rng);
                1.0
            }
            EyeBlinkState::Interval => {
                if self.next_blink < self.user_time {
                    self.state = EyeBlinkState::Closing;
                    self.state_start = self.user_time;
                }
                1.0
            }
            EyeBlinkState::Closing => {
                let t = self.progress(self.options.closing);
                if t >= 1.0 {
                    self.state = EyeBlinkState::Closed;
                    self.state_start = self.user_time;
                }
                1.0 - t
            }
            EyeBlinkState::Closed => {
                if self.progress(self.options.closed) >= 1.0 {
                    self.state = EyeBlinkState::Opening;
                    self.state_start = self.user_time;
                }
                0.0
            }
            EyeBlinkState::Opening => {
                let t = self.progress(self.options.opening);
                if t >= 1.0 {
                    self.state = EyeBlinkState::Interval;
                    self.next_blink = self.next_blink_time(rng);
                }
                t
            }
        };

        for &id in self.ids.iter().filter(|id| !skip(**id)) {
            model.set_parameter_value(id, value, 1.0);
        }
    }

    fn progress(&self, duration: f32) -> f32 {
        if duration <= 0.0 {
            1.0
        } else {
            ((self.user_time - self.state_start) / duration).min(1.0)
        }
    }
}
