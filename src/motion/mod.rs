//! 动作系统
//!
//! - motion3.json 动作片段与曲线求值
//! - exp3.json 表情与表情混合
//! - 按优先级仲裁的动作队列
//! - 以组名/序号索引的动作库

mod curve;
mod expression;
mod library;
mod motion;
mod queue;

pub use curve::{Curve, CurveTarget, Segment};
pub use expression::{Expression, ExpressionBlend, ExpressionManager};
pub use library::MotionLibrary;
pub use motion::{Motion, MotionError, MotionUserDataEvent};
pub use queue::MotionQueueManager;

use std::fmt;

/// 动作优先级
pub mod priority {
    pub const NONE: i32 = 0;
    pub const IDLE: i32 = 1;
    pub const NORMAL: i32 = 2;
    pub const FORCE: i32 = 3;
}

/// 动作句柄；-1 表示启动失败
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MotionHandle(i64);

impl MotionHandle {
    pub const INVALID: MotionHandle = MotionHandle(-1);

    pub(crate) fn new(value: i64) -> Self {
        Self(value)
    }

    pub fn is_valid(self) -> bool {
        self.0 >= 0
    }

    pub fn value(self) -> i64 {
        self.0
    }
}

impl From<MotionHandle> for i64 {
    fn from(handle: MotionHandle) -> Self {
        handle.0
    }
}

impl fmt::Display for MotionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 队列条目状态
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MotionState {
    /// 已加入队列，尚未经过一次更新
    Waiting,
    FadingIn,
    Playing,
    FadingOut,
    /// 下一帧从队列中移除
    Finished,
}

/// 动作生命周期事件
#[derive(Clone, Debug, PartialEq)]
pub enum MotionEvent {
    Began {
        handle: MotionHandle,
        group: String,
        index: usize,
    },
    Finished {
        handle: MotionHandle,
        group: String,
        index: usize,
    },
    /// 动作片段中的定时用户数据
    UserData { handle: MotionHandle, value: String },
}

impl MotionEvent {
    pub fn handle(&self) -> MotionHandle {
        match self {
            MotionEvent::Began { handle, .. }
            | MotionEvent::Finished { handle, .. }
            | MotionEvent::UserData { handle, .. } => *handle,
        }
    }
}

/// 正弦缓动，输入限制在 [0, 1]
pub(crate) fn easing_sine(t: f32) -> f32 {
    if t <= 0.0 {
        0.0
    } else if t >= 1.0 {
        1.0
    } else {
        0.5 - 0.5 * (t * std::f32::consts::PI).cos()
    }
}
