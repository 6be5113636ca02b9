//! 待机效果与约束
//!
//! 每帧按固定顺序应用：眨眼 → 呼吸 → 拖拽跟随 → 物理 → 姿势。
//! 后面的阶段可以覆盖前面阶段写入的参数。

mod breath;
mod drag;
mod eye_blink;
mod physics;
mod pose;

pub use breath::Breath;
pub use drag::DragFollow;
pub use eye_blink::{EyeBlink, EyeBlinkState};
pub use physics::{Physics, PhysicsError};
pub use pose::{Pose, PoseError};
