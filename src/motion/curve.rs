//! 动作曲线
//!
//! 段编码：起点 (t, v)，之后每段为 类型码 + 点：
//! 0 线性（1 点）、1 贝塞尔（3 点）、2 阶梯（1 点）、3 反向阶梯（1 点）。

use glam::Vec2;

/// 曲线作用对象
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CurveTarget {
    /// 模型级：Opacity / EyeBlink / LipSync
    Model,
    Parameter,
    PartOpacity,
}

/// 曲线段
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Segment {
    Linear(Vec2, Vec2),
    Bezier([Vec2; 4]),
    Stepped(Vec2, Vec2),
    InverseStepped(Vec2, Vec2),
}

impl Segment {
    fn end(&self) -> Vec2 {
        match self {
            Segment::Linear(_, p1) | Segment::Stepped(_, p1) | Segment::InverseStepped(_, p1) => *p1,
            Segment::Bezier(p) => p[3],
        }
    }

    fn evaluate(&self, time: f32, restricted: bool) -> f32 {
        match *self {
            Segment::Linear(p0, p1) => {
                let span = p1.x - p0.x;
                let t = if span > 0.0 { ((time - p0.x) / span).max(0.0) } else { 1.0 };
                p0.y + (p1.y - p0.y) * t
            }
            Segment::Stepped(p0, _) => p0.y,
            Segment::InverseStepped(_, p1) => p1.y,
            Segment::Bezier(p) => {
                let span = p[3].x - p[0].x;
                let t = if restricted {
                    if span > 0.0 { ((time - p[0].x) / span).clamp(0.0, 1.0) } else { 1.0 }
                } else {
                    solve_bezier_t(&p, time)
                };
                de_casteljau(&p, t).y
            }
        }
    }
}

fn de_casteljau(p: &[Vec2; 4], t: f32) -> Vec2 {
    let p01 = p[0].lerp(p[1], t);
    let p12 = p[1].lerp(p[2], t);
    let p23 = p[2].lerp(p[3], t);
    let p012 = p01.lerp(p12, t);
    let p123 = p12.lerp(p23, t);
    p012.lerp(p123, t)
}

/// 牛顿法求 x(s) = time 的参数 s
fn solve_bezier_t(p: &[Vec2; 4], time: f32) -> f32 {
    let span = p[3].x - p[0].x;
    if span <= 0.0 {
        return 1.0;
    }
    let mut s = ((time - p[0].x) / span).clamp(0.0, 1.0);
    for _ in 0..15 {
        let x = de_casteljau(p, s).x - time;
        let u = 1.0 - s;
        let dx = 3.0 * u * u * (p[1].x - p[0].x)
            + 6.0 * u * s * (p[2].x - p[1].x)
            + 3.0 * s * s * (p[3].x - p[2].x);
        if dx.abs() < 1e-6 {
            break;
        }
        let next = (s - x / dx).clamp(0.0, 1.0);
        if (next - s).abs() < 1e-6 {
            s = next;
            break;
        }
        s = next;
    }
    s
}

/// 一条曲线
#[derive(Clone, Debug)]
pub struct Curve {
    pub target: CurveTarget,
    pub id: String,
    /// 覆盖动作级的淡入/淡出
    pub fade_in: Option<f32>,
    pub fade_out: Option<f32>,
    segments: Vec<Segment>,
    /// 只有起点、没有段时的值
    start_value: f32,
}

impl Curve {
    /// 解析段编码
    pub fn parse(
        target: CurveTarget,
        id: impl Into<String>,
        encoded: &[f32],
        fade_in: Option<f32>,
        fade_out: Option<f32>,
    ) -> Result<Self, String> {
        let id = id.into();
        if encoded.len() < 2 {
            return Err(format!("curve '{}' has no start point", id));
        }

        let point = |i: usize| Vec2::new(encoded[i], encoded[i + 1]);
        let mut last = point(0);
        let mut pos = 2;
        let mut segments = Vec::new();

        while pos < encoded.len() {
            let kind = encoded[pos] as i32;
            let needed = if kind == 1 { 6 } else { 2 };
            if pos + 1 + needed > encoded.len() {
                return Err(format!("curve '{}' segment at {} is truncated", id, pos));
            }
            let segment = match kind {
                0 => Segment::Linear(last, point(pos + 1)),
                1 => Segment::Bezier([last, point(pos + 1), point(pos + 3), point(pos + 5)]),
                2 => Segment::Stepped(last, point(pos + 1)),
                3 => Segment::InverseStepped(last, point(pos + 1)),
                other => return Err(format!("curve '{}' has unknown segment type {}", id, other)),
            };
            last = segment.end();
            segments.push(segment);
            pos += 1 + needed;
        }

        Ok(Self {
            target,
            id,
            fade_in: fade_in.filter(|t| *t >= 0.0),
            fade_out: fade_out.filter(|t| *t >= 0.0),
            start_value: encoded[1],
            segments,
        })
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// 求曲线在 time 处的值；超过最后一点时保持末值
    pub fn evaluate(&self, time: f32, restricted_bezier: bool) -> f32 {
        let Some(last) = self.segments.last() else {
            return self.start_value;
        };
        for segment in &self.segments {
            if time < segment.end().x {
                return segment.evaluate(time, restricted_bezier);
            }
        }
        last.end().y
    }
}
