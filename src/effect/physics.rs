//! physics3.json 二次运动模拟
//!
//! 每组设置是一条粒子链：输入参数归一化为根部平移和角度，
//! 粒子按延迟、加速度、空气阻力跟随，末端相对父粒子的位移写回输出参数。

use glam::Vec2;
use serde::Deserialize;
use thiserror::Error;

use crate::config::PhysicsOptions;
use crate::id::ParameterId;
use crate::model::Model;

const MAXIMUM_WEIGHT: f32 = 100.0;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PhysicsError {
    #[error("physics json: {0}")]
    Json(String),

    #[error("physics setting '{0}' has no particles")]
    EmptyStrand(String),
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Physics3Json {
    #[serde(default)]
    meta: PhysicsMetaJson,
    physics_settings: Vec<SettingJson>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
struct PhysicsMetaJson {
    #[serde(default)]
    fps: Option<f32>,
    #[serde(default)]
    effective_forces: EffectiveForcesJson,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct EffectiveForcesJson {
    gravity: XyJson,
    wind: XyJson,
}

impl Default for EffectiveForcesJson {
    fn default() -> Self {
        Self {
            gravity: XyJson { x: 0.0, y: -1.0 },
            wind: XyJson { x: 0.0, y: 0.0 },
        }
    }
}

#[derive(Deserialize, Clone, Copy)]
#[serde(rename_all = "PascalCase")]
struct XyJson {
    x: f32,
    y: f32,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SettingJson {
    #[serde(default)]
    id: String,
    input: Vec<InputJson>,
    output: Vec<OutputJson>,
    vertices: Vec<VertexJson>,
    normalization: NormalizationJson,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct TargetJson {
    #[serde(default)]
    target: String,
    id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InputJson {
    source: TargetJson,
    weight: f32,
    r#type: String,
    #[serde(default)]
    reflect: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct OutputJson {
    destination: TargetJson,
    vertex_index: usize,
    scale: f32,
    weight: f32,
    r#type: String,
    #[serde(default)]
    reflect: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct VertexJson {
    mobility: f32,
    delay: f32,
    acceleration: f32,
    radius: f32,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct NormalizationJson {
    position: RangeJson,
    angle: RangeJson,
}

#[derive(Deserialize, Clone, Copy)]
#[serde(rename_all = "PascalCase")]
struct RangeJson {
    minimum: f32,
    default: f32,
    maximum: f32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Component {
    X,
    Y,
    Angle,
}

impl Component {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "X" => Some(Component::X),
            "Y" => Some(Component::Y),
            "Angle" => Some(Component::Angle),
            _ => None,
        }
    }
}

struct Input {
    id: ParameterId,
    weight: f32,
    component: Component,
    reflect: bool,
}

struct Output {
    id: ParameterId,
    vertex_index: usize,
    scale: f32,
    weight: f32,
    component: Component,
    reflect: bool,
}

#[derive(Clone, Copy, Debug)]
struct Particle {
    mobility: f32,
    delay: f32,
    acceleration: f32,
    radius: f32,
    initial_position: Vec2,
    position: Vec2,
    last_position: Vec2,
    last_gravity: Vec2,
    velocity: Vec2,
}

struct Strand {
    inputs: Vec<Input>,
    outputs: Vec<Output>,
    particles: Vec<Particle>,
    position_range: RangeJson,
    angle_range: RangeJson,
}

impl Strand {
    fn reset(&mut self) {
        let mut previous = Vec2::ZERO;
        for (i, p) in self.particles.iter_mut().enumerate() {
            p.initial_position = if i == 0 { Vec2::ZERO } else { previous + Vec2::new(0.0, p.radius) };
            p.position = p.initial_position;
            p.last_position = p.initial_position;
            p.last_gravity = Vec2::new(0.0, 1.0);
            p.velocity = Vec2::ZERO;
            previous = p.initial_position;
        }
    }
}

/// 把参数值线性映射到归一化区间；默认值映射到区间的 default
fn normalize_parameter_value(
    value: f32,
    parameter_min: f32,
    parameter_max: f32,
    range: &RangeJson,
    reflect: bool,
) -> f32 {
    let max_value = parameter_max.max(parameter_min);
    let min_value = parameter_max.min(parameter_min);
    let value = value.clamp(min_value, max_value);

    let min_norm = range.minimum.min(range.maximum);
    let max_norm = range.minimum.max(range.maximum);
    let middle_norm = range.default;
    let middle_value = min_value + (max_value - min_value) / 2.0;
    let offset = value - middle_value;

    let result = if offset > 0.0 {
        let p_length = max_value - middle_value;
        let n_length = max_norm - middle_norm;
        if p_length != 0.0 { offset * (n_length / p_length) + middle_norm } else { middle_norm }
    } else if offset < 0.0 {
        let p_length = min_value - middle_value;
        let n_length = min_norm - middle_norm;
        if p_length != 0.0 { offset * (n_length / p_length) + middle_norm } else { middle_norm }
    } else {
        middle_norm
    };

    if reflect {
        result
    } else {
        -result
    }
}

fn radian_to_direction(radian: f32) -> Vec2 {
    Vec2::new(radian.sin(), radian.cos())
}

/// from 到 to 的有符号夹角，范围 [-π, π]
fn direction_to_radian(from: Vec2, to: Vec2) -> f32 {
    let mut radian = to.y.atan2(to.x) - from.y.atan2(from.x);
    while radian < -std::f32::consts::PI {
        radian += std::f32::consts::TAU;
    }
    while radian > std::f32::consts::PI {
        radian -= std::f32::consts::TAU;
    }
    radian
}

/// 粒子链物理
pub struct Physics {
    strands: Vec<Strand>,
    gravity: Vec2,
    wind: Vec2,
    /// 外部加速度带来的附加风力
    external_force: Vec2,
    fps: f32,
    options: PhysicsOptions,
}

impl Physics {
    /// 解析 physics3.json；引用模型中不存在参数的输入输出被跳过
    pub fn from_json(bytes: &[u8], model: &Model, options: &PhysicsOptions) -> Result<Self, PhysicsError> {
        let json: Physics3Json =
            serde_json::from_slice(bytes).map_err(|e| PhysicsError::Json(e.to_string()))?;

        let mut strands = Vec::with_capacity(json.physics_settings.len());
        for setting in json.physics_settings {
            if setting.vertices.is_empty() {
                return Err(PhysicsError::EmptyStrand(setting.id));
            }

            let inputs = setting
                .input
                .into_iter()
                .filter_map(|i| {
                    let id = model.parameter_index(&i.source.id);
                    let component = Component::parse(&i.r#type);
                    if id.is_none() || component.is_none() {
                        log::debug!("physics '{}': skip input {} ({})", setting.id, i.source.id, i.source.target);
                    }
                    Some(Input {
                        id: id?,
                        weight: i.weight,
                        component: component?,
                        reflect: i.reflect,
                    })
                })
                .collect();

            let particle_count = setting.vertices.len();
            let outputs = setting
                .output
                .into_iter()
                .filter_map(|o| {
                    let id = model.parameter_index(&o.destination.id);
                    let component = Component::parse(&o.r#type);
                    if id.is_none() || component.is_none() || o.vertex_index < 1 || o.vertex_index >= particle_count {
                        log::debug!("physics '{}': skip output {}", setting.id, o.destination.id);
                        return None;
                    }
                    Some(Output {
                        id: id?,
                        vertex_index: o.vertex_index,
                        scale: o.scale,
                        weight: o.weight,
                        component: component?,
                        reflect: o.reflect,
                    })
                })
                .collect();

            let particles = setting
                .vertices
                .iter()
                .map(|v| Particle {
                    mobility: v.mobility,
                    delay: v.delay,
                    acceleration: v.acceleration,
                    radius: v.radius,
                    initial_position: Vec2::ZERO,
                    position: Vec2::ZERO,
                    last_position: Vec2::ZERO,
                    last_gravity: Vec2::new(0.0, 1.0),
                    velocity: Vec2::ZERO,
                })
                .collect();

            let mut strand = Strand {
                inputs,
                outputs,
                particles,
                position_range: setting.normalization.position,
                angle_range: setting.normalization.angle,
            };
            strand.reset();
            strands.push(strand);
        }

        let forces = json.meta.effective_forces;
        Ok(Self {
            strands,
            gravity: Vec2::new(forces.gravity.x, forces.gravity.y),
            wind: Vec2::new(forces.wind.x, forces.wind.y),
            external_force: Vec2::ZERO,
            fps: json.meta.fps.filter(|f| *f > 0.0).unwrap_or(options.fps),
            options: options.clone(),
        })
    }

    pub fn strand_count(&self) -> usize {
        self.strands.len()
    }

    /// 外部加速度（x, y），按 acceleration_scale 叠加到风力
    pub fn set_external_force(&mut self, force: Vec2) {
        self.external_force = force * self.options.acceleration_scale;
    }

    /// 粒子回到初始姿势
    pub fn reset(&mut self) {
        for strand in &mut self.strands {
            strand.reset();
        }
    }

    /// 按固定步长推进 dt 秒
    ///
    /// 所需步数不超过 max_substeps 时平均分配；否则前 max_substeps - 1 步用固定步长，
    /// 最后一步消化剩余时间。
    pub fn update(&mut self, model: &mut Model, dt: f32) {
        if dt <= 0.0 || self.strands.is_empty() {
            return;
        }
        let fixed_dt = 1.0 / self.fps.max(1.0);
        let max_steps = self.options.max_substeps.max(1);
        let needed = ((dt / fixed_dt) - 1e-4).ceil().max(1.0) as u32;

        if needed <= max_steps {
            let step = dt / needed as f32;
            for _ in 0..needed {
                self.step(model, step);
            }
        } else {
            for _ in 0..max_steps - 1 {
                self.step(model, fixed_dt);
            }
            self.step(model, dt - (max_steps - 1) as f32 * fixed_dt);
        }
    }

    fn step(&mut self, model: &mut Model, dt: f32) {
        let wind = self.wind + self.external_force;
        let air_resistance = self.options.air_resistance.max(f32::EPSILON);
        let parent_gravity = -self.gravity;

        for strand in &mut self.strands {
            let mut translation = Vec2::ZERO;
            let mut angle = 0.0;

            for input in &strand.inputs {
                let weight = input.weight / MAXIMUM_WEIGHT;
                let range = match input.component {
                    Component::Angle => &strand.angle_range,
                    _ => &strand.position_range,
                };
                let normalized = normalize_parameter_value(
                    model.parameter_value(input.id),
                    model.parameter_minimum(input.id),
                    model.parameter_maximum(input.id),
                    range,
                    input.reflect,
                ) * weight;
                match input.component {
                    Component::X => translation.x += normalized,
                    Component::Y => translation.y += normalized,
                    Component::Angle => angle += normalized,
                }
            }

            let rad = (-angle).to_radians();
            let translation = Vec2::new(
                translation.x * rad.cos() - translation.y * rad.sin(),
                translation.x * rad.sin() + translation.y * rad.cos(),
            );

            let threshold = self.options.movement_threshold * strand.position_range.maximum;
            update_particles(&mut strand.particles, translation, angle, wind, threshold, dt, air_resistance);

            for output in &strand.outputs {
                let index = output.vertex_index;
                let offset = strand.particles[index].position - strand.particles[index - 1].position;
                let mut value = match output.component {
                    Component::X => offset.x,
                    Component::Y => offset.y,
                    Component::Angle => {
                        let parent = if index >= 2 {
                            strand.particles[index - 1].position - strand.particles[index - 2].position
                        } else {
                            parent_gravity
                        };
                        direction_to_radian(parent, offset)
                    }
                };
                if output.reflect {
                    value = -value;
                }
                let value = (value * output.scale)
                    .clamp(model.parameter_minimum(output.id), model.parameter_maximum(output.id));
                model.set_parameter_value(output.id, value, output.weight / MAXIMUM_WEIGHT);
            }
        }
    }
}

fn update_particles(
    particles: &mut [Particle],
    root: Vec2,
    angle_degrees: f32,
    wind: Vec2,
    threshold: f32,
    dt: f32,
    air_resistance: f32,
) {
    if let Some(first) = particles.first_mut() {
        first.position = root;
    }

    let gravity = radian_to_direction(angle_degrees.to_radians()).normalize_or_zero();

    for i in 1..particles.len() {
        let parent = particles[i - 1].position;
        let p = &mut particles[i];

        let force = gravity * p.acceleration + wind;
        p.last_position = p.position;
        let delay = p.delay * dt * 30.0;

        let direction = p.position - parent;
        let radian = direction_to_radian(p.last_gravity, gravity) / air_resistance;
        let rotated = Vec2::new(
            radian.cos() * direction.x - direction.y * radian.sin(),
            radian.sin() * direction.x + direction.y * radian.cos(),
        );
        p.position = parent + rotated;
        p.position += p.velocity * delay + force * delay * delay;

        let new_direction = (p.position - parent).normalize_or_zero();
        p.position = parent + new_direction * p.radius;

        if p.position.x.abs() < threshold {
            p.position.x = 0.0;
        }
        if delay != 0.0 {
            p.velocity = (p.position - p.last_position) / delay * p.mobility;
        }
        p.last_gravity = gravity;
    }
}
