//! 参数 ID 驻留
//!
//! 模型的参数、部件、可绘制对象名称在加载时一次性驻留到扁平表中，
//! 运行时只传递小整数句柄并按值比较。

use std::collections::HashMap;
use std::fmt;

macro_rules! define_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(u32);

        impl $name {
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl From<usize> for $name {
            fn from(index: usize) -> Self {
                Self(index as u32)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}#{}", stringify!($name), self.0)
            }
        }
    };
}

define_handle!(
    /// 参数句柄
    ParameterId
);
define_handle!(
    /// 部件句柄
    PartId
);
define_handle!(
    /// 可绘制对象（ArtMesh）句柄
    DrawableId
);

/// 名称 → 句柄 的驻留表
#[derive(Clone, Debug)]
pub struct IdTable<H> {
    names: Vec<String>,
    lookup: HashMap<String, H>,
}

impl<H: Copy + From<usize>> IdTable<H> {
    pub fn new() -> Self {
        Self {
            names: Vec::new(),
            lookup: HashMap::new(),
        }
    }

    /// 驻留名称，已存在时返回原句柄
    pub fn intern(&mut self, name: &str) -> H {
        if let Some(handle) = self.lookup.get(name) {
            return *handle;
        }
        let handle = H::from(self.names.len());
        self.names.push(name.to_string());
        self.lookup.insert(name.to_string(), handle);
        handle
    }

    pub fn get(&self, name: &str) -> Option<H> {
        self.lookup.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }
}

impl<H: Copy + From<usize>> Default for IdTable<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: Copy + From<usize>> FromIterator<String> for IdTable<H> {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        let mut table = Self::new();
        for name in iter {
            table.intern(&name);
        }
        table
    }
}

/// 标准参数名称
pub mod default_ids {
    pub const PARAM_ANGLE_X: &str = "ParamAngleX";
    pub const PARAM_ANGLE_Y: &str = "ParamAngleY";
    pub const PARAM_ANGLE_Z: &str = "ParamAngleZ";
    pub const PARAM_BODY_ANGLE_X: &str = "ParamBodyAngleX";
    pub const PARAM_EYE_BALL_X: &str = "ParamEyeBallX";
    pub const PARAM_EYE_BALL_Y: &str = "ParamEyeBallY";
    pub const PARAM_BREATH: &str = "ParamBreath";
}

/// 运行时使用的参数句柄集合，加载时解析一次
#[derive(Clone, Debug, Default, PartialEq)]
pub struct IdentifierSet {
    pub angle_x: Option<ParameterId>,
    pub angle_y: Option<ParameterId>,
    pub angle_z: Option<ParameterId>,
    pub body_angle_x: Option<ParameterId>,
    pub eye_ball_x: Option<ParameterId>,
    pub eye_ball_y: Option<ParameterId>,
    pub eye_blink: Vec<ParameterId>,
    pub lip_sync: Vec<ParameterId>,
}

impl IdentifierSet {
    /// 按模型参数表解析；模型不存在的参数记为 None 并跳过
    pub fn resolve(
        parameters: &IdTable<ParameterId>,
        eye_blink_names: &[String],
        lip_sync_names: &[String],
    ) -> Self {
        let resolve_list = |names: &[String], group: &str| -> Vec<ParameterId> {
            names
                .iter()
                .filter_map(|name| {
                    let id = parameters.get(name);
                    if id.is_none() {
                        log::debug!("{} parameter '{}' not present in model", group, name);
                    }
                    id
                })
                .collect()
        };

        Self {
            angle_x: parameters.get(default_ids::PARAM_ANGLE_X),
            angle_y: parameters.get(default_ids::PARAM_ANGLE_Y),
            angle_z: parameters.get(default_ids::PARAM_ANGLE_Z),
            body_angle_x: parameters.get(default_ids::PARAM_BODY_ANGLE_X),
            eye_ball_x: parameters.get(default_ids::PARAM_EYE_BALL_X),
            eye_ball_y: parameters.get(default_ids::PARAM_EYE_BALL_Y),
            eye_blink: resolve_list(eye_blink_names, "EyeBlink"),
            lip_sync: resolve_list(lip_sync_names, "LipSync"),
        }
    }

    pub fn is_lip_sync(&self, id: ParameterId) -> bool {
        self.lip_sync.contains(&id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intern_is_stable() {
        let mut table: IdTable<ParameterId> = IdTable::new();
        let a = table.intern("ParamAngleX");
        let b = table.intern("ParamAngleY");
        assert_eq!(table.intern("ParamAngleX"), a);
        assert_ne!(a, b);
        assert_eq!(b.index(), 1);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_resolve_skips_unknown() {
        let table: IdTable<ParameterId> = ["ParamAngleX", "ParamEyeLOpen"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let ids = IdentifierSet::resolve(
            &table,
            &["ParamEyeLOpen".to_string(), "ParamEyeROpen".to_string()],
            &[],
        );
        assert_eq!(ids.angle_x, Some(ParameterId::from(0)));
        assert_eq!(ids.angle_y, None);
        assert_eq!(ids.eye_blink, vec![ParameterId::from(1)]);
    }
}
