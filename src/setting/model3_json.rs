//! model3.json 解析

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use super::{
    ExpressionSetting, HitAreaSetting, ManifestError, ManifestParser, ModelSetting, MotionGroup,
    MotionSetting,
};

const GROUP_EYE_BLINK: &str = "EyeBlink";
const GROUP_LIP_SYNC: &str = "LipSync";

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Model3Json {
    #[serde(default)]
    version: Option<u32>,
    file_references: FileReferences,
    #[serde(default)]
    groups: Vec<GroupJson>,
    #[serde(default)]
    hit_areas: Vec<HitAreaJson>,
    #[serde(default)]
    layout: BTreeMap<String, f32>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct FileReferences {
    #[serde(default)]
    moc: Option<String>,
    #[serde(default)]
    textures: Vec<String>,
    #[serde(default)]
    physics: Option<String>,
    #[serde(default)]
    pose: Option<String>,
    #[serde(default)]
    user_data: Option<String>,
    #[serde(default)]
    expressions: Vec<ExpressionJson>,
    /// 组名保持清单中的顺序
    #[serde(default)]
    motions: serde_json::Map<String, serde_json::Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ExpressionJson {
    name: String,
    file: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct MotionJson {
    file: String,
    #[serde(default)]
    fade_in_time: Option<f32>,
    #[serde(default)]
    fade_out_time: Option<f32>,
    #[serde(default)]
    sound: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GroupJson {
    #[serde(default)]
    target: String,
    name: String,
    #[serde(default)]
    ids: Vec<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct HitAreaJson {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    vertices: Option<Vec<u32>>,
}

/// 默认的 model3.json 解析器
#[derive(Clone, Copy, Debug, Default)]
pub struct Model3JsonParser;

impl ManifestParser for Model3JsonParser {
    fn parse(&self, home_dir: &Path, file_name: &str, bytes: &[u8]) -> Result<ModelSetting, ManifestError> {
        let json: Model3Json =
            serde_json::from_slice(bytes).map_err(|e| ManifestError(e.to_string()))?;

        if let Some(version) = json.version {
            if version < 3 {
                return Err(ManifestError(format!("unsupported manifest version {}", version)));
            }
        }

        let refs = json.file_references;
        let mut motion_groups = Vec::with_capacity(refs.motions.len());
        for (name, value) in refs.motions {
            let motions: Vec<MotionJson> = serde_json::from_value(value)
                .map_err(|e| ManifestError(format!("motion group '{}': {}", name, e)))?;
            motion_groups.push(MotionGroup {
                name,
                motions: motions
                    .into_iter()
                    .map(|m| MotionSetting {
                        file: m.file,
                        fade_in_time: m.fade_in_time.filter(|t| *t >= 0.0),
                        fade_out_time: m.fade_out_time.filter(|t| *t >= 0.0),
                        sound: m.sound.filter(|s| !s.is_empty()),
                    })
                    .collect(),
            });
        }

        let group_ids = |name: &str| -> Vec<String> {
            json.groups
                .iter()
                .filter(|g| g.name == name && (g.target.is_empty() || g.target == "Parameter"))
                .flat_map(|g| g.ids.iter().cloned())
                .collect()
        };

        Ok(ModelSetting {
            home_dir: home_dir.to_path_buf(),
            file_name: file_name.to_string(),
            model_file: refs.moc.filter(|s| !s.is_empty()),
            textures: refs.textures,
            physics_file: refs.physics.filter(|s| !s.is_empty()),
            pose_file: refs.pose.filter(|s| !s.is_empty()),
            user_data_file: refs.user_data.filter(|s| !s.is_empty()),
            expressions: refs
                .expressions
                .into_iter()
                .map(|e| ExpressionSetting { name: e.name, file: e.file })
                .collect(),
            motion_groups,
            eye_blink_ids: group_ids(GROUP_EYE_BLINK),
            lip_sync_ids: group_ids(GROUP_LIP_SYNC),
            hit_areas: json
                .hit_areas
                .into_iter()
                .map(|h| HitAreaSetting {
                    name: if h.name.is_empty() { h.id.clone() } else { h.name },
                    id: h.id,
                    vertices: h.vertices,
                })
                .collect(),
            layout: json.layout,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const HIYORI: &str = r#"{
        "Version": 3,
        "FileReferences": {
            "Moc": "hiyori.moc3",
            "Textures": ["hiyori.2048/texture_00.png", "hiyori.2048/texture_01.png"],
            "Physics": "hiyori.physics3.json",
            "Pose": "hiyori.pose3.json",
            "Expressions": [{"Name": "f01", "File": "exp/f01.exp3.json"}],
            "Motions": {
                "Idle": [{"File": "motion/idle_01.motion3.json", "FadeInTime": 0.5}],
                "TapBody": [{"File": "motion/tap_01.motion3.json", "Sound": "sounds/tap.wav"}]
            }
        },
        "Groups": [
            {"Target": "Parameter", "Name": "EyeBlink", "Ids": ["ParamEyeLOpen", "ParamEyeROpen"]},
            {"Target": "Parameter", "Name": "LipSync", "Ids": ["ParamMouthOpenY"]}
        ],
        "HitAreas": [{"Id": "HitArea", "Name": "Body"}],
        "Layout": {"CenterX": 0.0, "Width": 2.0}
    }"#;

    #[test]
    fn test_parse_full_manifest() {
        let setting = Model3JsonParser
            .parse(Path::new("hiyori"), "hiyori.model3.json", HIYORI.as_bytes())
            .unwrap();
        assert_eq!(setting.model_file(), Some("hiyori.moc3"));
        assert_eq!(setting.textures().len(), 2);
        assert_eq!(setting.physics_file(), Some("hiyori.physics3.json"));
        assert_eq!(setting.user_data_file(), None);
        assert_eq!(setting.expressions()[0].name, "f01");
        assert_eq!(setting.motion_groups()[0].name, "Idle");
        assert_eq!(setting.motion_groups()[0].motions[0].fade_in_time, Some(0.5));
        assert_eq!(
            setting.motion_group("TapBody").unwrap().motions[0].sound.as_deref(),
            Some("sounds/tap.wav")
        );
        assert_eq!(setting.eye_blink_ids(), &["ParamEyeLOpen", "ParamEyeROpen"]);
        assert_eq!(setting.lip_sync_ids(), &["ParamMouthOpenY"]);
        assert_eq!(setting.hit_areas()[0].name, "Body");
        assert_eq!(setting.layout().get("Width"), Some(&2.0));
        assert_eq!(
            setting.resolve_path("hiyori.moc3"),
            Path::new("hiyori").join("hiyori.moc3")
        );
    }

    #[test]
    fn test_rejects_missing_file_references() {
        let err = Model3JsonParser
            .parse(Path::new("x"), "x.model3.json", br#"{"Version":3}"#)
            .unwrap_err();
        assert!(err.0.contains("FileReferences"));
    }
}
