//! userdata3.json

use serde::Deserialize;

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct UserData3Json {
    #[serde(default)]
    user_data: Vec<UserDataEntry>,
}

/// 附加在模型对象上的用户数据
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UserDataEntry {
    pub target: String,
    pub id: String,
    pub value: String,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ModelUserData {
    entries: Vec<UserDataEntry>,
}

impl ModelUserData {
    pub fn from_json(bytes: &[u8]) -> Result<Self, String> {
        let json: UserData3Json = serde_json::from_slice(bytes).map_err(|e| e.to_string())?;
        Ok(Self { entries: json.user_data })
    }

    pub fn entries(&self) -> &[UserDataEntry] {
        &self.entries
    }

    /// ArtMesh 上的标签
    pub fn art_mesh_values(&self, drawable_id: &str) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|e| e.target == "ArtMesh" && e.id == drawable_id)
            .map(|e| e.value.as_str())
            .collect()
    }
}
