//! 动作与表情库

use std::collections::HashMap;
use std::sync::Arc;

use rand::Rng;

use super::{Expression, Motion};
use crate::setting::{MotionGroup, MotionSetting};

/// 动作槽位：清单条目 + 已加载的片段
struct MotionSlot {
    setting: MotionSetting,
    motion: Option<Arc<Motion>>,
    /// 延迟加载失败过，不再重试
    failed: bool,
}

struct LibraryGroup {
    name: String,
    slots: Vec<MotionSlot>,
}

/// 以 (组名, 序号) 或表情名索引的片段库
pub struct MotionLibrary {
    groups: Vec<LibraryGroup>,
    group_index: HashMap<String, usize>,
    expressions: Vec<(String, Arc<Expression>)>,
    expression_index: HashMap<String, usize>,
}

impl MotionLibrary {
    /// 按清单的组顺序建立空槽位
    pub fn new(groups: &[MotionGroup]) -> Self {
        let mut library = Self {
            groups: Vec::with_capacity(groups.len()),
            group_index: HashMap::new(),
            expressions: Vec::new(),
            expression_index: HashMap::new(),
        };
        for group in groups {
            library.group_index.insert(group.name.clone(), library.groups.len());
            library.groups.push(LibraryGroup {
                name: group.name.clone(),
                slots: group
                    .motions
                    .iter()
                    .map(|m| MotionSlot {
                        setting: m.clone(),
                        motion: None,
                        failed: false,
                    })
                    .collect(),
            });
        }
        library
    }

    fn slot(&self, group: &str, index: usize) -> Option<&MotionSlot> {
        let g = *self.group_index.get(group)?;
        self.groups[g].slots.get(index)
    }

    fn slot_mut(&mut self, group: &str, index: usize) -> Option<&mut MotionSlot> {
        let g = *self.group_index.get(group)?;
        self.groups[g].slots.get_mut(index)
    }

    pub fn group_names(&self) -> Vec<&str> {
        self.groups.iter().map(|g| g.name.as_str()).collect()
    }

    /// 组内动作数；未知组为 0
    pub fn motion_count(&self, group: &str) -> usize {
        self.group_index
            .get(group)
            .map(|&g| self.groups[g].slots.len())
            .unwrap_or(0)
    }

    pub fn setting(&self, group: &str, index: usize) -> Option<&MotionSetting> {
        self.slot(group, index).map(|s| &s.setting)
    }

    /// 放入已加载的片段
    pub fn insert_motion(&mut self, group: &str, index: usize, motion: Motion) -> bool {
        match self.slot_mut(group, index) {
            Some(slot) => {
                slot.motion = Some(Arc::new(motion));
                slot.failed = false;
                true
            }
            None => false,
        }
    }

    pub fn motion(&self, group: &str, index: usize) -> Option<Arc<Motion>> {
        self.slot(group, index).and_then(|s| s.motion.clone())
    }

    /// 取片段，未加载时调用 `load` 并缓存结果
    ///
    /// 加载失败的槽位被标记，之后直接返回 None。
    pub fn get_or_load<E: std::fmt::Display>(
        &mut self,
        group: &str,
        index: usize,
        load: impl FnOnce(&MotionSetting) -> Result<Motion, E>,
    ) -> Option<Arc<Motion>> {
        let slot = self.slot_mut(group, index)?;
        if let Some(motion) = &slot.motion {
            return Some(motion.clone());
        }
        if slot.failed {
            return None;
        }
        match load(&slot.setting) {
            Ok(motion) => {
                let motion = Arc::new(motion);
                slot.motion = Some(motion.clone());
                Some(motion)
            }
            Err(e) => {
                log::warn!("failed to load motion {}[{}] ({}): {}", group, index, slot.setting.file, e);
                slot.failed = true;
                None
            }
        }
    }

    /// 组内均匀随机选一个序号；空组或未知组返回 None
    pub fn random_index<R: Rng + ?Sized>(&self, group: &str, rng: &mut R) -> Option<usize> {
        let count = self.motion_count(group);
        if count == 0 {
            None
        } else {
            Some(rng.random_range(0..count))
        }
    }

    pub fn loaded_motion_count(&self) -> usize {
        self.groups
            .iter()
            .flat_map(|g| g.slots.iter())
            .filter(|s| s.motion.is_some())
            .count()
    }

    pub fn insert_expression(&mut self, name: &str, expression: Expression) {
        let expression = Arc::new(expression);
        match self.expression_index.get(name) {
            Some(&i) => self.expressions[i].1 = expression,
            None => {
                self.expression_index.insert(name.to_string(), self.expressions.len());
                self.expressions.push((name.to_string(), expression));
            }
        }
    }

    pub fn expression(&self, name: &str) -> Option<Arc<Expression>> {
        self.expression_index
            .get(name)
            .map(|&i| self.expressions[i].1.clone())
    }

    /// 清单顺序的表情名
    pub fn expression_names(&self) -> Vec<&str> {
        self.expressions.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn random_expression<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<(&str, Arc<Expression>)> {
        if self.expressions.is_empty() {
            return None;
        }
        let (name, expression) = &self.expressions[rng.random_range(0..self.expressions.len())];
        Some((name.as_str(), expression.clone()))
    }
}
