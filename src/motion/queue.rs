//! 动作队列：优先级仲裁、淡入淡出与生命周期事件

use std::sync::Arc;

use super::motion::{ApplyContext, Motion};
use super::{easing_sine, MotionEvent, MotionHandle, MotionState};
use crate::id::IdentifierSet;
use crate::model::Model;

struct QueueEntry {
    handle: MotionHandle,
    motion: Arc<Motion>,
    group: String,
    index: usize,
    priority: i32,
    state: MotionState,
    start_time: f32,
    fade_in_start: f32,
    /// None 表示无结束时间（循环动作或尚未触发淡出）
    end_time: Option<f32>,
    fade_out_requested: bool,
    last_local_time: f32,
}

impl QueueEntry {
    /// 仍在争夺播放权的条目
    fn is_active(&self) -> bool {
        !self.fade_out_requested
            && matches!(
                self.state,
                MotionState::Waiting | MotionState::FadingIn | MotionState::Playing
            )
    }

    fn request_fade_out(&mut self, user_time: f32) {
        self.fade_out_requested = true;
        if self.state != MotionState::Waiting {
            self.begin_fade_out(user_time);
        }
    }

    fn begin_fade_out(&mut self, user_time: f32) {
        let new_end = user_time + self.motion.fade_out();
        if self.end_time.map_or(true, |end| new_end < end) {
            self.end_time = Some(new_end);
        }
    }

    fn local_time(&self, user_time: f32) -> f32 {
        let elapsed = (user_time - self.start_time).max(0.0);
        let duration = self.motion.duration();
        if self.motion.is_loop() && duration > 0.0 {
            elapsed % duration
        } else {
            elapsed.min(duration)
        }
    }

    fn began_event(&self) -> MotionEvent {
        MotionEvent::Began {
            handle: self.handle,
            group: self.group.clone(),
            index: self.index,
        }
    }

    fn finished_event(&self) -> MotionEvent {
        MotionEvent::Finished {
            handle: self.handle,
            group: self.group.clone(),
            index: self.index,
        }
    }
}

/// 动作队列
///
/// 时间只由 [`MotionQueueManager::update`] 传入的累计时间推进。
pub struct MotionQueueManager {
    entries: Vec<QueueEntry>,
    user_time: f32,
    next_handle: i64,
}

impl MotionQueueManager {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            user_time: 0.0,
            next_handle: 0,
        }
    }

    /// 以给定优先级启动动作
    ///
    /// 存在更高优先级的活动条目时返回 [`MotionHandle::INVALID`]；
    /// 否则所有活动条目开始淡出，新条目进入 Waiting。
    pub fn start(&mut self, motion: Arc<Motion>, group: &str, index: usize, priority: i32) -> MotionHandle {
        if let Some(blocking) = self.entries.iter().find(|e| e.is_active() && e.priority > priority) {
            log::debug!(
                "motion {}[{}] at priority {} blocked by handle {} at priority {}",
                group,
                index,
                priority,
                blocking.handle,
                blocking.priority
            );
            return MotionHandle::INVALID;
        }

        let user_time = self.user_time;
        for entry in self.entries.iter_mut().filter(|e| e.is_active()) {
            entry.request_fade_out(user_time);
        }

        let handle = MotionHandle::new(self.next_handle);
        self.next_handle += 1;
        self.entries.push(QueueEntry {
            handle,
            motion,
            group: group.to_string(),
            index,
            priority,
            state: MotionState::Waiting,
            start_time: 0.0,
            fade_in_start: 0.0,
            end_time: None,
            fade_out_requested: false,
            last_local_time: 0.0,
        });
        handle
    }

    /// 推进到 `user_time` 并把动作混合到模型参数上
    ///
    /// 上一帧进入 Finished 的条目在本帧开始时移除。返回是否有动作被应用，
    /// 以及 Opacity 曲线给出的模型不透明度。
    pub fn update(
        &mut self,
        user_time: f32,
        model: &mut Model,
        ids: &IdentifierSet,
        events: &mut Vec<MotionEvent>,
    ) -> (bool, Option<f32>) {
        self.user_time = user_time;
        self.entries.retain(|e| e.state != MotionState::Finished);

        let mut updated = false;
        let mut opacity = None;

        for entry in &mut self.entries {
            if entry.state == MotionState::Waiting {
                entry.start_time = user_time;
                entry.fade_in_start = user_time;
                entry.last_local_time = 0.0;
                let duration = entry.motion.duration();
                entry.end_time = if entry.motion.is_loop() || duration <= 0.0 {
                    None
                } else {
                    Some(user_time + duration)
                };
                if entry.fade_out_requested {
                    entry.begin_fade_out(user_time);
                }
                entry.state = MotionState::Playing;
                events.push(entry.began_event());
            }

            if let Some(end) = entry.end_time {
                if user_time >= end {
                    entry.state = MotionState::Finished;
                    events.push(entry.finished_event());
                    continue;
                }
            }

            let fade_in = entry.motion.fade_in();
            let fade_out = entry.motion.fade_out();
            let since_fade_in = user_time - entry.fade_in_start;
            let until_end = entry.end_time.map(|end| end - user_time);

            let fade_in_weight = if fade_in > 0.0 { easing_sine(since_fade_in / fade_in) } else { 1.0 };
            let fade_out_weight = match until_end {
                Some(remaining) if fade_out > 0.0 => easing_sine(remaining / fade_out),
                _ => 1.0,
            };

            entry.state = match until_end {
                Some(remaining) if fade_out > 0.0 && remaining <= fade_out => MotionState::FadingOut,
                _ if fade_in_weight < 1.0 => MotionState::FadingIn,
                _ => MotionState::Playing,
            };

            let local = entry.local_time(user_time);
            let ctx = ApplyContext {
                ids,
                time: local,
                fade_weight: fade_in_weight * fade_out_weight,
                since_fade_in,
                until_end,
            };
            if let Some(value) = entry.motion.apply(model, &ctx) {
                opacity = Some(value);
            }
            updated = true;

            if local != entry.last_local_time {
                for data in entry.motion.fired_user_data(entry.last_local_time, local) {
                    events.push(MotionEvent::UserData {
                        handle: entry.handle,
                        value: data.value.clone(),
                    });
                }
                entry.last_local_time = local;
            }
        }

        (updated, opacity)
    }

    /// 队列中没有未结束的条目
    pub fn is_finished(&self) -> bool {
        self.entries.iter().all(|e| e.state == MotionState::Finished)
    }

    /// 句柄对应条目的状态；已移除或未知的句柄返回 None
    pub fn state(&self, handle: MotionHandle) -> Option<MotionState> {
        self.entries.iter().find(|e| e.handle == handle).map(|e| e.state)
    }

    /// 当前活动条目的最高优先级
    pub fn current_priority(&self) -> Option<i32> {
        self.entries.iter().filter(|e| e.is_active()).map(|e| e.priority).max()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for MotionQueueManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MotionOptions;
    use crate::model::tests::sample_model;
    use crate::motion::motion::tests::{wave_motion, WAVE};
    use crate::motion::priority;
    use crate::setting::MotionSetting;

    fn faded_motion(model: &Model, fade: f32) -> Arc<Motion> {
        let setting = MotionSetting {
            fade_in_time: Some(fade),
            fade_out_time: Some(fade),
            ..Default::default()
        };
        Arc::new(Motion::from_json(WAVE.as_bytes(), model, &setting, &MotionOptions::default()).unwrap())
    }

    #[test]
    fn test_began_and_finished_once() {
        let mut model = sample_model();
        let ids = IdentifierSet::default();
        let mut queue = MotionQueueManager::new();
        let mut events = Vec::new();

        let handle = queue.start(Arc::new(wave_motion(&model)), "Tap", 0, priority::NORMAL);
        assert_eq!(queue.state(handle), Some(MotionState::Waiting));

        let mut t = 0.0;
        while t <= 2.5 {
            queue.update(t, &mut model, &ids, &mut events);
            t += 0.25;
        }
        let began = events.iter().filter(|e| matches!(e, MotionEvent::Began { .. })).count();
        let finished = events.iter().filter(|e| matches!(e, MotionEvent::Finished { .. })).count();
        let user_data = events.iter().filter(|e| matches!(e, MotionEvent::UserData { .. })).count();
        assert_eq!((began, finished, user_data), (1, 1, 1));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_higher_priority_blocks() {
        let mut model = sample_model();
        let ids = IdentifierSet::default();
        let mut queue = MotionQueueManager::new();
        let mut events = Vec::new();

        let forced = queue.start(faded_motion(&model, 0.5), "Tap", 0, priority::FORCE);
        queue.update(0.0, &mut model, &ids, &mut events);
        let blocked = queue.start(faded_motion(&model, 0.5), "Idle", 0, priority::IDLE);
        assert_eq!(blocked, MotionHandle::INVALID);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.current_priority(), Some(priority::FORCE));
        assert!(queue.state(forced).is_some());
    }

    #[test]
    fn test_equal_priority_replaces_with_crossfade() {
        let mut model = sample_model();
        let ids = IdentifierSet::default();
        let mut queue = MotionQueueManager::new();
        let mut events = Vec::new();

        let first = queue.start(faded_motion(&model, 0.5), "Tap", 0, priority::NORMAL);
        queue.update(0.0, &mut model, &ids, &mut events);
        queue.update(0.6, &mut model, &ids, &mut events);
        let second = queue.start(faded_motion(&model, 0.5), "Tap", 1, priority::NORMAL);
        assert!(second.is_valid());

        queue.update(0.8, &mut model, &ids, &mut events);
        assert_eq!(queue.state(first), Some(MotionState::FadingOut));
        assert_eq!(queue.state(second), Some(MotionState::FadingIn));

        queue.update(1.2, &mut model, &ids, &mut events);
        assert_eq!(queue.state(first), Some(MotionState::Finished));
        queue.update(1.3, &mut model, &ids, &mut events);
        assert_eq!(queue.state(first), None);

        let order: Vec<_> = events
            .iter()
            .filter(|e| !matches!(e, MotionEvent::UserData { .. }))
            .map(|e| e.handle())
            .collect();
        assert_eq!(order, vec![first, second, first]);
    }

    #[test]
    fn test_superseded_waiting_entry_still_reports() {
        let mut model = sample_model();
        let ids = IdentifierSet::default();
        let mut queue = MotionQueueManager::new();
        let mut events = Vec::new();

        let first = queue.start(Arc::new(wave_motion(&model)), "Tap", 0, priority::NORMAL);
        let second = queue.start(Arc::new(wave_motion(&model)), "Tap", 1, priority::NORMAL);
        queue.update(0.0, &mut model, &ids, &mut events);

        assert_eq!(
            events,
            vec![
                MotionEvent::Began { handle: first, group: "Tap".into(), index: 0 },
                MotionEvent::Finished { handle: first, group: "Tap".into(), index: 0 },
                MotionEvent::Began { handle: second, group: "Tap".into(), index: 1 },
            ]
        );
    }
}
