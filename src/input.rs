//! # Input モジュール
//!
//! キー入力とビューポートのリサイズを表す入力イベントを扱います。
//!
//! ヘッドレス実行ではシナリオに書かれた入力スクリプトを時刻順に再生し、
//! キーボードやウィンドウシステムの代わりとします。

use serde::{Deserialize, Serialize};

/// 入力イベント
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InputEvent {
    KeyPress(char),
    Resize { width: u32, height: u32 },
}

/// 時刻付き入力イベント
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct ScheduledInput {
    pub at_s: f64,
    /// YAMLでは `{ key_press: "v" }` のような単一キーのマップで書く
    #[serde(with = "serde_yaml::with::singleton_map")]
    pub event: InputEvent,
}

/// キー入力の解釈結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    CycleCameraMode,
    ToggleEvasion,
}

/// キー割り当て（大文字・小文字は区別しない）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeyBindings {
    pub camera_cycle: char,
    pub evasion_toggle: char,
}

impl Default for KeyBindings {
    fn default() -> Self {
        Self {
            camera_cycle: 'v',
            evasion_toggle: 'm',
        }
    }
}

impl KeyBindings {
    pub fn new(camera_cycle: char, evasion_toggle: char) -> Self {
        Self {
            camera_cycle,
            evasion_toggle,
        }
    }

    /// キーを操作に変換。割り当てのないキーはNone
    pub fn resolve(&self, key: char) -> Option<Action> {
        if key.eq_ignore_ascii_case(&self.camera_cycle) {
            Some(Action::CycleCameraMode)
        } else if key.eq_ignore_ascii_case(&self.evasion_toggle) {
            Some(Action::ToggleEvasion)
        } else {
            None
        }
    }
}

/// 時刻順に再生される入力スクリプト
#[derive(Debug, Clone, Default)]
pub struct InputScript {
    events: Vec<ScheduledInput>,
    cursor: usize,
}

impl InputScript {
    pub fn new(mut events: Vec<ScheduledInput>) -> Self {
        // 同時刻のイベントは記述順を保つ
        events.sort_by(|a, b| a.at_s.total_cmp(&b.at_s));
        Self { events, cursor: 0 }
    }

    /// `time` までに発生すべきイベントを取り出す
    pub fn drain_due(&mut self, time: f64) -> Vec<InputEvent> {
        let start = self.cursor;
        while self.cursor < self.events.len() && self.events[self.cursor].at_s <= time {
            self.cursor += 1;
        }
        self.events[start..self.cursor].iter().map(|s| s.event).collect()
    }

    #[cfg(test)]
    pub fn remaining(&self) -> usize {
        self.events.len() - self.cursor
    }
}
