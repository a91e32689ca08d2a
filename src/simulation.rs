//! # Simulation モジュール
//!
//! 自動飛行デモのフレームループを提供します。
//!
//! すべての状態（戦闘機・ミサイル・爆発・発射スケジューラ・カメラ・乱数）は
//! `SimulationEngine` が単独で所有し、1フレームごとに `step` で更新します。
//!
//! ## フレーム処理順序
//!
//! 1. **入力処理**: フレーム開始時点までに発生した入力イベントを適用
//! 2. **戦闘機処理**: 周回飛行または回避機動、飛行機雲の更新
//! 3. **発射処理**: バーストスケジューラによるミサイル発射
//! 4. **ミサイル処理**: 誘導・前進・爆発判定。終了したミサイルの位置に爆発を生成
//! 5. **爆発処理**: パーティクル更新と寿命切れの削除
//! 6. **カメラ処理**: 現在のモードでカメラ姿勢を計算
//! 7. **描画**: シーンのレンダリング（ヘッドレス実行ではトレース出力）
//!
//! 戦闘機モデルの読み込みが完了するまでは入力処理と描画だけが行われます。

use std::time::{Duration, Instant};

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use slotmap::SlotMap;
use tracing::{debug, error, info, trace, warn};

use crate::assets::{AssetError, ModelAsset, PendingModel};
use crate::camera::CameraController;
use crate::input::{Action, InputEvent, InputScript, KeyBindings};
use crate::models::{
    missile::missile_trail, Aircraft, BurstScheduler, EffectStatus, Explosion, IEffect, IHoming, Missile,
    MissileEndReason, MissileKey, SmokeTrail, SpawnOrder, TrailStyle,
};
use crate::scenario::ScenarioConfig;
use crate::scene::{SceneError, SceneGraph};

/// リアルタイム実行時に1フレームで進める最大時間
const MAX_REALTIME_DT: f64 = 0.25;

/// 進行状況をログ出力する間隔（シミュレーション時間）
const PROGRESS_INTERVAL_S: f64 = 5.0;

#[derive(Debug, thiserror::Error)]
pub enum SimulationError {
    #[error("描画エラー: {0}")]
    Scene(#[from] SceneError),

    #[error("時間刻みが不正です: {0}")]
    InvalidTimeStep(f64),
}

/// 実行統計
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimulationStats {
    pub frames: u64,
    pub sim_time: f64,
    pub model_loaded_at: Option<f64>,
    pub missiles_spawned: u64,
    pub bursts: u64,
    pub direct_hits: u64,
    pub flyby_detonations: u64,
    pub timeouts: u64,
    pub target_lost: u64,
    pub explosions_spawned: u64,
    pub evasions: u64,
    pub peak_live_missiles: usize,
}

impl SimulationStats {
    /// 終了したミサイルの総数
    pub fn missiles_ended(&self) -> u64 {
        self.direct_hits + self.flyby_detonations + self.timeouts + self.target_lost
    }

    fn record_end(&mut self, reason: MissileEndReason) {
        match reason {
            MissileEndReason::DirectHit => self.direct_hits += 1,
            MissileEndReason::FlybySelfDestruct => self.flyby_detonations += 1,
            MissileEndReason::TimedOut => self.timeouts += 1,
            MissileEndReason::TargetLost => self.target_lost += 1,
        }
    }

    pub fn log_summary(&self) {
        info!("=== シミュレーション完了 ===");
        info!("実行時間: {:.2}秒 ({}フレーム)", self.sim_time, self.frames);
        match self.model_loaded_at {
            Some(t) => info!("モデル読み込み完了時刻: {:.2}秒", t),
            None => warn!("戦闘機モデルは読み込まれませんでした"),
        }
        info!("発射: {}発 ({}バースト)", self.missiles_spawned, self.bursts);
        info!(
            "終了: {}発 (命中 {} / 通過自爆 {} / 寿命切れ {} / 目標喪失 {})",
            self.missiles_ended(),
            self.direct_hits,
            self.flyby_detonations,
            self.timeouts,
            self.target_lost
        );
        info!("爆発: {}回, 回避機動: {}回", self.explosions_spawned, self.evasions);
        info!("同時飛翔ミサイル最大数: {}", self.peak_live_missiles);
    }
}

pub struct SimulationEngine {
    pub time: f64,
    pub frame: u64,
    pub dt: f64,
    pub duration: f64,

    pub aircraft: Option<Aircraft>,
    pub missiles: SlotMap<MissileKey, Missile>,
    pub explosions: Vec<Explosion>,
    pub scheduler: BurstScheduler,
    pub camera: CameraController,

    config: ScenarioConfig,
    input: InputScript,
    bindings: KeyBindings,
    rng: ChaCha8Rng,
    stats: SimulationStats,
    scene: Box<dyn SceneGraph>,
    missile_counter: u64,
    explosion_counter: u64,
}

impl SimulationEngine {
    pub fn new(config: ScenarioConfig, scene: Box<dyn SceneGraph>) -> Self {
        let bindings = KeyBindings::new(config.input.camera_cycle_key, config.input.evasion_toggle_key);
        Self {
            time: 0.0,
            frame: 0,
            dt: config.sim.frame_dt_s,
            duration: config.sim.duration_s,
            aircraft: None,
            missiles: SlotMap::with_key(),
            explosions: Vec::new(),
            scheduler: BurstScheduler::new(&config.burst),
            camera: CameraController::new(&config.camera),
            input: InputScript::new(config.input.events.clone()),
            bindings,
            rng: ChaCha8Rng::seed_from_u64(config.sim.seed),
            stats: SimulationStats::default(),
            scene,
            missile_counter: 0,
            explosion_counter: 0,
            config,
        }
    }

    #[cfg(test)]
    pub fn stats(&self) -> &SimulationStats {
        &self.stats
    }

    #[cfg(test)]
    pub fn scene(&self) -> &dyn SceneGraph {
        self.scene.as_ref()
    }

    /// 読み込み完了したモデルで戦闘機を生成
    pub fn attach_aircraft(&mut self, asset: &ModelAsset) {
        if self.aircraft.is_some() {
            return;
        }
        let trail = SmokeTrail::new(
            TrailStyle::Aircraft,
            self.config.trail.aircraft_capacity,
            self.config.trail.particle_lifetime_s,
        );
        let aircraft = Aircraft::new(
            "F001".to_string(),
            &self.config.flight_path,
            &self.config.evasion,
            trail,
            self.config.asset.model_scale,
        );
        info!(
            aircraft_id = %aircraft.id,
            model = %asset.path.display(),
            time = self.time,
            evasion_enabled = aircraft.evasion_enabled,
            "AIRCRAFT_READY: 戦闘機を配置しました"
        );
        self.stats.model_loaded_at = Some(self.time);
        self.aircraft = Some(aircraft);
    }

    /// モデル読み込み失敗（戦闘機は配置されず、再試行もしない）
    pub fn on_model_load_failed(&mut self, error: &AssetError) {
        error!(error = %error, "MODEL_LOAD_FAILED: 戦闘機モデルの読み込みに失敗しました");
    }

    /// 読み込み状況を確認し、完了していれば反映
    pub fn poll_model(&mut self, pending: &mut PendingModel) {
        match pending.poll() {
            Some(Ok(asset)) => self.attach_aircraft(&asset),
            Some(Err(e)) => self.on_model_load_failed(&e),
            None => {}
        }
    }

    /// 1フレーム進める
    pub fn step(&mut self, dt: f64) -> Result<(), SimulationError> {
        if !dt.is_finite() || dt < 0.0 {
            return Err(SimulationError::InvalidTimeStep(dt));
        }

        self.process_input();

        if self.aircraft.is_some() {
            self.process_aircraft(dt);
            self.process_spawning(dt);
            self.process_missiles(dt);
            self.process_explosions(dt);
            self.process_camera(dt);
        }

        self.scene.render(self.frame, self.time)?;

        self.time += dt;
        self.frame += 1;
        self.stats.frames = self.frame;
        self.stats.sim_time = self.time;
        Ok(())
    }

    fn process_input(&mut self) {
        for event in self.input.drain_due(self.time) {
            match event {
                InputEvent::KeyPress(key) => match self.bindings.resolve(key) {
                    Some(Action::CycleCameraMode) => {
                        self.camera.cycle_mode(&mut self.rng);
                    }
                    Some(Action::ToggleEvasion) => match self.aircraft.as_mut() {
                        Some(aircraft) => {
                            aircraft.toggle_evasion();
                        }
                        // 戦闘機の配置前は初期設定を切り替える
                        None => {
                            self.config.evasion.enabled = !self.config.evasion.enabled;
                            info!(
                                evasion_enabled = self.config.evasion.enabled,
                                "EVASION_TOGGLED: 緊急回避機動の設定を切り替えました"
                            );
                        }
                    },
                    None => trace!(key = %key, "割り当てのないキー入力を無視しました"),
                },
                InputEvent::Resize { width, height } => self.scene.resize(width, height),
            }
        }
    }

    /// 飛翔中ミサイルのうち戦闘機に最も近いものの距離（前フレームの誘導結果）
    fn closest_threat(&self) -> Option<f64> {
        self.missiles
            .values()
            .filter(|m| m.is_alive())
            .filter_map(|m| m.distance_to_target())
            .min_by(|a, b| a.total_cmp(b))
    }

    fn process_aircraft(&mut self, dt: f64) {
        let threat = self.closest_threat();
        let Some(aircraft) = self.aircraft.as_mut() else {
            return;
        };

        if aircraft.update_flight(dt, threat, &mut self.rng).is_some() {
            self.stats.evasions += 1;
        }
        aircraft.sync_scene(self.scene.as_mut(), dt);
    }

    fn process_spawning(&mut self, dt: f64) {
        let Some(altitude) = self.aircraft.as_ref().map(|a| a.position().y) else {
            return;
        };
        if let Some(order) = self.scheduler.tick(dt, altitude, &mut self.rng) {
            self.spawn_missile(order);
        }
    }

    fn spawn_missile(&mut self, order: SpawnOrder) {
        self.missile_counter += 1;
        let trail = missile_trail(self.config.trail.missile_capacity, self.config.trail.particle_lifetime_s);
        let mut missile = Missile::new(
            format!("M{:04}", self.missile_counter),
            self.missile_counter,
            order.origin,
            &self.config.missile,
            trail,
        );
        missile.attach(self.scene.as_mut());

        debug!(
            missile_id = %missile.get_id(),
            burst_id = order.burst_id,
            burst_index = order.index,
            origin_x = order.origin.x,
            origin_y = order.origin.y,
            origin_z = order.origin.z,
            "MISSILE_SPAWNED: ミサイルを発射しました"
        );

        let key = self.missiles.insert(missile);
        self.camera.on_missile_spawned(key);

        self.stats.missiles_spawned += 1;
        self.stats.bursts = self.scheduler.bursts_started();
        self.stats.peak_live_missiles = self.stats.peak_live_missiles.max(self.missiles.len());
    }

    fn process_missiles(&mut self, dt: f64) {
        let target = self.aircraft.as_ref().map(Aircraft::position);
        let scene = self.scene.as_mut();

        let mut ended = Vec::new();
        for (key, missile) in self.missiles.iter_mut() {
            missile.acquire_target(target);
            if !missile.update(scene, dt) {
                ended.push(key);
            }
        }

        for key in ended {
            let Some(mut missile) = self.missiles.remove(key) else {
                continue;
            };
            match missile.end_reason {
                Some(reason) => self.stats.record_end(reason),
                None => warn!(missile_id = %missile.get_id(), "終了理由のないミサイルを除去しました"),
            }
            missile.dispose(scene);

            self.explosion_counter += 1;
            let mut explosion = Explosion::new(
                format!("E{:04}", self.explosion_counter),
                missile.position,
                &self.config.explosion,
                &mut self.rng,
            );
            explosion.attach(scene);
            self.explosions.push(explosion);
            self.stats.explosions_spawned += 1;
        }
    }

    fn process_explosions(&mut self, dt: f64) {
        let scene = self.scene.as_mut();
        for i in (0..self.explosions.len()).rev() {
            if !self.explosions[i].update(scene, dt) {
                let mut explosion = self.explosions.remove(i);
                if explosion.status == EffectStatus::Alive {
                    explosion.dispose(scene);
                }
            }
        }
    }

    fn process_camera(&mut self, dt: f64) {
        let aircraft = self.aircraft.as_ref().map(Aircraft::position);
        if let Some(pose) = self.camera.compute(&self.missiles, aircraft, dt) {
            self.scene.set_camera(pose);
        }
    }

    /// シナリオの実行時間までフレームループを回す
    pub fn run(&mut self, pending: &mut PendingModel) -> Result<SimulationStats, SimulationError> {
        let realtime = self.config.sim.realtime;
        info!(
            duration = self.duration,
            dt = self.dt,
            realtime,
            seed = self.config.sim.seed,
            "=== シミュレーション実行開始 ==="
        );

        let progress_frames = ((PROGRESS_INTERVAL_S / self.dt).round() as u64).max(1);
        let frame_budget = Duration::try_from_secs_f64(self.dt).unwrap_or(Duration::ZERO);
        let mut last_frame = Instant::now();

        while self.time < self.duration {
            if !pending.is_settled() {
                self.poll_model(pending);
            }

            let dt = if realtime {
                let elapsed = last_frame.elapsed();
                if elapsed < frame_budget {
                    std::thread::sleep(frame_budget - elapsed);
                }
                let now = Instant::now();
                let wall = now.duration_since(last_frame).as_secs_f64();
                last_frame = now;
                wall.min(MAX_REALTIME_DT)
            } else {
                self.dt
            };

            self.step(dt)?;

            if self.frame % progress_frames == 0 {
                let progress = (self.time / self.duration * 100.0).min(100.0);
                info!(
                    live_missiles = self.missiles.len(),
                    explosions = self.explosions.len(),
                    nodes = self.scene.live_node_count(),
                    "進行状況: {:.1}% ({:.1}/{:.1}秒)",
                    progress,
                    self.time,
                    self.duration
                );
            }
        }

        self.scene.flush()?;
        if let Some(last) = self.scheduler.launch_history().last() {
            debug!(
                burst_id = last.burst_id,
                timestamp = last.timestamp,
                origin_x = last.origin.x,
                origin_y = last.origin.y,
                origin_z = last.origin.z,
                "最終発射記録"
            );
        }
        self.stats.log_summary();
        Ok(self.stats.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::CameraMode;
    use crate::input::ScheduledInput;
    use crate::scene::{HeadlessScene, NodeKind, Viewport};
    use glam::DVec3;
    use std::path::PathBuf;

    fn asset() -> ModelAsset {
        ModelAsset {
            path: PathBuf::from("data/fighter.glb"),
            mesh_count: 1,
            node_count: 1,
            scene_count: 1,
        }
    }

    fn engine(config: ScenarioConfig) -> SimulationEngine {
        SimulationEngine::new(config, Box::new(HeadlessScene::new(Viewport::new(640, 480, 20.0))))
    }

    fn burst_config() -> ScenarioConfig {
        let mut config = ScenarioConfig::default();
        config.sim.frame_dt_s = 0.125;
        config.burst.spawn_interval_s = 0.25;
        config.burst.burst_delay_s = 1.0;
        config
    }

    #[test]
    fn test_inert_until_model_loaded() {
        let mut engine = engine(ScenarioConfig::default());
        for _ in 0..120 {
            engine.step(1.0 / 60.0).unwrap();
        }
        assert!(engine.aircraft.is_none());
        assert_eq!(engine.stats().missiles_spawned, 0);
        assert_eq!(engine.scene().live_node_count(), 0);
        assert_eq!(engine.stats().frames, 120);
    }

    #[test]
    fn test_burst_cycle_spawns_burst_size_missiles() {
        let mut engine = engine(burst_config());
        engine.attach_aircraft(&asset());

        for _ in 0..28 {
            engine.step(0.125).unwrap();
        }
        let stats = engine.stats();
        assert_eq!(stats.missiles_spawned, 10);
        assert_eq!(stats.bursts, 1);

        let origins: Vec<DVec3> = engine.scheduler.launch_history().map(|r| r.origin).collect();
        assert_eq!(origins.len(), 10);
        assert!(origins.iter().all(|o| *o == origins[0]));

        // 終了したミサイルごとにちょうど1つの爆発
        assert_eq!(stats.explosions_spawned, stats.missiles_ended());
        assert_eq!(engine.missiles.len() as u64 + stats.missiles_ended(), 10);
        assert_eq!(engine.scene().live_node_count_of(NodeKind::Missile), engine.missiles.len());
    }

    #[test]
    fn test_record_end_counts_each_reason_once() {
        let mut stats = SimulationStats::default();
        stats.record_end(MissileEndReason::DirectHit);
        stats.record_end(MissileEndReason::FlybySelfDestruct);
        stats.record_end(MissileEndReason::FlybySelfDestruct);
        stats.record_end(MissileEndReason::TimedOut);
        assert_eq!(stats.direct_hits, 1);
        assert_eq!(stats.flyby_detonations, 2);
        assert_eq!(stats.timeouts, 1);
        assert_eq!(stats.target_lost, 0);
        assert_eq!(stats.missiles_ended(), 4);
    }

    #[test]
    fn test_removed_aircraft_ends_missiles_as_target_lost() {
        let mut engine = engine(burst_config());
        engine.attach_aircraft(&asset());
        for _ in 0..4 {
            engine.step(0.125).unwrap();
        }
        let spawned = engine.stats().missiles_spawned;
        assert_eq!(spawned, 2);
        assert!(engine.aircraft.as_ref().is_some_and(|a| !a.is_maneuvering()));

        engine.aircraft = None;
        engine.step(0.125).unwrap();

        let stats = engine.stats();
        assert!(engine.missiles.is_empty());
        assert_eq!(stats.target_lost, spawned);
        assert_eq!(stats.direct_hits + stats.flyby_detonations + stats.timeouts, 0);
        assert_eq!(stats.explosions_spawned, stats.missiles_ended());
    }

    #[test]
    fn test_close_missile_triggers_evasion_from_guidance_distance() {
        let config = ScenarioConfig::default();
        let missile_config = config.missile.clone();
        let mut engine = engine(config);
        engine.attach_aircraft(&asset());
        let Some(position) = engine.aircraft.as_ref().map(Aircraft::position) else {
            panic!("aircraft not attached");
        };

        let threat = Missile::new(
            "T_M900".to_string(),
            900,
            position - DVec3::new(0.0, 3.0, 0.0),
            &missile_config,
            missile_trail(10, 2.0),
        );
        let key = engine.missiles.insert(threat);

        engine.step(1.0 / 60.0).unwrap();
        let distance = engine.missiles.get(key).and_then(|m| m.distance_to_target());
        assert!(distance.is_some_and(|d| d > 1.5 && d < 4.0), "{distance:?}");

        engine.step(1.0 / 60.0).unwrap();
        assert_eq!(engine.stats().evasions, 1);
        assert!(engine.aircraft.as_ref().is_some_and(|a| a.is_maneuvering()));
    }

    #[test]
    fn test_camera_follows_newest_missile() {
        let mut engine = engine(burst_config());
        engine.attach_aircraft(&asset());
        for _ in 0..6 {
            engine.step(0.125).unwrap();
        }
        let newest = engine
            .missiles
            .iter()
            .max_by_key(|(_, m)| m.spawn_seq)
            .map(|(key, _)| key);
        assert!(newest.is_some());
        assert_eq!(engine.camera.tracked(), newest);
    }

    #[test]
    fn test_scripted_input_switches_camera_and_evasion() {
        let mut config = ScenarioConfig::default();
        config.input.events = vec![
            ScheduledInput { at_s: 0.0, event: InputEvent::KeyPress('V') },
            ScheduledInput { at_s: 0.0, event: InputEvent::KeyPress('m') },
            ScheduledInput { at_s: 0.5, event: InputEvent::Resize { width: 800, height: 800 } },
        ];
        let mut engine = engine(config);

        // 配置前の切り替えは戦闘機の初期設定に反映される
        engine.step(0.25).unwrap();
        assert_eq!(engine.camera.mode, CameraMode::Dynamic);
        engine.attach_aircraft(&asset());
        assert_eq!(engine.aircraft.as_ref().map(|a| a.evasion_enabled), Some(false));

        engine.step(0.25).unwrap();
        engine.step(0.25).unwrap();
        assert_eq!(engine.scene().viewport().aspect(), 1.0);
    }

    #[test]
    fn test_run_with_failed_model_stays_inert() {
        let mut config = ScenarioConfig::default();
        config.sim.duration_s = 1.0;
        let mut engine = engine(config);
        let mut pending = PendingModel::ready(Err(AssetError::LoadAborted));

        let stats = engine.run(&mut pending).unwrap();
        assert!(pending.is_settled());
        assert_eq!(stats.model_loaded_at, None);
        assert_eq!(stats.missiles_spawned, 0);
        assert!(stats.frames >= 60);
    }

    #[test]
    fn test_run_writes_trace_and_counts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trace.jsonl");
        let mut config = ScenarioConfig::default();
        config.sim.frame_dt_s = 0.125;
        config.sim.duration_s = 4.0;
        let scene = HeadlessScene::with_trace(Viewport::new(640, 480, 20.0), &path).unwrap();
        let mut engine = SimulationEngine::new(config, Box::new(scene));
        let mut pending = PendingModel::ready(Ok(asset()));

        let stats = engine.run(&mut pending).unwrap();
        assert_eq!(stats.frames, 32);
        assert_eq!(stats.model_loaded_at, Some(0.0));
        assert!(stats.missiles_spawned > 0);
        assert_eq!(stats.explosions_spawned, stats.missiles_ended());

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 32);
    }

    #[test]
    fn test_rejects_invalid_time_step() {
        let mut engine = engine(ScenarioConfig::default());
        assert!(matches!(engine.step(f64::NAN), Err(SimulationError::InvalidTimeStep(_))));
        assert!(matches!(engine.step(-1.0), Err(SimulationError::InvalidTimeStep(_))));
    }
}
