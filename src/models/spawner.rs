use std::collections::VecDeque;
use std::f64::consts::TAU;

use glam::DVec3;
use rand::Rng;
use tracing::debug;

use crate::scenario::BurstConfig;

/// 保持する発射記録の上限
const LAUNCH_HISTORY_LIMIT: usize = 256;

/// 発射指示
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpawnOrder {
    pub origin: DVec3,
    /// 何番目のバーストか（1始まり）
    pub burst_id: u64,
    /// バースト内の発射順（0始まり）
    pub index: u32,
}

/// 発射記録
#[derive(Debug, Clone, PartialEq)]
pub struct LaunchRecord {
    pub timestamp: f64,
    pub burst_id: u64,
    pub origin: DVec3,
}

/// バーストの状態
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BurstPhase {
    Firing,
    Cooldown,
}

/// バースト発射スケジューラ
///
/// バースト内は一定間隔で発射し、規定数に達したら待機時間を経て次のバーストへ
/// 移ります。発射位置はバーストの最初の1発の時点で決め、同じバーストの
/// ミサイルはすべて同じ位置から発射されます。
#[derive(Debug, Clone)]
pub struct BurstScheduler {
    pub burst_size: u32,
    pub spawn_interval: f64,
    pub burst_delay: f64,
    pub spawn_distance_min: f64,
    pub spawn_distance_max: f64,
    pub spawn_height_range: f64,

    burst_count: u32,
    spawn_timer: f64,
    delay_timer: f64,
    current_origin: Option<DVec3>,
    bursts_started: u64,
    elapsed: f64,
    launch_history: VecDeque<LaunchRecord>,
}

impl BurstScheduler {
    pub fn new(config: &BurstConfig) -> Self {
        Self {
            burst_size: config.burst_size,
            spawn_interval: config.spawn_interval_s,
            burst_delay: config.burst_delay_s,
            spawn_distance_min: config.spawn_distance_min,
            spawn_distance_max: config.spawn_distance_max,
            spawn_height_range: config.spawn_height_range,
            burst_count: 0,
            spawn_timer: 0.0,
            delay_timer: 0.0,
            current_origin: None,
            bursts_started: 0,
            elapsed: 0.0,
            launch_history: VecDeque::new(),
        }
    }

    pub fn phase(&self) -> BurstPhase {
        if self.burst_count < self.burst_size {
            BurstPhase::Firing
        } else {
            BurstPhase::Cooldown
        }
    }

    pub fn bursts_started(&self) -> u64 {
        self.bursts_started
    }

    pub fn launch_history(&self) -> impl Iterator<Item = &LaunchRecord> {
        self.launch_history.iter()
    }

    /// タイマーを進め、発射すべきなら発射指示を返す
    ///
    /// # 引数
    /// * `dt` - 経過時間[s]
    /// * `target_altitude` - 発射位置の高さの基準となるターゲット高度
    pub fn tick<R: Rng>(&mut self, dt: f64, target_altitude: f64, rng: &mut R) -> Option<SpawnOrder> {
        self.elapsed += dt;

        if self.phase() == BurstPhase::Cooldown {
            self.delay_timer += dt;
            if self.delay_timer >= self.burst_delay {
                self.delay_timer = 0.0;
                self.spawn_timer = 0.0;
                self.burst_count = 0;
            }
            return None;
        }

        self.spawn_timer += dt;
        if self.spawn_timer < self.spawn_interval {
            return None;
        }
        self.spawn_timer = 0.0;

        if self.burst_count == 0 {
            let origin = self.pick_origin(target_altitude, rng);
            self.current_origin = Some(origin);
            self.bursts_started += 1;
            debug!(
                burst_id = self.bursts_started,
                origin_x = origin.x,
                origin_y = origin.y,
                origin_z = origin.z,
                "BURST_STARTED: 新しい発射位置からバーストを開始します"
            );
        }
        let origin = self.current_origin?;

        let order = SpawnOrder {
            origin,
            burst_id: self.bursts_started,
            index: self.burst_count,
        };
        self.burst_count += 1;

        self.launch_history.push_back(LaunchRecord {
            timestamp: self.elapsed,
            burst_id: order.burst_id,
            origin,
        });
        if self.launch_history.len() > LAUNCH_HISTORY_LIMIT {
            self.launch_history.pop_front();
        }

        Some(order)
    }

    /// ランダムな方位・距離・高度差で発射位置を決める
    fn pick_origin<R: Rng>(&self, target_altitude: f64, rng: &mut R) -> DVec3 {
        let angle = rng.gen_range(0.0..TAU);
        let span = self.spawn_distance_max - self.spawn_distance_min;
        let distance = self.spawn_distance_min + rng.r#gen::<f64>() * span;
        let height = rng.r#gen::<f64>() * self.spawn_height_range * 2.0 - self.spawn_height_range;
        DVec3::new(angle.cos() * distance, target_altitude + height, angle.sin() * distance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn config() -> BurstConfig {
        BurstConfig {
            spawn_interval_s: 0.25,
            burst_delay_s: 1.0,
            ..BurstConfig::default()
        }
    }

    #[test]
    fn test_full_cycle_spawns_burst_size_from_one_origin() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let mut scheduler = BurstScheduler::new(&config());

        // 10発 × 0.25秒 + 待機1.0秒 = 28フレーム（dt=0.125）
        let orders: Vec<SpawnOrder> = (0..28)
            .filter_map(|_| scheduler.tick(0.125, 2.0, &mut rng))
            .collect();

        assert_eq!(orders.len(), 10);
        let origin = orders[0].origin;
        assert!(orders.iter().all(|o| o.origin == origin && o.burst_id == 1));
        assert_eq!(orders.iter().map(|o| o.index).collect::<Vec<_>>(), (0..10).collect::<Vec<_>>());
        assert_eq!(scheduler.phase(), BurstPhase::Firing);

        // 次のバーストは新しい発射位置から
        let next: Vec<SpawnOrder> = (0..2)
            .filter_map(|_| scheduler.tick(0.125, 2.0, &mut rng))
            .collect();
        assert_eq!(next.len(), 1);
        assert_eq!(next[0].burst_id, 2);
        assert_ne!(next[0].origin, origin);
    }

    #[test]
    fn test_origin_is_within_configured_ring() {
        let mut rng = ChaCha8Rng::seed_from_u64(21);
        let mut scheduler = BurstScheduler::new(&BurstConfig::default());
        let altitude = 3.0;
        for _ in 0..2000 {
            if let Some(order) = scheduler.tick(1.0 / 60.0, altitude, &mut rng) {
                let horizontal = DVec3::new(order.origin.x, 0.0, order.origin.z).length();
                assert!((15.0 - 1e-9..25.0 + 1e-9).contains(&horizontal));
                assert!((order.origin.y - altitude).abs() <= 5.0 + 1e-9);
            }
        }
        assert!(scheduler.bursts_started() > 1);
    }

    #[test]
    fn test_cooldown_emits_nothing() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut scheduler = BurstScheduler::new(&BurstConfig {
            burst_size: 1,
            spawn_interval_s: 0.125,
            burst_delay_s: 1.0,
            ..BurstConfig::default()
        });
        assert!(scheduler.tick(0.125, 0.0, &mut rng).is_some());
        assert_eq!(scheduler.phase(), BurstPhase::Cooldown);
        for _ in 0..7 {
            assert!(scheduler.tick(0.125, 0.0, &mut rng).is_none());
            assert_eq!(scheduler.phase(), BurstPhase::Cooldown);
        }
        assert!(scheduler.tick(0.125, 0.0, &mut rng).is_none());
        assert_eq!(scheduler.phase(), BurstPhase::Firing);
        assert_eq!(scheduler.launch_history().count(), 1);
    }
}
