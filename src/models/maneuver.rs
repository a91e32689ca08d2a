use std::f64::consts::PI;

use glam::DVec3;
use rand::Rng;

use crate::models::common::EulerAxis;

/// 緊急回避機動のパターン
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EvasionPattern {
    BarrelRoll,
    Immelmann,
    SplitS,
    Cobra,
    Kulbit,
}

/// ある時刻における機動の出力
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ManeuverSample {
    pub velocity: DVec3,
    /// 上書きするオイラー角の軸と角度
    pub rotation_axis: EulerAxis,
    pub rotation_angle: f64,
}

impl EvasionPattern {
    pub const STANDARD: [EvasionPattern; 4] = [
        EvasionPattern::BarrelRoll,
        EvasionPattern::Immelmann,
        EvasionPattern::SplitS,
        EvasionPattern::Cobra,
    ];

    pub const ALL: [EvasionPattern; 5] = [
        EvasionPattern::BarrelRoll,
        EvasionPattern::Immelmann,
        EvasionPattern::SplitS,
        EvasionPattern::Cobra,
        EvasionPattern::Kulbit,
    ];

    /// 一様ランダムに機動を選択（クルビットは明示的に有効化した場合のみ）
    pub fn choose<R: Rng>(rng: &mut R, include_kulbit: bool) -> Self {
        let candidates: &[EvasionPattern] = if include_kulbit {
            &Self::ALL
        } else {
            &Self::STANDARD
        };
        candidates[rng.gen_range(0..candidates.len())]
    }

    pub fn name(&self) -> &'static str {
        match self {
            EvasionPattern::BarrelRoll => "barrel_roll",
            EvasionPattern::Immelmann => "immelmann",
            EvasionPattern::SplitS => "split_s",
            EvasionPattern::Cobra => "cobra",
            EvasionPattern::Kulbit => "kulbit",
        }
    }

    /// 経過時間 `elapsed` における速度と回転
    pub fn sample(&self, elapsed: f64, duration: f64) -> ManeuverSample {
        let t = elapsed / duration;
        match self {
            EvasionPattern::BarrelRoll => ManeuverSample {
                velocity: DVec3::new((elapsed * 10.0).cos() * 8.0, (elapsed * 10.0).sin() * 8.0, 10.0),
                rotation_axis: EulerAxis::X,
                rotation_angle: elapsed * 5.0,
            },
            EvasionPattern::Immelmann => ManeuverSample {
                velocity: DVec3::new(0.0, (t * PI).sin() * 15.0, (t * PI).cos() * 10.0),
                rotation_axis: EulerAxis::X,
                rotation_angle: -t * PI,
            },
            EvasionPattern::SplitS => ManeuverSample {
                velocity: DVec3::new((t * PI * 2.0).sin() * 10.0, -(t * PI).sin().abs() * 10.0, 8.0),
                rotation_axis: EulerAxis::Z,
                rotation_angle: t * PI * 2.0,
            },
            // 急減速しながら機首を上げる
            EvasionPattern::Cobra => ManeuverSample {
                velocity: DVec3::new(0.0, (t * PI).sin() * 5.0, (1.0 - t) * 2.0),
                rotation_axis: EulerAxis::X,
                rotation_angle: -(t * PI).sin() * PI / 2.0,
            },
            EvasionPattern::Kulbit => ManeuverSample {
                velocity: DVec3::new(0.0, (t * PI * 2.0).sin() * 12.0, (t * PI * 2.0).cos() * 8.0),
                rotation_axis: EulerAxis::X,
                rotation_angle: -t * PI * 2.0,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_choose_excludes_kulbit_by_default() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let mut seen = std::collections::HashSet::new();
        for _ in 0..500 {
            let pattern = EvasionPattern::choose(&mut rng, false);
            assert_ne!(pattern, EvasionPattern::Kulbit);
            seen.insert(pattern);
        }
        assert_eq!(seen.len(), 4);
    }

    #[test]
    fn test_choose_can_pick_kulbit_when_enabled() {
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let picked = (0..500).any(|_| EvasionPattern::choose(&mut rng, true) == EvasionPattern::Kulbit);
        assert!(picked);
    }

    #[test]
    fn test_cobra_decelerates() {
        let start = EvasionPattern::Cobra.sample(0.0, 1.0);
        let end = EvasionPattern::Cobra.sample(1.0, 1.0);
        assert!((start.velocity.z - 2.0).abs() < 1e-12);
        assert!(end.velocity.z.abs() < 1e-12);
        assert!(end.rotation_angle.abs() < 1e-9);
    }

    #[test]
    fn test_immelmann_half_loop() {
        let end = EvasionPattern::Immelmann.sample(1.0, 1.0);
        assert!((end.rotation_angle + PI).abs() < 1e-12);
        assert!((end.velocity.z + 10.0).abs() < 1e-9);
    }
}
