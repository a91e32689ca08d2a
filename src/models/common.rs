use glam::{DMat3, DQuat, DVec3, EulerRot};

/// 位置と姿勢の組
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub position: DVec3,
    pub orientation: DQuat,
}

impl Pose {
    pub fn new(position: DVec3, orientation: DQuat) -> Self {
        Self { position, orientation }
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self::new(DVec3::ZERO, DQuat::IDENTITY)
    }
}

/// エフェクトの状態
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EffectStatus {
    Alive,     // 動作中
    Detonated, // 爆発（ミサイル）
    Expired,   // 寿命切れ
    Disposed,  // 描画リソース解放済み
}

/// ミサイル終了理由
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MissileEndReason {
    /// 最大寿命を超えて自爆した
    TimedOut,
    /// 近接距離に入り爆発した
    DirectHit,
    /// ターゲットを通過後、離脱距離を超えて自爆した
    FlybySelfDestruct,
    /// 誘導対象が存在しない
    TargetLost,
}

/// オイラー角の軸（XYZ順）
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EulerAxis {
    X,
    Z,
}

/// 数学ユーティリティ関数
pub mod math_utils {
    use super::*;

    /// ゼロ長ベクトルの正規化ポリシー
    ///
    /// 正規化できない場合は `fallback` をそのまま返す（直前の向きを保持する用途）。
    pub fn safe_normalize(v: DVec3, fallback: DVec3) -> DVec3 {
        v.try_normalize().unwrap_or(fallback)
    }

    /// ローカル+Z軸が `forward` を向く姿勢を計算
    ///
    /// `forward` がゼロ長の場合は `None`。`forward` と `up` が平行な場合は
    /// 別の基準軸で右ベクトルを作り直す。
    pub fn look_rotation(forward: DVec3, up: DVec3) -> Option<DQuat> {
        let z = forward.try_normalize()?;
        let x = up
            .cross(z)
            .try_normalize()
            .or_else(|| DVec3::X.cross(z).try_normalize())
            .or_else(|| DVec3::Z.cross(z).try_normalize())?;
        let y = z.cross(x);
        Some(DQuat::from_mat3(&DMat3::from_cols(x, y, z)).normalize())
    }

    /// 姿勢のXYZオイラー角のうち1成分だけを置き換える
    pub fn with_euler_component(orientation: DQuat, axis: EulerAxis, angle: f64) -> DQuat {
        let (mut x, y, mut z) = orientation.to_euler(EulerRot::XYZ);
        match axis {
            EulerAxis::X => x = angle,
            EulerAxis::Z => z = angle,
        }
        DQuat::from_euler(EulerRot::XYZ, x, y, z)
    }

    /// `from` 軸を `to` 方向へ回転させる姿勢（両者とも正規化済みであること）
    pub fn rotation_onto(from: DVec3, to: DVec3) -> DQuat {
        DQuat::from_rotation_arc(from, to)
    }
}

#[cfg(test)]
mod tests {
    use super::math_utils::*;
    use super::*;

    const EPS: f64 = 1e-9;

    #[test]
    fn test_look_rotation_points_z_axis_forward() {
        let forward = DVec3::new(1.0, 0.5, -2.0);
        let q = look_rotation(forward, DVec3::Y).unwrap();
        let z = q * DVec3::Z;
        assert!((z - forward.normalize()).length() < EPS);
    }

    #[test]
    fn test_look_rotation_handles_parallel_up() {
        let q = look_rotation(DVec3::Y, DVec3::Y).unwrap();
        assert!(((q * DVec3::Z) - DVec3::Y).length() < EPS);
        assert!(look_rotation(DVec3::ZERO, DVec3::Y).is_none());
    }

    #[test]
    fn test_safe_normalize_keeps_fallback() {
        let fallback = DVec3::new(0.0, 0.0, 1.0);
        assert_eq!(safe_normalize(DVec3::ZERO, fallback), fallback);
        assert!((safe_normalize(DVec3::new(3.0, 0.0, 4.0), fallback).length() - 1.0).abs() < EPS);
    }

    #[test]
    fn test_with_euler_component_replaces_single_axis() {
        let q = DQuat::from_euler(EulerRot::XYZ, 0.2, 0.4, 0.1);
        let banked = with_euler_component(q, EulerAxis::Z, -0.3);
        let (x, y, z) = banked.to_euler(EulerRot::XYZ);
        assert!((x - 0.2).abs() < 1e-6);
        assert!((y - 0.4).abs() < 1e-6);
        assert!((z + 0.3).abs() < 1e-6);
    }
}
