//! CQ Solver (C8): measures VMAF loss at several CQ values per scene, fits a quadratic
//! to the loss curve, and solves for the CQ that hits the profile's target loss.

use tracing::warn;

use crate::config::{CqCalculationSettings, Profile};
use crate::quality::QualityScorer;
use crate::scene::SceneEncoder;
use crate::utils::{Error, Result};
use crate::vpc::Vpc;

pub struct CqSolver {
    scene_encoder: SceneEncoder,
    scorer: QualityScorer,
}

struct SceneProbe {
    // D[cq] keyed by position in the CQ array; position 1 (the middle value) is
    // shared across all scenes per the cost-optimization rule.
    delta: [Option<f64>; 4],
}

impl CqSolver {
    pub fn new(scene_encoder: SceneEncoder, scorer: QualityScorer) -> Self {
        Self { scene_encoder, scorer }
    }

    pub async fn solve(&self, vpc: &Vpc, profile: &Profile, settings: &CqCalculationSettings) -> Result<f64> {
        if settings.cq_values.len() != 4 {
            return Err(Error::solver("cq_calculation requires exactly 4 cq_values"));
        }
        let cq = &settings.cq_values;
        let scenes = settings.number_of_scenes.max(1);
        let child = vpc.scoped_child("cq_test")?;
        let timestep = vpc.orig_duration / (scenes as f64 + 1.0);

        let mut probes = Vec::new();
        let mut middle_vmaf: Option<f64> = None;

        for s in 1..=scenes {
            let start = s as f64 * timestep;
            let cut_path = child.workspace.join(format!("{s}_src.mkv"));
            self.scene_encoder
                .cut_test_clip(&vpc.source_path, &cut_path, start, settings.scene_length, vpc.fs_support, profile.fs_enable)
                .await?;

            let reference = child.workspace.join(format!("{s}_ref.mkv"));
            if let Err(e) = self
                .scene_encoder
                .encode_video_only(
                    profile,
                    &cut_path,
                    &reference,
                    vpc.orig_h_res,
                    vpc.orig_v_res,
                    vpc.crop,
                    vpc.output_res,
                    settings.cq_reference,
                    false,
                )
                .await
            {
                warn!("cq solver: scene {s} reference encode failed: {e}");
                continue;
            }

            let mut vmaf = [None; 4];
            for &p in &[0usize, 2, 3] {
                match self
                    .measure_vmaf(&child.workspace, &cut_path, &reference, profile, vpc, cq[p], s, p, settings.threads)
                    .await
                {
                    Ok(v) => vmaf[p] = Some(v),
                    Err(e) => warn!("cq solver: scene {s} position {p} failed: {e}"),
                }
            }

            if s == 1 {
                match self
                    .measure_vmaf(&child.workspace, &cut_path, &reference, profile, vpc, cq[1], s, 1, settings.threads)
                    .await
                {
                    Ok(v) => middle_vmaf = Some(v),
                    Err(e) => warn!("cq solver: middle anchor measurement failed: {e}"),
                }
            }
            vmaf[1] = middle_vmaf;

            let Some(vmaf0) = vmaf[0] else {
                warn!("cq solver: scene {s} missing the c0 baseline, dropping scene");
                continue;
            };
            let delta = [
                Some(0.0),
                vmaf[1].map(|v| vmaf0 - v),
                vmaf[2].map(|v| vmaf0 - v),
                vmaf[3].map(|v| vmaf0 - v),
            ];

            probes.push(SceneProbe { delta });
        }

        let mut solutions = Vec::new();
        for probe in &probes {
            let points: Vec<(f64, f64)> = cq
                .iter()
                .zip(probe.delta.iter())
                .filter_map(|(&c, d)| d.map(|d| (c, d)))
                .collect();
            if points.len() < 3 {
                continue;
            }
            let Some((a, b, c)) = fit_quadratic(&points) else {
                continue;
            };
            if let Some(root) = solve_for_target(a, b, c, profile.cq_threshold) {
                solutions.push(root);
            }
        }

        if solutions.is_empty() {
            warn!("cq solver: no scene produced a valid root, keeping profile default");
            return Ok(profile.default_cq);
        }

        solutions.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let keep = ((solutions.len() as f64) * settings.keep_best_scenes).ceil() as usize;
        let keep = keep.max(1).min(solutions.len());
        let avg = solutions[..keep].iter().sum::<f64>() / keep as f64;

        Ok((avg * 2.0).round() / 2.0)
    }

    /// Encodes a scene at `cq_value` and returns its VMAF against the scene's
    /// near-lossless reference clip.
    #[allow(clippy::too_many_arguments)]
    async fn measure_vmaf(
        &self,
        workspace: &std::path::Path,
        cut_path: &std::path::Path,
        reference: &std::path::Path,
        profile: &Profile,
        vpc: &Vpc,
        cq_value: f64,
        scene: u32,
        position: usize,
        threads: usize,
    ) -> Result<f64> {
        let candidate = workspace.join(format!("{scene}_cq_p{position}.mkv"));
        self.scene_encoder
            .encode_video_only(
                profile,
                cut_path,
                &candidate,
                vpc.orig_h_res,
                vpc.orig_v_res,
                vpc.crop,
                vpc.output_res,
                cq_value,
                false,
            )
            .await?;

        let log_path = workspace.join(format!("{scene}_cq_p{position}_vmaf.xml"));
        self.scorer.vmaf(reference, &candidate, &log_path, threads).await
    }
}

/// Closed-form least-squares quadratic fit via the normal equations, solved with
/// Cramer's rule over the 3x3 system.
fn fit_quadratic(points: &[(f64, f64)]) -> Option<(f64, f64, f64)> {
    let n = points.len() as f64;
    let (mut sx, mut sx2, mut sx3, mut sx4) = (0.0, 0.0, 0.0, 0.0);
    let (mut sy, mut sxy, mut sx2y) = (0.0, 0.0, 0.0);

    for &(x, y) in points {
        let x2 = x * x;
        sx += x;
        sx2 += x2;
        sx3 += x2 * x;
        sx4 += x2 * x2;
        sy += y;
        sxy += x * y;
        sx2y += x2 * y;
    }

    // | sx4 sx3 sx2 | a   | sx2y |
    // | sx3 sx2 sx  | b = | sxy  |
    // | sx2 sx  n   | c   | sy   |
    let m = [[sx4, sx3, sx2], [sx3, sx2, sx], [sx2, sx, n]];
    let rhs = [sx2y, sxy, sy];

    let det = det3(&m);
    if det.abs() < 1e-12 {
        return None;
    }

    let a = det3(&replace_col(&m, 0, &rhs)) / det;
    let b = det3(&replace_col(&m, 1, &rhs)) / det;
    let c = det3(&replace_col(&m, 2, &rhs)) / det;
    Some((a, b, c))
}

fn det3(m: &[[f64; 3]; 3]) -> f64 {
    m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1]) - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
        + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0])
}

fn replace_col(m: &[[f64; 3]; 3], col: usize, values: &[f64; 3]) -> [[f64; 3]; 3] {
    let mut out = *m;
    for (row, v) in out.iter_mut().zip(values.iter()) {
        row[col] = *v;
    }
    out
}

/// Solves `a*cq^2 + b*cq + (c - target) = 0` for the positive root, returning `None`
/// when the discriminant is negative.
fn solve_for_target(a: f64, b: f64, c: f64, target: f64) -> Option<f64> {
    if a.abs() < 1e-12 {
        if b.abs() < 1e-12 {
            return None;
        }
        return Some((target - c) / b);
    }
    let discriminant = b * b - 4.0 * a * (c - target);
    if discriminant < 0.0 {
        return None;
    }
    Some((-b + discriminant.sqrt()) / (2.0 * a))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fit_quadratic_recovers_exact_parabola() {
        let points = vec![(15.0, 0.0), (18.0, 2.25), (27.0, 24.75), (36.0, 67.5)];
        let (a, b, c) = fit_quadratic(&points).unwrap();
        let predict = |x: f64| a * x * x + b * x + c;
        for &(x, y) in &points {
            assert!((predict(x) - y).abs() < 0.05, "x={x} predicted={} expected={y}", predict(x));
        }
    }

    #[test]
    fn solve_for_target_finds_positive_root() {
        // y = 0.05x^2, solve for y = 5 -> x = 10
        let root = solve_for_target(0.05, 0.0, 0.0, 5.0).unwrap();
        assert!((root - 10.0).abs() < 1e-6);
    }

    #[test]
    fn solve_for_target_none_when_discriminant_negative() {
        assert!(solve_for_target(1.0, 0.0, 100.0, 0.0).is_none());
    }
}
