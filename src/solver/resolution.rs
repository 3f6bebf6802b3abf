//! Resolution Solver (C7): measures how much a scene actually benefits from higher
//! resolution by scoring clips at the two configured extremes, then maps the average
//! slope through the profile's decode table to a single target resolution.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{Mutex, Semaphore};
use tracing::warn;

use crate::config::{Profile, ResolutionCalculationSettings};
use crate::quality::QualityScorer;
use crate::scene::SceneEncoder;
use crate::utils::{Error, Result};
use crate::vpc::Vpc;

pub struct ResolutionSolver {
    scene_encoder: SceneEncoder,
    scorer: QualityScorer,
}

struct Job {
    clip_stem: String,
    clip_path: PathBuf,
}

impl ResolutionSolver {
    pub fn new(scene_encoder: SceneEncoder, scorer: QualityScorer) -> Self {
        Self { scene_encoder, scorer }
    }

    pub async fn solve(&self, vpc: &Vpc, profile: &Profile, settings: &ResolutionCalculationSettings) -> Result<u32> {
        let resolutions = &settings.testing_resolutions;
        if resolutions.len() < 2 {
            return Err(Error::solver("resolution test requires at least two testing_resolutions"));
        }
        let r_min = *resolutions.iter().min().unwrap();
        let r_max = *resolutions.iter().max().unwrap();
        let scenes = settings.num_of_tests.max(1);

        let child = vpc.scoped_child("resolution_test")?;
        let timestep = vpc.orig_duration / (scenes as f64 + 1.0);

        let mut jobs = Vec::new();
        for s in 1..=scenes {
            let start = s as f64 * timestep;
            for r in [r_min, r_max] {
                let stem = format!("{s}_{r}_cq{}", settings.cq_value);
                let clip_path = child.workspace.join(format!("{stem}.mkv"));
                let cut_path = child.workspace.join(format!("{stem}_src.mkv"));

                self.scene_encoder
                    .cut_test_clip(&vpc.source_path, &cut_path, start, settings.scene_length, vpc.fs_support, profile.fs_enable)
                    .await?;

                if let Err(e) = self
                    .scene_encoder
                    .encode_video_only(
                        profile,
                        &cut_path,
                        &clip_path,
                        vpc.orig_h_res,
                        vpc.orig_v_res,
                        vpc.crop,
                        r,
                        settings.cq_value,
                        true,
                    )
                    .await
                {
                    warn!("resolution test clip {stem} failed to encode: {e}");
                    continue;
                }

                jobs.push(Job { clip_stem: stem, clip_path });
            }
        }

        let scores: Arc<Mutex<HashMap<String, Vec<f64>>>> = Arc::new(Mutex::new(HashMap::new()));
        let semaphore = Arc::new(Semaphore::new(settings.threads.max(1)));
        let mut handles = Vec::new();

        for job in jobs {
            let permit = semaphore.clone().acquire_owned().await.unwrap();
            let scorer = self.scorer.clone();
            let scores = scores.clone();
            let clip_path = job.clip_path.clone();
            let stem = job.clip_stem.clone();
            handles.push(tokio::spawn(async move {
                let _permit = permit;
                match scorer.score(&clip_path, 10).await {
                    Ok(score) => {
                        scores.lock().await.entry(stem).or_default().push(score);
                    }
                    Err(e) => warn!("resolution scorer failed for {stem}: {e}"),
                }
            }));
        }
        for handle in handles {
            let _ = handle.await;
        }

        let scores = scores.lock().await;
        let mut slopes = Vec::new();
        for s in 1..=scenes {
            let min_key = format!("{s}_{r_min}_cq{}", settings.cq_value);
            let max_key = format!("{s}_{r_max}_cq{}", settings.cq_value);
            let (Some(min_scores), Some(max_scores)) = (scores.get(&min_key), scores.get(&max_key)) else {
                continue;
            };
            if min_scores.is_empty() || max_scores.is_empty() {
                continue;
            }
            let mean_min = min_scores.iter().sum::<f64>() / min_scores.len() as f64;
            let mean_max = max_scores.iter().sum::<f64>() / max_scores.len() as f64;
            let slope = (mean_max - mean_min) / (r_max - r_min) as f64;
            slopes.push(slope);
        }

        if slopes.len() < 2 {
            return Err(Error::solver("resolution solver: fewer than two scenes produced usable scores"));
        }

        slopes.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
        let keep = ((slopes.len() as f64) * settings.keep_best_slopes).ceil() as usize;
        let keep = keep.max(1).min(slopes.len());
        let avg_slope = slopes[..keep].iter().sum::<f64>() / keep as f64;

        Ok(decode_resolution(avg_slope, &profile.res_decode, vpc.orig_h_res, r_min))
    }
}

/// Walks the ordered `(resolution, slope_threshold)` table, raising the answer to each
/// entry's resolution whenever the measured slope clears its threshold, then clamps to
/// the source's native resolution so the result never upscales.
fn decode_resolution(slope: f64, res_decode: &[(u32, f64)], orig_h_res: u32, floor: u32) -> u32 {
    let mut answer = floor;
    for &(res, threshold) in res_decode {
        if slope >= threshold && res > answer {
            answer = res;
        }
    }
    answer.min(orig_h_res)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_resolution_raises_answer_when_threshold_cleared() {
        let table = vec![(854, -10.0), (1280, -1.0), (1920, -0.0001)];
        assert_eq!(decode_resolution(-0.00005, &table, 3840, 854), 1920);
        assert_eq!(decode_resolution(-5.0, &table, 3840, 854), 854);
        assert_eq!(decode_resolution(-0.5, &table, 3840, 854), 1280);
    }

    #[test]
    fn decode_resolution_never_exceeds_original() {
        let table = vec![(854, -10.0), (3840, -0.0001)];
        assert_eq!(decode_resolution(-0.00005, &table, 1920, 854), 1920);
    }

    #[test]
    fn decode_resolution_with_empty_table_returns_floor() {
        let table: Vec<(u32, f64)> = Vec::new();
        assert_eq!(decode_resolution(-1.0, &table, 3840, 854), 854);
    }
}
