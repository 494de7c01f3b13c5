//! Output path planning.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use super::config::CollisionPolicy;
use crate::job::{Job, TargetFormat};

/// Stem used for the output file of `job`.
fn output_stem(job: &Job) -> String {
    job.path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| job.id.to_string())
}

/// Computes one output path per job: source stem plus the target extension,
/// under `output_dir`.
///
/// With [`CollisionPolicy::Suffix`], later jobs whose name is already taken in
/// this batch get `-1`, `-2`, ... appended to the stem. Names are compared
/// case-insensitively. Files already on disk are not considered.
pub fn plan_output_paths(
    jobs: &[Job],
    output_dir: &Path,
    format: TargetFormat,
    policy: CollisionPolicy,
) -> Vec<PathBuf> {
    let ext = format.extension();
    let mut taken: HashSet<String> = HashSet::with_capacity(jobs.len());

    jobs.iter()
        .map(|job| {
            let stem = output_stem(job);
            let mut file_name = format!("{}.{}", stem, ext);

            if policy == CollisionPolicy::Suffix {
                let mut n = 1;
                while taken.contains(&file_name.to_lowercase()) {
                    file_name = format!("{}-{}.{}", stem, n, ext);
                    n += 1;
                }
            }

            taken.insert(file_name.to_lowercase());
            output_dir.join(file_name)
        })
        .collect()
}
