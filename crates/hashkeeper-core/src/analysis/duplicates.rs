use ahash::{AHashMap, AHashSet};
use std::path::Path;

use crate::model::{DuplicateGroup, ScanEvent};

/// Group history by hash and keep the hashes seen at more than one distinct
/// path. Largest groups first, ties broken by hash. Each group keeps at most
/// `sample_size` paths, in first-seen order.
pub fn find_duplicates<'a, I>(events: I, sample_size: usize) -> Vec<DuplicateGroup>
where
    I: IntoIterator<Item = &'a ScanEvent>,
{
    let mut by_hash: AHashMap<&str, Vec<&Path>> = AHashMap::new();
    let mut seen: AHashSet<(&str, &Path)> = AHashSet::new();

    for event in events {
        let key = (event.hash.as_str(), event.path.as_path());
        if seen.insert(key) {
            by_hash.entry(key.0).or_default().push(key.1);
        }
    }

    let mut groups: Vec<DuplicateGroup> = by_hash
        .into_iter()
        .filter(|(_, paths)| paths.len() > 1)
        .map(|(hash, paths)| DuplicateGroup {
            hash: hash.to_string(),
            count: paths.len(),
            has_more: paths.len() > sample_size,
            sample_paths: paths
                .iter()
                .take(sample_size)
                .map(|p| p.to_path_buf())
                .collect(),
        })
        .collect();

    groups.sort_unstable_by(|a, b| b.count.cmp(&a.count).then_with(|| a.hash.cmp(&b.hash)));
    groups
}
