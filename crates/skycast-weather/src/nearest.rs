/// Entry whose timestamp is closest to `target_ms`.
///
/// Ties keep the earlier entry. `None` only for an empty slice.
pub fn pick_nearest<T, F>(entries: &[T], target_ms: i64, timestamp_ms: F) -> Option<&T>
where
    F: Fn(&T) -> i64,
{
    let mut best: Option<(&T, u64)> = None;

    for entry in entries {
        let distance = timestamp_ms(entry).abs_diff(target_ms);
        match best {
            Some((_, best_distance)) if distance >= best_distance => {}
            _ => best = Some((entry, distance)),
        }
    }

    best.map(|(entry, _)| entry)
}
