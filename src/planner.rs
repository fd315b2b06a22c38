use crate::error::GenError;
use crate::model::SetPlan;

/// Splits `total_segments` into contiguous sets of at most
/// `segments_per_set`. The last set carries the remainder and is never empty.
pub fn plan(total_segments: u32, segments_per_set: u32) -> Result<Vec<SetPlan>, GenError> {
    if total_segments == 0 {
        return Err(GenError::InvalidInput(
            "total_segments must be at least 1".to_string(),
        ));
    }
    if segments_per_set == 0 {
        return Err(GenError::InvalidInput(
            "segments_per_set must be at least 1".to_string(),
        ));
    }

    let set_count = total_segments.div_ceil(segments_per_set);
    let plans = (1..=set_count)
        .map(|set_number| {
            let start_segment = (set_number - 1) * segments_per_set + 1;
            let end_segment = (start_segment + segments_per_set - 1).min(total_segments);
            SetPlan {
                set_number,
                start_segment,
                end_segment,
                segment_count: end_segment - start_segment + 1,
            }
        })
        .collect();

    Ok(plans)
}
