use crate::detection::domain::object_detector::DetectOptions;
use crate::shared::region::Region;

/// Applies request options to detector output.
///
/// Order matters: overlap removal first (so a suppressed duplicate cannot
/// take a result slot), then the size floor, then truncation. Detector
/// output is confidence-ordered, so truncation keeps the strongest boxes.
pub fn apply_options(regions: &[Region], options: &DetectOptions) -> Vec<Region> {
    let min = options.min_size as i32;
    let mut kept: Vec<Region> = Region::deduplicate(regions, options.iou_threshold)
        .into_iter()
        .filter(|r| r.width >= min && r.height >= min)
        .collect();
    if let Some(max) = options.max_results {
        kept.truncate(max);
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(min_size: u32, max_results: Option<usize>) -> DetectOptions {
        DetectOptions {
            min_size,
            max_results,
            ..Default::default()
        }
    }

    #[test]
    fn test_default_options_keep_distinct_boxes() {
        let regions = vec![Region::new(0, 0, 10, 10), Region::new(100, 100, 10, 10)];
        assert_eq!(apply_options(&regions, &DetectOptions::default()), regions);
    }

    #[test]
    fn test_min_size_drops_small_boxes_in_either_dimension() {
        let regions = vec![
            Region::new(0, 0, 40, 40),
            Region::new(100, 0, 40, 10),
            Region::new(200, 0, 10, 40),
        ];
        let result = apply_options(&regions, &options(24, None));
        assert_eq!(result, vec![Region::new(0, 0, 40, 40)]);
    }

    #[test]
    fn test_max_results_keeps_leading_boxes() {
        let regions = vec![
            Region::new(0, 0, 10, 10),
            Region::new(100, 0, 10, 10),
            Region::new(200, 0, 10, 10),
        ];
        let result = apply_options(&regions, &options(0, Some(2)));
        assert_eq!(result, regions[..2].to_vec());
    }

    #[test]
    fn test_duplicates_do_not_consume_result_slots() {
        let regions = vec![
            Region::new(0, 0, 100, 100),
            Region::new(5, 5, 100, 100),
            Region::new(300, 300, 50, 50),
        ];
        let result = apply_options(&regions, &options(0, Some(2)));
        assert_eq!(result, vec![regions[0], regions[2]]);
    }

    #[test]
    fn test_empty_input() {
        assert!(apply_options(&[], &options(10, Some(1))).is_empty());
    }
}
