//! Single-shot anchor detector (BlazeFace / BlazePalm family) on ONNX Runtime.
//!
//! Both the short-range face model and the palm model share the same
//! head layout: a regressor tensor `[1, N, R]` (box deltas followed by
//! keypoints) and a score tensor `[1, N, 1]` over a fixed anchor grid.
//! Only the input resolution and the regressor width differ, which is
//! what [`BlazeModelSpec`] captures.

use std::path::Path;

use crate::detection::domain::detector_kind::DetectorKind;
use crate::detection::domain::object_detector::ObjectDetector;
use crate::shared::frame::Frame;
use crate::shared::region::Region;

/// Anchor layout and head shape of a Blaze-style model.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlazeModelSpec {
    /// Square model input resolution.
    pub input_size: u32,
    /// `(stride, anchors_per_cell)` for each feature map.
    pub layers: &'static [(usize, usize)],
    /// Values per anchor in the regressor tensor.
    pub regressor_width: usize,
}

/// Short-range face model: 16×16×2 + 8×8×6 = 896 anchors.
pub const FACE_SHORT_RANGE: BlazeModelSpec = BlazeModelSpec {
    input_size: 128,
    layers: &[(8, 2), (16, 6)],
    regressor_width: 16,
};

/// Palm model: 24×24×2 + 12×12×6 = 2016 anchors, 7 keypoints.
pub const PALM: BlazeModelSpec = BlazeModelSpec {
    input_size: 192,
    layers: &[(8, 2), (16, 6)],
    regressor_width: 18,
};

impl BlazeModelSpec {
    pub fn for_kind(kind: DetectorKind) -> BlazeModelSpec {
        match kind {
            DetectorKind::Face => FACE_SHORT_RANGE,
            DetectorKind::Palm => PALM,
        }
    }

    pub fn anchor_count(&self) -> usize {
        self.layers
            .iter()
            .map(|&(stride, per_cell)| {
                let grid = self.input_size as usize / stride;
                grid * grid * per_cell
            })
            .sum()
    }

    /// Anchor centers in normalized `[0,1]` coordinates, in head order.
    pub fn anchors(&self) -> Vec<[f32; 2]> {
        let mut anchors = Vec::with_capacity(self.anchor_count());
        for &(stride, per_cell) in self.layers {
            let grid_size = self.input_size as usize / stride;
            for y in 0..grid_size {
                for x in 0..grid_size {
                    let cx = (x as f32 + 0.5) / grid_size as f32;
                    let cy = (y as f32 + 0.5) / grid_size as f32;
                    for _ in 0..per_cell {
                        anchors.push([cx, cy]);
                    }
                }
            }
        }
        anchors
    }
}

/// Blaze-style detector backed by an ONNX Runtime session.
pub struct OnnxBlazeDetector {
    session: ort::session::Session,
    spec: BlazeModelSpec,
    anchors: Vec<[f32; 2]>,
    confidence: f64,
    iou_threshold: f64,
}

impl OnnxBlazeDetector {
    pub fn new(
        model_path: &Path,
        spec: BlazeModelSpec,
        confidence: f64,
        iou_threshold: f64,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let intra_threads = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        let session = ort::session::Session::builder()?
            .with_optimization_level(ort::session::builder::GraphOptimizationLevel::Level3)?
            .with_intra_threads(intra_threads)?
            .with_execution_providers(platform_execution_providers())?
            .commit_from_file(model_path)?;
        Ok(Self {
            session,
            anchors: spec.anchors(),
            spec,
            confidence,
            iou_threshold,
        })
    }
}

/// CoreML on macOS, DirectML on Windows; ort falls back to CPU when the
/// provider cannot be registered.
fn platform_execution_providers() -> Vec<ort::execution_providers::ExecutionProviderDispatch> {
    #[cfg(target_os = "macos")]
    {
        vec![ort::execution_providers::CoreMLExecutionProvider::default().build()]
    }
    #[cfg(target_os = "windows")]
    {
        vec![ort::execution_providers::DirectMLExecutionProvider::default().build()]
    }
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        Vec::new()
    }
}

impl ObjectDetector for OnnxBlazeDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Region>, Box<dyn std::error::Error>> {
        if frame.is_empty() {
            return Ok(Vec::new());
        }

        let input_tensor = preprocess(frame, self.spec.input_size);
        let input_value = ort::value::Tensor::from_array(input_tensor)?;
        let outputs = self.session.run(ort::inputs![input_value])?;

        if outputs.len() < 2 {
            return Err(format!("Blaze model expected 2 outputs, got {}", outputs.len()).into());
        }

        let first = outputs[0].try_extract_array::<f32>()?;
        let second = outputs[1].try_extract_array::<f32>()?;

        // Exported models disagree on output order; the score head is the
        // one whose trailing dimension is 1.
        let (regressors, scores) = if is_score_shape(first.shape()) && !is_score_shape(second.shape())
        {
            (second, first)
        } else {
            (first, second)
        };

        let reg_data = regressors
            .as_slice()
            .ok_or("Cannot get regressor slice")?;
        let score_data = scores.as_slice().ok_or("Cannot get score slice")?;

        let mut raw_dets = decode(
            &self.spec,
            &self.anchors,
            reg_data,
            score_data,
            self.confidence as f32,
            frame.width(),
            frame.height(),
        );
        let kept = nms(&mut raw_dets, self.iou_threshold);

        Ok(kept
            .iter()
            .map(|d| {
                let x = d.x1 as i32;
                let y = d.y1 as i32;
                Region::new(x, y, (d.x2 - d.x1) as i32, (d.y2 - d.y1) as i32)
                    .clamp_to(frame.width(), frame.height())
            })
            .collect())
    }
}

fn is_score_shape(shape: &[usize]) -> bool {
    shape.last() == Some(&1)
}

/// Nearest-neighbour resample to `size × size`, scaled to `[0,1]`, NCHW.
fn preprocess(frame: &Frame, size: u32) -> ndarray::Array4<f32> {
    let src = frame.as_ndarray();
    let s = size as usize;
    let sample = |dst: usize, src_len: usize| -> usize {
        (((dst as f64 + 0.5) * src_len as f64 / s as f64) as usize).min(src_len - 1)
    };
    let rows: Vec<usize> = (0..s).map(|y| sample(y, frame.height() as usize)).collect();
    let cols: Vec<usize> = (0..s).map(|x| sample(x, frame.width() as usize)).collect();

    ndarray::Array4::from_shape_fn((1, 3, s, s), |(_, c, y, x)| {
        f32::from(src[[rows[y], cols[x], c]]) / 255.0
    })
}

#[derive(Clone, Debug)]
struct RawDet {
    x1: f64,
    y1: f64,
    x2: f64,
    y2: f64,
    score: f64,
}

/// Turns raw head outputs into frame-space boxes above `confidence`.
fn decode(
    spec: &BlazeModelSpec,
    anchors: &[[f32; 2]],
    reg_data: &[f32],
    score_data: &[f32],
    confidence: f32,
    frame_width: u32,
    frame_height: u32,
) -> Vec<RawDet> {
    let input = spec.input_size as f32;
    let fw = frame_width as f32;
    let fh = frame_height as f32;
    let mut dets = Vec::new();

    for (i, &raw_score) in score_data.iter().enumerate().take(anchors.len()) {
        let score = sigmoid(raw_score);
        if score < confidence {
            continue;
        }

        let offset = i * spec.regressor_width;
        if offset + 4 > reg_data.len() {
            break;
        }

        let anchor = anchors[i];
        let cx = anchor[0] + reg_data[offset] / input;
        let cy = anchor[1] + reg_data[offset + 1] / input;
        let w = reg_data[offset + 2] / input;
        let h = reg_data[offset + 3] / input;

        dets.push(RawDet {
            x1: ((cx - w / 2.0) * fw).max(0.0) as f64,
            y1: ((cy - h / 2.0) * fh).max(0.0) as f64,
            x2: ((cx + w / 2.0) * fw).min(fw) as f64,
            y2: ((cy + h / 2.0) * fh).min(fh) as f64,
            score: score as f64,
        });
    }

    dets
}

impl RawDet {
    fn area(&self) -> f64 {
        (self.x2 - self.x1).max(0.0) * (self.y2 - self.y1).max(0.0)
    }

    fn iou(&self, other: &RawDet) -> f64 {
        let overlap = RawDet {
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
            x2: self.x2.min(other.x2),
            y2: self.y2.min(other.y2),
            score: 0.0,
        };
        let inter = overlap.area();
        if inter <= 0.0 {
            return 0.0;
        }
        inter / (self.area() + other.area() - inter)
    }
}

/// Greedy non-maximum suppression, highest score first.
fn nms(dets: &mut [RawDet], iou_threshold: f64) -> Vec<RawDet> {
    dets.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut kept: Vec<RawDet> = Vec::new();
    for det in dets.iter() {
        if kept.iter().all(|k| k.iou(det) <= iou_threshold) {
            kept.push(det.clone());
        }
    }
    kept
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;

    fn det(x1: f64, y1: f64, x2: f64, y2: f64, score: f64) -> RawDet {
        RawDet {
            x1,
            y1,
            x2,
            y2,
            score,
        }
    }

    #[rstest]
    #[case::face(FACE_SHORT_RANGE, 896)]
    #[case::palm(PALM, 2016)]
    fn test_anchor_count(#[case] spec: BlazeModelSpec, #[case] expected: usize) {
        assert_eq!(spec.anchor_count(), expected);
        assert_eq!(spec.anchors().len(), expected);
    }

    #[test]
    fn test_anchors_in_unit_range() {
        for a in PALM.anchors() {
            assert!(a[0] > 0.0 && a[0] < 1.0);
            assert!(a[1] > 0.0 && a[1] < 1.0);
        }
    }

    #[test]
    fn test_for_kind() {
        assert_eq!(BlazeModelSpec::for_kind(DetectorKind::Face), FACE_SHORT_RANGE);
        assert_eq!(BlazeModelSpec::for_kind(DetectorKind::Palm), PALM);
    }

    #[test]
    fn test_preprocess_shape_and_range() {
        let frame = Frame::new(vec![255u8; 200 * 100 * 3], 200, 100, 3, 0);
        let tensor = preprocess(&frame, 192);
        assert_eq!(tensor.shape(), &[1, 3, 192, 192]);
        assert_relative_eq!(tensor[[0, 2, 191, 191]], 1.0);
    }

    #[test]
    fn test_score_shape_detection() {
        assert!(is_score_shape(&[1, 896, 1]));
        assert!(!is_score_shape(&[1, 896, 16]));
    }

    #[test]
    fn test_decode_single_confident_anchor() {
        let spec = FACE_SHORT_RANGE;
        let anchors = spec.anchors();
        let n = anchors.len();
        let mut scores = vec![-10.0f32; n];
        let mut regs = vec![0.0f32; n * spec.regressor_width];

        // First anchor sits at (0.5/16, 0.5/16); give it a 32px box at 128px input.
        scores[0] = 10.0;
        regs[2] = 32.0;
        regs[3] = 32.0;

        let dets = decode(&spec, &anchors, &regs, &scores, 0.5, 128, 128);
        assert_eq!(dets.len(), 1);
        let d = &dets[0];
        // center 4px, half-size 16px → clamped to 0 on the left/top
        assert_relative_eq!(d.x1, 0.0);
        assert_relative_eq!(d.x2, 20.0, epsilon = 1e-3);
        assert_relative_eq!(d.y2, 20.0, epsilon = 1e-3);
    }

    #[test]
    fn test_decode_nothing_above_threshold() {
        let spec = PALM;
        let anchors = spec.anchors();
        let scores = vec![0.0f32; anchors.len()]; // sigmoid(0) = 0.5
        let regs = vec![0.0f32; anchors.len() * spec.regressor_width];
        let dets = decode(&spec, &anchors, &regs, &scores, 0.6, 640, 480);
        assert!(dets.is_empty());
    }

    #[test]
    fn test_decode_stops_on_short_regressor_tensor() {
        let spec = FACE_SHORT_RANGE;
        let anchors = spec.anchors();
        let scores = vec![10.0f32; anchors.len()];
        let regs = vec![0.0f32; spec.regressor_width]; // only one anchor's worth
        let dets = decode(&spec, &anchors, &regs, &scores, 0.5, 128, 128);
        assert_eq!(dets.len(), 1);
    }

    #[test]
    fn test_iou_of_disjoint_and_identical_boxes() {
        let a = det(0.0, 0.0, 10.0, 10.0, 1.0);
        assert_relative_eq!(a.iou(&det(20.0, 20.0, 30.0, 30.0, 1.0)), 0.0);
        assert_relative_eq!(a.iou(&a), 1.0);
    }

    #[test]
    fn test_nms_suppresses_overlap_keeps_highest() {
        let mut dets = vec![
            det(5.0, 5.0, 105.0, 105.0, 0.7),
            det(0.0, 0.0, 100.0, 100.0, 0.9),
        ];
        let kept = nms(&mut dets, 0.3);
        assert_eq!(kept.len(), 1);
        assert_relative_eq!(kept[0].score, 0.9);
    }

    #[test]
    fn test_nms_keeps_separate_in_score_order() {
        let mut dets = vec![
            det(200.0, 200.0, 250.0, 250.0, 0.6),
            det(0.0, 0.0, 50.0, 50.0, 0.9),
        ];
        let kept = nms(&mut dets, 0.3);
        assert_eq!(kept.len(), 2);
        assert!(kept[0].score > kept[1].score);
    }

    #[rstest]
    #[case(0.0, 0.5)]
    #[case(10.0, 1.0)]
    #[case(-10.0, 0.0)]
    fn test_sigmoid(#[case] x: f32, #[case] expected: f32) {
        assert_relative_eq!(sigmoid(x), expected, epsilon = 1e-3);
    }
}
