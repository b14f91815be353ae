use crate::shared::frame::Frame;
use crate::shared::region::Region;

pub const DEFAULT_BOX_COLOUR: [u8; 3] = [0, 255, 0];
pub const DEFAULT_BOX_THICKNESS: u32 = 2;

/// Strokes rectangle outlines onto an RGB frame.
///
/// Boxes are clipped to the frame; a box entirely outside it is skipped.
/// The stroke is drawn inside the box so a thick outline never bleeds past
/// the reported bounds.
pub fn paint_boxes(frame: &mut Frame, boxes: &[Region], colour: [u8; 3], thickness: u32) {
    let fw = frame.width();
    let fh = frame.height();
    let channels = frame.channels() as usize;
    if channels < 3 || thickness == 0 {
        return;
    }

    for b in boxes {
        let clipped = b.clamp_to(fw, fh);
        if clipped.area() == 0 {
            continue;
        }
        let x1 = clipped.x as u32;
        let y1 = clipped.y as u32;
        let x2 = x1 + clipped.width as u32; // exclusive
        let y2 = y1 + clipped.height as u32;
        let t = thickness.min(clipped.width as u32).min(clipped.height as u32);

        let data = frame.data_mut();
        let mut put = |x: u32, y: u32| {
            let idx = (y as usize * fw as usize + x as usize) * channels;
            data[idx..idx + 3].copy_from_slice(&colour);
        };

        for y in y1..y2 {
            let on_horizontal_edge = y < y1 + t || y >= y2 - t;
            if on_horizontal_edge {
                for x in x1..x2 {
                    put(x, y);
                }
            } else {
                for x in (x1..x1 + t).chain(x2 - t..x2) {
                    put(x, y);
                }
            }
        }
    }
}
