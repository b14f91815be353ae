use std::error::Error;
use std::path::PathBuf;

use recognition_core::imaging::box_painter::{paint_boxes, DEFAULT_BOX_COLOUR, DEFAULT_BOX_THICKNESS};
use recognition_core::imaging::image_file_writer::write_frame;
use recognition_core::shared::frame::Frame;
use recognition_core::shared::region::Region;

/// Where the client renders the current frame and its boxes.
pub trait Surface: Send {
    /// Called once with the acquired size; every later frame has it.
    fn resize(&mut self, width: u32, height: u32);

    fn draw_frame(&mut self, frame: &Frame) -> Result<(), Box<dyn Error>>;

    /// Strokes `boxes` over the last drawn frame.
    fn draw_boxes(&mut self, boxes: &[Region]) -> Result<(), Box<dyn Error>>;
}

/// Renders to an image file, rewritten on every draw.
pub struct AnnotatedFileSurface {
    path: PathBuf,
    canvas: Option<Frame>,
    colour: [u8; 3],
    thickness: u32,
}

impl AnnotatedFileSurface {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            canvas: None,
            colour: DEFAULT_BOX_COLOUR,
            thickness: DEFAULT_BOX_THICKNESS,
        }
    }
}

impl Surface for AnnotatedFileSurface {
    fn resize(&mut self, width: u32, height: u32) {
        self.canvas = Some(Frame::blank(width, height, 0));
    }

    fn draw_frame(&mut self, frame: &Frame) -> Result<(), Box<dyn Error>> {
        self.canvas = Some(frame.clone());
        Ok(())
    }

    fn draw_boxes(&mut self, boxes: &[Region]) -> Result<(), Box<dyn Error>> {
        let Some(canvas) = &self.canvas else {
            return Ok(());
        };
        // Paint on a copy so repaints of the same frame never stack strokes.
        let mut annotated = canvas.clone();
        paint_boxes(&mut annotated, boxes, self.colour, self.thickness);
        write_frame(&self.path, &annotated)
    }
}

/// Logs what would be drawn. Used when no output file is given.
#[derive(Default)]
pub struct LogSurface {
    frames: u64,
}

impl Surface for LogSurface {
    fn resize(&mut self, width: u32, height: u32) {
        log::info!("Surface sized to {width}x{height}");
    }

    fn draw_frame(&mut self, frame: &Frame) -> Result<(), Box<dyn Error>> {
        self.frames += 1;
        log::debug!("Frame {} ({}x{})", frame.sequence(), frame.width(), frame.height());
        Ok(())
    }

    fn draw_boxes(&mut self, boxes: &[Region]) -> Result<(), Box<dyn Error>> {
        if !boxes.is_empty() {
            log::info!("Frame {}: {} box(es) {:?}", self.frames, boxes.len(), boxes);
        }
        Ok(())
    }
}
