pub mod box_painter;
pub mod frame_decoder;
pub mod image_blob_codec;
pub mod image_file_writer;
