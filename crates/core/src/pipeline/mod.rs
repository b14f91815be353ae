pub mod recognise_frame_use_case;
pub mod region_filter;
