pub mod color_classifier;
pub mod edge_map;
pub mod frame;
pub mod frame_source;
pub mod noise_suppressor;
pub mod selector;
pub mod shape_detector;
