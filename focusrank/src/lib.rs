pub mod color_utils;
pub mod config;
pub mod detector;
pub mod focus_measure;
pub mod image_input;
pub mod naming;
pub mod onnx_session;
pub mod pipeline;
pub mod placement;
pub mod progress;
pub mod rank_processing;
pub mod ranker;
pub mod region;
pub mod region_scorer;
pub mod report;
pub mod yolo;
