//! Core of the recognition relay: detector kinds and their ONNX-backed
//! detectors, image blob codec, the socket wire protocol and the
//! recognise-frame use case shared by the server and the headless client.

pub mod detection;
pub mod imaging;
pub mod pipeline;
pub mod protocol;
pub mod shared;
