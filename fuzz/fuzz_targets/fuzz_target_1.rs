#![no_main]

use bytes::BytesMut;
use insim_protocol::core::codec::{self, FrameCodec};
use insim_protocol::core::telemetry::{OutGauge, OutSim};
use libfuzzer_sys::fuzz_target;
use tokio_util::codec::Decoder;

fuzz_target!(|data: &[u8]| {
    // Single packets, then the same bytes as a stream
    let _ = codec::decode(data);

    let mut framer = FrameCodec;
    let mut buf = BytesMut::from(data);
    while let Ok(Some(frame)) = framer.decode(&mut buf) {
        let _ = codec::decode(&frame);
    }

    let _ = OutSim::decode(data);
    let _ = OutGauge::decode(data);
});
