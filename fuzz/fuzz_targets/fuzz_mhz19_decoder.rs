//! Fuzz target: MH-Z19 response decoding
//!
//! Treats the input as a stream of 9-byte UART responses.  The decoder must
//! never panic and must only accept frames whose checksum matches.
//!
//! cargo fuzz run fuzz_mhz19_decoder

#![no_main]

use co2ampel::sensors::mhz19::{self, Frame, FRAME_LEN};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    for chunk in data.chunks_exact(FRAME_LEN) {
        let mut frame: Frame = [0; FRAME_LEN];
        frame.copy_from_slice(chunk);

        if let Ok(reading) = mhz19::decode_co2(&frame) {
            assert_eq!(mhz19::checksum(&frame), frame[8]);
            assert_eq!(frame[1], mhz19::CMD_READ_CO2);
            assert_eq!(reading.ppm, u16::from_be_bytes([frame[2], frame[3]]));
        }
        let _ = mhz19::decode(&frame, mhz19::CMD_ZERO_POINT);
    }
});
