#![no_main]

use libfuzzer_sys::fuzz_target;
use sml_gateway::channel::{Channel, ChannelConfig};
use sml_gateway::clock::Millis;
use sml_gateway::decoder::RawFrameDecoder;
use sml_gateway::publish::MemoryPublisher;

fuzz_target!(|data: &[u8]| {
    if data.len() < 2 {
        return;
    }
    // First byte picks the capacity, second the burst size.
    let capacity = 16 + data[0] as usize * 4;
    let chunk = 1 + data[1] as usize % 96;
    let mut channel = Channel::new(0, ChannelConfig::sml("fuzz").with_capacity(capacity));
    let mut decoder = RawFrameDecoder::new();
    let mut publisher = MemoryPublisher::default();

    for (i, burst) in data[2..].chunks(chunk).enumerate() {
        channel.push(burst);
        assert!(channel.len() <= capacity);
        if burst.first() == Some(&0x1A) {
            channel.end_of_burst();
        }
        channel.tick(Millis(i as u32), &mut decoder, &mut publisher);
    }
});
