//! End-to-end tests of the tick driver with channels, a mock bus and a
//! recording publisher.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use sml_gateway::bus::MockBus;
use sml_gateway::channel::{Channel, ChannelConfig, ChannelState, SharedChannel};
use sml_gateway::clock::{Clock, ManualClock, Millis};
use sml_gateway::constants::{SML_END_SEQUENCE, SML_START_SEQUENCE};
use sml_gateway::decoder::RawFrameDecoder;
use sml_gateway::gateway::Gateway;
use sml_gateway::poll::{PollConfig, PollScheduler, PollState, RegisterLayout, SlaveConfig};
use sml_gateway::publish::{MemoryPublisher, Publisher};
use tokio_test::{assert_pending, assert_ready};

/// Publisher whose messages stay readable after it is boxed into a gateway.
#[derive(Clone, Default)]
struct SharedPublisher(Rc<RefCell<MemoryPublisher>>);

impl Publisher for SharedPublisher {
    fn publish(&mut self, key: &str, value: &str) {
        self.0.borrow_mut().publish(key, value);
    }
}

fn sml_frame(payload: &[u8]) -> Vec<u8> {
    let mut frame = SML_START_SEQUENCE.to_vec();
    frame.extend_from_slice(payload);
    frame.extend_from_slice(&SML_END_SEQUENCE);
    frame.extend_from_slice(&[0x01, 0x2A, 0x9B]);
    frame
}

/// Tests that frames on two channels are decoded and published in the same
/// tick, and that the delivered flag needs every channel.
#[test]
fn test_channels_deliver_through_gateway() {
    let grid = SharedChannel::new(Channel::new(0, ChannelConfig::sml("grid")));
    let solar = SharedChannel::new(Channel::new(1, ChannelConfig::line("solar", b'\n')));
    let publisher = SharedPublisher::default();
    let mut gateway = Gateway::new(
        vec![grid.clone(), solar.clone()],
        Box::new(RawFrameDecoder::new()),
        Box::new(publisher.clone()),
    );

    grid.push(&sml_frame(&[0xAB]));
    grid.end_of_burst();
    gateway.tick(Millis(10));
    assert!(!gateway.all_channels_delivered());

    solar.push(b"1-0:2.8.0(000042.0*kWh)\n");
    solar.end_of_burst();
    gateway.tick(Millis(20));
    assert!(gateway.all_channels_delivered());

    let messages = publisher.0.borrow();
    assert_eq!(
        messages.get("grid/frame"),
        Some("1b1b1b1b01010101ab1b1b1b1b1a012a9b")
    );
    assert_eq!(messages.get("solar/line"), Some("1-0:2.8.0(000042.0*kWh)"));
}

/// Tests that polling and channel acquisition interleave in one loop and
/// that the status snapshot reflects both.
#[test]
fn test_status_snapshot() {
    let clock = ManualClock::new(0);
    let grid = SharedChannel::new(Channel::new(0, ChannelConfig::sml("grid")));
    let bus = MockBus::default();
    let slaves = vec![SlaveConfig::new("sdm", 1, 10_000, Arc::new(RegisterLayout::sdm630())).without_identity()];
    let scheduler = PollScheduler::new(PollConfig::default(), slaves);
    let publisher = SharedPublisher::default();

    let mut gateway = Gateway::new(
        vec![grid.clone()],
        Box::new(RawFrameDecoder::new()),
        Box::new(publisher.clone()),
    )
    .with_poller(scheduler, Box::new(bus.clone()));

    // A bad burst, then a good one, while the meter is silent.
    grid.push(&[0x00; 20]);
    grid.end_of_burst();
    gateway.tick(clock.now());
    clock.set(10_000);
    grid.push(&sml_frame(&[]));
    grid.end_of_burst();

    bus.queue_silence();
    for _ in 0..200 {
        gateway.tick(clock.now());
        clock.advance(5);
    }

    let status = gateway.status(clock.now());
    assert_eq!(status.channels[0].frames_delivered, 1);
    assert_eq!(status.channels[0].frames_discarded, 1);
    assert_eq!(status.channels[0].state, ChannelState::Idle);
    assert_eq!(status.last_frame_ms_ago, Some(1000));
    assert_eq!(status.slaves[0].fail, 1);
    assert_eq!(status.slaves[0].last_error.as_deref(), Some("not enough bytes"));
    assert_eq!(status.slaves[0].last_error_code, Some(7));
    assert_eq!(status.poll_state, Some(PollState::Idle));
    assert_eq!(status.uptime_ms, 11_000);

    let json = serde_json::to_value(&status).unwrap();
    assert_eq!(json["slaves"][0]["name"], "sdm");
    assert_eq!(json["channels"][0]["state"], "Idle");

    assert_eq!(publisher.0.borrow().get("sdm/error"), Some(r#"{"success":0,"fail":1}"#));
}

/// Tests that the async control loop ticks until the shutdown future resolves.
#[tokio::test]
async fn test_run_stops_on_shutdown() {
    let grid = SharedChannel::new(Channel::new(0, ChannelConfig::sml("grid")));
    let mut gateway = Gateway::new(
        vec![grid.clone()],
        Box::new(RawFrameDecoder::new()),
        Box::new(MemoryPublisher::default()),
    );
    grid.push(&sml_frame(&[0x42]));
    grid.end_of_burst();

    let clock = ManualClock::new(0);
    gateway
        .run(
            &clock,
            Duration::from_millis(1),
            tokio::time::sleep(Duration::from_millis(50)),
        )
        .await;

    assert!(gateway.ticks() > 0);
    assert!(gateway.all_channels_delivered());
}

/// Tests that the control loop parks between ticks and finishes on the poll
/// after the shutdown signal fires.
#[tokio::test]
async fn test_run_pending_until_shutdown() {
    let mut gateway = Gateway::new(
        vec![],
        Box::new(RawFrameDecoder::new()),
        Box::new(MemoryPublisher::default()),
    );
    let clock = ManualClock::new(0);
    let (stop, stopped) = tokio::sync::oneshot::channel::<()>();

    {
        let mut run = tokio_test::task::spawn(gateway.run(&clock, Duration::from_secs(3600), async {
            let _ = stopped.await;
        }));
        assert_pending!(run.poll());
        assert!(!run.is_woken());

        stop.send(()).unwrap();
        assert!(run.is_woken());
        assert_ready!(run.poll());
    }

    // Only the immediate first tick of the interval ran.
    assert_eq!(gateway.ticks(), 1);
}
