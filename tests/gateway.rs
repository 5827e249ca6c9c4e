// slcan-gateway/tests/gateway.rs
//
// End-to-end tests of the gateway loop, from host bytes to bus frames and
// back, using the in-memory device and stream.

use embedded_can::Frame as EmbeddedFrame;
use slcan_gateway::{
    CanFrame, CanId, ChannelState, Config, ControllerAdapter, Gateway, LineTransport, MockDevice,
    MockStream, Slcan,
};
use std::{cell::RefCell, rc::Rc};

type Engine = Slcan<ControllerAdapter<MockDevice>>;

struct Harness {
    stream: MockStream,
    dev: MockDevice,
    slcan: Rc<RefCell<Engine>>,
    gw: Gateway<LineTransport<MockStream>>,
}

impl Harness {
    fn new() -> Self {
        Self::with_config(&Config::default())
    }

    fn with_config(config: &Config) -> Self {
        let stream = MockStream::new();
        let dev = MockDevice::new();
        let can = ControllerAdapter::new(dev.clone(), config.tx_queue_len);
        let slcan = Rc::new(RefCell::new(Slcan::with_config(can, config)));

        let tp = LineTransport::with_config(stream.clone(), config);
        let mut gw = Gateway::with_config(tp, config);
        assert!(gw.register(slcan.clone()));

        Self {
            stream,
            dev,
            slcan,
            gw,
        }
    }

    // Feeds the host bytes, runs one iteration, and returns the output.
    fn exchange(&mut self, input: &str) -> String {
        self.stream.feed(input);
        self.gw.run_once();
        self.stream.take_output_string()
    }

    fn state(&self) -> ChannelState {
        self.slcan.borrow().state()
    }
}

fn std_frame(id: u16, data: &[u8]) -> CanFrame {
    CanFrame::with_id(CanId::standard(id).unwrap(), data).unwrap()
}

#[test]
fn test_open_and_transmit() {
    let mut h = Harness::new();

    assert_eq!(h.exchange("S6\r"), "\r");
    assert_eq!(h.exchange("O\r"), "\r");
    assert_eq!(h.state(), ChannelState::Open);

    assert_eq!(h.exchange("t1233AABBCC\r"), "z\r");

    let sent = h.dev.take_transmitted();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].raw_id(), 0x123);
    assert!(!sent[0].can_id().is_extended());
    assert_eq!(sent[0].dlc(), 3);
    assert_eq!(sent[0].data(), &[0xAA, 0xBB, 0xCC]);

    assert_eq!(h.exchange("T1FFFFFFF81122334455667788\r"), "Z\r");
    let sent = h.dev.take_transmitted();
    assert_eq!(sent[0].raw_id(), 0x1FFF_FFFF);
    assert!(sent[0].can_id().is_extended());
}

#[test]
fn test_transmit_while_closed() {
    let mut h = Harness::new();

    assert_eq!(h.exchange("t1233AABBCC\r"), "\x07\r");
    assert!(h.dev.transmitted().is_empty());
    assert_eq!(h.state(), ChannelState::Closed);
}

#[test]
fn test_open_twice_and_close_twice() {
    let mut h = Harness::new();

    assert_eq!(h.exchange("O\rO\r"), "\r\x07\r");
    assert_eq!(h.state(), ChannelState::Open);

    assert_eq!(h.exchange("C\rC\r"), "\r\r");
    assert_eq!(h.state(), ChannelState::Closed);
    assert!(!h.dev.is_started());
}

#[test]
fn test_bitrate_while_open() {
    let mut h = Harness::new();

    assert_eq!(h.exchange("S4\rO\r"), "\r\r");
    assert_eq!(h.exchange("S6\r"), "\x07\r");
    assert_eq!(h.exchange("S9\r"), "\x07\r");
    assert_eq!(h.slcan.borrow().bitrate().preset(), 4);
}

#[test]
fn test_acceptance_filter() {
    let mut h = Harness::new();

    assert_eq!(h.exchange("M000007FF\rm00000123\rO\r"), "\r\r\r");

    h.dev.push_rx(std_frame(0x456, &[0x01]));
    h.dev.push_rx(std_frame(0x123, &[0x11]));

    assert_eq!(h.exchange(""), "t123111\r");
    assert_eq!(h.dev.rx_len(), 0);
}

#[test]
fn test_filter_cleared_on_open() {
    let mut h = Harness::new();

    // A zero mask means accept everything
    assert_eq!(h.exchange("m00000123\rO\r"), "\r\r");

    h.dev.push_rx(std_frame(0x456, &[]));
    assert_eq!(h.exchange(""), "t4560\r");
}

#[test]
fn test_listen_only() {
    let mut h = Harness::new();

    assert_eq!(h.exchange("L\r"), "\r");
    assert_eq!(h.state(), ChannelState::ListenOnly);

    assert_eq!(h.exchange("t1230\r"), "\x07\r");
    assert!(h.dev.transmitted().is_empty());

    // Still receiving
    h.dev.push_rx(std_frame(0x7FF, &[0xDE, 0xAD]));
    assert_eq!(h.exchange(""), "t7FF2DEAD\r");
}

#[test]
fn test_info_commands() {
    let config = Config {
        version: (2, 10),
        serial: "AB12".into(),
        ..Config::default()
    };
    let mut h = Harness::with_config(&config);

    assert_eq!(h.exchange("V\r"), "V020A\r");
    assert_eq!(h.exchange("N\r"), "NAB12\r");
    assert_eq!(h.exchange("F\r"), "F00\r");
}

#[test]
fn test_unclaimed_line() {
    let mut h = Harness::new();

    assert_eq!(h.exchange("Q\r"), "\x07\r");
    assert_eq!(h.exchange("hello\r"), "\x07\r");

    // Blank lines get nothing
    assert_eq!(h.exchange("\r\n\r"), "");
}

#[test]
fn test_command_queue_overflow() {
    let config = Config {
        cmd_queue_len: 2,
        ..Config::default()
    };
    let mut h = Harness::with_config(&config);

    h.stream.feed("V\rN\rF\r");
    assert_eq!(h.gw.run_once(), 2);

    let tp = h.gw.transport();
    assert_eq!(tp.counters().queue_overflows, 1);
    assert_eq!(tp.queued_lines(), 0);

    // The newest line was the one dropped
    assert_eq!(h.stream.take_output_string(), "V0100\rNGW01\r");
}

#[test]
fn test_commands_per_iteration() {
    let config = Config {
        max_cmds_per_iteration: 2,
        ..Config::default()
    };
    let mut h = Harness::with_config(&config);

    h.stream.feed("V\rV\rV\r");
    assert_eq!(h.gw.run_once(), 2);
    assert_eq!(h.gw.transport().queued_lines(), 1);
    assert_eq!(h.gw.run_once(), 1);
    assert_eq!(h.gw.run_once(), 0);
    assert_eq!(h.stream.take_output_string(), "V0100\rV0100\rV0100\r");
}

#[test]
fn test_forwarding_is_bounded() {
    let config = Config {
        max_frames_per_poll: 4,
        ..Config::default()
    };
    let mut h = Harness::with_config(&config);
    h.exchange("O\r");

    for i in 0..6 {
        h.dev.push_rx(std_frame(0x100 + i, &[i as u8]));
    }

    let out = h.exchange("");
    assert_eq!(out.matches('\r').count(), 4);
    assert!(out.starts_with("t100100\r"));

    let out = h.exchange("");
    assert_eq!(out, "t104104\rt105105\r");
}

#[test]
fn test_rx_ring_overflow_keeps_oldest() {
    let config = Config {
        rx_ring_len: 2,
        ..Config::default()
    };
    let mut h = Harness::with_config(&config);
    assert_eq!(h.exchange("X0\rO\r"), "\r\r");

    h.dev.push_rx(std_frame(0x001, &[0xAA]));
    h.dev.push_rx(std_frame(0x002, &[0xBB]));
    h.dev.push_rx(std_frame(0x003, &[0xCC]));

    assert_eq!(h.exchange("A\r"), "t0011AA\rt0021BB\rA\r");
    assert_eq!(h.slcan.borrow().counters().rx_overflows, 1);

    // The frame that didn't fit is still there
    assert_eq!(h.exchange("P\r"), "t0031CC\r");
    assert_eq!(h.exchange("P\r"), "\r");
}

#[test]
fn test_poll_all_keeps_what_doesnt_fit() {
    let mut h = Harness::new();
    assert_eq!(h.exchange("X0\rO\r"), "\r\r");

    // A whole ring of frames against a stream that takes 1 KiB at a time
    h.stream.set_capacity(Some(1024));
    for i in 0..64 {
        h.dev.push_rx(std_frame(0x100 + i, &[i as u8]));
    }

    let out = h.exchange("A\r");
    assert!(out.len() <= Config::default().max_response_len);
    assert!(out.starts_with("t100100\r"));
    assert!(out.ends_with("t13E13E\rA\r"));
    assert_eq!(out.matches('\r').count(), 64);

    assert_eq!(h.gw.transport().counters().response_drops, 0);
    assert_eq!(h.slcan.borrow().rx_pending(), 1);

    // Nothing was lost
    assert_eq!(h.exchange("P\r"), "t13F13F\r");
    assert_eq!(h.exchange("A\r"), "A\r");
}

#[test]
fn test_polling_needs_x0() {
    let mut h = Harness::new();

    assert_eq!(h.exchange("P\r"), "\x07\r");
    assert_eq!(h.exchange("O\rA\r"), "\r\x07\r");
    assert_eq!(h.exchange("X0\rA\r"), "\rA\r");
}

#[test]
fn test_timestamps() {
    let mut h = Harness::new();
    assert_eq!(h.exchange("Z1\rO\r"), "\r\r");

    h.dev.push_rx(std_frame(0x123, &[0x11]));
    let out = h.exchange("");

    assert!(out.starts_with("t123111"));
    assert!(out.ends_with('\r'));
    let stamp = &out["t123111".len()..out.len() - 1];
    assert_eq!(stamp.len(), 4);
    assert!(stamp.bytes().all(|b| b.is_ascii_hexdigit()));
}

#[test]
fn test_queued_transmit_goes_out_on_poll() {
    let mut h = Harness::new();
    h.exchange("O\r");

    h.dev.set_tx_busy(true);
    assert_eq!(h.exchange("t1230\rt1240\r"), "z\rz\r");
    assert!(h.dev.transmitted().is_empty());

    h.dev.set_tx_busy(false);
    h.exchange("");

    let ids: Vec<u32> = h.dev.take_transmitted().iter().map(|f| f.raw_id()).collect();
    assert_eq!(ids, vec![0x123, 0x124]);
}

#[test]
fn test_slow_host_drops_frames() {
    let mut h = Harness::new();
    h.exchange("O\r");

    // Too small for a forwarded frame
    h.stream.set_capacity(Some(4));
    h.dev.push_rx(std_frame(0x123, &[0x11]));
    h.dev.push_rx(std_frame(0x124, &[0x22]));
    assert_eq!(h.exchange(""), "");

    assert_eq!(h.slcan.borrow().counters().forward_drops, 1);
    assert_eq!(h.gw.transport().counters().frame_drops, 1);

    // The frame behind the lost one is still waiting
    h.stream.set_capacity(None);
    assert_eq!(h.exchange(""), "t124122\r");
}

#[test]
fn test_host_hangup() {
    let mut h = Harness::new();

    h.stream.feed("V\r");
    h.stream.set_eof(true);
    assert_eq!(h.gw.run_once(), 1);
    assert!(h.gw.transport().is_hung_up());
}
