// slcan-gateway/src/bin/slcan-gateway.rs
//
// Bridges an SLCAN host on a serial line to a SocketCAN interface.
//
// This file is part of the Rust 'slcan-gateway' crate.
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.

//! Command-line SLCAN gateway.
//!
//! Speaks SLCAN on a serial tty (or stdin/stdout) and puts the frames on a
//! Linux CAN interface, like 'can0' or 'vcan0'. Runs until the host end of
//! the stream hangs up.
//!
//! Set `RUST_LOG=debug` to see the commands and state changes.

use anyhow::{anyhow, Context, Result};
use clap::{value_parser, Arg, ArgMatches, Command};
use log::info;
use slcan_gateway::{
    handler_ref, Bitrate, Config, ControllerAdapter, FdStream, Gateway, LineTransport, Slcan,
    SocketCanDevice,
};
use std::{process, thread, time::Duration};

// Make the app version the same as the package.
const VERSION: &str = env!("CARGO_PKG_VERSION");

// --------------------------------------------------------------------------

// Builds the gateway configuration from the command-line options.
fn config_from_opts(opts: &ArgMatches) -> Result<Config> {
    let mut config = Config::default();

    if let Some(&preset) = opts.get_one::<u8>("bitrate") {
        config.default_bitrate = Bitrate::from_preset(preset)
            .ok_or_else(|| anyhow!("Invalid bitrate preset: {}", preset))?;
    }
    if let Some(serial) = opts.get_one::<String>("serial") {
        if serial.len() != 4 || !serial.is_ascii() {
            return Err(anyhow!("The serial number must be 4 ASCII characters"));
        }
        config.serial = serial.clone();
    }
    if let Some(&n) = opts.get_one::<usize>("tx-queue") {
        config.tx_queue_len = n;
    }
    if let Some(&n) = opts.get_one::<usize>("rx-queue") {
        config.rx_ring_len = n;
    }
    if let Some(&n) = opts.get_one::<usize>("cmd-queue") {
        config.cmd_queue_len = n;
    }
    Ok(config)
}

fn run(opts: &ArgMatches) -> Result<()> {
    let iface = opts
        .get_one::<String>("iface")
        .ok_or_else(|| anyhow!("Need to specify a CAN interface"))?;
    let config = config_from_opts(opts)?;
    let idle = Duration::from_micros(opts.get_one::<u64>("idle-us").copied().unwrap_or(100));

    // A fixed-rate interface only accepts its own preset
    let mut device = SocketCanDevice::new(iface)
        .with_context(|| format!("Can't find CAN interface '{}'", iface))?;
    if opts.contains_id("bitrate") {
        device = device.with_bitrate(config.default_bitrate);
    }

    let stream = match opts.get_one::<String>("tty") {
        Some(path) => {
            FdStream::open_tty(path).with_context(|| format!("Can't open tty '{}'", path))?
        }
        None => FdStream::stdio().context("Can't use stdin/stdout")?,
    };

    let can = ControllerAdapter::new(device, config.tx_queue_len);
    let slcan = handler_ref(Slcan::with_config(can, &config));

    let mut gw = Gateway::with_config(LineTransport::with_config(stream, &config), &config);
    if !gw.register(slcan) {
        return Err(anyhow!("Unable to register the SLCAN handler"));
    }

    info!("SLCAN gateway on '{}', {}", iface, config.default_bitrate);

    loop {
        let handled = gw.run_once();
        let tp = gw.transport();
        if tp.is_hung_up() && tp.queued_lines() == 0 {
            break;
        }
        if handled == 0 {
            thread::sleep(idle);
        }
    }

    let counters = gw.transport().counters();
    info!("Host hung up. Transport counters: {:?}", counters);
    Ok(())
}

// --------------------------------------------------------------------------

fn main() {
    env_logger::init();

    let opts = Command::new("slcan-gateway")
        .version(VERSION)
        .about("SLCAN serial-line gateway to a Linux CAN interface")
        .arg(
            Arg::new("iface")
                .help("The CAN interface to use, like 'can0', 'vcan0', etc")
                .required(true)
                .index(1),
        )
        .arg(
            Arg::new("tty")
                .long("tty")
                .takes_value(true)
                .help("Serial tty to the host [default: stdin/stdout]"),
        )
        .arg(
            Arg::new("bitrate")
                .long("bitrate")
                .takes_value(true)
                .value_parser(value_parser!(u8).range(0..=8))
                .help("Fixed bitrate preset of the interface (0-8)"),
        )
        .arg(
            Arg::new("serial")
                .long("serial")
                .takes_value(true)
                .help("The four-character serial number reported by 'N'"),
        )
        .arg(
            Arg::new("tx-queue")
                .long("tx-queue")
                .takes_value(true)
                .value_parser(value_parser!(usize))
                .help("Length of the software transmit queue"),
        )
        .arg(
            Arg::new("rx-queue")
                .long("rx-queue")
                .takes_value(true)
                .value_parser(value_parser!(usize))
                .help("Length of the receive ring"),
        )
        .arg(
            Arg::new("cmd-queue")
                .long("cmd-queue")
                .takes_value(true)
                .value_parser(value_parser!(usize))
                .help("Length of the host command queue"),
        )
        .arg(
            Arg::new("idle-us")
                .long("idle-us")
                .takes_value(true)
                .value_parser(value_parser!(u64))
                .help("Microseconds to sleep when a loop pass found no commands [default: 100]"),
        )
        .get_matches();

    if let Err(err) = run(&opts) {
        eprintln!("{:#}", err);
        process::exit(1);
    }
}
