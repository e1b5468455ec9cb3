//! gvnet Echo Server
//!
//! Single-threaded TCP echo server: one listening [`ServerChannel`], every
//! accepted connection registered with the same reactor, every byte read
//! written straight back.
//!
//! Usage:
//!     cargo build --release -p gvnet-echo
//!     ./target/release/gvnet-echo [port] [max_conns]
//!
//! Environment:
//!     GVNET_POLL_TIMEOUT_MS   poll wait per iteration (default 100)
//!     GVNET_IDLE_TIMEOUT_MS   close connections idle this long (default off)
//!     GVNET_READ_CHUNK        bytes per recv (default 1024)
//!     RUST_LOG                log filter, e.g. `gvnet_reactor=debug`
//!
//! Test with:
//!     echo "hello" | nc localhost 9999

use std::io;
use std::thread;
use std::time::{Duration, Instant};

use gvnet_core::{Accepted, Channel, ReadOpts};
use gvnet_module::{ExpiringChannel, ServerChannel};
use gvnet_reactor::{
    ChannelId, CloseReason, Reactor, ReactorConfig, ReactorHooks, ReactorStats, StopHandle,
};
use log::{debug, info, warn};
use nix::sys::signal::{SigSet, Signal};

const ECHO_CHUNK: usize = 4096;
const REPORT_EVERY: Duration = Duration::from_secs(5);

struct EchoHooks {
    idle_timeout: Option<Duration>,
    max_conns: usize,
    /// Registered connections as of the last tick, plus accepts since.
    live: usize,
    echoed: u64,
    last_report: Instant,
}

impl EchoHooks {
    fn new(idle_timeout: Option<Duration>, max_conns: usize) -> Self {
        Self {
            idle_timeout,
            max_conns,
            live: 0,
            echoed: 0,
            last_report: Instant::now(),
        }
    }
}

impl ReactorHooks for EchoHooks {
    fn on_accept(&mut self, listener: ChannelId, accepted: Accepted) -> Option<Box<dyn Channel>> {
        if self.live >= self.max_conns {
            warn!("listener {}: at {} connections, dropping {}", listener, self.live, accepted.peer);
            return None;
        }
        self.live += 1;
        debug!("accepted {}", accepted.peer);
        match self.idle_timeout {
            Some(idle) => Some(Box::new(ExpiringChannel::new(accepted.channel, idle))),
            None => Some(accepted.channel),
        }
    }

    fn on_readable(&mut self, id: ChannelId, channel: &mut dyn Channel) {
        while channel.buffered() > 0 {
            let data = match channel.read(ECHO_CHUNK, ReadOpts::up_to()) {
                Ok(data) => data,
                Err(e) => {
                    debug!("{}: read: {}", id, e);
                    return;
                }
            };
            if let Err(e) = channel.write(&data) {
                debug!("{}: write: {}", id, e);
                return;
            }
            self.echoed += data.len() as u64;
        }
    }

    fn on_closed(&mut self, id: ChannelId, _channel: &mut dyn Channel, reason: CloseReason) {
        debug!("{} closed: {:?}", id, reason);
    }

    fn on_tick(&mut self, stats: &ReactorStats) {
        // The reactor's own count; accepts that never got registered drop out here.
        self.live = stats.channels as usize;
        if self.last_report.elapsed() >= REPORT_EVERY {
            self.last_report = Instant::now();
            info!("live={} echoed={}B {}", self.live, self.echoed, stats);
        }
    }

    fn on_cleanup(&mut self) {
        eprintln!("gvnet-echo: echoed {} bytes", self.echoed);
    }
}

/// Block SIGINT/SIGTERM in this thread (and every thread it spawns later),
/// then wait for them on a dedicated thread that stops the reactor.
fn watch_signals(stop: StopHandle) -> io::Result<()> {
    let mut mask = SigSet::empty();
    mask.add(Signal::SIGINT);
    mask.add(Signal::SIGTERM);
    mask.thread_block()?;
    thread::Builder::new()
        .name("gvnet-signals".into())
        .spawn(move || {
            match mask.wait() {
                Ok(sig) => info!("received {:?}, stopping", sig),
                Err(e) => warn!("signal wait failed: {}, stopping", e),
            }
            stop.stop();
        })?;
    Ok(())
}

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();
    let port: u16 = args.get(1).and_then(|s| s.parse().ok()).unwrap_or(9999);
    let max_conns: usize = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(1024);

    let config = ReactorConfig::from_env();
    config.print();

    let listener = match ServerChannel::bind(("0.0.0.0", port)) {
        Ok(l) => l,
        Err(e) => {
            eprintln!("gvnet-echo: bind port {}: {}", port, e);
            std::process::exit(1);
        }
    };

    let hooks = EchoHooks::new(config.idle_timeout, max_conns);
    let mut reactor = match Reactor::with_hooks(config, hooks) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("gvnet-echo: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = watch_signals(reactor.stop_handle()) {
        eprintln!("gvnet-echo: signal setup: {}", e);
        std::process::exit(1);
    }

    if let Err(e) = reactor.listen(Box::new(listener)) {
        eprintln!("gvnet-echo: listen: {}", e);
        std::process::exit(1);
    }

    eprintln!("gvnet-echo: listening on 0.0.0.0:{} (max {} connections)", port, max_conns);
    reactor.run();

    eprintln!("\ngvnet-echo: shutting down...");
    for mut listener in reactor.take_listeners() {
        listener.close();
    }
    eprintln!("gvnet-echo: {}", reactor.stats());
    eprintln!("gvnet-echo: done.");
}
