//! Scripted debuggee shared by the session tests.
//!
//! [`FakeDebuggee`] plays the debuggee side of an in-memory transport: it
//! records every request the session writes and lets a test script replies.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use transport::io::InMemoryWriter;
use transport::{
    Frame, InMemoryTransport, PollResult, Reader, Request, Response, Transport, Writer,
};

use debugger::{Session, SessionConfig};

struct Outbound {
    writer: Writer<InMemoryWriter>,
    raw: InMemoryWriter,
}

type SharedOutbound = Arc<Mutex<Option<Outbound>>>;

fn send_to(outbound: &SharedOutbound, response: Response) -> eyre::Result<()> {
    let message = response.into_message()?;
    let mut outbound = outbound
        .lock()
        .map_err(|_| eyre::eyre!("outbound lock poisoned"))?;
    let outbound = outbound
        .as_mut()
        .ok_or_else(|| eyre::eyre!("fake debuggee disconnected"))?;
    outbound.writer.send(&message)?;
    Ok(())
}

/// Scripted debuggee on the far end of an in-memory transport
pub struct FakeDebuggee {
    outbound: SharedOutbound,
    requests: crossbeam_channel::Receiver<Request>,
    auto_pong: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
}

impl FakeDebuggee {
    pub fn new(transport: InMemoryTransport) -> eyre::Result<Self> {
        let (input, output) = transport.split()?;
        let outbound: SharedOutbound = Arc::new(Mutex::new(Some(Outbound {
            raw: output.clone(),
            writer: Writer::new(output),
        })));
        let auto_pong = Arc::new(AtomicBool::new(true));
        let stop = Arc::new(AtomicBool::new(false));
        let (tx, requests) = crossbeam_channel::unbounded();

        let reader = {
            let outbound = Arc::clone(&outbound);
            let auto_pong = Arc::clone(&auto_pong);
            let stop = Arc::clone(&stop);
            thread::Builder::new()
                .name("fake-debuggee".to_string())
                .spawn(move || {
                    let mut reader = Reader::new(input);
                    while !stop.load(Ordering::SeqCst) {
                        let frame = match reader.try_poll_frame(Duration::from_millis(5)) {
                            Ok(PollResult::Frame(frame)) => frame,
                            Ok(PollResult::Timeout) => continue,
                            Ok(PollResult::Closed) => break,
                            Err(e) => {
                                tracing::warn!(error = %e, "fake debuggee read error");
                                break;
                            }
                        };
                        let Frame::Message(message) = frame else {
                            continue;
                        };
                        let request = match Request::try_from(message) {
                            Ok(request) => request,
                            Err(e) => {
                                tracing::warn!(error = %e, "fake debuggee got unparseable request");
                                continue;
                            }
                        };
                        tracing::debug!(?request, "fake debuggee received request");
                        if request == Request::Ping && auto_pong.load(Ordering::SeqCst) {
                            let _ = send_to(&outbound, Response::Ok);
                        }
                        if tx.send(request).is_err() {
                            break;
                        }
                    }
                })?
        };

        Ok(Self {
            outbound,
            requests,
            auto_pong,
            stop,
            reader: Some(reader),
        })
    }

    /// A session wired to a fresh fake debuggee.
    pub fn pair(config: SessionConfig) -> eyre::Result<(Session, FakeDebuggee)> {
        let (ide, debuggee) = InMemoryTransport::pair();
        let debuggee = FakeDebuggee::new(debuggee)?;
        let session = Session::with_transport(ide, config)?;
        Ok((session, debuggee))
    }

    pub fn send(&self, response: Response) -> eyre::Result<()> {
        send_to(&self.outbound, response)
    }

    /// Write bytes as they are, e.g. program output or broken frames.
    pub fn send_raw(&self, bytes: &[u8]) -> eyre::Result<()> {
        let mut outbound = self
            .outbound
            .lock()
            .map_err(|_| eyre::eyre!("outbound lock poisoned"))?;
        let outbound = outbound
            .as_mut()
            .ok_or_else(|| eyre::eyre!("fake debuggee disconnected"))?;
        outbound.raw.write_all(bytes)?;
        Ok(())
    }

    /// Wait for the next request the session wrote.
    pub fn expect_request(&self, timeout: Duration) -> eyre::Result<Request> {
        self.requests
            .recv_timeout(timeout)
            .map_err(|e| eyre::eyre!("no request within {timeout:?}: {e}"))
    }

    pub fn try_request(&self) -> Option<Request> {
        self.requests.try_recv().ok()
    }

    /// Whether liveness probes are answered automatically.
    pub fn set_auto_pong(&self, enabled: bool) {
        self.auto_pong.store(enabled, Ordering::SeqCst);
    }

    /// Close the debuggee's side of the connection.
    pub fn disconnect(&self) {
        if let Ok(mut outbound) = self.outbound.lock() {
            outbound.take();
        }
    }
}

impl Drop for FakeDebuggee {
    fn drop(&mut self) {
        self.disconnect();
        self.stop.store(true, Ordering::SeqCst);
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
    }
}
