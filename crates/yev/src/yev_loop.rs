// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The completion reactor.
//!
//! Each started event runs as a tokio task that performs the operation and
//! queues a completion message; [`YevLoop::run`] is the single consumer that
//! dispatches completions, in arrival order, into the event callbacks.
//! Cancellation (`stop`) resolves to exactly one completion with the
//! STOPPED flag; destroying an event is legal only once it is out of the
//! ring.

use crate::event::{
    ConnId, YevCallback, YevError, YevEvent, YevType, RESULT_CANCELED, YEV_STOPPED,
    YEV_TIMER_PERIODIC,
};
use std::collections::HashMap;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};
use yn_core::error::MsgSet;
use yn_core::helpers::parse_url;
use yn_core::list::Registry;
use yn_core::GBuffer;

/// Handle to an event entry in the loop.
pub type YevId = yn_core::RegistryId;

enum EntryKind {
    Timer { delay_ms: u64 },
    Accept { url: String },
    Connect { url: String },
    Read { conn: ConnId, gbuf: GBuffer },
    Write { conn: ConnId, gbuf: GBuffer },
}

impl EntryKind {
    fn tag(&self) -> YevType {
        match self {
            EntryKind::Timer { .. } => YevType::Timer,
            EntryKind::Accept { .. } => YevType::Accept,
            EntryKind::Connect { .. } => YevType::Connect,
            EntryKind::Read { .. } => YevType::Read,
            EntryKind::Write { .. } => YevType::Write,
        }
    }
}

struct Entry {
    kind: EntryKind,
    callback: Option<YevCallback>,
    in_ring: bool,
    stopping: bool,
    periodic: bool,
    flags: u32,
    token: Option<CancellationToken>,
}

enum Payload {
    None,
    NewConn { read: OwnedReadHalf, write: OwnedWriteHalf },
    ReadDone { conn: ConnId, read: OwnedReadHalf },
    WriteDone { conn: ConnId, write: OwnedWriteHalf },
}

enum Msg {
    Complete { id: YevId, result: i32, stopped: bool, payload: Payload },
    StopLoop,
}

struct Conn {
    read: Option<OwnedReadHalf>,
    write: Option<OwnedWriteHalf>,
}

/// Cloneable control handle: stops the loop from any task.
#[derive(Clone)]
pub struct YevHandle {
    tx: mpsc::UnboundedSender<Msg>,
}

impl YevHandle {
    pub fn stop_loop(&self) {
        let _ = self.tx.send(Msg::StopLoop);
    }
}

/// The event loop.
pub struct YevLoop {
    entries: Registry<Entry>,
    conns: HashMap<u64, Conn>,
    next_conn: u64,
    tx: mpsc::UnboundedSender<Msg>,
    rx: mpsc::UnboundedReceiver<Msg>,
    running: bool,
}

impl Default for YevLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl YevLoop {
    pub fn new() -> YevLoop {
        let (tx, rx) = mpsc::unbounded_channel();
        YevLoop {
            entries: Registry::new(),
            conns: HashMap::new(),
            next_conn: 1,
            tx,
            rx,
            running: false,
        }
    }

    pub fn handle(&self) -> YevHandle {
        YevHandle { tx: self.tx.clone() }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    // ------------------------------------------------------------------
    //  Event creation
    // ------------------------------------------------------------------

    pub fn create_timer(
        &mut self,
        callback: impl FnMut(&mut YevLoop, &YevEvent) + Send + 'static,
    ) -> YevId {
        self.add_entry(EntryKind::Timer { delay_ms: 0 }, Box::new(callback))
    }

    /// Create an accept event bound to `tcp://host:port`. The listener
    /// re-arms itself: every incoming connection is one completion.
    pub fn create_accept(
        &mut self,
        url: &str,
        callback: impl FnMut(&mut YevLoop, &YevEvent) + Send + 'static,
    ) -> Result<YevId, YevError> {
        parse_url(url).map_err(|e| YevError::Parameter(e.to_string()))?;
        Ok(self.add_entry(EntryKind::Accept { url: url.to_string() }, Box::new(callback)))
    }

    /// Create a connect event to `tcp://host:port`.
    pub fn create_connect(
        &mut self,
        url: &str,
        callback: impl FnMut(&mut YevLoop, &YevEvent) + Send + 'static,
    ) -> Result<YevId, YevError> {
        parse_url(url).map_err(|e| YevError::Parameter(e.to_string()))?;
        Ok(self.add_entry(EntryKind::Connect { url: url.to_string() }, Box::new(callback)))
    }

    /// Create a read event: one `start` reads once into the buffer's free
    /// space. Re-arm by calling `start` again (after `reset_wr`).
    pub fn create_read(
        &mut self,
        conn: ConnId,
        gbuf: GBuffer,
        callback: impl FnMut(&mut YevLoop, &YevEvent) + Send + 'static,
    ) -> YevId {
        self.add_entry(EntryKind::Read { conn, gbuf }, Box::new(callback))
    }

    /// Create a write event: one `start` drains the buffer's readable
    /// region (short writes are retried internally).
    pub fn create_write(
        &mut self,
        conn: ConnId,
        gbuf: GBuffer,
        callback: impl FnMut(&mut YevLoop, &YevEvent) + Send + 'static,
    ) -> YevId {
        self.add_entry(EntryKind::Write { conn, gbuf }, Box::new(callback))
    }

    fn add_entry(&mut self, kind: EntryKind, callback: YevCallback) -> YevId {
        self.entries.add(Entry {
            kind,
            callback: Some(callback),
            in_ring: false,
            stopping: false,
            periodic: false,
            flags: 0,
            token: None,
        })
    }

    // ------------------------------------------------------------------
    //  Start / stop / destroy
    // ------------------------------------------------------------------

    /// Arm a timer. `periodic` re-fires every `delay_ms` until stopped.
    pub fn timer_start(&mut self, id: YevId, delay_ms: u64, periodic: bool) -> Result<(), YevError> {
        {
            let entry = self
                .entries
                .get_mut(id)
                .ok_or_else(|| YevError::Parameter("unknown event".to_string()))?;
            match &mut entry.kind {
                EntryKind::Timer { delay_ms: d } => *d = delay_ms,
                _ => return Err(YevError::Parameter("not a timer event".to_string())),
            }
            entry.periodic = periodic;
        }
        self.start(id)
    }

    /// Submit an event. Fails while it is already in the ring.
    pub fn start(&mut self, id: YevId) -> Result<(), YevError> {
        enum Plan {
            Timer { delay_ms: u64 },
            Accept { addr: String },
            Connect { addr: String },
            Read { conn: ConnId, gbuf: GBuffer },
            Write { conn: ConnId, gbuf: GBuffer },
        }

        let token = CancellationToken::new();
        let (plan, periodic) = {
            let entry = self
                .entries
                .get_mut(id)
                .ok_or_else(|| YevError::Parameter("unknown event".to_string()))?;
            if entry.in_ring {
                return Err(YevError::Operational("event already in ring".to_string()));
            }
            let plan = match &entry.kind {
                EntryKind::Timer { delay_ms } => Plan::Timer { delay_ms: *delay_ms },
                EntryKind::Accept { url } => Plan::Accept { addr: url_to_addr(url)? },
                EntryKind::Connect { url } => Plan::Connect { addr: url_to_addr(url)? },
                EntryKind::Read { conn, gbuf } => {
                    Plan::Read { conn: *conn, gbuf: gbuf.clone() }
                }
                EntryKind::Write { conn, gbuf } => {
                    Plan::Write { conn: *conn, gbuf: gbuf.clone() }
                }
            };
            entry.in_ring = true;
            entry.stopping = false;
            entry.flags &= !YEV_STOPPED;
            entry.token = Some(token.clone());
            (plan, entry.periodic)
        };
        let tx = self.tx.clone();

        match plan {
            Plan::Timer { delay_ms } => {
                let delay = Duration::from_millis(delay_ms);
                tokio::spawn(async move {
                    if periodic {
                        let mut interval = tokio::time::interval(delay.max(Duration::from_millis(1)));
                        interval.tick().await; // the immediate tick
                        loop {
                            tokio::select! {
                                _ = token.cancelled() => {
                                    let _ = tx.send(Msg::Complete {
                                        id, result: RESULT_CANCELED, stopped: true, payload: Payload::None,
                                    });
                                    break;
                                }
                                _ = interval.tick() => {
                                    let _ = tx.send(Msg::Complete {
                                        id, result: 0, stopped: false, payload: Payload::None,
                                    });
                                }
                            }
                        }
                    } else {
                        tokio::select! {
                            _ = token.cancelled() => {
                                let _ = tx.send(Msg::Complete {
                                    id, result: RESULT_CANCELED, stopped: true, payload: Payload::None,
                                });
                            }
                            _ = tokio::time::sleep(delay) => {
                                let _ = tx.send(Msg::Complete {
                                    id, result: 0, stopped: false, payload: Payload::None,
                                });
                            }
                        }
                    }
                });
            }
            Plan::Accept { addr } => {
                tokio::spawn(async move {
                    let listener = match TcpListener::bind(&addr).await {
                        Ok(l) => l,
                        Err(e) => {
                            error!(msgset = %MsgSet::SystemError, addr, "bind failed: {e}");
                            let _ = tx.send(Msg::Complete {
                                id,
                                result: io_result(&e),
                                stopped: false,
                                payload: Payload::None,
                            });
                            return;
                        }
                    };
                    loop {
                        tokio::select! {
                            _ = token.cancelled() => {
                                let _ = tx.send(Msg::Complete {
                                    id, result: RESULT_CANCELED, stopped: true, payload: Payload::None,
                                });
                                break;
                            }
                            accepted = listener.accept() => match accepted {
                                Ok((stream, _peer)) => {
                                    let (read, write) = stream.into_split();
                                    let _ = tx.send(Msg::Complete {
                                        id, result: 0, stopped: false,
                                        payload: Payload::NewConn { read, write },
                                    });
                                }
                                Err(e) => {
                                    let _ = tx.send(Msg::Complete {
                                        id, result: io_result(&e), stopped: false, payload: Payload::None,
                                    });
                                    break;
                                }
                            }
                        }
                    }
                });
            }
            Plan::Connect { addr } => {
                tokio::spawn(async move {
                    tokio::select! {
                        _ = token.cancelled() => {
                            let _ = tx.send(Msg::Complete {
                                id, result: RESULT_CANCELED, stopped: true, payload: Payload::None,
                            });
                        }
                        connected = TcpStream::connect(&addr) => match connected {
                            Ok(stream) => {
                                let (read, write) = stream.into_split();
                                let _ = tx.send(Msg::Complete {
                                    id, result: 0, stopped: false,
                                    payload: Payload::NewConn { read, write },
                                });
                            }
                            Err(e) => {
                                debug!(addr, "connect failed: {e}");
                                let _ = tx.send(Msg::Complete {
                                    id, result: io_result(&e), stopped: false, payload: Payload::None,
                                });
                            }
                        }
                    }
                });
            }
            Plan::Read { conn, gbuf } => {
                let mut read_half = match self.checkout_read(conn) {
                    Ok(h) => h,
                    Err(e) => {
                        if let Some(entry) = self.entries.get_mut(id) {
                            entry.in_ring = false;
                        }
                        return Err(e);
                    }
                };
                tokio::spawn(async move {
                    let mut buf = vec![0u8; gbuf.freebytes().max(1)];
                    let done = tokio::select! {
                        _ = token.cancelled() => None,
                        done = read_half.read(&mut buf) => Some(done),
                    };
                    let (result, stopped) = match done {
                        None => (RESULT_CANCELED, true),
                        Some(Ok(n)) => {
                            gbuf.append(&buf[..n]);
                            (n as i32, false)
                        }
                        Some(Err(ref e)) => (io_result(e), false),
                    };
                    let _ = tx.send(Msg::Complete {
                        id,
                        result,
                        stopped,
                        payload: Payload::ReadDone { conn, read: read_half },
                    });
                });
            }
            Plan::Write { conn, gbuf } => {
                let mut write_half = match self.checkout_write(conn) {
                    Ok(h) => h,
                    Err(e) => {
                        if let Some(entry) = self.entries.get_mut(id) {
                            entry.in_ring = false;
                        }
                        return Err(e);
                    }
                };
                tokio::spawn(async move {
                    let bytes = gbuf.with_readable(|b| b.to_vec());
                    let done = tokio::select! {
                        _ = token.cancelled() => None,
                        done = write_half.write_all(&bytes) => Some(done),
                    };
                    let (result, stopped) = match done {
                        None => (RESULT_CANCELED, true),
                        Some(Ok(())) => {
                            // the written region is consumed
                            let _ = gbuf.get(bytes.len());
                            (bytes.len() as i32, false)
                        }
                        Some(Err(ref e)) => (io_result(e), false),
                    };
                    let _ = tx.send(Msg::Complete {
                        id,
                        result,
                        stopped,
                        payload: Payload::WriteDone { conn, write: write_half },
                    });
                });
            }
        }
        Ok(())
    }

    /// Cancel an event. An in-flight submission resolves to exactly one
    /// STOPPED completion; an idle event gets a synthesized one. Repeated
    /// stops are idempotent.
    pub fn stop(&mut self, id: YevId) -> Result<(), YevError> {
        let entry = self
            .entries
            .get_mut(id)
            .ok_or_else(|| YevError::Parameter("unknown event".to_string()))?;
        if entry.stopping {
            return Ok(());
        }
        entry.stopping = true;
        if entry.in_ring {
            if let Some(token) = &entry.token {
                token.cancel();
            }
        } else {
            let _ = self.tx.send(Msg::Complete {
                id,
                result: RESULT_CANCELED,
                stopped: true,
                payload: Payload::None,
            });
        }
        Ok(())
    }

    /// Free an event entry. Legal only once it is out of the ring (its
    /// STOPPED completion consumed).
    pub fn destroy(&mut self, id: YevId) -> Result<(), YevError> {
        let entry = self
            .entries
            .get(id)
            .ok_or_else(|| YevError::Parameter("unknown event".to_string()))?;
        if entry.in_ring {
            return Err(YevError::Operational(
                "event still in ring, stop it and consume the STOPPED completion".to_string(),
            ));
        }
        self.entries.remove(id);
        Ok(())
    }

    /// Drop a connection, closing both halves.
    pub fn close_conn(&mut self, conn: ConnId) {
        self.conns.remove(&conn.0);
    }

    // ------------------------------------------------------------------
    //  The loop
    // ------------------------------------------------------------------

    /// Ask the running loop to exit. In-flight events are cancelled and
    /// their STOPPED completions drained before `run` returns.
    pub fn stop_loop(&mut self) {
        self.running = false;
        let _ = self.tx.send(Msg::StopLoop);
    }

    /// Consume completions until [`stop_loop`](Self::stop_loop) (or a
    /// [`YevHandle`]) breaks the loop, then cancel in-flight events and
    /// drain their STOPPED completions.
    pub async fn run(&mut self) {
        self.running = true;
        while self.running {
            let msg = self.rx.recv().await;
            match msg {
                Some(msg) => self.dispatch(msg),
                None => break,
            }
        }
        // cancel whatever is still flying and drain
        let in_flight: Vec<YevId> = self
            .entries
            .ids()
            .into_iter()
            .filter(|id| self.entries.get(*id).map(|e| e.in_ring).unwrap_or(false))
            .collect();
        for id in in_flight {
            let _ = self.stop(id);
        }
        while self.any_in_ring() {
            let msg = self.rx.recv().await;
            match msg {
                Some(msg) => self.dispatch(msg),
                None => break,
            }
        }
    }

    fn any_in_ring(&self) -> bool {
        self.entries.iter().any(|e| e.in_ring)
    }

    fn dispatch(&mut self, msg: Msg) {
        let Msg::Complete { id, result, stopped, payload } = msg else {
            self.running = false;
            return;
        };

        // connection bookkeeping happens before the callback so it can use
        // the new conn immediately
        let new_conn = match payload {
            Payload::None => None,
            Payload::NewConn { read, write } => Some(self.register_conn(read, write)),
            Payload::ReadDone { conn, read } => {
                if let Some(c) = self.conns.get_mut(&conn.0) {
                    c.read = Some(read);
                }
                None
            }
            Payload::WriteDone { conn, write } => {
                if let Some(c) = self.conns.get_mut(&conn.0) {
                    c.write = Some(write);
                }
                None
            }
        };

        let Some(entry) = self.entries.get_mut(id) else {
            return; // destroyed while the completion was queued
        };
        let mut stopped = stopped;
        let mut result = result;
        if stopped {
            // a task's STOPPED arriving after a raced completion already
            // collapsed into one is a duplicate
            if !entry.stopping {
                return;
            }
        } else {
            // completion queued for an entry already out of the ring
            if !entry.in_ring {
                return;
            }
            // stop raced with an in-flight completion: the contract is one
            // STOPPED completion, so this one becomes it
            if entry.stopping {
                stopped = true;
                result = RESULT_CANCELED;
            }
        }
        if stopped {
            entry.flags |= YEV_STOPPED;
            entry.in_ring = false;
            entry.stopping = false;
        } else if result < 0 {
            entry.in_ring = false;
        } else if !entry.periodic && !matches!(entry.kind, EntryKind::Accept { .. }) {
            entry.in_ring = false;
        }
        let kind = entry.kind.tag();
        let conn = new_conn.or(match &entry.kind {
            EntryKind::Read { conn, .. } | EntryKind::Write { conn, .. } => Some(*conn),
            _ => None,
        });
        let gbuf = match &entry.kind {
            EntryKind::Read { gbuf, .. } | EntryKind::Write { gbuf, .. } => Some(gbuf.clone()),
            _ => None,
        };
        let mut flags = entry.flags;
        if entry.periodic {
            flags |= YEV_TIMER_PERIODIC;
        }
        let callback = entry.callback.take();

        let ev = YevEvent { id, kind, result, flags, conn, gbuf };
        if let Some(mut cb) = callback {
            cb(self, &ev);
            // the callback may have destroyed the entry
            if let Some(entry) = self.entries.get_mut(id) {
                if entry.callback.is_none() {
                    entry.callback = Some(cb);
                }
            }
        }
    }

    fn register_conn(&mut self, read: OwnedReadHalf, write: OwnedWriteHalf) -> ConnId {
        let id = self.next_conn;
        self.next_conn += 1;
        self.conns.insert(id, Conn { read: Some(read), write: Some(write) });
        ConnId(id)
    }

    fn checkout_read(&mut self, conn: ConnId) -> Result<OwnedReadHalf, YevError> {
        let c = self
            .conns
            .get_mut(&conn.0)
            .ok_or_else(|| YevError::Parameter("unknown conn".to_string()))?;
        c.read
            .take()
            .ok_or_else(|| YevError::Operational("read already pending on conn".to_string()))
    }

    fn checkout_write(&mut self, conn: ConnId) -> Result<OwnedWriteHalf, YevError> {
        let c = self
            .conns
            .get_mut(&conn.0)
            .ok_or_else(|| YevError::Parameter("unknown conn".to_string()))?;
        c.write
            .take()
            .ok_or_else(|| YevError::Operational("write already pending on conn".to_string()))
    }
}

fn url_to_addr(url: &str) -> Result<String, YevError> {
    let parts = parse_url(url).map_err(|e| YevError::Parameter(e.to_string()))?;
    Ok(format!("{}:{}", parts.host, parts.port))
}

fn io_result(e: &std::io::Error) -> i32 {
    -e.raw_os_error().unwrap_or(1)
}

/// Install SIGINT/SIGQUIT handlers that stop the loop through `handle`.
pub fn install_signal_handlers(handle: YevHandle) -> Result<(), YevError> {
    use tokio::signal::unix::{signal, SignalKind};
    let mut interrupt =
        signal(SignalKind::interrupt()).map_err(|e| YevError::System(e.to_string()))?;
    let mut quit = signal(SignalKind::quit()).map_err(|e| YevError::System(e.to_string()))?;
    tokio::spawn(async move {
        tokio::select! {
            _ = interrupt.recv() => {}
            _ = quit.recv() => {}
        }
        debug!("signal received, stopping loop");
        handle.stop_loop();
    });
    Ok(())
}

#[cfg(test)]
#[path = "yev_loop_tests.rs"]
mod tests;
