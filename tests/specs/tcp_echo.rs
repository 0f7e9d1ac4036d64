// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! TCP ping/pong: accept, connect, echo, re-armed reads on both sides.

use parking_lot::Mutex;
use std::sync::Arc;
use yn_core::GBuffer;
use yn_yev::YevLoop;

const URL: &str = "tcp://127.0.0.1:22122";
const ROUNDS: u32 = 2;

#[derive(Default)]
struct Counters {
    server_rx: u32,
    server_tx: u32,
    client_rx: u32,
    client_tx: u32,
}

#[tokio::test]
async fn ping_pong_round_trips() {
    let mut yev = YevLoop::new();
    let counters = Arc::new(Mutex::new(Counters::default()));
    let last_payload = Arc::new(Mutex::new(Vec::<u8>::new()));

    // server: echo every read back, then re-arm the read
    let counters_srv = counters.clone();
    let accept = yev
        .create_accept(URL, move |yev, ev| {
            if ev.is_stopped() || ev.result < 0 {
                return;
            }
            let conn = ev.conn.unwrap();
            let gbuf = GBuffer::create(8 * 1024, 8 * 1024).unwrap();
            let counters_rd = counters_srv.clone();
            let read = yev.create_read(conn, gbuf, move |yev, rev| {
                if rev.is_stopped() || rev.result <= 0 {
                    return;
                }
                counters_rd.lock().server_rx += 1;
                let conn = rev.conn.unwrap();
                let echo = GBuffer::create(8 * 1024, 8 * 1024).unwrap();
                rev.gbuf.as_ref().unwrap().with_readable(|b| echo.append(b));
                let counters_wr = counters_rd.clone();
                let write = yev.create_write(conn, echo, move |_yev, _wev| {
                    counters_wr.lock().server_tx += 1;
                });
                let _ = yev.start(write);
                // re-arm the server read
                rev.gbuf.as_ref().unwrap().reset_wr();
                let _ = yev.start(rev.id);
            });
            let _ = yev.start(read);
        })
        .unwrap();
    yev.start(accept).unwrap();

    // client: send PING, read the echo, repeat for ROUNDS
    let counters_cli = counters.clone();
    let last_cli = last_payload.clone();
    let connect = yev
        .create_connect(URL, move |yev, ev| {
            assert!(ev.result >= 0, "connect failed: {}", ev.result);
            let conn = ev.conn.unwrap();

            let out = GBuffer::create(8 * 1024, 8 * 1024).unwrap();
            out.append(b"PING\n");
            let read_started = Arc::new(Mutex::new(false));
            let counters_w = counters_cli.clone();
            let last_w = last_cli.clone();
            let write = yev.create_write(conn, out, move |yev, wev| {
                assert_eq!(wev.result, 5, "whole ping written");
                counters_w.lock().client_tx += 1;
                {
                    let mut started = read_started.lock();
                    if *started {
                        return; // the echo read re-arms itself
                    }
                    *started = true;
                }
                let gbuf = GBuffer::create(8 * 1024, 8 * 1024).unwrap();
                let counters_r = counters_w.clone();
                let last_r = last_w.clone();
                let write_id = wev.id;
                let out_buf = wev.gbuf.clone().unwrap();
                let read = yev.create_read(wev.conn.unwrap(), gbuf, move |yev, rev| {
                    if rev.result <= 0 {
                        return;
                    }
                    let mut c = counters_r.lock();
                    c.client_rx += 1;
                    let payload = rev.gbuf.as_ref().unwrap().with_readable(|b| b.to_vec());
                    *last_r.lock() = payload;
                    if c.client_rx == ROUNDS {
                        drop(c);
                        yev.stop_loop();
                        return;
                    }
                    drop(c);
                    // next round: refill the write buffer and go again
                    out_buf.reset_wr();
                    out_buf.append(b"PING\n");
                    let _ = yev.start(write_id);
                    rev.gbuf.as_ref().unwrap().reset_wr();
                    let _ = yev.start(rev.id);
                });
                let _ = yev.start(read);
            });
            let _ = yev.start(write);
        })
        .unwrap();
    yev.start(connect).unwrap();

    yev.run().await;

    let c = counters.lock();
    assert_eq!(c.client_tx, ROUNDS);
    assert_eq!(c.client_rx, ROUNDS);
    assert_eq!(c.server_rx, ROUNDS);
    assert_eq!(c.server_tx, ROUNDS);
    assert_eq!(last_payload.lock().as_slice(), b"PING\n");
}
