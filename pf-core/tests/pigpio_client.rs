/*
 * pigpiod client tests
 *
 * Runs the client against an in-process fake daemon speaking the socket
 * protocol, and checks the frames it receives.
 */

use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use pf_core::{DutyActuator, ErrorKind, PigpioActuator};

const HWVER: u32 = 17;
const HP: u32 = 86;

#[derive(Debug, PartialEq)]
struct Frame {
    cmd: u32,
    p1: u32,
    p2: u32,
    ext: Vec<u8>,
}

/// Fake pigpiod: answers every command with `reply(cmd)` and reports frames
fn spawn_fake_daemon(reply: fn(u32) -> i32) -> (u16, mpsc::Receiver<Frame>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let (tx, rx) = mpsc::channel();

    thread::spawn(move || {
        let (mut conn, _) = listener.accept().unwrap();
        loop {
            let mut header = [0u8; 16];
            if conn.read_exact(&mut header).is_err() {
                return;
            }
            let word = |i: usize| u32::from_le_bytes(header[i * 4..i * 4 + 4].try_into().unwrap());
            let (cmd, p1, p2, p3) = (word(0), word(1), word(2), word(3));
            let mut ext = vec![0u8; p3 as usize];
            if conn.read_exact(&mut ext).is_err() {
                return;
            }

            let mut response = Vec::new();
            response.extend_from_slice(&cmd.to_le_bytes());
            response.extend_from_slice(&p1.to_le_bytes());
            response.extend_from_slice(&p2.to_le_bytes());
            response.extend_from_slice(&reply(cmd).to_le_bytes());
            if conn.write_all(&response).is_err() {
                return;
            }
            let _ = tx.send(Frame { cmd, p1, p2, ext });
        }
    });

    (port, rx)
}

fn healthy(cmd: u32) -> i32 {
    if cmd == HWVER {
        0xd03114
    } else {
        0
    }
}

fn rejects_pwm(cmd: u32) -> i32 {
    if cmd == HP {
        -95
    } else {
        0xd03114
    }
}

#[test]
fn test_connect_handshake_and_set_duty() {
    let (port, frames) = spawn_fake_daemon(healthy);
    let mut pwm = PigpioActuator::connect("127.0.0.1", port, Duration::from_secs(2)).unwrap();
    assert_eq!(pwm.hardware_revision(), 0xd03114);

    let handshake = frames.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(handshake.cmd, HWVER);

    pwm.set_duty(18, 25_000, 70.0).unwrap();
    let frame = frames.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(
        frame,
        Frame {
            cmd: HP,
            p1: 18,
            p2: 25_000,
            ext: 700_000u32.to_le_bytes().to_vec(),
        }
    );

    // Out-of-range requests are clamped before they hit the wire
    pwm.set_duty(18, 25_000, 250.0).unwrap();
    let frame = frames.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(frame.ext, 1_000_000u32.to_le_bytes().to_vec());

    pwm.release().unwrap();
    assert_eq!(
        pwm.set_duty(18, 25_000, 0.0).unwrap_err().kind(),
        ErrorKind::Actuation
    );
}

#[test]
fn test_daemon_error_is_actuation_error() {
    let (port, _frames) = spawn_fake_daemon(rejects_pwm);
    let mut pwm = PigpioActuator::connect("127.0.0.1", port, Duration::from_secs(2)).unwrap();

    let err = pwm.set_duty(17, 50, 50.0).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Actuation);
    assert!(err.to_string().contains("PI_NOT_HPWM_GPIO"));
}

#[test]
fn test_nothing_listening_is_connection_error() {
    // Bind then drop to get a port that is very likely closed
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let err = PigpioActuator::connect("127.0.0.1", port, Duration::from_millis(500))
        .err()
        .unwrap();
    assert_eq!(err.kind(), ErrorKind::Connection);
    assert!(err.to_string().contains("pigpiod"));
}
