//! Socket-level tests for the `suppaftp` connector.
//!
//! A minimal FTP server on loopback accepts the passive data connection for
//! `RETR` and then never sends a byte. The transfer must fail within the
//! configured read timeout instead of hanging the worker.

use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use station_downloader_core::ftp::{ConnectionManager, ConnectionSettings, SuppaConnector};
use station_downloader_core::{DownloadError, ServerProfile};
use tempfile::TempDir;

/// Serves one control connection; data connections are accepted and held open.
fn serve_control(control: TcpStream) {
    let Ok(reader) = control.try_clone() else {
        return;
    };
    let mut reader = BufReader::new(reader);
    let mut out = control;
    let mut passive: Option<TcpListener> = None;
    let mut held = Vec::new();

    if out.write_all(b"220 stalled server ready\r\n").is_err() {
        return;
    }
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line) {
            Ok(0) | Err(_) => return,
            Ok(_) => {}
        }
        let command = line.split_whitespace().next().unwrap_or_default().to_ascii_uppercase();
        let reply = match command.as_str() {
            "USER" => "331 password required\r\n".to_string(),
            "PASS" => "230 logged in\r\n".to_string(),
            "TYPE" => "200 type set\r\n".to_string(),
            "CWD" => "250 directory changed\r\n".to_string(),
            "PASV" => {
                let listener = TcpListener::bind("127.0.0.1:0").unwrap();
                let port = listener.local_addr().unwrap().port();
                passive = Some(listener);
                format!(
                    "227 Entering Passive Mode (127,0,0,1,{},{})\r\n",
                    port >> 8,
                    port & 0xff
                )
            }
            "RETR" => {
                if out.write_all(b"150 opening data connection\r\n").is_err() {
                    return;
                }
                if let Some(listener) = passive.take()
                    && let Ok((data, _)) = listener.accept()
                {
                    held.push(data);
                }
                continue;
            }
            "QUIT" => {
                let _ = out.write_all(b"221 bye\r\n");
                return;
            }
            _ => "502 command not implemented\r\n".to_string(),
        };
        if out.write_all(reply.as_bytes()).is_err() {
            return;
        }
    }
}

/// Starts the server and returns its control port, or `None` when loopback
/// sockets are unavailable.
fn start_stalled_server() -> Option<u16> {
    let listener = TcpListener::bind("127.0.0.1:0").ok()?;
    let port = listener.local_addr().ok()?.port();
    thread::spawn(move || {
        for control in listener.incoming().flatten() {
            thread::spawn(move || serve_control(control));
        }
    });
    Some(port)
}

#[test]
fn test_silent_data_channel_fails_within_read_timeout() {
    let Some(port) = start_stalled_server() else {
        eprintln!("skipping: cannot bind a loopback socket");
        return;
    };
    let server = ServerProfile::new("127.0.0.1", "ops", "secret").with_port(port);
    let settings = ConnectionSettings {
        connect_timeout: Duration::from_secs(5),
        read_timeout: Duration::from_millis(300),
    };
    let dir = TempDir::new().unwrap();
    let dest = dir.path().join("A251118104500");

    let (tx, rx) = mpsc::channel();
    let started = Instant::now();
    thread::spawn(move || {
        let mut manager = ConnectionManager::new(Arc::new(SuppaConnector), server, settings);
        let result = manager.retrieve_to("/data", "A251118104500", &dest);
        let connects = manager.connects();
        let _ = tx.send((result, connects));
    });

    let (result, connects) = rx
        .recv_timeout(Duration::from_secs(15))
        .expect("transfer on a silent data channel never returned");

    assert!(
        matches!(result, Err(DownloadError::Retrieval { .. })),
        "got {result:?}"
    );
    // The timeout counts as an I/O failure: one reconnect, then give up.
    assert_eq!(connects, 2);
    assert!(started.elapsed() < Duration::from_secs(10));
}
