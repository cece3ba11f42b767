use std::net::TcpListener;
use std::thread;

use btx_core::linklayer::HangUp;
use btx_session::config::SessionConfig;
use btx_session::error::SessionError;
use btx_session::host::MemoryAudio;
use btx_session::Session;

/// Uses a real loopback socket rather than an in-memory double, since what is
/// under test here is the kernel's ENOTCONN/EOF behaviour on a non-blocking
/// socket, which a fake `Read`/`Write` pair can't reproduce faithfully.
#[test]
fn peer_disconnect_is_reported_as_a_fatal_hangup() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let acceptor = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        drop(stream);
    });

    let config = SessionConfig::parse(&format!("{} {}", addr.ip(), addr.port())).unwrap();

    // enough silence to carry the modulator through its ~2s startup idle to
    // the first ready-for-next-octet point, where the link layer polls the
    // socket for the first time.
    let samples = vec![0i16; 24_200];
    let source = MemoryAudio::new(samples);
    let sink = MemoryAudio::new(Vec::new());

    let mut session = Session::connect(config, source, sink).unwrap();
    let result = session.run();

    assert!(matches!(
        result,
        Err(SessionError::HungUp(HangUp::PeerDisconnected))
    ));

    acceptor.join().unwrap();
}

#[test]
fn session_runs_to_completion_when_peer_stays_silent_and_idle() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let acceptor = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        // keep the connection open and simply never send anything
        thread::sleep(std::time::Duration::from_millis(50));
        drop(stream);
    });

    let config = SessionConfig::parse(&format!("{} {}", addr.ip(), addr.port())).unwrap();
    let samples = vec![0i16; 1_000];
    let source = MemoryAudio::new(samples);
    let sink = MemoryAudio::new(Vec::new());

    let mut session = Session::connect(config, source, sink).unwrap();
    let result = session.run();
    assert!(result.is_ok());

    acceptor.join().unwrap();
}
