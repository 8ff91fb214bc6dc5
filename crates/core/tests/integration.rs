//! End-to-end integration test: a real `Server` on a real TCP socket,
//! driven through the AirPlay v1 (RAOP) ANNOUNCE → SETUP → RECORD →
//! SET_PARAMETER → TEARDOWN happy path.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

use raop_rtsp::crypto::DefaultCryptoProvider;
use raop_rtsp::mdns::NullMdnsAdvertiser;
use raop_rtsp::player::NullPlayer;
use raop_rtsp::rtp::NullRtpEndpoint;
use raop_rtsp::server::Collaborators;
use raop_rtsp::{Config, Server};

use rsa::pkcs1::EncodeRsaPrivateKey;
use rsa::RsaPrivateKey;

/// Fixed port for the integration test; `Server` does not expose the
/// ephemeral port a `port: 0` bind lands on, so a real integration test
/// over a live socket needs one pinned ahead of time.
const TEST_PORT: u16 = 18555;
const TEST_BIND: &str = "127.0.0.1:18555";

fn test_server() -> Server {
    let mut rng = rand::rng();
    let key = RsaPrivateKey::new(&mut rng, 1024).expect("generate RSA key");
    let pem = key
        .to_pkcs1_pem(rsa::pkcs1::LineEnding::LF)
        .expect("encode PEM")
        .to_string();
    let crypto = DefaultCryptoProvider::from_pkcs1_pem(&pem).expect("load crypto provider");

    Server::new(
        Config {
            port: TEST_PORT,
            ..Config::default()
        },
        Collaborators {
            crypto: Arc::new(crypto),
            player: Arc::new(NullPlayer::default()),
            rtp: Arc::new(NullRtpEndpoint),
            mdns: Arc::new(NullMdnsAdvertiser),
        },
    )
}

fn rtsp_request(stream: &mut TcpStream, request: &str) -> std::io::Result<String> {
    stream.write_all(request.as_bytes())?;
    stream.flush()?;

    let mut reader = BufReader::new(stream);
    let mut response = String::new();
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 {
            break;
        }
        response.push_str(&line);
        if line == "\r\n" || line == "\n" {
            break;
        }
    }

    if let Some(len) = response
        .lines()
        .find(|l| l.to_lowercase().starts_with("content-length:"))
        .and_then(|l| l.split(':').nth(1))
        .and_then(|v| v.trim().parse::<usize>().ok())
    {
        if len > 0 {
            let mut body = vec![0u8; len];
            reader.read_exact(&mut body)?;
            response.push_str(&String::from_utf8_lossy(&body));
        }
    }

    Ok(response)
}

const ANNOUNCE_SDP: &str = "v=0\r\n\
o=iTunes 3848719074 0 IN IP4 127.0.0.1\r\n\
s=iTunes\r\n\
c=IN IP4 127.0.0.1\r\n\
t=0 0\r\n\
m=audio 0 RTP/AVP 96\r\n\
a=rtpmap:96 AppleLossless\r\n\
a=fmtp:96 352 0 16 40 10 14 2 255 0 0 44100\r\n";

#[test]
fn full_handshake_announce_setup_record_teardown() {
    let mut server = test_server();
    server.start().expect("server start");
    std::thread::sleep(Duration::from_millis(100));

    let addr = TEST_BIND.to_socket_addrs().unwrap().next().unwrap();
    let mut stream =
        TcpStream::connect_timeout(&addr, Duration::from_secs(2)).expect("connect to server");
    stream.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
    stream.set_write_timeout(Some(Duration::from_secs(2))).unwrap();

    // OPTIONS
    let opt_resp = rtsp_request(&mut stream, "OPTIONS * RTSP/1.0\r\nCSeq: 1\r\n\r\n")
        .expect("OPTIONS response");
    assert!(
        opt_resp.starts_with("RTSP/1.0 200 OK"),
        "OPTIONS: expected 200 OK, got: {}",
        opt_resp.lines().next().unwrap_or("")
    );
    assert!(opt_resp.contains("Public:"), "OPTIONS: missing Public header");
    assert!(opt_resp.contains("RECORD"), "OPTIONS: Public header missing RECORD");

    // ANNOUNCE
    let announce_req = format!(
        "ANNOUNCE rtsp://127.0.0.1/audio RTSP/1.0\r\nCSeq: 2\r\nContent-Type: application/sdp\r\nContent-Length: {}\r\n\r\n{}",
        ANNOUNCE_SDP.len(),
        ANNOUNCE_SDP
    );
    let announce_resp = rtsp_request(&mut stream, &announce_req).expect("ANNOUNCE response");
    assert!(
        announce_resp.starts_with("RTSP/1.0 200 OK"),
        "ANNOUNCE: expected 200 OK, got: {}",
        announce_resp.lines().next().unwrap_or("")
    );

    // SETUP
    let setup_req = "SETUP rtsp://127.0.0.1/audio RTSP/1.0\r\nCSeq: 3\r\nTransport: RTP/AVP/UDP;unicast;mode=record;control_port=6001;timing_port=6002\r\n\r\n";
    let setup_resp = rtsp_request(&mut stream, setup_req).expect("SETUP response");
    assert!(
        setup_resp.starts_with("RTSP/1.0 200 OK"),
        "SETUP: expected 200 OK, got: {}",
        setup_resp.lines().next().unwrap_or("")
    );
    assert!(setup_resp.contains("Session: 1"), "SETUP: missing Session header");
    assert!(setup_resp.contains("Transport:"), "SETUP: missing Transport header");

    // RECORD
    let record_req = "RECORD rtsp://127.0.0.1/audio RTSP/1.0\r\nCSeq: 4\r\nSession: 1\r\nRange: npt=0-\r\nRTP-Info: seq=0;rtptime=0\r\n\r\n";
    let record_resp = rtsp_request(&mut stream, record_req).expect("RECORD response");
    assert!(
        record_resp.starts_with("RTSP/1.0 200 OK"),
        "RECORD: expected 200 OK, got: {}",
        record_resp.lines().next().unwrap_or("")
    );
    assert!(
        record_resp.contains("Audio-Latency:"),
        "RECORD: missing Audio-Latency header"
    );

    // SET_PARAMETER (volume)
    let volume_body = "volume: -15.000000\r\n";
    let set_param_req = format!(
        "SET_PARAMETER rtsp://127.0.0.1/audio RTSP/1.0\r\nCSeq: 5\r\nSession: 1\r\nContent-Type: text/parameters\r\nContent-Length: {}\r\n\r\n{}",
        volume_body.len(),
        volume_body
    );
    let set_param_resp = rtsp_request(&mut stream, &set_param_req).expect("SET_PARAMETER response");
    assert!(
        set_param_resp.starts_with("RTSP/1.0 200 OK"),
        "SET_PARAMETER: expected 200 OK, got: {}",
        set_param_resp.lines().next().unwrap_or("")
    );

    // TEARDOWN
    let teardown_resp = rtsp_request(
        &mut stream,
        "TEARDOWN rtsp://127.0.0.1/audio RTSP/1.0\r\nCSeq: 6\r\nSession: 1\r\n\r\n",
    )
    .expect("TEARDOWN response");
    assert!(
        teardown_resp.starts_with("RTSP/1.0 200 OK"),
        "TEARDOWN: expected 200 OK, got: {}",
        teardown_resp.lines().next().unwrap_or("")
    );
    assert!(
        teardown_resp.contains("Connection: close"),
        "TEARDOWN: missing Connection: close header"
    );

    server.stop().expect("server stop");
}

#[test]
fn setup_without_announce_is_rejected() {
    // A different port than the happy-path test so the two can run
    // concurrently without racing for the same listen address.
    let mut server = Server::new(
        Config {
            port: TEST_PORT + 1,
            ..Config::default()
        },
        Collaborators {
            crypto: server_crypto(),
            player: Arc::new(NullPlayer::default()),
            rtp: Arc::new(NullRtpEndpoint),
            mdns: Arc::new(NullMdnsAdvertiser),
        },
    );
    server.start().expect("server start");
    std::thread::sleep(Duration::from_millis(100));

    let addr = format!("127.0.0.1:{}", TEST_PORT + 1)
        .to_socket_addrs()
        .unwrap()
        .next()
        .unwrap();
    let mut stream =
        TcpStream::connect_timeout(&addr, Duration::from_secs(2)).expect("connect to server");
    stream.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
    stream.set_write_timeout(Some(Duration::from_secs(2))).unwrap();

    let setup_req = "SETUP rtsp://127.0.0.1/audio RTSP/1.0\r\nCSeq: 1\r\nTransport: RTP/AVP/UDP;unicast;control_port=6001;timing_port=6002\r\n\r\n";
    let setup_resp = rtsp_request(&mut stream, setup_req).expect("SETUP response");
    assert!(
        setup_resp.starts_with("RTSP/1.0 451"),
        "SETUP without ANNOUNCE: expected 451, got: {}",
        setup_resp.lines().next().unwrap_or("")
    );

    server.stop().expect("server stop");
}

fn server_crypto() -> Arc<DefaultCryptoProvider> {
    let mut rng = rand::rng();
    let key = RsaPrivateKey::new(&mut rng, 1024).expect("generate RSA key");
    let pem = key
        .to_pkcs1_pem(rsa::pkcs1::LineEnding::LF)
        .expect("encode PEM")
        .to_string();
    Arc::new(DefaultCryptoProvider::from_pkcs1_pem(&pem).expect("load crypto provider"))
}
