use anyhow::Context;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    time::{timeout, Duration},
};
use tracing::{info, warn};

use smarthome_common::{
    dispatch, DeviceBank, FirmwareError, PinCommand, ReadProgress, Request, RequestReader,
    RuntimeConfig,
};

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = RuntimeConfig::default();

    // Port 80 needs privileges on a workstation; same env override the
    // device image does not have.
    let port = std::env::var("HTTP_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let listener = TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("failed to bind control server on port {port}"))?;
    info!("control server listening on http://0.0.0.0:{port}");

    let mut bank = DeviceBank::new();

    // One connection serviced at a time: accept only happens back at
    // the top of this loop once the previous client has closed.
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(err) => {
                warn!("accept failed: {err}");
                continue;
            }
        };
        info!("client connected: {peer}");

        if let Err(err) =
            serve_connection(stream, &mut bank, config.server.request_timeout_ms).await
        {
            warn!("connection error: {err:#}");
        }
        info!("client disconnected");
    }
}

/// Handles one client: read under the deadline, dispatch, respond,
/// close. A request that never completes gets no response at all.
async fn serve_connection(
    mut stream: TcpStream,
    bank: &mut DeviceBank,
    timeout_ms: u64,
) -> anyhow::Result<()> {
    match read_request(&mut stream, timeout_ms).await {
        Ok(request) => {
            let reply = dispatch(bank, &request);
            if let Some(pin) = reply.pin {
                drive_pin(pin);
            }
            stream
                .write_all(reply.render().as_bytes())
                .await
                .context("failed to write response")?;
            stream.shutdown().await.ok();
        }
        Err(err) => {
            // Dropping the stream closes the connection silently.
            info!("abandoning connection: {err}");
        }
    }
    Ok(())
}

/// Accumulates bytes until the blank-line terminator, bounded by the
/// request timeout. Early EOF and oversized requests are treated the
/// same as a silent client.
async fn read_request(
    stream: &mut TcpStream,
    timeout_ms: u64,
) -> Result<Request, FirmwareError> {
    let mut reader = RequestReader::new();

    let read_loop = async {
        let mut buf = [0u8; 256];
        loop {
            let n = stream.read(&mut buf).await.map_err(|_| ())?;
            if n == 0 {
                return Err(());
            }
            match reader.extend(&buf[..n]) {
                ReadProgress::Complete => return Ok(()),
                ReadProgress::Overflow => return Err(()),
                ReadProgress::Incomplete => {}
            }
        }
    };

    match timeout(Duration::from_millis(timeout_ms), read_loop).await {
        Ok(Ok(())) => {}
        Ok(Err(())) | Err(_) => return Err(FirmwareError::RequestIncomplete { timeout_ms }),
    }

    // A malformed request line still gets an answer: it parses to a
    // request no route matches, so dispatch produces the 404 body.
    Ok(Request::parse(&reader.text()).unwrap_or(Request {
        method: String::new(),
        path: String::new(),
    }))
}

fn drive_pin(pin: PinCommand) {
    // Hardware integration point: the ESP32 image drives PinDriver
    // outputs here.
    info!("pin write: {:?} -> {:?}", pin.device, pin.level);
}

#[cfg(test)]
mod tests {
    use super::*;
    use smarthome_common::{DeviceId, DeviceState};

    async fn spawn_single_serve(
        timeout_ms: u64,
    ) -> (std::net::SocketAddr, tokio::task::JoinHandle<DeviceBank>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut bank = DeviceBank::new();
            serve_connection(stream, &mut bank, timeout_ms).await.unwrap();
            bank
        });
        (addr, handle)
    }

    #[tokio::test]
    async fn command_round_trip_over_tcp() {
        let (addr, server) = spawn_single_serve(2_000).await;

        let mut client = TcpStream::connect(addr).await.unwrap();
        client
            .write_all(b"GET /26/on HTTP/1.1\r\nHost: device\r\n\r\n")
            .await
            .unwrap();

        let mut response = String::new();
        client.read_to_string(&mut response).await.unwrap();

        assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(response.contains("Access-Control-Allow-Origin: *\r\n"));
        assert!(
            response.contains(r#"{"status":"success","device":"heating_pad","state":"on"}"#)
        );

        let bank = server.await.unwrap();
        assert_eq!(bank.get(DeviceId::HeatingPad), DeviceState::On);
    }

    #[tokio::test]
    async fn silent_client_is_closed_without_response() {
        let (addr, server) = spawn_single_serve(100).await;

        let mut client = TcpStream::connect(addr).await.unwrap();
        // Half a request line, then silence past the deadline.
        client.write_all(b"GET /26/on HT").await.unwrap();

        let mut response = String::new();
        client.read_to_string(&mut response).await.unwrap();
        assert!(response.is_empty());

        let bank = server.await.unwrap();
        assert_eq!(bank.get(DeviceId::HeatingPad), DeviceState::Off);
    }

    #[tokio::test]
    async fn unknown_route_gets_404_over_tcp() {
        let (addr, server) = spawn_single_serve(2_000).await;

        let mut client = TcpStream::connect(addr).await.unwrap();
        client
            .write_all(b"GET /favicon.ico HTTP/1.1\r\n\r\n")
            .await
            .unwrap();

        let mut response = String::new();
        client.read_to_string(&mut response).await.unwrap();

        assert!(response.starts_with("HTTP/1.1 404 Not Found\r\n"));
        assert!(response.contains(r#"{"status":"error","message":"Endpoint not found"}"#));
        server.await.unwrap();
    }
}
