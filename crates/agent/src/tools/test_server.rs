//! One-shot HTTP responder on a local port.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

pub(crate) struct OneShotServer {
    pub base_url: String,
    request: oneshot::Receiver<String>,
}

impl OneShotServer {
    /// Raw request text (head and body) the server received.
    pub async fn request(self) -> String {
        self.request.await.unwrap_or_default()
    }
}

/// Answers the first connection with the given status and body, then stops.
pub(crate) async fn serve_once(status: u16, reason: &str, body: &str) -> OneShotServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind local listener");
    let address = listener.local_addr().expect("listener address");
    let response = format!(
        "HTTP/1.1 {status} {reason}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
        body.len()
    );
    let (sender, receiver) = oneshot::channel();

    tokio::spawn(async move {
        let Ok((mut socket, _)) = listener.accept().await else {
            return;
        };
        let request = read_request(&mut socket).await;
        let _ = socket.write_all(response.as_bytes()).await;
        let _ = socket.shutdown().await;
        let _ = sender.send(request);
    });

    OneShotServer { base_url: format!("http://{address}"), request: receiver }
}

async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
    let mut buffer = Vec::new();
    let mut chunk = [0_u8; 4096];

    loop {
        let read = match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(read) => read,
        };
        buffer.extend_from_slice(&chunk[..read]);

        let text = String::from_utf8_lossy(&buffer);
        if let Some(head_end) = text.find("\r\n\r\n") {
            let content_length = text[..head_end]
                .lines()
                .filter_map(|line| line.split_once(':'))
                .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
                .and_then(|(_, value)| value.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buffer.len() >= head_end + 4 + content_length {
                break;
            }
        }
    }

    String::from_utf8_lossy(&buffer).into_owned()
}
