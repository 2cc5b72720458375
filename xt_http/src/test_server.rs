//! Single-connection HTTP servers on loopback for client tests

use std::io::Read;
use std::io::Write;
use std::net::TcpListener;
use std::thread::JoinHandle;
use std::time::Duration;

pub(crate) struct TestServer {
    pub url: String,
    handle: JoinHandle<String>,
}

impl TestServer {
    /// Raw request head received by the server
    pub fn request(self) -> String {
        self.handle.join().unwrap()
    }
}

fn serve<F>(respond: F) -> TestServer
where
    F: FnOnce(&mut std::net::TcpStream) + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());

    let handle = std::thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut buf = [0u8; 4096];
        let n = stream.read(&mut buf).unwrap();
        respond(&mut stream);
        String::from_utf8_lossy(&buf[..n]).into_owned()
    });

    TestServer { url, handle }
}

/// Reads the request and holds the connection open without answering
pub(crate) fn silent() -> TestServer {
    serve(|_| std::thread::sleep(Duration::from_secs(1)))
}

/// Reads the request and writes `response` verbatim
pub(crate) fn answering(response: &'static str) -> TestServer {
    serve(move |stream| {
        stream.write_all(response.as_bytes()).unwrap();
        stream.flush().unwrap();
    })
}

/// URL of a loopback port nothing listens on
pub(crate) fn closed_port_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}/")
}
