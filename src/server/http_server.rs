use std::io;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::thread;
use std::time::Duration;

use may::coroutine::JoinHandle;
use may_minihttp::HttpService;

/// Wrapper around may_minihttp's HTTP server.
///
/// One suspendable coroutine per connection; the service is cloned per
/// connection, which is cheap because it only holds `Arc`s to frozen state.
pub struct HttpServer<T>(pub T);

/// Handle to a running server.
pub struct ServerHandle {
    addr: SocketAddr,
    handle: JoinHandle<()>,
}

impl ServerHandle {
    /// Poll the bound address until it accepts a TCP connection. Used by
    /// tests to avoid racing the accept loop.
    pub fn wait_ready(&self) -> io::Result<()> {
        for _ in 0..50 {
            if TcpStream::connect(self.addr).is_ok() {
                return Ok(());
            }
            thread::sleep(Duration::from_millis(5));
        }
        Err(io::Error::new(io::ErrorKind::TimedOut, "server not ready"))
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Cancel the accept-loop coroutine and wait for it to finish.
    pub fn stop(self) {
        // SAFETY: cancellation of the accept loop during shutdown; the
        // handle is owned and still valid.
        unsafe {
            self.handle.coroutine().cancel();
        }
        let _ = self.handle.join();
    }

    /// Block until the accept loop exits.
    pub fn join(self) -> std::thread::Result<()> {
        self.handle.join()
    }
}

impl<T: HttpService + Clone + Send + Sync + 'static> HttpServer<T> {
    /// Bind `addr` and start accepting connections.
    pub fn start<A: ToSocketAddrs>(self, addr: A) -> io::Result<ServerHandle> {
        let addr = addr
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "invalid address"))?;
        let handle = may_minihttp::HttpServer(self.0).start(addr)?;
        Ok(ServerHandle { addr, handle })
    }
}
