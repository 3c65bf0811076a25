//! Raw-fd TCP listener and connection stream.
//!
//! The listening descriptor is created once by the master and
//! inherited across fork; every pool thread of every worker may block
//! in accept() on it and the kernel serializes the fan-out. Keeping
//! the type a plain fd wrapper (rather than std's `TcpListener`) is
//! what makes the cross-process sharing and the SHUT_RDWR wakeup
//! explicit.

use crate::errno;
use chttp_core::constants::LISTEN_BACKLOG;
use chttp_core::error::SocketError;
use std::net::Ipv4Addr;
use std::os::unix::io::RawFd;

fn set_rcvtimeo(fd: RawFd, secs: u64) -> Result<(), SocketError> {
    let tv = libc::timeval {
        tv_sec: secs as libc::time_t,
        tv_usec: 0,
    };
    let ret = unsafe {
        libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_RCVTIMEO,
            &tv as *const _ as *const libc::c_void,
            std::mem::size_of::<libc::timeval>() as libc::socklen_t,
        )
    };
    if ret != 0 {
        return Err(SocketError::SockOpt(errno()));
    }
    Ok(())
}

/// The shared listening socket.
pub struct Listener {
    fd: RawFd,
}

impl Listener {
    /// Create, bind to the port on all interfaces, and listen.
    /// Port 0 asks the kernel for an ephemeral port (tests).
    pub fn bind(port: u16) -> Result<Self, SocketError> {
        let fd = unsafe { libc::socket(libc::AF_INET, libc::SOCK_STREAM | libc::SOCK_CLOEXEC, 0) };
        if fd < 0 {
            return Err(SocketError::Create(errno()));
        }

        // Allow quick restart of the server
        let opt: libc::c_int = 1;
        let ret = unsafe {
            libc::setsockopt(
                fd,
                libc::SOL_SOCKET,
                libc::SO_REUSEADDR,
                &opt as *const _ as *const libc::c_void,
                std::mem::size_of::<libc::c_int>() as libc::socklen_t,
            )
        };
        if ret != 0 {
            let e = errno();
            unsafe { libc::close(fd) };
            return Err(SocketError::SockOpt(e));
        }

        let mut addr: libc::sockaddr_in = unsafe { std::mem::zeroed() };
        addr.sin_family = libc::AF_INET as libc::sa_family_t;
        addr.sin_addr.s_addr = libc::INADDR_ANY;
        addr.sin_port = port.to_be();

        let ret = unsafe {
            libc::bind(
                fd,
                &addr as *const _ as *const libc::sockaddr,
                std::mem::size_of::<libc::sockaddr_in>() as libc::socklen_t,
            )
        };
        if ret != 0 {
            let e = errno();
            unsafe { libc::close(fd) };
            return Err(SocketError::Bind { port, errno: e });
        }

        if unsafe { libc::listen(fd, LISTEN_BACKLOG) } != 0 {
            let e = errno();
            unsafe { libc::close(fd) };
            return Err(SocketError::Listen(e));
        }

        Ok(Self { fd })
    }

    /// Accept one connection. EINTR is surfaced (not retried) so the
    /// caller can re-check its shutdown flag between attempts; see
    /// `SocketError::is_interrupt`. EAGAIN maps to `Timeout` when an
    /// accept timeout was set.
    pub fn accept(&self) -> Result<Stream, SocketError> {
        let fd = unsafe { libc::accept(self.fd, std::ptr::null_mut(), std::ptr::null_mut()) };
        if fd < 0 {
            let e = errno();
            if e == libc::EAGAIN {
                return Err(SocketError::Timeout);
            }
            return Err(SocketError::Accept(e));
        }
        Ok(Stream { fd })
    }

    /// Bound port (after binding port 0).
    pub fn local_port(&self) -> Result<u16, SocketError> {
        let mut addr: libc::sockaddr_in = unsafe { std::mem::zeroed() };
        let mut len = std::mem::size_of::<libc::sockaddr_in>() as libc::socklen_t;
        let ret = unsafe {
            libc::getsockname(
                self.fd,
                &mut addr as *mut _ as *mut libc::sockaddr,
                &mut len,
            )
        };
        if ret != 0 {
            return Err(SocketError::Name(errno()));
        }
        Ok(u16::from_be(addr.sin_port))
    }

    /// Make blocked accepts return periodically (queue-mode master).
    pub fn set_accept_timeout(&self, secs: u64) -> Result<(), SocketError> {
        set_rcvtimeo(self.fd, secs)
    }

    /// SHUT_RDWR: wakes every thread blocked in accept, across all
    /// processes sharing the descriptor.
    pub fn shutdown(&self) {
        unsafe { libc::shutdown(self.fd, libc::SHUT_RDWR) };
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        unsafe { libc::close(self.fd) };
    }
}

/// One accepted connection, owned by the handling thread until close.
pub struct Stream {
    fd: RawFd,
}

impl Stream {
    /// Re-wrap a descriptor that traveled through the shared ring.
    pub fn from_raw(fd: RawFd) -> Self {
        Self { fd }
    }

    /// Give up ownership (for pushing into the shared ring).
    pub fn into_raw(self) -> RawFd {
        let fd = self.fd;
        std::mem::forget(self);
        fd
    }

    pub fn set_recv_timeout(&self, secs: u64) -> Result<(), SocketError> {
        set_rcvtimeo(self.fd, secs)
    }

    /// One read, EINTR retried. `Timeout` when SO_RCVTIMEO expired,
    /// `Closed` when the peer reset.
    pub fn read(&self, buf: &mut [u8]) -> Result<usize, SocketError> {
        loop {
            let n = unsafe { libc::read(self.fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len()) };
            if n >= 0 {
                return Ok(n as usize);
            }
            match errno() {
                libc::EINTR => continue,
                libc::EAGAIN => return Err(SocketError::Timeout),
                libc::ECONNRESET => return Err(SocketError::Closed),
                e => return Err(SocketError::Read(e)),
            }
        }
    }

    /// Write the whole buffer. A gone peer (EPIPE/ECONNRESET) is
    /// `Closed`, which callers treat as a silent end of connection.
    pub fn write_all(&self, buf: &[u8]) -> Result<(), SocketError> {
        let mut sent = 0;
        while sent < buf.len() {
            let n = unsafe {
                libc::write(
                    self.fd,
                    buf[sent..].as_ptr() as *const libc::c_void,
                    buf.len() - sent,
                )
            };
            if n > 0 {
                sent += n as usize;
                continue;
            }
            if n == 0 {
                return Err(SocketError::Write(0));
            }
            match errno() {
                libc::EINTR => continue,
                libc::EPIPE | libc::ECONNRESET => return Err(SocketError::Closed),
                e => return Err(SocketError::Write(e)),
            }
        }
        Ok(())
    }

    /// Peer address for the access log. Falls back to loopback when
    /// the peer is already gone.
    pub fn peer_ip(&self) -> String {
        let mut addr: libc::sockaddr_in = unsafe { std::mem::zeroed() };
        let mut len = std::mem::size_of::<libc::sockaddr_in>() as libc::socklen_t;
        let ret = unsafe {
            libc::getpeername(
                self.fd,
                &mut addr as *mut _ as *mut libc::sockaddr,
                &mut len,
            )
        };
        if ret != 0 {
            return "127.0.0.1".to_string();
        }
        Ipv4Addr::from(u32::from_be(addr.sin_addr.s_addr)).to_string()
    }
}

impl Drop for Stream {
    fn drop(&mut self) {
        unsafe { libc::close(self.fd) };
    }
}
